//! Heuristic confidence estimation for transcripts.
//!
//! The score combines audio-quality metrics with transcript shape
//! (words per second). It is an additive heuristic clamped to [0, 1], not a
//! calibrated probability: only ordering properties are meaningful.

use crate::protocol::{AudioQuality, QualityTier};

/// Tunable thresholds for [`ConfidenceScorer`].
///
/// The defaults are empirically tuned values with no stated derivation;
/// they are kept as configuration rather than hard-coded so deployments can
/// adjust them without a rebuild.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Entropy proxy above this earns a small bonus.
    pub entropy_bonus_threshold: f64,
    /// Entropy proxy below this earns a penalty.
    pub entropy_penalty_threshold: f64,
    /// Words-per-second range considered typical speech.
    pub plausible_rate_min: f64,
    pub plausible_rate_max: f64,
    /// Words-per-second range outside which the rate is implausible.
    pub hard_rate_min: f64,
    pub hard_rate_max: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            entropy_bonus_threshold: 30.0,
            entropy_penalty_threshold: 10.0,
            plausible_rate_min: 1.0,
            plausible_rate_max: 6.0,
            hard_rate_min: 0.5,
            hard_rate_max: 8.0,
        }
    }
}

/// Estimates how much a transcript should be trusted.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score `text` transcribed from audio with the given `quality`.
    ///
    /// `duration_seconds` is the size-derived duration estimate; it only
    /// feeds the relative words-per-second check.
    pub fn score(&self, quality: &AudioQuality, text: &str, duration_seconds: f64) -> f64 {
        if text.trim().is_empty() {
            return 0.05;
        }

        let words = text.split_whitespace().count();
        if words == 0 {
            return 0.1;
        }

        let mut confidence: f64 = 0.5;

        confidence += match quality.quality_tier {
            QualityTier::Good => 0.2,
            QualityTier::Fair => 0.1,
            QualityTier::Poor => -0.2,
        };

        confidence -= 0.3 * quality.zero_ratio;

        if quality.entropy > self.config.entropy_bonus_threshold {
            confidence += 0.1;
        } else if quality.entropy < self.config.entropy_penalty_threshold {
            confidence -= 0.2;
        }

        if duration_seconds > 0.0 {
            let rate = words as f64 / duration_seconds;
            if rate >= self.config.plausible_rate_min && rate <= self.config.plausible_rate_max {
                confidence += 0.1;
            } else if rate < self.config.hard_rate_min || rate > self.config.hard_rate_max {
                confidence -= 0.15;
            }
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Whether a words-per-second rate falls outside the hard plausibility
    /// bounds. Used by the local-tier confidence heuristic.
    pub fn rate_is_implausible(&self, words: usize, duration_seconds: f64) -> bool {
        if duration_seconds <= 0.0 {
            return false;
        }
        let rate = words as f64 / duration_seconds;
        rate < self.config.hard_rate_min || rate > self.config.hard_rate_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AudioContainer;

    fn quality(tier: QualityTier, zero_ratio: f64, entropy: f64) -> AudioQuality {
        AudioQuality {
            has_valid_header: true,
            container: AudioContainer::WebM,
            zero_ratio,
            is_mostly_silence: false,
            size: 50_000,
            estimated_duration_seconds: 3.0,
            entropy,
            quality_tier: tier,
        }
    }

    #[test]
    fn good_quality_scores_at_least_as_high_as_poor() {
        let scorer = ConfidenceScorer::default();
        let text = "hello there how are you today";

        let good = scorer.score(&quality(QualityTier::Good, 0.01, 60.0), text, 3.0);
        let poor = scorer.score(&quality(QualityTier::Poor, 0.01, 60.0), text, 3.0);
        assert!(good >= poor, "good={good} poor={poor}");
    }

    #[test]
    fn plausible_speech_on_good_audio_clears_the_threshold() {
        let scorer = ConfidenceScorer::default();
        // 6 words over 3 seconds: 2 words/sec, well inside the typical band.
        let score = scorer.score(
            &quality(QualityTier::Good, 0.01, 60.0),
            "hello there how are you today",
            3.0,
        );
        assert!(score >= 0.6, "score={score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn zero_words_forces_low_confidence() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(&quality(QualityTier::Good, 0.0, 60.0), "   ", 3.0);
        assert!((score - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_text_scores_lowest() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(&quality(QualityTier::Good, 0.0, 60.0), "", 3.0);
        assert!((score - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn implausible_rate_is_penalized() {
        let scorer = ConfidenceScorer::default();
        let q = quality(QualityTier::Good, 0.01, 60.0);
        // 40 words in 3 seconds is over 13 words/sec.
        let babble = "word ".repeat(40);
        let fast = scorer.score(&q, &babble, 3.0);
        let normal = scorer.score(&q, "hello there how are you today", 3.0);
        assert!(fast < normal, "fast={fast} normal={normal}");
    }

    #[test]
    fn low_entropy_is_penalized() {
        let scorer = ConfidenceScorer::default();
        let text = "hello there how are you today";
        let flat = scorer.score(&quality(QualityTier::Good, 0.01, 5.0), text, 3.0);
        let lively = scorer.score(&quality(QualityTier::Good, 0.01, 60.0), text, 3.0);
        assert!(flat < lively);
    }

    #[test]
    fn result_is_always_clamped() {
        let scorer = ConfidenceScorer::default();
        // Pile every penalty on at once.
        let q = quality(QualityTier::Poor, 1.0, 5.0);
        let babble = "word ".repeat(100);
        let score = scorer.score(&q, &babble, 1.0);
        assert!((0.0..=1.0).contains(&score), "score={score}");
    }

    #[test]
    fn rate_plausibility_helper_matches_bounds() {
        let scorer = ConfidenceScorer::default();
        assert!(!scorer.rate_is_implausible(6, 3.0)); // 2 words/sec
        assert!(scorer.rate_is_implausible(40, 3.0)); // >8 words/sec
        assert!(scorer.rate_is_implausible(1, 10.0)); // <0.5 words/sec
        assert!(!scorer.rate_is_implausible(5, 0.0)); // no duration, no judgment
    }
}
