//! Top-level transcription policy: tier sequencing, retry with backoff,
//! and final result selection.
//!
//! Tiers and attempts run strictly sequentially; providers are never raced.
//! Duplicate provider charges cost real money, so the latency a race would
//! save is deliberately not taken. Cancellation is cooperative: the caller
//! drops the returned future (for example on client disconnect) and no
//! further provider call starts.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::audio::preprocess::AudioPreprocessor;
use crate::audio::validator;
use crate::config::TranscriberConfig;
use crate::corrector::TextCorrector;
use crate::error::TranscribeError;
use crate::protocol::{
    AudioQuality, PromptVariant, ProviderKind, QualityTier, TranscriptionAttempt,
    TranscriptionResult,
};
use crate::providers::{
    GeminiProvider, GroqProvider, OpenAiProvider, ProviderRequest, TranscriptionProvider,
    WhisperLocalProvider,
};
use crate::scoring::ConfidenceScorer;

/// Sentinel phrases providers emit for unintelligible clips; normalized to
/// an empty transcript in the final cleanup pass.
const NO_SPEECH_SENTINELS: &[&str] = &["[no speech detected]", "[silence]", "[no audio]", "[blank_audio]"];

/// Confidence assigned to an empty final transcript.
const NO_SPEECH_CONFIDENCE: f64 = 0.1;

/// Local-tier confidence heuristic: whisper is assumed accurate for clear
/// speech.
const LOCAL_BASE_CONFIDENCE: f64 = 0.9;
const LOCAL_IMPLAUSIBLE_RATE_CONFIDENCE: f64 = 0.75;
const LOCAL_POOR_QUALITY_PENALTY: f64 = 0.1;

/// Per-request options passed in by the boundary layer.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub use_local_fallback: bool,
    pub language_hint: Option<String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            use_local_fallback: true,
            language_hint: None,
        }
    }
}

/// Retry and acceptance policy, lifted from [`TranscriberConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorPolicy {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub confidence_threshold: f64,
    pub local_confidence_floor: f64,
    pub enable_local_fallback: bool,
}

impl From<&TranscriberConfig> for OrchestratorPolicy {
    fn from(config: &TranscriberConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(config.retry_max_delay_ms),
            confidence_threshold: config.confidence_threshold,
            local_confidence_floor: config.local_confidence_floor,
            enable_local_fallback: config.enable_local_fallback,
        }
    }
}

/// A failed orchestration run: the terminal error plus the attempt log,
/// which would otherwise be lost with the result.
#[derive(Debug)]
pub struct OrchestrationFailure {
    pub error: TranscribeError,
    pub attempts: Vec<TranscriptionAttempt>,
}

impl std::fmt::Display for OrchestrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for OrchestrationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<TranscribeError> for OrchestrationFailure {
    fn from(error: TranscribeError) -> Self {
        Self {
            error,
            attempts: Vec::new(),
        }
    }
}

/// Sequences providers and picks the final transcript.
///
/// Stateless per invocation: one orchestrator instance serves concurrent
/// requests without shared mutable state.
pub struct TranscriptionOrchestrator {
    fast: Option<Arc<dyn TranscriptionProvider>>,
    general: Option<Arc<dyn TranscriptionProvider>>,
    secondary: Option<Arc<dyn TranscriptionProvider>>,
    local: Option<Arc<dyn TranscriptionProvider>>,
    preprocessor: Option<AudioPreprocessor>,
    scorer: ConfidenceScorer,
    corrector: TextCorrector,
    policy: OrchestratorPolicy,
}

/// A transcript candidate still in the running.
struct Candidate {
    text: String,
    confidence: f64,
    provider: ProviderKind,
}

impl TranscriptionOrchestrator {
    pub fn new(policy: OrchestratorPolicy) -> Self {
        Self {
            fast: None,
            general: None,
            secondary: None,
            local: None,
            preprocessor: None,
            scorer: ConfidenceScorer::default(),
            corrector: TextCorrector::new(),
            policy,
        }
    }

    /// Build the production pipeline from configuration.
    pub fn from_config(config: &TranscriberConfig) -> Self {
        let mut orchestrator = Self::new(OrchestratorPolicy::from(config));
        orchestrator.scorer = ConfidenceScorer::new(config.scorer.clone());
        orchestrator.preprocessor = Some(AudioPreprocessor::new());
        orchestrator.fast = Some(Arc::new(GroqProvider::new(config.groq_api_key.clone())));
        orchestrator.general = Some(Arc::new(GeminiProvider::new(
            config.gemini_api_key.clone(),
            Duration::from_millis(config.gemini_timeout_ms),
        )));
        orchestrator.secondary = Some(Arc::new(OpenAiProvider::new(config.openai_api_key.clone())));
        orchestrator.local = Some(Arc::new(WhisperLocalProvider::new(
            config.whisper_binary_path.clone(),
            config.whisper_model_path.clone(),
        )));
        orchestrator
    }

    pub fn with_fast(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.fast = Some(provider);
        self
    }

    pub fn with_general(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.general = Some(provider);
        self
    }

    pub fn with_secondary(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    pub fn with_local(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.local = Some(provider);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: AudioPreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Run the full pipeline on one clip.
    ///
    /// Benign rejections (`TooShort`, `Silence`) surface as errors here; the
    /// boundary layer turns them into empty-transcript responses. Dropping
    /// the returned future cancels the run at the next suspension point.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult, OrchestrationFailure> {
        let started = Instant::now();

        // Gate before any network or subprocess work. A mostly-silent clip
        // must never reach a paid provider.
        let validated = validator::validate(audio)?;

        let (audio, quality, preprocess_confidence) = match &self.preprocessor {
            Some(preprocessor) => {
                let outcome = preprocessor
                    .preprocess(validated.audio, &validated.quality)
                    .await;
                (outcome.audio, outcome.quality, outcome.confidence)
            }
            None => (validated.audio, validated.quality, 1.0),
        };

        let mime_type = quality.container.mime_type();
        let language_hint = options.language_hint.as_deref();
        let mut attempts: Vec<TranscriptionAttempt> = Vec::new();
        let mut last_error: Option<TranscribeError> = None;
        let mut first_tier: Option<ProviderKind> = None;

        // Fast tier: one attempt, trusted at face value when it returns text.
        if let Some(fast) = configured(&self.fast) {
            first_tier.get_or_insert(fast.kind());
            let request = ProviderRequest {
                audio: &audio,
                mime_type,
                prompt_variant: PromptVariant::Standard,
                language_hint,
            };
            match fast.transcribe(request).await {
                Ok(reply) if !reply.text.trim().is_empty() => {
                    let confidence = reply.provider_confidence.unwrap_or_else(|| {
                        self.scorer
                            .score(&quality, &reply.text, quality.estimated_duration_seconds)
                    });
                    attempts.push(TranscriptionAttempt::success(
                        fast.kind(),
                        1,
                        PromptVariant::Standard,
                        confidence,
                    ));
                    info!(provider = fast.kind().as_str(), "fast tier accepted");
                    return Ok(self.finalize(
                        Candidate {
                            text: reply.text,
                            confidence,
                            provider: fast.kind(),
                        },
                        first_tier,
                        attempts,
                        quality,
                        started,
                    ));
                }
                Ok(_) => {
                    debug!(provider = fast.kind().as_str(), "fast tier returned empty text");
                    attempts.push(TranscriptionAttempt::success(
                        fast.kind(),
                        1,
                        PromptVariant::Standard,
                        0.05,
                    ));
                }
                Err(e) => {
                    warn!(provider = fast.kind().as_str(), error = %e, "fast tier failed");
                    attempts.push(TranscriptionAttempt::failure(
                        fast.kind(),
                        1,
                        PromptVariant::Standard,
                        e.kind(),
                    ));
                    last_error = Some(e);
                }
            }
        }

        // General tier: the retry target.
        let mut best_cloud: Option<Candidate> = None;
        if let Some(general) = configured(&self.general) {
            first_tier.get_or_insert(general.kind());

            for attempt in 1..=self.policy.max_retries {
                // An over-long prompt can itself degrade transcription of
                // noisy input: later retries switch to the terse variant
                // rather than repeating the same instruction.
                let variant = if attempt > 2 {
                    PromptVariant::Fallback
                } else {
                    PromptVariant::Standard
                };
                let request = ProviderRequest {
                    audio: &audio,
                    mime_type,
                    prompt_variant: variant,
                    language_hint,
                };

                match general.transcribe(request).await {
                    Ok(reply) => {
                        let scored = (self.scorer.score(
                            &quality,
                            &reply.text,
                            quality.estimated_duration_seconds,
                        ) * preprocess_confidence)
                            .clamp(0.0, 1.0);
                        attempts.push(TranscriptionAttempt::success(
                            general.kind(),
                            attempt,
                            variant,
                            scored,
                        ));
                        debug!(attempt, confidence = scored, "general tier succeeded");

                        if best_cloud
                            .as_ref()
                            .map_or(true, |best| scored > best.confidence)
                        {
                            best_cloud = Some(Candidate {
                                text: reply.text,
                                confidence: scored,
                                provider: general.kind(),
                            });
                        }

                        if scored >= self.policy.confidence_threshold {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(attempt, provider = general.kind().as_str(), error = %e, "general tier attempt failed");
                        attempts.push(TranscriptionAttempt::failure(
                            general.kind(),
                            attempt,
                            variant,
                            e.kind(),
                        ));
                        let retryable = e.is_retryable();
                        last_error = Some(e);
                        // Permanent failures abort the tier, not just the
                        // attempt; remaining retries would burn money on a
                        // request that cannot succeed.
                        if !retryable {
                            break;
                        }
                    }
                }

                if attempt < self.policy.max_retries {
                    let delay = backoff_delay(
                        self.policy.retry_base_delay,
                        self.policy.retry_max_delay,
                        attempt,
                    );
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                    sleep(delay).await;
                }
            }
        }

        let accepted_cloud = best_cloud
            .as_ref()
            .is_some_and(|c| c.confidence >= self.policy.confidence_threshold);

        // Secondary cloud tier: one attempt, judged like a general result.
        if !accepted_cloud {
            if let Some(secondary) = configured(&self.secondary) {
                first_tier.get_or_insert(secondary.kind());
                let request = ProviderRequest {
                    audio: &audio,
                    mime_type,
                    prompt_variant: PromptVariant::Standard,
                    language_hint,
                };
                match secondary.transcribe(request).await {
                    Ok(reply) => {
                        let scored = (self.scorer.score(
                            &quality,
                            &reply.text,
                            quality.estimated_duration_seconds,
                        ) * preprocess_confidence)
                            .clamp(0.0, 1.0);
                        attempts.push(TranscriptionAttempt::success(
                            secondary.kind(),
                            1,
                            PromptVariant::Standard,
                            scored,
                        ));
                        if best_cloud
                            .as_ref()
                            .map_or(true, |best| scored > best.confidence)
                        {
                            best_cloud = Some(Candidate {
                                text: reply.text,
                                confidence: scored,
                                provider: secondary.kind(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!(provider = secondary.kind().as_str(), error = %e, "secondary tier failed");
                        attempts.push(TranscriptionAttempt::failure(
                            secondary.kind(),
                            1,
                            PromptVariant::Standard,
                            e.kind(),
                        ));
                        last_error = Some(e);
                    }
                }
            }
        }

        let cloud_is_confident = best_cloud
            .as_ref()
            .is_some_and(|c| c.confidence >= self.policy.confidence_threshold);

        // Local tier: runs only when the cloud result is still unconvincing.
        if !cloud_is_confident
            && options.use_local_fallback
            && self.policy.enable_local_fallback
        {
            if let Some(local) = configured(&self.local) {
                first_tier.get_or_insert(local.kind());
                let request = ProviderRequest {
                    audio: &audio,
                    mime_type,
                    prompt_variant: PromptVariant::Standard,
                    language_hint,
                };
                match local.transcribe(request).await {
                    Ok(reply) => {
                        let local_confidence = self.local_confidence(&quality, &reply.text);
                        attempts.push(TranscriptionAttempt::success(
                            local.kind(),
                            1,
                            PromptVariant::Standard,
                            local_confidence,
                        ));

                        // Two separate escape hatches, kept deliberately:
                        // a strictly better local score beats a weakly-right
                        // cloud result, and the hard floor discards a cloud
                        // result that is confidently wrong.
                        let take_local = match &best_cloud {
                            Some(cloud) => {
                                local_confidence > cloud.confidence
                                    || cloud.confidence < self.policy.local_confidence_floor
                            }
                            None => true,
                        };
                        if take_local {
                            info!(confidence = local_confidence, "local tier result selected");
                            best_cloud = Some(Candidate {
                                text: reply.text,
                                confidence: local_confidence,
                                provider: local.kind(),
                            });
                        } else {
                            debug!("keeping cloud result over local");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "local tier failed");
                        attempts.push(TranscriptionAttempt::failure(
                            local.kind(),
                            1,
                            PromptVariant::Standard,
                            e.kind(),
                        ));
                        last_error = Some(e);
                    }
                }
            }
        }

        match best_cloud {
            Some(candidate) => Ok(self.finalize(candidate, first_tier, attempts, quality, started)),
            // Never succeed silently with no text at all.
            None => Err(OrchestrationFailure {
                error: last_error.unwrap_or(TranscribeError::TranscriptionFailed),
                attempts,
            }),
        }
    }

    /// Provider-specific confidence for the local tier.
    fn local_confidence(&self, quality: &AudioQuality, text: &str) -> f64 {
        let words = text.split_whitespace().count();
        let mut confidence = if self
            .scorer
            .rate_is_implausible(words, quality.estimated_duration_seconds)
        {
            LOCAL_IMPLAUSIBLE_RATE_CONFIDENCE
        } else {
            LOCAL_BASE_CONFIDENCE
        };
        if quality.quality_tier == QualityTier::Poor {
            confidence -= LOCAL_POOR_QUALITY_PENALTY;
        }
        confidence
    }

    /// Correct the chosen text, normalize sentinels, and assemble the result.
    fn finalize(
        &self,
        candidate: Candidate,
        first_tier: Option<ProviderKind>,
        attempts: Vec<TranscriptionAttempt>,
        quality: AudioQuality,
        started: Instant,
    ) -> TranscriptionResult {
        let corrected = self.corrector.correct(&candidate.text);
        let normalized = strip_sentinels(&corrected);

        let (text, confidence, no_speech) = if normalized.trim().is_empty() {
            (String::new(), NO_SPEECH_CONFIDENCE, true)
        } else {
            (normalized, candidate.confidence.clamp(0.0, 1.0), false)
        };

        TranscriptionResult {
            text,
            raw_text: candidate.text,
            confidence,
            method: candidate.provider,
            used_fallback: first_tier.is_some_and(|first| first != candidate.provider),
            no_speech,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts,
            quality,
        }
    }
}

fn configured(
    slot: &Option<Arc<dyn TranscriptionProvider>>,
) -> Option<&Arc<dyn TranscriptionProvider>> {
    slot.as_ref().filter(|provider| provider.is_configured())
}

/// Exponential backoff after a failed attempt: min(base * 2^(n-1), cap).
fn backoff_delay(base: Duration, cap: Duration, completed_attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(completed_attempt.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

/// Case-insensitively remove sentinel phrases a provider emitted instead of
/// a transcript. ASCII lowercasing keeps byte offsets aligned with the
/// original text.
fn strip_sentinels(text: &str) -> String {
    let mut out = text.to_string();
    for sentinel in NO_SPEECH_SENTINELS {
        loop {
            let lower = out.to_ascii_lowercase();
            let Some(index) = lower.find(sentinel) else {
                break;
            };
            out.replace_range(index..index + sentinel.len(), "");
        }
    }
    out.trim().to_string()
}
