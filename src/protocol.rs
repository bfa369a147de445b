use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container format detected from the first bytes of a clip.
///
/// Browser recordings are WebM in practice, so ambiguous buffers default to
/// WebM rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioContainer {
    WebM,
    Wav,
    Mp3,
    Ogg,
    Mp4,
    Flac,
}

impl AudioContainer {
    /// MIME type to declare when handing this clip to a provider.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioContainer::WebM => "audio/webm",
            AudioContainer::Wav => "audio/wav",
            AudioContainer::Mp3 => "audio/mpeg",
            AudioContainer::Ogg => "audio/ogg",
            AudioContainer::Mp4 => "audio/mp4",
            AudioContainer::Flac => "audio/flac",
        }
    }

    /// File extension used for temp files fed to subprocess tools.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioContainer::WebM => "webm",
            AudioContainer::Wav => "wav",
            AudioContainer::Mp3 => "mp3",
            AudioContainer::Ogg => "ogg",
            AudioContainer::Mp4 => "m4a",
            AudioContainer::Flac => "flac",
        }
    }
}

/// Coarse signal-quality bucket derived from the zero-byte ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Good,
    Fair,
    Poor,
}

/// Heuristic signal-quality metrics for one audio buffer.
///
/// Computed once per request by the quality analyzer and never cached across
/// requests. All fields are cheap byte-level heuristics; none of them involve
/// real codec parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioQuality {
    /// Whether the buffer started with a known container signature.
    pub has_valid_header: bool,
    /// Detected (or defaulted) container format.
    pub container: AudioContainer,
    /// Fraction of sampled bytes equal to zero, in [0, 1].
    pub zero_ratio: f64,
    /// True when the sampled buffer is almost entirely zero bytes.
    pub is_mostly_silence: bool,
    /// Buffer size in bytes.
    pub size: usize,
    /// Rough size-derived duration estimate in seconds. Only meaningful for
    /// relative comparisons such as words-per-second, never wall-clock time.
    pub estimated_duration_seconds: f64,
    /// Sample standard deviation of byte values. A proxy for signal
    /// activity, not true Shannon entropy.
    pub entropy: f64,
    pub quality_tier: QualityTier,
}

/// Which provider produced (or failed to produce) a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "whisperLocal")]
    WhisperLocal,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
            ProviderKind::WhisperLocal => "whisperLocal",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Which transcription instruction a provider call carried.
///
/// The standard prompt is detailed; the fallback prompt is deliberately terse
/// because an over-specified prompt can itself degrade transcription of noisy
/// input on later retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    Standard,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One provider invocation within an orchestration run.
///
/// Attempts are appended in real invocation order and never mutated after
/// being appended. They exist for observability only and are discarded with
/// the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionAttempt {
    pub provider: ProviderKind,
    /// 1-based attempt number within the provider's tier.
    pub attempt_number: u32,
    pub prompt_variant: PromptVariant,
    pub outcome: AttemptOutcome,
    /// Stable error code when the outcome is a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Confidence computed for this attempt when it succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptionAttempt {
    pub fn success(
        provider: ProviderKind,
        attempt_number: u32,
        prompt_variant: PromptVariant,
        confidence: f64,
    ) -> Self {
        Self {
            provider,
            attempt_number,
            prompt_variant,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            confidence: Some(confidence),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        provider: ProviderKind,
        attempt_number: u32,
        prompt_variant: PromptVariant,
        error_kind: &str,
    ) -> Self {
        Self {
            provider,
            attempt_number,
            prompt_variant,
            outcome: AttemptOutcome::Failure,
            error_kind: Some(error_kind.to_string()),
            confidence: None,
            timestamp: Utc::now(),
        }
    }
}

/// Final output of one orchestration run.
///
/// Constructed once, immutable, returned to the HTTP boundary and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    /// Corrected transcript. Empty when no intelligible speech was found,
    /// in which case `confidence` is at most 0.1 and `no_speech` is set.
    pub text: String,
    /// Transcript as the chosen provider returned it, before correction.
    pub raw_text: String,
    /// Heuristic trust estimate in [0, 1]. Not a calibrated probability.
    pub confidence: f64,
    /// Provider that produced the accepted transcript.
    pub method: ProviderKind,
    /// True when the accepted transcript did not come from the first tier
    /// attempted in this run.
    pub used_fallback: bool,
    /// True when the final transcript is empty after sentinel cleanup.
    pub no_speech: bool,
    pub duration_ms: u64,
    /// Every provider invocation in real order.
    pub attempts: Vec<TranscriptionAttempt>,
    pub quality: AudioQuality,
}
