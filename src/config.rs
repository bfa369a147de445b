//! Environment-sourced configuration for the transcription pipeline.
//!
//! The core is a library, so configuration arrives as a plain struct; the
//! [`TranscriberConfig::from_env`] constructor reads the recognized
//! environment variables and falls back to defaults for anything unset or
//! unparseable (with a warning, never a panic).

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::scoring::ScorerConfig;

/// Everything the pipeline needs to know about its environment.
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Credential for the fast cloud STT tier. Unset disables the tier.
    pub groq_api_key: Option<String>,
    /// Credential for the general multimodal tier. Unset disables the tier.
    pub gemini_api_key: Option<String>,
    /// Credential for the secondary cloud STT tier. Unset disables the tier.
    pub openai_api_key: Option<String>,
    /// Caller-side deadline for one general-tier call, in milliseconds.
    pub gemini_timeout_ms: u64,
    /// Explicit whisper binary path, checked before the probe list.
    pub whisper_binary_path: Option<PathBuf>,
    /// Path to the whisper model file. Unset disables the local tier.
    pub whisper_model_path: Option<PathBuf>,
    /// Model name recorded in logs.
    pub whisper_model: String,
    /// Whether the local tier may run at all.
    pub enable_local_fallback: bool,
    /// Maximum attempts against the general tier.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Confidence at or above which a general-tier result is accepted
    /// without escalating further.
    pub confidence_threshold: f64,
    /// Cloud confidence below this hard floor always yields to a local
    /// result, even one with lower confidence of its own.
    pub local_confidence_floor: f64,
    pub scorer: ScorerConfig,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            gemini_api_key: None,
            openai_api_key: None,
            gemini_timeout_ms: 30_000,
            whisper_binary_path: None,
            whisper_model_path: None,
            whisper_model: "base.en".to_string(),
            enable_local_fallback: true,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 8_000,
            confidence_threshold: 0.6,
            local_confidence_floor: 0.4,
            scorer: ScorerConfig::default(),
        }
    }
}

impl TranscriberConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            groq_api_key: non_empty_var("GROQ_API_KEY"),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            gemini_timeout_ms: parsed_var("GEMINI_TIMEOUT_MS", defaults.gemini_timeout_ms),
            whisper_binary_path: non_empty_var("WHISPER_BINARY_PATH").map(PathBuf::from),
            whisper_model_path: non_empty_var("WHISPER_MODEL_PATH").map(PathBuf::from),
            whisper_model: non_empty_var("WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            enable_local_fallback: parsed_var("ENABLE_LOCAL_FALLBACK", defaults.enable_local_fallback),
            max_retries: parsed_var("TRANSCRIBE_MAX_RETRIES", defaults.max_retries),
            retry_base_delay_ms: parsed_var("TRANSCRIBE_RETRY_BASE_MS", defaults.retry_base_delay_ms),
            retry_max_delay_ms: parsed_var("TRANSCRIBE_RETRY_MAX_MS", defaults.retry_max_delay_ms),
            confidence_threshold: parsed_var("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            local_confidence_floor: defaults.local_confidence_floor,
            scorer: ScorerConfig::default(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parsed_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring unparseable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}
