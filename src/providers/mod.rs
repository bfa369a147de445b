//! Transcription providers.
//!
//! Every provider conforms to the same [`TranscriptionProvider`] contract
//! and reports failures through the closed error taxonomy, so the
//! orchestrator can treat tiers uniformly regardless of whether a tier is a
//! cloud API or a local subprocess.

pub mod gemini;
pub mod groq;
pub mod openai;
pub mod whisper_local;

use async_trait::async_trait;

use crate::error::TranscribeError;
use crate::protocol::{PromptVariant, ProviderKind};

pub use gemini::GeminiProvider;
pub use groq::GroqProvider;
pub use openai::OpenAiProvider;
pub use whisper_local::WhisperLocalProvider;

/// One transcription request as a provider sees it.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub audio: &'a [u8],
    pub mime_type: &'a str,
    pub prompt_variant: PromptVariant,
    /// ISO 639-1 hint, when the caller knows the expected language.
    pub language_hint: Option<&'a str>,
}

/// Raw transcript as returned by one provider call.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub text: String,
    pub provider: ProviderKind,
    pub prompt_variant: PromptVariant,
    /// Confidence asserted by the provider itself, when it offers one.
    pub provider_confidence: Option<f64>,
}

/// Common capability implemented by every tier.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether this provider has the credentials/paths it needs. The
    /// orchestrator skips unconfigured tiers without counting an attempt.
    fn is_configured(&self) -> bool;

    async fn transcribe(&self, request: ProviderRequest<'_>)
        -> Result<ProviderReply, TranscribeError>;
}

/// Sentinel a provider is instructed to emit when the clip has no
/// intelligible speech. Normalized away by the orchestrator's final pass.
pub const NO_SPEECH_SENTINEL: &str = "[no speech detected]";

/// Detailed instruction used on first attempts.
const STANDARD_PROMPT: &str = "Transcribe this audio recording exactly as spoken. \
The speaker is practicing English conversation about technology topics; expect \
vocabulary such as AI, LLM, ChatGPT, OpenAI, prompt engineering, and machine \
learning. Transcribe only the primary speaker and ignore background noise or \
faint secondary voices. Do not add commentary, translations, or punctuation \
the speaker did not dictate. If there is no intelligible speech, reply with \
exactly [no speech detected].";

/// Terse instruction used on later retries. A long prompt can itself degrade
/// transcription of noisy input, so retries switch strategy instead of
/// repeating the detailed prompt.
const FALLBACK_PROMPT: &str = "Transcribe this audio exactly. If there is no \
intelligible speech, reply with exactly [no speech detected].";

pub fn prompt_for(variant: PromptVariant) -> &'static str {
    match variant {
        PromptVariant::Standard => STANDARD_PROMPT,
        PromptVariant::Fallback => FALLBACK_PROMPT,
    }
}

/// Map an HTTP status from a cloud STT endpoint to an error kind.
///
/// Shared by the multipart providers; Gemini has its own richer mapping
/// that also inspects in-body error codes.
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> TranscribeError {
    match status.as_u16() {
        400 => TranscribeError::InvalidRequest(truncate_body(body)),
        401 => TranscribeError::InvalidApiKey,
        403 => TranscribeError::Forbidden,
        413 => TranscribeError::InvalidRequest("payload too large".to_string()),
        429 => TranscribeError::RateLimit,
        500..=599 => TranscribeError::ServiceError(format!("status {}", status.as_u16())),
        _ => TranscribeError::UnknownError(format!("status {}", status.as_u16())),
    }
}

/// Map a transport-level reqwest failure to an error kind.
pub(crate) fn map_transport_error(e: reqwest::Error, timeout_ms: u64) -> TranscribeError {
    if e.is_timeout() {
        TranscribeError::Timeout(timeout_ms)
    } else if e.is_connect() || e.is_request() {
        TranscribeError::NetworkError(e.to_string())
    } else {
        TranscribeError::UnknownError(e.to_string())
    }
}

/// Keep error bodies short enough for logs; they are diagnostics, not data.
fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < LIMIT)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert_eq!(
            map_http_status(StatusCode::TOO_MANY_REQUESTS, ""),
            TranscribeError::RateLimit
        );
        assert_eq!(
            map_http_status(StatusCode::UNAUTHORIZED, ""),
            TranscribeError::InvalidApiKey
        );
        assert_eq!(map_http_status(StatusCode::FORBIDDEN, ""), TranscribeError::Forbidden);
        assert!(matches!(
            map_http_status(StatusCode::BAD_REQUEST, "bad form"),
            TranscribeError::InvalidRequest(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            TranscribeError::ServiceError(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::IM_A_TEAPOT, ""),
            TranscribeError::UnknownError(_)
        ));
    }

    #[test]
    fn prompts_differ_by_variant() {
        let standard = prompt_for(PromptVariant::Standard);
        let fallback = prompt_for(PromptVariant::Fallback);
        assert!(standard.len() > fallback.len());
        assert!(standard.contains(NO_SPEECH_SENTINEL));
        assert!(fallback.contains(NO_SPEECH_SENTINEL));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let long = "x".repeat(1000);
        match map_http_status(StatusCode::BAD_REQUEST, &long) {
            TranscribeError::InvalidRequest(msg) => assert!(msg.len() < 250),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
