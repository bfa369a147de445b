use thiserror::Error;

/// Errors that can occur in the transcription pipeline.
///
/// This is a closed taxonomy: provider adapters map raw HTTP statuses,
/// in-body error codes, and subprocess failures onto these variants so the
/// orchestrator can apply a uniform retry policy. Messages never contain
/// credentials.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranscribeError {
    /// Empty request body.
    #[error("no audio data received")]
    NoAudio,

    /// Clip below the minimum byte size. Benign: callers should treat this
    /// as an empty transcript, not a hard failure.
    #[error("audio too short: {size} bytes (minimum {min})")]
    TooShort { size: usize, min: usize },

    /// Clip above the hard byte limit.
    #[error("audio too large: {size} bytes (maximum {max})")]
    TooLarge { size: usize, max: usize },

    /// Sampled buffer is almost entirely zero bytes. Benign, like `TooShort`.
    #[error("audio is mostly silence")]
    Silence,

    /// A required credential or setting is missing.
    #[error("service not configured: {0}")]
    ConfigError(String),

    /// Provider asked us to back off.
    #[error("rate limited by provider")]
    RateLimit,

    /// Provider-side 5xx or equivalent.
    #[error("provider service error: {0}")]
    ServiceError(String),

    /// Provider rejected the request shape or payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credential was rejected.
    #[error("invalid API key")]
    InvalidApiKey,

    /// Credential is valid but not allowed to do this.
    #[error("access forbidden")]
    Forbidden,

    /// Provider safety filter refused to transcribe. Permanent.
    #[error("content blocked by provider safety filter")]
    ContentBlocked,

    /// Caller-side deadline expired.
    #[error("provider call timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure before any HTTP status was seen.
    #[error("network error: {0}")]
    NetworkError(String),

    /// No usable whisper binary was found on this machine.
    #[error("local whisper binary not available")]
    WhisperNotAvailable,

    /// Whisper subprocess exited non-zero or could not be driven.
    #[error("local whisper failed: {0}")]
    WhisperError(String),

    /// Whisper ran but produced no text.
    #[error("local whisper produced no output")]
    WhisperEmpty,

    /// Provider response body could not be decoded.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    /// Provider response decoded but was missing required fields.
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    /// Every tier was skipped or failed without a more specific cause.
    #[error("transcription failed on all providers")]
    TranscriptionFailed,

    #[error("unknown error: {0}")]
    UnknownError(String),
}

impl TranscribeError {
    /// Whether the orchestrator may retry the same provider after this error.
    ///
    /// Retryability is a static property of the kind; permanent kinds abort
    /// the current tier immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranscribeError::RateLimit
                | TranscribeError::Timeout(_)
                | TranscribeError::NetworkError(_)
                | TranscribeError::ServiceError(_)
        )
    }

    /// Whether this is a benign empty-transcript outcome rather than a real
    /// failure. The HTTP boundary should answer these with an empty
    /// transcript, not an error page.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            TranscribeError::TooShort { .. } | TranscribeError::Silence
        )
    }

    /// Stable machine-readable code for logs and the boundary layer.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscribeError::NoAudio => "NO_AUDIO",
            TranscribeError::TooShort { .. } => "TOO_SHORT",
            TranscribeError::TooLarge { .. } => "TOO_LARGE",
            TranscribeError::Silence => "SILENCE",
            TranscribeError::ConfigError(_) => "CONFIG_ERROR",
            TranscribeError::RateLimit => "RATE_LIMIT",
            TranscribeError::ServiceError(_) => "SERVICE_ERROR",
            TranscribeError::InvalidRequest(_) => "INVALID_REQUEST",
            TranscribeError::InvalidApiKey => "INVALID_API_KEY",
            TranscribeError::Forbidden => "FORBIDDEN",
            TranscribeError::ContentBlocked => "CONTENT_BLOCKED",
            TranscribeError::Timeout(_) => "TIMEOUT",
            TranscribeError::NetworkError(_) => "NETWORK_ERROR",
            TranscribeError::WhisperNotAvailable => "WHISPER_NOT_AVAILABLE",
            TranscribeError::WhisperError(_) => "WHISPER_ERROR",
            TranscribeError::WhisperEmpty => "WHISPER_EMPTY",
            TranscribeError::ParseError(_) => "PARSE_ERROR",
            TranscribeError::InvalidResponse(_) => "INVALID_RESPONSE",
            TranscribeError::TranscriptionFailed => "TRANSCRIPTION_FAILED",
            TranscribeError::UnknownError(_) => "UNKNOWN_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(TranscribeError::RateLimit.is_retryable());
        assert!(TranscribeError::Timeout(30_000).is_retryable());
        assert!(TranscribeError::NetworkError("reset".into()).is_retryable());
        assert!(TranscribeError::ServiceError("503".into()).is_retryable());
    }

    #[test]
    fn permanent_kinds_are_not_retryable() {
        assert!(!TranscribeError::ContentBlocked.is_retryable());
        assert!(!TranscribeError::InvalidApiKey.is_retryable());
        assert!(!TranscribeError::Forbidden.is_retryable());
        assert!(!TranscribeError::InvalidRequest("bad".into()).is_retryable());
        assert!(!TranscribeError::ConfigError("no key".into()).is_retryable());
    }

    #[test]
    fn validator_rejections_are_benign() {
        assert!(TranscribeError::TooShort { size: 500, min: 1000 }.is_benign());
        assert!(TranscribeError::Silence.is_benign());
        assert!(!TranscribeError::NoAudio.is_benign());
        assert!(!TranscribeError::TooLarge {
            size: 20_000_000,
            max: 10_485_760
        }
        .is_benign());
    }

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(TranscribeError::RateLimit.kind(), "RATE_LIMIT");
        assert_eq!(TranscribeError::WhisperEmpty.kind(), "WHISPER_EMPTY");
        assert_eq!(TranscribeError::TranscriptionFailed.kind(), "TRANSCRIPTION_FAILED");
    }
}
