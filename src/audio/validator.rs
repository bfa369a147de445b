//! Size and silence gates applied before any network call.

use tracing::{debug, warn};

use crate::audio::quality;
use crate::error::TranscribeError;
use crate::protocol::AudioQuality;

/// Clips below this byte size are rejected as too short to transcribe.
pub const MIN_AUDIO_BYTES: usize = 1_000;

/// Hard upper bound on accepted clips.
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Largest payload any provider is handed. Clips between this and
/// [`MAX_AUDIO_BYTES`] are truncated, which may cut off trailing speech;
/// that loss is accepted rather than rejecting the whole clip.
pub const PROVIDER_BYTE_LIMIT: usize = 8 * 1024 * 1024;

/// An audio buffer that passed every gate.
#[derive(Debug, Clone)]
pub struct ValidatedAudio {
    pub audio: Vec<u8>,
    pub quality: AudioQuality,
    /// True when the clip was cut down to [`PROVIDER_BYTE_LIMIT`].
    pub truncated: bool,
}

/// Apply the acceptance policy to a raw clip.
///
/// Gates run in a fixed order: empty, too short, too large, mostly-silence,
/// then provider-limit truncation. The size gates run before any content
/// analysis, so a 500-byte buffer is `TooShort` even if it is all zeros.
/// `TooShort` and `Silence` are benign rejections (see
/// [`TranscribeError::is_benign`]).
pub fn validate(audio: Vec<u8>) -> Result<ValidatedAudio, TranscribeError> {
    if audio.is_empty() {
        return Err(TranscribeError::NoAudio);
    }

    if audio.len() < MIN_AUDIO_BYTES {
        debug!(size = audio.len(), "clip below minimum size");
        return Err(TranscribeError::TooShort {
            size: audio.len(),
            min: MIN_AUDIO_BYTES,
        });
    }

    if audio.len() > MAX_AUDIO_BYTES {
        warn!(size = audio.len(), "clip above maximum size");
        return Err(TranscribeError::TooLarge {
            size: audio.len(),
            max: MAX_AUDIO_BYTES,
        });
    }

    let quality = quality::analyze(&audio);
    if quality.is_mostly_silence {
        debug!(zero_ratio = quality.zero_ratio, "clip is mostly silence");
        return Err(TranscribeError::Silence);
    }

    let mut audio = audio;
    let truncated = audio.len() > PROVIDER_BYTE_LIMIT;
    if truncated {
        warn!(
            size = audio.len(),
            limit = PROVIDER_BYTE_LIMIT,
            "truncating clip to provider limit"
        );
        audio.truncate(PROVIDER_BYTE_LIMIT);
    }

    Ok(ValidatedAudio {
        audio,
        quality,
        truncated,
    })
}
