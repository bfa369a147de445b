//! Byte-level audio quality heuristics.
//!
//! Everything here is a cheap approximation computed from the raw buffer:
//! no codec parsing, no I/O, microsecond cost. The metrics gate whether a
//! clip is worth sending to a paid provider and feed the confidence scorer.

use crate::protocol::{AudioContainer, AudioQuality, QualityTier};

/// Maximum number of bytes sampled per buffer.
const SAMPLE_LIMIT: usize = 2048;

/// Size-to-duration conversion tuned for the typical byte rate of
/// MediaRecorder WebM/Opus clips. Approximate only; used for relative
/// comparisons such as words-per-second, never wall-clock accuracy.
const BYTES_PER_SECOND: f64 = 16_000.0;

/// Zero-ratio boundaries for the quality tiers.
const GOOD_ZERO_RATIO: f64 = 0.02;
const FAIR_ZERO_RATIO: f64 = 0.5;

/// Above this zero ratio the clip is treated as silence.
const SILENCE_ZERO_RATIO: f64 = 0.95;

/// Compute quality metrics for one audio buffer.
pub fn analyze(buffer: &[u8]) -> AudioQuality {
    let (container, has_valid_header) = sniff_container(buffer);
    let (zero_ratio, entropy) = sample_bytes(buffer);

    AudioQuality {
        has_valid_header,
        container,
        zero_ratio,
        is_mostly_silence: zero_ratio > SILENCE_ZERO_RATIO,
        size: buffer.len(),
        estimated_duration_seconds: buffer.len() as f64 / BYTES_PER_SECOND,
        entropy,
        quality_tier: tier_for(zero_ratio),
    }
}

fn tier_for(zero_ratio: f64) -> QualityTier {
    if zero_ratio < GOOD_ZERO_RATIO {
        QualityTier::Good
    } else if zero_ratio < FAIR_ZERO_RATIO {
        QualityTier::Fair
    } else {
        QualityTier::Poor
    }
}

/// Inspect the first bytes for known container signatures.
///
/// Ambiguous buffers default to WebM, the format browsers actually record.
fn sniff_container(buffer: &[u8]) -> (AudioContainer, bool) {
    if buffer.len() >= 4 && buffer[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return (AudioContainer::WebM, true);
    }
    if buffer.len() >= 12 && &buffer[0..4] == b"RIFF" && &buffer[8..12] == b"WAVE" {
        return (AudioContainer::Wav, true);
    }
    if buffer.len() >= 4 && &buffer[0..4] == b"OggS" {
        return (AudioContainer::Ogg, true);
    }
    if buffer.len() >= 4 && &buffer[0..4] == b"fLaC" {
        return (AudioContainer::Flac, true);
    }
    if buffer.len() >= 8 && &buffer[4..8] == b"ftyp" {
        return (AudioContainer::Mp4, true);
    }
    if buffer.len() >= 3 && &buffer[0..3] == b"ID3" {
        return (AudioContainer::Mp3, true);
    }
    // MP3 frame sync: 11 set bits at the start of a frame header.
    if buffer.len() >= 2 && buffer[0] == 0xFF && (buffer[1] & 0xE0) == 0xE0 {
        return (AudioContainer::Mp3, true);
    }
    (AudioContainer::WebM, false)
}

/// Sample up to [`SAMPLE_LIMIT`] bytes at a uniform stride over the whole
/// buffer and compute (zero ratio, byte-value standard deviation).
///
/// Sampling spans the full buffer rather than a prefix so header padding
/// cannot dominate the measurement.
fn sample_bytes(buffer: &[u8]) -> (f64, f64) {
    if buffer.is_empty() {
        return (0.0, 0.0);
    }

    let stride = (buffer.len() / SAMPLE_LIMIT).max(1);
    let mut count = 0usize;
    let mut zeros = 0usize;
    let mut sum = 0f64;
    let mut sum_squares = 0f64;

    for &byte in buffer.iter().step_by(stride).take(SAMPLE_LIMIT) {
        count += 1;
        if byte == 0 {
            zeros += 1;
        }
        let value = byte as f64;
        sum += value;
        sum_squares += value * value;
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_squares / n - mean * mean).max(0.0);

    (zeros as f64 / n, variance.sqrt())
}
