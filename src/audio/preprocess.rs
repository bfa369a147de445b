//! Best-effort audio normalization through an external ffmpeg process.
//!
//! Preprocessing trims silence at the clip boundaries, normalizes loudness,
//! and resamples to 16 kHz mono. It is strictly optional: when ffmpeg is
//! missing, fails, or times out, the original buffer is used unmodified and
//! the request continues. A failed normalization lowers the confidence hint
//! handed to the scorer but never fails the request.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::audio::quality;
use crate::probe::{BinaryLocator, CachedProbe, FsBinaryLocator};
use crate::protocol::{AudioQuality, QualityTier};
use crate::tempfiles::{ensure_temp_root, request_path, TempGuard};

/// Confidence hint when normalization was attempted but fell back to the
/// original buffer.
const DEGRADED_CONFIDENCE: f64 = 0.8;

/// Result of one preprocessing call. Always usable: `audio` is either the
/// normalized clip or the untouched original.
#[derive(Debug)]
pub struct PreprocessOutcome {
    pub audio: Vec<u8>,
    /// Quality of the returned buffer (re-analyzed after normalization).
    pub quality: AudioQuality,
    /// Whether the returned buffer actually went through ffmpeg.
    pub processed: bool,
    /// Multiplier for downstream confidence scoring, in (0, 1].
    pub confidence: f64,
}

pub struct AudioPreprocessor {
    ffmpeg: CachedProbe,
    run_timeout: Duration,
}

impl AudioPreprocessor {
    pub fn new() -> Self {
        Self::with_locator(Box::new(FsBinaryLocator))
    }

    pub fn with_locator(locator: Box<dyn BinaryLocator>) -> Self {
        let candidates = vec![
            PathBuf::from("ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ];
        Self {
            ffmpeg: CachedProbe::new(locator, candidates),
            run_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Normalize `audio` if worthwhile and possible.
    ///
    /// Clips already in the good tier skip normalization entirely; so does
    /// every clip when ffmpeg is unavailable.
    pub async fn preprocess(&self, audio: Vec<u8>, current: &AudioQuality) -> PreprocessOutcome {
        if current.quality_tier == QualityTier::Good {
            debug!("clip already good quality, skipping normalization");
            return passthrough(audio, current.clone(), 1.0);
        }

        let Some(ffmpeg) = self.ffmpeg.resolve() else {
            debug!("ffmpeg not available, skipping normalization");
            return passthrough(audio, current.clone(), 1.0);
        };
        let ffmpeg = ffmpeg.to_path_buf();

        if let Err(e) = ensure_temp_root() {
            warn!(error = %e, "cannot create temp dir, skipping normalization");
            return passthrough(audio, current.clone(), DEGRADED_CONFIDENCE);
        }

        let input_path = request_path("preprocess-in", current.container.extension());
        let output_path = request_path("preprocess-out", "wav");
        let mut guard = TempGuard::new();
        guard.track(&input_path);
        guard.track(&output_path);

        if let Err(e) = tokio::fs::write(&input_path, &audio).await {
            warn!(error = %e, "failed to stage clip for normalization");
            return passthrough(audio, current.clone(), DEGRADED_CONFIDENCE);
        }

        match self.run_ffmpeg(&ffmpeg, &input_path, &output_path).await {
            Ok(()) => match tokio::fs::read(&output_path).await {
                Ok(normalized) if !normalized.is_empty() => {
                    let quality = quality::analyze(&normalized);
                    debug!(
                        before = audio.len(),
                        after = normalized.len(),
                        "normalization complete"
                    );
                    PreprocessOutcome {
                        audio: normalized,
                        quality,
                        processed: true,
                        confidence: 1.0,
                    }
                }
                Ok(_) => {
                    warn!("ffmpeg produced an empty file, keeping original clip");
                    passthrough(audio, current.clone(), DEGRADED_CONFIDENCE)
                }
                Err(e) => {
                    warn!(error = %e, "cannot read normalized clip, keeping original");
                    passthrough(audio, current.clone(), DEGRADED_CONFIDENCE)
                }
            },
            Err(reason) => {
                warn!(reason, "normalization failed, keeping original clip");
                passthrough(audio, current.clone(), DEGRADED_CONFIDENCE)
            }
        }
        // guard drops here and removes both temp files on every path
    }

    async fn run_ffmpeg(
        &self,
        ffmpeg: &std::path::Path,
        input: &std::path::Path,
        output: &std::path::Path,
    ) -> Result<(), &'static str> {
        let mut command = Command::new(ffmpeg);
        command
            .arg("-hide_banner")
            .arg("-y")
            .arg("-i")
            .arg(input)
            // Trim leading/trailing silence, then bring speech to a uniform
            // loudness target.
            .arg("-af")
            .arg("silenceremove=start_periods=1:start_threshold=-50dB:stop_periods=1:stop_threshold=-50dB,loudnorm=I=-16:TP=-1.5:LRA=11")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-sample_fmt")
            .arg("s16")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|_| "spawn failed")?;

        // Dropping the wait future on timeout drops the child, and
        // kill_on_drop terminates it: no orphaned processes.
        match timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(_)) => Err("ffmpeg exited non-zero"),
            Ok(Err(_)) => Err("ffmpeg could not be awaited"),
            Err(_) => Err("ffmpeg timed out"),
        }
    }
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn passthrough(audio: Vec<u8>, quality: AudioQuality, confidence: f64) -> PreprocessOutcome {
    PreprocessOutcome {
        audio,
        quality,
        processed: false,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::quality::analyze;
    use std::path::PathBuf;

    struct NoTools;

    impl BinaryLocator for NoTools {
        fn locate(&self, _candidates: &[PathBuf]) -> Option<PathBuf> {
            None
        }
    }

    fn fair_clip() -> Vec<u8> {
        let mut buffer = vec![0x1A, 0x45, 0xDF, 0xA3];
        buffer.extend((0..50_000).map(|i| if i % 10 == 0 { 0u8 } else { (i % 200 + 1) as u8 }));
        buffer
    }

    fn good_clip() -> Vec<u8> {
        let mut buffer = vec![0x1A, 0x45, 0xDF, 0xA3];
        buffer.extend((0..50_000).map(|i| ((i * 31 + 7) % 251 + 1) as u8));
        buffer
    }

    #[tokio::test]
    async fn good_audio_is_passed_through() {
        let preprocessor = AudioPreprocessor::with_locator(Box::new(NoTools));
        let clip = good_clip();
        let quality = analyze(&clip);

        let outcome = preprocessor.preprocess(clip.clone(), &quality).await;
        assert!(!outcome.processed);
        assert_eq!(outcome.audio, clip);
        assert_eq!(outcome.confidence, 1.0);
    }

    #[tokio::test]
    async fn missing_tool_degrades_gracefully() {
        let preprocessor = AudioPreprocessor::with_locator(Box::new(NoTools));
        let clip = fair_clip();
        let quality = analyze(&clip);
        assert_eq!(quality.quality_tier, QualityTier::Fair);

        let outcome = preprocessor.preprocess(clip.clone(), &quality).await;
        assert!(!outcome.processed);
        assert_eq!(outcome.audio, clip);
        // Skipping for lack of a tool is not a failed attempt.
        assert_eq!(outcome.confidence, 1.0);
    }

    #[tokio::test]
    async fn broken_tool_keeps_original_and_lowers_confidence() {
        // Points at a real file that is not a working ffmpeg; the spawn/run
        // fails and the preprocessor must fall back to the original bytes.
        struct BrokenTool(PathBuf);
        impl BinaryLocator for BrokenTool {
            fn locate(&self, _candidates: &[PathBuf]) -> Option<PathBuf> {
                Some(self.0.clone())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, b"not a binary").unwrap();

        let preprocessor = AudioPreprocessor::with_locator(Box::new(BrokenTool(fake)));
        let clip = fair_clip();
        let quality = analyze(&clip);

        let outcome = preprocessor.preprocess(clip.clone(), &quality).await;
        assert!(!outcome.processed);
        assert_eq!(outcome.audio, clip);
        assert!(outcome.confidence < 1.0);
    }
}
