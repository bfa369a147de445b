//! Local fallback tier: whisper.cpp driven as a subprocess.
//!
//! The clip is written to a temp file whose extension matches the sniffed
//! container, the binary runs with a hard wall-clock deadline, and the
//! transcript is read from the expected output file (with the subprocess's
//! stdout as a fallback). Every temp artifact is removed on every exit
//! path, including timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::TranscribeError;
use crate::probe::{BinaryLocator, CachedProbe, FsBinaryLocator};
use crate::protocol::ProviderKind;
use crate::providers::{ProviderReply, ProviderRequest, TranscriptionProvider};
use crate::tempfiles::{ensure_temp_root, request_path, TempGuard};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct WhisperLocalProvider {
    binary: CachedProbe,
    model_path: Option<PathBuf>,
    language: String,
    run_timeout: Duration,
}

impl WhisperLocalProvider {
    pub fn new(explicit_binary: Option<PathBuf>, model_path: Option<PathBuf>) -> Self {
        Self::with_locator(Box::new(FsBinaryLocator), explicit_binary, model_path)
    }

    pub fn with_locator(
        locator: Box<dyn BinaryLocator>,
        explicit_binary: Option<PathBuf>,
        model_path: Option<PathBuf>,
    ) -> Self {
        // Explicit configuration wins; after that, the usual install spots.
        let mut candidates = Vec::new();
        if let Some(path) = explicit_binary {
            candidates.push(path);
        }
        candidates.extend([
            PathBuf::from("whisper-cli"),
            PathBuf::from("whisper-cpp"),
            PathBuf::from("/usr/local/bin/whisper-cli"),
            PathBuf::from("/opt/homebrew/bin/whisper-cli"),
            PathBuf::from("/usr/local/bin/whisper-cpp"),
            PathBuf::from("./whisper.cpp/build/bin/whisper-cli"),
        ]);

        Self {
            binary: CachedProbe::new(locator, candidates),
            model_path,
            language: "en".to_string(),
            run_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Whether the binary probe found anything. Cached after the first call.
    pub fn is_available(&self) -> bool {
        self.binary.is_available()
    }

    async fn run(
        &self,
        binary: &Path,
        model: &Path,
        input: &Path,
        output_prefix: &Path,
    ) -> Result<std::process::Output, TranscribeError> {
        let mut command = Command::new(binary);
        command
            .arg("-m")
            .arg(model)
            .arg("-f")
            .arg(input)
            .arg("-otxt")
            .arg("-of")
            .arg(output_prefix)
            .arg("-nt")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| TranscribeError::WhisperError(format!("spawn: {e}")))?;

        // On deadline the wait future is dropped, which drops the child, and
        // kill_on_drop forcibly terminates it: no orphaned processes.
        match timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TranscribeError::WhisperError(format!("wait: {e}"))),
            Err(_) => {
                warn!(timeout_ms = self.run_timeout.as_millis() as u64, "whisper timed out, killed");
                Err(TranscribeError::Timeout(self.run_timeout.as_millis() as u64))
            }
        }
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperLocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WhisperLocal
    }

    fn is_configured(&self) -> bool {
        self.model_path.is_some()
    }

    async fn transcribe(
        &self,
        request: ProviderRequest<'_>,
    ) -> Result<ProviderReply, TranscribeError> {
        let model = self
            .model_path
            .as_ref()
            .ok_or_else(|| TranscribeError::ConfigError("whisper model path missing".into()))?;
        let Some(binary) = self.binary.resolve() else {
            return Err(TranscribeError::WhisperNotAvailable);
        };
        let binary = binary.to_path_buf();

        ensure_temp_root().map_err(|e| TranscribeError::WhisperError(format!("temp dir: {e}")))?;

        let input_path = request_path("whisper-in", extension_for(request.mime_type));
        let output_prefix = request_path("whisper-out", "");
        let output_path = output_prefix.with_extension("txt");

        let mut guard = TempGuard::new();
        guard.track(&input_path);
        guard.track(&output_path);

        tokio::fs::write(&input_path, request.audio)
            .await
            .map_err(|e| TranscribeError::WhisperError(format!("stage input: {e}")))?;

        debug!(binary = %binary.display(), bytes = request.audio.len(), "running local whisper");

        let output = self.run(&binary, model, &input_path, &output_prefix).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscribeError::WhisperError(
                stderr.lines().last().unwrap_or("exited non-zero").to_string(),
            ));
        }

        // Prefer the output file; older builds only print to stdout.
        let text = match tokio::fs::read_to_string(&output_path).await {
            Ok(contents) => contents,
            Err(_) => String::from_utf8_lossy(&output.stdout).to_string(),
        };

        let text = clean_whisper_text(&text);
        if text.is_empty() {
            return Err(TranscribeError::WhisperEmpty);
        }

        Ok(ProviderReply {
            text,
            provider: ProviderKind::WhisperLocal,
            prompt_variant: request.prompt_variant,
            provider_confidence: None,
        })
    }
}

/// Strip whisper's timestamp/progress lines and collapse the rest.
fn clean_whisper_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" => "wav",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        "audio/flac" => "flac",
        _ => "webm",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptVariant;

    struct NoTools;

    impl BinaryLocator for NoTools {
        fn locate(&self, _candidates: &[PathBuf]) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn configured_means_model_path_present() {
        let provider = WhisperLocalProvider::with_locator(Box::new(NoTools), None, None);
        assert!(!provider.is_configured());

        let provider = WhisperLocalProvider::with_locator(
            Box::new(NoTools),
            None,
            Some(PathBuf::from("/models/ggml-base.en.bin")),
        );
        assert!(provider.is_configured());
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn missing_binary_is_whisper_not_available() {
        let provider = WhisperLocalProvider::with_locator(
            Box::new(NoTools),
            None,
            Some(PathBuf::from("/models/ggml-base.en.bin")),
        );
        let result = provider
            .transcribe(ProviderRequest {
                audio: b"bytes",
                mime_type: "audio/webm",
                prompt_variant: PromptVariant::Standard,
                language_hint: None,
            })
            .await;
        assert_eq!(result.unwrap_err(), TranscribeError::WhisperNotAvailable);
    }

    #[test]
    fn explicit_binary_is_probed_first() {
        struct FirstCandidate;
        impl BinaryLocator for FirstCandidate {
            fn locate(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
                candidates.first().cloned()
            }
        }

        let provider = WhisperLocalProvider::with_locator(
            Box::new(FirstCandidate),
            Some(PathBuf::from("/custom/whisper")),
            Some(PathBuf::from("/models/model.bin")),
        );
        assert!(provider.is_available());
        assert_eq!(provider.binary.resolve(), Some(Path::new("/custom/whisper")));
    }

    #[test]
    fn whisper_output_is_cleaned() {
        let raw = "[00:00:00.000 --> 00:00:02.000] ignored\n  hello there\n\nhow are you  \n";
        assert_eq!(clean_whisper_text(raw), "hello there how are you");
        assert_eq!(clean_whisper_text("   \n[banner]\n"), "");
    }
}
