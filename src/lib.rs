//! Obiwon Transcriber - multi-provider speech-to-text pipeline
//!
//! This crate is the transcription core of the Obiwon voice tutor. It takes
//! a raw recorded audio buffer and produces a corrected transcript with a
//! confidence estimate and full attempt provenance. It features:
//!
//! - Byte-level audio quality gating before any paid provider call
//! - Best-effort loudness/silence normalization via an external ffmpeg
//! - Tiered provider fallback: fast cloud STT, general multimodal LLM,
//!   secondary cloud STT, local whisper subprocess
//! - Retry with exponential backoff and prompt-variant switching
//! - Heuristic confidence scoring and deterministic transcript correction
//!
//! It is a library, not a server: the HTTP layer lives elsewhere and talks
//! to this crate through [`TranscriptionOrchestrator`].
//!
//! # Example
//!
//! ```rust,no_run
//! use obiwon_transcriber::{
//!     config::TranscriberConfig,
//!     orchestrator::{TranscribeOptions, TranscriptionOrchestrator},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TranscriberConfig::from_env();
//!     let orchestrator = TranscriptionOrchestrator::from_config(&config);
//!
//!     let audio = std::fs::read("clip.webm").expect("readable clip");
//!     match orchestrator.transcribe(audio, &TranscribeOptions::default()).await {
//!         Ok(result) => println!("{} (confidence {:.2})", result.text, result.confidence),
//!         Err(failure) if failure.error.is_benign() => println!(),
//!         Err(failure) => eprintln!("transcription failed: {}", failure.error),
//!     }
//! }
//! ```

pub mod audio;
pub mod config;
pub mod corrector;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod protocol;
pub mod providers;
pub mod scoring;
pub mod tempfiles;

// Re-export commonly used types for convenience
pub use config::TranscriberConfig;
pub use corrector::TextCorrector;
pub use error::TranscribeError;
pub use orchestrator::{
    OrchestrationFailure, OrchestratorPolicy, TranscribeOptions, TranscriptionOrchestrator,
};
pub use protocol::{
    AudioQuality, ProviderKind, QualityTier, TranscriptionAttempt, TranscriptionResult,
};
pub use scoring::{ConfidenceScorer, ScorerConfig};

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
