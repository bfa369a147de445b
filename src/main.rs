use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use obiwon_transcriber::{
    config::TranscriberConfig,
    orchestrator::{TranscribeOptions, TranscriptionOrchestrator},
    tempfiles,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "obiwon-transcriber")]
#[command(about = "Transcribe a recorded audio clip through the provider fallback chain")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Audio file to transcribe
    pub file: PathBuf,

    /// Disable the local whisper fallback tier for this run
    #[arg(long)]
    pub no_local_fallback: bool,

    /// ISO 639-1 language hint passed to providers
    #[arg(long)]
    pub language: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Age threshold in minutes for the temp-file sweep
    #[arg(long, default_value = "60")]
    pub sweep_max_age_mins: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(tracing::Level::from(args.log_level).to_string())
            }),
        )
        .with_target(false)
        .init();

    let audio = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    info!(file = %args.file.display(), bytes = audio.len(), "loaded clip");

    let config = TranscriberConfig::from_env();
    let orchestrator = TranscriptionOrchestrator::from_config(&config);

    // Housekeeping runs independent of the request.
    let _sweeper = tempfiles::spawn_sweeper(
        Duration::from_secs(args.sweep_max_age_mins * 60),
        Duration::from_secs(300),
    );

    let options = TranscribeOptions {
        use_local_fallback: !args.no_local_fallback,
        language_hint: args.language.clone(),
    };

    match orchestrator.transcribe(audio, &options).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(failure) if failure.error.is_benign() => {
            // Too-short and silent clips are empty transcripts, not errors.
            debug!(kind = failure.error.kind(), "benign rejection");
            println!(
                "{}",
                serde_json::json!({
                    "text": "",
                    "confidence": 0.0,
                    "noSpeech": true,
                    "rejection": failure.error.kind(),
                })
            );
            Ok(())
        }
        Err(failure) => {
            for attempt in &failure.attempts {
                debug!(?attempt, "attempt log");
            }
            Err(anyhow::anyhow!(failure.error))
        }
    }
}
