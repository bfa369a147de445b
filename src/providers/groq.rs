//! Fast cloud STT tier (Groq-hosted Whisper).
//!
//! One multipart HTTP call, no retries at this level. Fails closed with
//! `ConfigError` when no credential is configured.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::TranscribeError;
use crate::protocol::ProviderKind;
use crate::providers::{
    map_http_status, map_transport_error, ProviderReply, ProviderRequest, TranscriptionProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "whisper-large-v3-turbo";
const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Confidence reported when the response carries no usable segment data.
const DEFAULT_CONFIDENCE: f64 = 0.9;

pub struct GroqProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GroqProvider {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GroqResponse {
    text: String,
    #[serde(default)]
    segments: Vec<GroqSegment>,
}

#[derive(Debug, Deserialize)]
struct GroqSegment {
    avg_logprob: f64,
}

/// Derive a [0, 1] confidence from per-segment average log-probabilities.
fn segment_confidence(segments: &[GroqSegment]) -> Option<f64> {
    if segments.is_empty() {
        return None;
    }
    let mean_logprob: f64 =
        segments.iter().map(|s| s.avg_logprob).sum::<f64>() / segments.len() as f64;
    Some(mean_logprob.exp().clamp(0.0, 1.0))
}

#[async_trait]
impl TranscriptionProvider for GroqProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(
        &self,
        request: ProviderRequest<'_>,
    ) -> Result<ProviderReply, TranscribeError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| TranscribeError::ConfigError("fast STT credential missing".into()))?;

        let file_name = format!("audio.{}", extension_for(request.mime_type));
        let file_part = multipart::Part::bytes(request.audio.to_vec())
            .file_name(file_name)
            .mime_str(request.mime_type)
            .map_err(|e| TranscribeError::InvalidRequest(format!("mime: {e}")))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0")
            .part("file", file_part);
        if let Some(language) = request.language_hint {
            form = form.text("language", language.to_string());
        }

        debug!(model = %self.model, bytes = request.audio.len(), "sending clip to fast STT");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error(e, REQUEST_TIMEOUT_MS))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, &body));
        }

        let parsed: GroqResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::ParseError(e.to_string()))?;

        Ok(ProviderReply {
            text: parsed.text.trim().to_string(),
            provider: ProviderKind::Groq,
            prompt_variant: request.prompt_variant,
            provider_confidence: Some(
                segment_confidence(&parsed.segments).unwrap_or(DEFAULT_CONFIDENCE),
            ),
        })
    }
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

    #[test]
    fn unconfigured_provider_reports_itself() {
        let provider = GroqProvider::new(None);
        assert!(!provider.is_configured());
        assert_eq!(provider.kind(), ProviderKind::Groq);
    }

    #[tokio::test]
    async fn missing_credential_fails_closed() {
        let provider = GroqProvider::new(None);
        let result = provider
            .transcribe(ProviderRequest {
                audio: b"bytes",
                mime_type: "audio/webm",
                prompt_variant: PromptVariant::Standard,
                language_hint: None,
            })
            .await;
        assert!(matches!(result, Err(TranscribeError::ConfigError(_))));
    }

    #[test]
    fn segment_confidence_averages_logprobs() {
        // avg_logprob of 0 means probability 1.0.
        let perfect = vec![GroqSegment { avg_logprob: 0.0 }];
        assert_eq!(segment_confidence(&perfect), Some(1.0));

        let weak = vec![
            GroqSegment { avg_logprob: -1.0 },
            GroqSegment { avg_logprob: -3.0 },
        ];
        let confidence = segment_confidence(&weak).unwrap();
        assert!((0.0..0.5).contains(&confidence), "confidence={confidence}");

        assert_eq!(segment_confidence(&[]), None);
    }

    #[test]
    fn response_parsing_tolerates_missing_segments() {
        let parsed: GroqResponse = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(parsed.text, "hello");
        assert!(parsed.segments.is_empty());
    }

    #[test]
    fn mime_to_extension_defaults_to_webm() {
        assert_eq!(extension_for("audio/wav"), "wav");
        assert_eq!(extension_for("application/octet-stream"), "webm");
    }
}
