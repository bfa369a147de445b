//! Secondary cloud STT tier (OpenAI Whisper API).
//!
//! Same multipart contract as the fast tier; sits between the general tier
//! and the local fallback in the orchestrator's chain.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";
const REQUEST_TIMEOUT_MS: u64 = 30_000;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
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
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    text: String,
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
            .ok_or_else(|| TranscribeError::ConfigError("secondary STT credential missing".into()))?;

        let file_part = multipart::Part::bytes(request.audio.to_vec())
            .file_name("audio.webm")
            .mime_str(request.mime_type)
            .map_err(|e| TranscribeError::InvalidRequest(format!("mime: {e}")))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file_part);
        if let Some(language) = request.language_hint {
            form = form.text("language", language.to_string());
        }

        debug!(model = %self.model, bytes = request.audio.len(), "sending clip to secondary STT");

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

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::ParseError(e.to_string()))?;

        Ok(ProviderReply {
            text: parsed.text.trim().to_string(),
            provider: ProviderKind::OpenAi,
            prompt_variant: request.prompt_variant,
            provider_confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptVariant;

    #[tokio::test]
    async fn missing_credential_fails_closed() {
        let provider = OpenAiProvider::new(None);
        assert!(!provider.is_configured());
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
    fn response_parsing_reads_text_field() {
        let parsed: OpenAiResponse = serde_json::from_str(r#"{"text": "hi there"}"#).unwrap();
        assert_eq!(parsed.text, "hi there");
    }
}
