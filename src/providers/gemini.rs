//! General multimodal tier (Gemini-style LLM transcription).
//!
//! The clip is sent inline (base64) together with a natural-language
//! transcription instruction. This tier is the retry target: the
//! orchestrator calls it up to `max_retries` times and switches to the
//! terse fallback prompt on later attempts.
//!
//! The 30 s deadline is enforced caller-side with `tokio::time::timeout`
//! wrapped around the whole call, independent of any reqwest default: a
//! library default can change underneath us, the orchestrator's backoff
//! math cannot.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::error::TranscribeError;
use crate::protocol::ProviderKind;
use crate::providers::{
    map_transport_error, prompt_for, ProviderReply, ProviderRequest, TranscriptionProvider,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    call_timeout: Duration,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, call_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            call_timeout,
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

    async fn call(
        &self,
        api_key: &str,
        request: &ProviderRequest<'_>,
    ) -> Result<String, TranscribeError> {
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": prompt_for(request.prompt_variant) },
                    {
                        "inline_data": {
                            "mime_type": request.mime_type,
                            "data": general_purpose::STANDARD.encode(request.audio),
                        }
                    }
                ]
            }],
            "generationConfig": { "temperature": 0.0 }
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        // Credential travels in a header, never in the URL: reqwest errors
        // echo the URL and must not leak the key.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.call_timeout.as_millis() as u64))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TranscribeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(map_gemini_error(status.as_u16(), &text));
        }

        extract_transcript(&text)
    }
}

#[async_trait]
impl TranscriptionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
            .clone()
            .ok_or_else(|| TranscribeError::ConfigError("general tier credential missing".into()))?;

        debug!(
            model = %self.model,
            variant = ?request.prompt_variant,
            bytes = request.audio.len(),
            "sending clip to general tier"
        );

        let text = timeout(self.call_timeout, self.call(&api_key, &request))
            .await
            .map_err(|_| TranscribeError::Timeout(self.call_timeout.as_millis() as u64))??;

        Ok(ProviderReply {
            text: text.trim().to_string(),
            provider: ProviderKind::Gemini,
            prompt_variant: request.prompt_variant,
            provider_confidence: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    #[serde(default)]
    error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Map HTTP status plus in-body error codes onto the closed taxonomy.
fn map_gemini_error(status: u16, body: &str) -> TranscribeError {
    let parsed: GeminiErrorEnvelope = serde_json::from_str(body).unwrap_or(GeminiErrorEnvelope {
        error: None,
    });
    let error = parsed.error.unwrap_or_default();

    if error.message.contains("API_KEY_INVALID") || error.status == "UNAUTHENTICATED" {
        return TranscribeError::InvalidApiKey;
    }

    match (status, error.status.as_str()) {
        (429, _) | (_, "RESOURCE_EXHAUSTED") => TranscribeError::RateLimit,
        (403, _) | (_, "PERMISSION_DENIED") => TranscribeError::Forbidden,
        (401, _) => TranscribeError::InvalidApiKey,
        (400, _) | (_, "INVALID_ARGUMENT") => TranscribeError::InvalidRequest(short(&error.message)),
        (408, _) | (504, _) | (_, "DEADLINE_EXCEEDED") => TranscribeError::Timeout(0),
        (500..=599, _) | (_, "UNAVAILABLE") | (_, "INTERNAL") => {
            TranscribeError::ServiceError(format!("status {status}"))
        }
        _ => TranscribeError::UnknownError(format!("status {status}")),
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the transcript text out of a generateContent response body.
fn extract_transcript(body: &str) -> Result<String, TranscribeError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| TranscribeError::ParseError(e.to_string()))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(TranscribeError::InvalidResponse("no candidates".into()));
    };

    // A safety refusal is permanent: retrying the same clip cannot succeed.
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(TranscribeError::ContentBlocked);
    }

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() && candidate.finish_reason.as_deref() != Some("STOP") {
        return Err(TranscribeError::InvalidResponse(format!(
            "empty candidate, finish reason {:?}",
            candidate.finish_reason
        )));
    }

    Ok(text)
}

fn short(message: &str) -> String {
    message.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptVariant;

    #[test]
    fn unconfigured_provider_reports_itself() {
        let provider = GeminiProvider::new(None, Duration::from_secs(30));
        assert!(!provider.is_configured());
    }

    #[tokio::test]
    async fn missing_credential_fails_closed() {
        let provider = GeminiProvider::new(None, Duration::from_secs(30));
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
    fn rate_limit_detected_from_status_and_body() {
        assert_eq!(map_gemini_error(429, "{}"), TranscribeError::RateLimit);
        let body = r#"{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"}}"#;
        assert_eq!(map_gemini_error(200, body), TranscribeError::RateLimit);
    }

    #[test]
    fn invalid_key_detected_from_message() {
        let body = r#"{"error": {"code": 400, "status": "INVALID_ARGUMENT", "message": "API_KEY_INVALID: check key"}}"#;
        assert_eq!(map_gemini_error(400, body), TranscribeError::InvalidApiKey);
    }

    #[test]
    fn plain_bad_request_maps_to_invalid_request() {
        let body = r#"{"error": {"code": 400, "status": "INVALID_ARGUMENT", "message": "bad audio"}}"#;
        assert!(matches!(
            map_gemini_error(400, body),
            TranscribeError::InvalidRequest(_)
        ));
    }

    #[test]
    fn server_errors_map_to_service_error() {
        assert!(matches!(
            map_gemini_error(503, "oops not json"),
            TranscribeError::ServiceError(_)
        ));
    }

    #[test]
    fn safety_finish_reason_is_content_blocked() {
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        assert_eq!(extract_transcript(body), Err(TranscribeError::ContentBlocked));
    }

    #[test]
    fn transcript_text_is_concatenated_from_parts() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "hello "}, {"text": "world"}]}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_transcript(body).unwrap(), "hello world");
    }

    #[test]
    fn empty_candidates_is_invalid_response() {
        assert!(matches!(
            extract_transcript(r#"{"candidates": []}"#),
            Err(TranscribeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn empty_text_with_stop_is_allowed() {
        // The model legitimately returns nothing for a silent clip.
        let body = r#"{"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_transcript(body).unwrap(), "");
    }
}
