//! Google Gemini provider

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;

use super::types::{GenerationOptions, LlmProvider};

const VENDOR: &str = "google";

/// Google Gemini `generateContent` provider
#[derive(Clone)]
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GoogleProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn request_body(prompt: &str, system: Option<&str>, options: &GenerationOptions) -> Value {
        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        });
        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        body
    }

    fn extract_text(resp: GeminiApiResponse) -> Result<String, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::terminal("Gemini response had no candidates"))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::terminal(format!(
                "Gemini response contained no text (finishReason={:?})",
                candidate.finish_reason
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn with_model(&self, model: &str) -> Option<Arc<dyn LlmProvider>> {
        let mut sibling = self.clone();
        sibling.model = model.to_string();
        Some(Arc::new(sibling))
    }

    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = Self::request_body(prompt, system, options);

        debug!(
            "Gemini request: model={}, maxOutputTokens={}",
            self.model, options.max_tokens
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(VENDOR, &e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(VENDOR, status.as_u16(), &error_text));
        }

        let api_response: GeminiApiResponse = response.json().await.map_err(|e| {
            ProviderError::terminal(format!("Failed to parse Gemini API response: {}", e))
        })?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        Self::extract_text(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_maps_options() {
        let options = GenerationOptions::default().with_max_tokens(256);
        let body = GoogleProvider::request_body("hello", Some("be brief"), &options);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_request_body_without_system() {
        let body = GoogleProvider::request_body("hello", None, &GenerationOptions::default());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3}
        }))
        .unwrap();
        assert_eq!(GoogleProvider::extract_text(resp).unwrap(), "Hello there");
    }

    #[test]
    fn test_extract_text_blocked_response() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let err = GoogleProvider::extract_text(resp).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_no_candidates() {
        let resp: GeminiApiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(GoogleProvider::extract_text(resp).is_err());
    }

    #[test]
    fn test_google_provider_debug_hides_key() {
        let p = GoogleProvider::new(
            "AIza-secret".to_string(),
            "gemini-2.0-flash".to_string(),
            "https://generativelanguage.googleapis.com".to_string(),
        );
        let debug = format!("{:?}", p);
        assert!(!debug.contains("AIza-secret"));
        assert!(debug.contains("gemini-2.0-flash"));
    }

    fn mock_provider(server: &mockito::ServerGuard) -> GoogleProvider {
        GoogleProvider::new(
            "AIza-secret".to_string(),
            "gemini-2.0-flash".to_string(),
            server.url(),
        )
    }

    #[tokio::test]
    async fn test_generate_sends_generate_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "AIza-secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 2000},
                "systemInstruction": {"parts": [{"text": "be brief"}]}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"},"finishReason":"STOP"}]}"#)
            .create_async()
            .await;

        let text = mock_provider(&server)
            .generate("hi", Some("be brief"), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_unavailable_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check rate limits).","status":"UNAVAILABLE"}}"#)
            .create_async()
            .await;

        let err = mock_provider(&server)
            .generate("hi", None, &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_generate_daily_quota_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Quota exceeded for quota metric 'GenerateContent requests per day'","status":"RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let err = mock_provider(&server)
            .generate("hi", None, &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_generate_bad_key_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"API key not valid","status":"UNAUTHENTICATED"}}"#)
            .create_async()
            .await;

        let err = mock_provider(&server)
            .generate("hi", None, &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(401));
    }
}
