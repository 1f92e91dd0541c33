//! OpenAI provider (GPT-4o, o3, etc.)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;

use super::types::{GenerationOptions, LlmProvider};

/// OpenAI chat-completions provider
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
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

    pub(super) fn rebind(&self, model: &str) -> Self {
        let mut sibling = self.clone();
        sibling.model = model.to_string();
        sibling
    }

    /// System prompt goes first as its own message
    fn to_openai_messages(prompt: &str, system: Option<&str>) -> Vec<OpenAiMessage> {
        let mut result = Vec::with_capacity(2);
        if let Some(system) = system {
            result.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        result.push(OpenAiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        result
    }

    fn request_body(&self, prompt: &str, system: Option<&str>, options: &GenerationOptions) -> Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": Self::to_openai_messages(prompt, system),
        })
    }

    fn extract_text(vendor: &str, resp: OpenAiApiResponse) -> Result<String, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::terminal(format!("{} response had no choices", vendor)))?;

        match choice.message.content {
            Some(content) if !content.is_empty() => Ok(content),
            _ => Err(ProviderError::terminal(format!(
                "{} response contained no text (finish_reason={:?})",
                vendor, choice.finish_reason
            ))),
        }
    }

    /// Shared request path, labelled with the vendor that owns the endpoint
    pub(super) async fn generate_as(
        &self,
        vendor: &str,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(prompt, system, options);

        debug!(
            "{} request: model={}, max_tokens={}",
            vendor, self.model, options.max_tokens
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(vendor, &e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(vendor, status.as_u16(), &error_text));
        }

        let api_response: OpenAiApiResponse = response.json().await.map_err(|e| {
            ProviderError::terminal(format!("Failed to parse {} API response: {}", vendor, e))
        })?;

        debug!(
            "{} response: choices={}, finish_reason={:?}",
            vendor,
            api_response.choices.len(),
            api_response.choices.first().map(|c| &c.finish_reason)
        );

        Self::extract_text(vendor, api_response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn with_model(&self, model: &str) -> Option<Arc<dyn LlmProvider>> {
        Some(Arc::new(self.rebind(model)))
    }

    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.generate_as("openai", prompt, system, options).await
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-secret".to_string(),
            "gpt-4o".to_string(),
            "https://api.openai.com".to_string(),
        )
    }

    #[test]
    fn test_to_openai_messages_system_first() {
        let msgs = OpenAiProvider::to_openai_messages("hello", Some("you are helpful"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
        assert_eq!(msgs[1].content, "hello");
    }

    #[test]
    fn test_to_openai_messages_without_system() {
        let msgs = OpenAiProvider::to_openai_messages("hello", None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "user");
    }

    #[test]
    fn test_request_body_maps_options() {
        let options = GenerationOptions::default().with_max_tokens(64);
        let body = provider().request_body("hi", None, &options);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_extract_text() {
        let resp: OpenAiApiResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "SELECT 1;"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3}
        }))
        .unwrap();
        assert_eq!(OpenAiProvider::extract_text("openai", resp).unwrap(), "SELECT 1;");
    }

    #[test]
    fn test_extract_text_no_choices_is_terminal() {
        let resp = OpenAiApiResponse { choices: vec![] };
        let err = OpenAiProvider::extract_text("openai", resp).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message().contains("no choices"));
    }

    #[test]
    fn test_extract_text_null_content_is_terminal() {
        let resp: OpenAiApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": null}, "finish_reason": "length"}]
        }))
        .unwrap();
        assert!(OpenAiProvider::extract_text("openai", resp).is_err());
    }

    #[test]
    fn test_with_model() {
        let sibling = provider().with_model("gpt-4o-mini").unwrap();
        assert_eq!(sibling.provider_name(), "openai");
        assert_eq!(sibling.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_openai_provider_debug_hides_key() {
        let debug = format!("{:?}", provider());
        assert!(!debug.contains("sk-secret"));
    }

    fn mock_provider(server: &mockito::ServerGuard) -> OpenAiProvider {
        OpenAiProvider::new("sk-secret".to_string(), "gpt-4o".to_string(), server.url())
    }

    #[tokio::test]
    async fn test_generate_sends_chat_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 2000,
                "messages": [
                    {"role": "system", "content": "sql only"},
                    {"role": "user", "content": "count rows"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"SELECT COUNT(*) FROM t;"},"finish_reason":"stop"}]}"#)
            .create_async()
            .await;

        let text = mock_provider(&server)
            .generate("count rows", Some("sql only"), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "SELECT COUNT(*) FROM t;");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_rate_limited_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#)
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
    async fn test_generate_quota_exhausted_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#)
            .create_async()
            .await;

        let err = mock_provider(&server)
            .generate("hi", None, &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_generate_bad_key_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#)
            .create_async()
            .await;

        let err = mock_provider(&server)
            .generate("hi", None, &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(401));
        assert!(err.message().starts_with("openai"));
    }
}
