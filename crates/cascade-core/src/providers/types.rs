//! Provider-agnostic types for multi-vendor text generation

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Vendor + model pair used to attribute a generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub vendor: String,
    pub model: String,
}

impl ProviderIdentity {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.vendor, self.model)
    }
}

/// Options every provider honours, whatever the vendor calls them
///
/// Deserialising from a JSON object ignores keys other than `temperature`
/// and `max_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Build options from a loosely-typed map supplied by a caller
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }
}

/// A successful generation and who produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub identity: ProviderIdentity,
}

impl Generation {
    pub fn into_parts(self) -> (String, ProviderIdentity) {
        (self.text, self.identity)
    }
}

/// Trait that all inference providers implement
///
/// Implementations make exactly one vendor call per `generate` and never
/// retry on their own.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Vendor name (e.g. "anthropic", "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "claude-sonnet-4-5", "gpt-4o")
    fn model(&self) -> &str;

    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::new(self.provider_name(), self.model())
    }

    /// A sibling provider sharing this one's client and credential, bound to
    /// another model. `None` when the provider is pinned to a single model.
    fn with_model(&self, _model: &str) -> Option<Arc<dyn LlmProvider>> {
        None
    }

    /// Generate a completion for `prompt`
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = GenerationOptions::default();
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.max_tokens, 2000);
    }

    #[test]
    fn test_options_ignore_unknown_keys() {
        let options = GenerationOptions::from_value(&serde_json::json!({
            "temperature": 0.7,
            "top_k": 40,
            "stream": true,
        }))
        .unwrap();
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_tokens, 2000);
    }

    #[test]
    fn test_options_from_null() {
        let options = GenerationOptions::from_value(&Value::Null).unwrap();
        assert_eq!(options, GenerationOptions::default());
    }

    #[test]
    fn test_options_reject_wrong_types() {
        let result = GenerationOptions::from_value(&serde_json::json!({"max_tokens": "lots"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_identity_display() {
        let id = ProviderIdentity::new("openai", "gpt-4o");
        assert_eq!(id.to_string(), "openai/gpt-4o");
    }

    #[test]
    fn test_generation_into_parts() {
        let generation = Generation {
            text: "hi".to_string(),
            identity: ProviderIdentity::new("google", "gemini-2.0-flash"),
        };
        let (text, identity) = generation.into_parts();
        assert_eq!(text, "hi");
        assert_eq!(identity.vendor, "google");
    }
}
