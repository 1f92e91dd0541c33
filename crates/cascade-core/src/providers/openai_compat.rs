//! OpenAI-compatible provider for Groq, Together, LM Studio, etc.
//!
//! Reuses the OpenAI wire format with a configurable base URL.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;

use super::openai::OpenAiProvider;
use super::types::{GenerationOptions, LlmProvider};

/// OpenAI-compatible provider: wraps [`OpenAiProvider`] with a custom name
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
    name: String,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// - `name`: vendor label used for attribution (e.g. "groq", "together")
    /// - `base_url`: the endpoint root, without the `/v1` suffix
    ///   (e.g. `https://api.groq.com/openai`)
    pub fn new(name: String, api_key: String, model: String, base_url: String) -> Self {
        Self {
            inner: OpenAiProvider::new(api_key, model, base_url),
            name,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn with_model(&self, model: &str) -> Option<Arc<dyn LlmProvider>> {
        Some(Arc::new(Self {
            inner: self.inner.rebind(model),
            name: self.name.clone(),
        }))
    }

    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.inner.generate_as(&self.name, prompt, system, options).await
    }
}
