//! Multi-vendor text generation layer
//!
//! Supports Anthropic, OpenAI, Google Gemini, and any OpenAI-compatible endpoint.
//! Providers implement the [`LlmProvider`] trait and are collected into a
//! [`ProviderRegistry`](crate::registry::ProviderRegistry) for ordered fallback.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod openai_compat;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use types::{
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Generation, GenerationOptions, LlmProvider,
    ProviderIdentity,
};
