//! cascade-core - resilient inference across interchangeable LLM vendors
//!
//! This crate provides:
//! - A uniform [`LlmProvider`] capability with Anthropic, OpenAI, Gemini and
//!   OpenAI-compatible adapters
//! - A credential-driven, immutable [`ProviderRegistry`] with static priority
//! - A bounded [`RetryPolicy`] with a linear delay schedule
//! - The [`FallbackOrchestrator`] with cascading and strategy-driven walks
//! - Named [`Strategy`] presets (quality-first, latency-first)

pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod strategy;
pub mod telemetry;

// Re-export main types for convenience
pub use error::{CascadeError, ErrorKind, ProviderError};
pub use orchestrator::FallbackOrchestrator;
pub use providers::{Generation, GenerationOptions, LlmProvider, ProviderIdentity};
pub use registry::{ProviderRegistry, ProviderSettings, Vendor, VendorSettings};
pub use retry::RetryPolicy;
pub use strategy::Strategy;
pub use telemetry::{AttemptOutcome, AttemptRecord, AttemptSink, MemorySink, TracingSink};
