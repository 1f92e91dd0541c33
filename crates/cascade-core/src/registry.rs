//! Credential-driven provider registry
//!
//! The registry is built once at startup from whichever vendor credentials are
//! present and is read-only afterwards. Membership means "credential present",
//! not "reachable": reachability is only discovered by generating.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::providers::{
    AnthropicProvider, GoogleProvider, LlmProvider, OpenAiCompatProvider, OpenAiProvider,
    ProviderIdentity,
};

/// Supported inference vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Anthropic,
    OpenAi,
    Google,
    Groq,
}

impl Vendor {
    /// Static fallback priority, highest first
    pub const PRIORITY: [Vendor; 4] = [Self::Anthropic, Self::OpenAi, Self::Google, Self::Groq];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Groq => "groq",
        }
    }

    /// Environment variable holding this vendor's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GOOGLE_AI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5",
            Self::OpenAi => "gpt-4o",
            Self::Google => "gemini-2.0-flash",
            Self::Groq => "llama-3.3-70b-versatile",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com",
            Self::Google => "https://generativelanguage.googleapis.com",
            Self::Groq => "https://api.groq.com/openai",
        }
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Anthropic => &["claude-"],
            Self::OpenAi => &["gpt-", "o1", "o3", "o4", "chatgpt-"],
            Self::Google => &["gemini-"],
            Self::Groq => &["llama", "mixtral", "gemma", "qwen", "deepseek"],
        }
    }

    /// Whether a model identifier belongs to this vendor's catalogue
    pub fn owns_model(&self, model: &str) -> bool {
        let model = model.to_ascii_lowercase();
        self.model_prefixes().iter().any(|p| model.starts_with(p))
    }

    /// The vendor serving `model`, checked in priority order
    pub fn for_model(model: &str) -> Option<Vendor> {
        Self::PRIORITY.into_iter().find(|v| v.owns_model(model))
    }

    fn build(&self, settings: &VendorSettings) -> Arc<dyn LlmProvider> {
        let api_key = settings.api_key.trim().to_string();
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string());
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| self.default_base_url().to_string());

        match self {
            Self::Anthropic => Arc::new(AnthropicProvider::new(api_key, model, base_url)),
            Self::OpenAi => Arc::new(OpenAiProvider::new(api_key, model, base_url)),
            Self::Google => Arc::new(GoogleProvider::new(api_key, model, base_url)),
            Self::Groq => Arc::new(OpenAiCompatProvider::new(
                self.name().to_string(),
                api_key,
                model,
                base_url,
            )),
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" | "gemini" => Ok(Self::Google),
            "groq" => Ok(Self::Groq),
            other => Err(format!("unknown vendor '{}'", other)),
        }
    }
}

/// Credential and client settings for one vendor
#[derive(Clone, Default)]
pub struct VendorSettings {
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl VendorSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for VendorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.has_credential() { "(set)" } else { "(empty)" };
        f.debug_struct("VendorSettings")
            .field("api_key", &key)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Per-vendor settings gathered at startup
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    vendors: BTreeMap<Vendor, VendorSettings>,
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every vendor's API key from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read API keys through `lookup`, keyed by [`Vendor::env_var`]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::new();
        for vendor in Vendor::PRIORITY {
            if let Some(key) = lookup(vendor.env_var()) {
                settings.set(vendor, VendorSettings::new(key));
            }
        }
        settings
    }

    pub fn with_vendor(mut self, vendor: Vendor, settings: VendorSettings) -> Self {
        self.set(vendor, settings);
        self
    }

    pub fn set(&mut self, vendor: Vendor, settings: VendorSettings) {
        self.vendors.insert(vendor, settings);
    }

    pub fn get(&self, vendor: Vendor) -> Option<&VendorSettings> {
        self.vendors.get(&vendor)
    }

    /// Settings for `vendor` only when its credential is actually present
    pub fn credential(&self, vendor: Vendor) -> Option<&VendorSettings> {
        self.get(vendor).filter(|s| s.has_credential())
    }
}

/// Ordered, immutable set of credentialed providers
pub struct ProviderRegistry {
    /// Providers in fallback order (index 0 = primary)
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.identities())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create a registry from explicitly constructed providers, in the given order
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Build one provider per credentialed vendor, in [`Vendor::PRIORITY`] order
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        for vendor in Vendor::PRIORITY {
            match settings.credential(vendor) {
                Some(vendor_settings) => {
                    let provider = vendor.build(vendor_settings);
                    info!(
                        "Registered provider {} (priority {})",
                        provider.identity(),
                        providers.len() + 1
                    );
                    providers.push(provider);
                }
                None => {
                    info!("No credential for {}, skipping", vendor);
                }
            }
        }

        if providers.is_empty() {
            warn!("No provider credentials found; inference is unconfigured");
        }

        Self { providers }
    }

    /// Highest-priority provider, for callers that want no fallback
    pub fn get_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.providers.first().cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn identities(&self) -> Vec<ProviderIdentity> {
        self.providers.iter().map(|p| p.identity()).collect()
    }

    /// Find a provider able to serve `model`
    ///
    /// An exact model match among registered providers wins; otherwise the
    /// owning vendor's provider is rebound to `model`.
    pub fn resolve_model(&self, model: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        if let Some(provider) = self.providers.iter().find(|p| p.model() == model) {
            return Ok(Arc::clone(provider));
        }

        let vendor = Vendor::for_model(model)
            .ok_or_else(|| ProviderError::terminal(format!("no vendor serves model '{}'", model)))?;

        let provider = self
            .providers
            .iter()
            .find(|p| p.provider_name() == vendor.name())
            .ok_or_else(|| {
                ProviderError::terminal(format!(
                    "no credential configured for {} (needed by model '{}')",
                    vendor, model
                ))
            })?;

        provider.with_model(model).ok_or_else(|| {
            ProviderError::terminal(format!(
                "provider {} cannot serve model '{}'",
                provider.identity(),
                model
            ))
        })
    }
}
