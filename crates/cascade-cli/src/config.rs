use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use cascade_core::{ProviderSettings, RetryPolicy, Strategy, Vendor, VendorSettings};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub anthropic: Option<VendorConfig>,
    #[serde(default)]
    pub openai: Option<VendorConfig>,
    #[serde(default)]
    pub google: Option<VendorConfig>,
    #[serde(default)]
    pub groq: Option<VendorConfig>,
}

impl ProvidersConfig {
    fn entries(&self) -> [(Vendor, Option<&VendorConfig>); 4] {
        [
            (Vendor::Anthropic, self.anthropic.as_ref()),
            (Vendor::OpenAi, self.openai.as_ref()),
            (Vendor::Google, self.google.as_ref()),
            (Vendor::Groq, self.groq.as_ref()),
        ]
    }

    fn slot(&mut self, vendor: Vendor) -> &mut Option<VendorConfig> {
        match vendor {
            Vendor::Anthropic => &mut self.anthropic,
            Vendor::OpenAi => &mut self.openai,
            Vendor::Google => &mut self.google,
            Vendor::Groq => &mut self.groq,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default)]
    pub skip_terminal: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            skip_terminal: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    cascade_core::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    cascade_core::retry::DEFAULT_BASE_DELAY.as_millis() as u64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 0 disables the overall deadline
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// One day; anything longer is a misconfiguration
const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

fn default_deadline_secs() -> u64 {
    cascade_core::orchestrator::DEFAULT_DEADLINE.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub models: Vec<String>,
}

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cascade")
}

impl CascadeConfig {
    /// Load the config file, falling back to environment credentials when
    /// no file exists at the default location.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    info!(
                        "No config at {}, using provider credentials from the environment",
                        path.display()
                    );
                    return Ok(Self::from_env());
                }
                path
            }
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        // Refuse config files readable by group or other; they hold secrets
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `cascade init` first.",
                path.display()
            )
        })?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;

        for (vendor, vendor_config) in config.providers.entries() {
            if let Some(c) = vendor_config {
                if looks_hardcoded(&c.api_key, &content, vendor) {
                    warn!(
                        "{} API key is hardcoded in config file. For security, use environment variables: api_key = \"${{{}}}\"",
                        vendor,
                        vendor.env_var()
                    );
                }
            }
        }

        Ok(config)
    }

    /// Config built purely from `*_API_KEY` environment variables
    pub fn from_env() -> Self {
        Self::from_settings(&ProviderSettings::from_env())
    }

    /// Config whose provider table mirrors `settings`, other sections defaulted
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let mut config = Self::default();
        for vendor in Vendor::PRIORITY {
            if let Some(vendor_settings) = settings.get(vendor) {
                *config.providers.slot(vendor) = Some(VendorConfig {
                    api_key: vendor_settings.api_key.clone(),
                    model: vendor_settings.model.clone(),
                    base_url: vendor_settings.base_url.clone(),
                });
            }
        }
        config
    }

    fn validate(&self) -> Result<()> {
        for (vendor, vendor_config) in self.providers.entries() {
            if let Some(base_url) = vendor_config.and_then(|c| c.base_url.as_deref()) {
                url::Url::parse(base_url)
                    .with_context(|| format!("providers.{}.base_url is not a valid URL", vendor))?;
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.orchestrator.deadline_secs > MAX_DEADLINE_SECS {
            return Err(anyhow!(
                "orchestrator.deadline_secs must be at most {} (use 0 to disable the deadline)",
                MAX_DEADLINE_SECS
            ));
        }
        for (name, strategy) in &self.strategies {
            if strategy.models.is_empty() {
                return Err(anyhow!("strategies.{} must list at least one model", name));
            }
        }
        Ok(())
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        let mut settings = ProviderSettings::new();
        for (vendor, vendor_config) in self.providers.entries() {
            if let Some(c) = vendor_config {
                settings.set(
                    vendor,
                    VendorSettings {
                        api_key: c.api_key.clone(),
                        model: c.model.clone(),
                        base_url: c.base_url.clone(),
                    },
                );
            }
        }
        settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
        .skip_terminal(self.retry.skip_terminal)
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self.orchestrator.deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Custom strategies first, then built-in presets
    pub fn strategy(&self, name: &str) -> Option<Strategy> {
        match self.strategies.get(name) {
            Some(custom) => Some(Strategy::new(name, custom.models.clone())),
            None => Strategy::preset(name),
        }
    }

    /// Every usable strategy: presets (possibly overridden), then custom ones
    pub fn strategies(&self) -> Vec<Strategy> {
        let mut all: Vec<Strategy> = Strategy::presets()
            .into_iter()
            .map(|preset| self.strategy(&preset.name).unwrap_or(preset))
            .collect();
        for (name, custom) in &self.strategies {
            if Strategy::preset(name).is_none() {
                all.push(Strategy::new(name.as_str(), custom.models.clone()));
            }
        }
        all
    }

    /// Copy with every API key masked, for display
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        for vendor in Vendor::PRIORITY {
            if let Some(c) = masked.providers.slot(vendor) {
                c.api_key = mask_secret(&c.api_key);
            }
        }
        masked
    }
}

/// A key is hardcoded when it is set but the raw file never referenced a variable for it
fn looks_hardcoded(api_key: &str, raw: &str, vendor: Vendor) -> bool {
    !api_key.is_empty() && !api_key.contains("${") && !raw.contains(&format!("${{{}}}", vendor.env_var()))
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GOOGLE_AI_API_KEY",
    "GROQ_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}
