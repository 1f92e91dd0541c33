use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use cascade_core::{
    FallbackOrchestrator, Generation, GenerationOptions, ProviderRegistry, Vendor,
};
use config::CascadeConfig;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(version)]
#[command(about = "cascade: resilient multi-provider LLM inference")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a one-shot completion with provider fallback
    Ask {
        /// The prompt to send
        prompt: String,

        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Walk a named strategy (with per-model retry) instead of the registry
        #[arg(long)]
        strategy: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// List registered providers in fallback order
    Providers,

    /// List strategy presets and custom strategies
    Strategies,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Providers => cmd_providers(&cli.config).await,
        Commands::Strategies => cmd_strategies(&cli.config).await,
        Commands::Ask {
            prompt,
            system,
            strategy,
            temperature,
            max_tokens,
        } => {
            let mut options = GenerationOptions::default();
            if let Some(t) = temperature {
                options = options.with_temperature(t);
            }
            if let Some(n) = max_tokens {
                options = options.with_max_tokens(n);
            }
            cmd_ask(&cli.config, &prompt, system.as_deref(), strategy.as_deref(), &options).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("cascade initialized at {}", config_dir.display());
    println!(
        "Edit {} or export provider API keys to configure the fallback chain.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = CascadeConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

/// Build the registry once and hand it to the orchestrator
fn build_orchestrator(cfg: &CascadeConfig) -> FallbackOrchestrator {
    let registry = Arc::new(ProviderRegistry::from_settings(&cfg.provider_settings()));
    FallbackOrchestrator::new(registry)
        .with_retry_policy(cfg.retry_policy())
        .with_deadline(cfg.deadline())
}

async fn cmd_providers(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = CascadeConfig::load(config_path)?;
    let registry = ProviderRegistry::from_settings(&cfg.provider_settings());

    if registry.is_empty() {
        println!("No providers configured.");
        println!("{}", unconfigured_hint());
        return Ok(());
    }

    for (idx, identity) in registry.identities().iter().enumerate() {
        println!("{}. {}", idx + 1, identity);
    }
    Ok(())
}

async fn cmd_strategies(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = CascadeConfig::load(config_path)?;
    let settings = cfg.provider_settings();

    for strategy in cfg.strategies() {
        println!("{}:", strategy.name);
        for model in &strategy.models {
            let note = match Vendor::for_model(model) {
                Some(vendor) if settings.credential(vendor).is_some() => String::new(),
                Some(vendor) => format!("  (no {} credential)", vendor),
                None => "  (unknown vendor)".to_string(),
            };
            println!("  - {}{}", model, note);
        }
    }
    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    prompt: &str,
    system: Option<&str>,
    strategy: Option<&str>,
    options: &GenerationOptions,
) -> Result<()> {
    let cfg = CascadeConfig::load(config_path)?;
    let orchestrator = build_orchestrator(&cfg);

    let generation = match strategy {
        Some(name) => {
            let strategy = cfg.strategy(name).ok_or_else(|| {
                anyhow!(
                    "Unknown strategy '{}'. Run `cascade strategies` to list them.",
                    name
                )
            })?;
            orchestrator
                .generate_with_strategy(&strategy, prompt, system, options)
                .await
                .map_err(|e| {
                    if e.is_unconfigured() {
                        anyhow!("{}\n{}", e, unconfigured_hint())
                    } else {
                        anyhow!("Service unavailable: {}", e)
                    }
                })?
        }
        None => match orchestrator.generate(prompt, system, options).await {
            Some(generation) => generation,
            None if orchestrator.registry().is_empty() => {
                bail!("No providers configured.\n{}", unconfigured_hint())
            }
            None => bail!(
                "Service unavailable: all {} providers failed",
                orchestrator.registry().len()
            ),
        },
    };

    print_generation(&generation);
    Ok(())
}

fn print_generation(generation: &Generation) {
    println!("{}", generation.text);
    eprintln!("[{}]", generation.identity);
}

fn unconfigured_hint() -> String {
    let vars: Vec<&str> = Vendor::PRIORITY.iter().map(|v| v.env_var()).collect();
    format!(
        "Export one of {} or run `cascade init` and edit the config.",
        vars.join(", ")
    )
}
