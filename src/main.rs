//! tierwise - Profile-based model routing and cost accounting
//!
//! Command-line front end for checking a routing configuration and
//! previewing routing decisions against it.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tierwise::config::RoutingConfig;
use tierwise::cost::CostCalculator;
use tierwise::provider::ProviderRegistry;
use tierwise::resolver::Resolver;
use tierwise::router::{Phase, Router};

#[derive(Parser)]
#[command(name = "tierwise")]
#[command(about = "Profile-based model routing and cost accounting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "tierwise.toml")]
        config: String,
    },

    /// Show enabled providers and their models
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "tierwise.toml")]
        config: String,
    },

    /// Resolve a model for a profile or phase
    Route {
        /// Path to configuration file
        #[arg(short, long, default_value = "tierwise.toml")]
        config: String,

        /// Routing profile (cheap, balanced, premium)
        #[arg(short, long, default_value = "balanced")]
        profile: String,

        /// Route as a workflow phase with this id
        #[arg(long)]
        phase: Option<String>,

        /// Required capability; may be repeated
        #[arg(long = "capability")]
        capabilities: Vec<String>,
    },

    /// Estimate the cost of a dispatch
    Estimate {
        /// Path to configuration file
        #[arg(short, long, default_value = "tierwise.toml")]
        config: String,

        /// Model id
        #[arg(short, long)]
        model: String,

        /// Input tokens
        #[arg(long, default_value_t = 1000)]
        input: u64,

        /// Output tokens
        #[arg(long, default_value_t = 1000)]
        output: u64,
    },
}

impl Commands {
    fn config_path(&self) -> &str {
        match self {
            Commands::Check { config }
            | Commands::Providers { config }
            | Commands::Route { config, .. }
            | Commands::Estimate { config, .. } => config.as_str(),
        }
    }
}

/// Default log filter: `RUST_LOG` wins, then the config's `[logging] level`.
fn default_filter(config_path: &str) -> String {
    let level = RoutingConfig::from_file(config_path)
        .map(|cfg| cfg.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    format!("tierwise={}", level)
}

fn load(path: &str) -> anyhow::Result<RoutingConfig> {
    tracing::info!(config = %path, "Loading configuration");
    RoutingConfig::from_file(path).with_context(|| format!("failed to load {}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.command.config_path()).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Check { config } => {
            let cfg = load(&config)?;
            println!(
                "Configuration OK: {} providers, {} profiles",
                cfg.providers.len(),
                cfg.profiles.len()
            );
            Ok(())
        }

        Commands::Providers { config } => {
            let cfg = load(&config)?;
            for (name, provider) in cfg.providers_by_priority() {
                if !provider.enabled {
                    continue;
                }
                let kind = if provider.is_local { "local" } else { "cloud" };
                println!(
                    "{} [priority {}, {}] {}",
                    name, provider.priority, kind, provider.base_url
                );
                for (model_id, model) in provider.models.iter().filter(|(_, m)| m.enabled) {
                    println!(
                        "  {} tier={} in=${}/tok out=${}/tok max_tokens={}",
                        model_id,
                        model.tier.as_str(),
                        model.cost_per_input_token,
                        model.cost_per_output_token,
                        model.max_tokens
                    );
                }
            }
            Ok(())
        }

        Commands::Route {
            config,
            profile,
            phase,
            capabilities,
        } => {
            let cfg = load(&config)?;
            let registry = Arc::new(ProviderRegistry::from_config(&cfg));
            let resolver = Resolver::new(Arc::new(Router::new(cfg, registry)));

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let resolution = match phase {
                Some(id) => {
                    let phase = Phase::new(id).with_profile(profile);
                    resolver.resolve_for_phase(&cancel, &phase).await?
                }
                None if !capabilities.is_empty() => {
                    resolver
                        .resolve_with_capabilities(&cancel, &profile, &capabilities)
                        .await?
                }
                None => resolver.resolve(&cancel, &profile).await?,
            };

            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(())
        }

        Commands::Estimate {
            config,
            model,
            input,
            output,
        } => {
            let cfg = load(&config)?;
            let calculator = CostCalculator::from_config(&cfg);
            if calculator.get_model_cost(&model).is_none() {
                tracing::warn!(model = %model, "model not configured, estimating at zero cost");
            }
            let breakdown = calculator.calculate_or_zero(&model, input, output);
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
            Ok(())
        }
    }
}
