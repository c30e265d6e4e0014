//! floodwatch - DDoS event monitor and alert dispatcher
//!
//! Polls a detection service, matches events to monitored targets and
//! delivers alerts to webhooks or the log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use flood_alerts::{ChannelRouter, WebhookConfig};
use flood_core::InMemoryTargetStore;
use flood_engine::{Collaborators, EngineConfig, Monitor, MonitorService};
use flood_metrics::MetricStore;
use flood_upstream::HttpEventSource;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "floodwatch")]
#[command(about = "DDoS event monitor and alert dispatcher")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, env = "FLOODWATCH_CONFIG", default_value = "/etc/floodwatch/config.toml")]
        config: PathBuf,

        /// Detection service base URL (overrides the config file)
        #[arg(long, env = "FLOODWATCH_UPSTREAM_URL")]
        upstream_url: Option<String>,

        /// Detection service API key (overrides the config file)
        #[arg(long, env = "FLOODWATCH_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Load and validate a config file
    CheckConfig {
        /// Path to config file
        #[arg(short, long, env = "FLOODWATCH_CONFIG", default_value = "/etc/floodwatch/config.toml")]
        config: PathBuf,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "floodwatch.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json = cli.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(
            EnvFilter::from_default_env()
                .add_directive("floodwatch=info".parse()?)
                .add_directive("flood_engine=info".parse()?),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            upstream_url,
            api_key,
        } => run(config, upstream_url, api_key).await?,
        Commands::CheckConfig { config } => check_config(&config)?,
        Commands::InitConfig { output } => init_config(&output)?,
    }

    Ok(())
}

async fn run(
    config_path: PathBuf,
    upstream_url: Option<String>,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting floodwatch");

    let config = EngineConfig::from_file(&config_path)?.with_upstream_overrides(upstream_url, api_key);
    config.validate()?;

    let store = InMemoryTargetStore::new();
    for target in config.seed_targets()? {
        store.add_target(target)?;
    }
    info!(
        upstream = %config.upstream.url,
        targets = store.target_count(),
        "loaded config"
    );

    let source = Arc::new(HttpEventSource::new(config.http_source_config())?);
    let channel = Arc::new(ChannelRouter::standard(WebhookConfig::default())?);
    let metrics = Arc::new(MetricStore::new(config.retention.metrics()));
    let deps = Collaborators::new(Arc::new(store), source, channel).with_metrics(metrics);

    let service = MonitorService::new(Monitor::new(config, deps));
    service.start()?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    service.stop().await?;
    let stats = service.get_stats();
    if stats.alerts_abandoned > 0 {
        warn!(abandoned = stats.alerts_abandoned, "alerts were abandoned at shutdown");
    }
    info!(stats = %serde_json::to_string(&stats)?, "final stats");
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = EngineConfig::from_file(path)?;
    config.validate()?;
    println!(
        "{}: ok ({} targets, upstream {})",
        path.display(),
        config.targets.len(),
        config.upstream.url
    );
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("refusing to overwrite {}", output.display());
    }
    std::fs::write(output, EngineConfig::sample().to_toml()?)?;
    println!("Wrote sample config to {}", output.display());
    Ok(())
}
