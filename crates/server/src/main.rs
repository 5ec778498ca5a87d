//! Depot server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depot_core::config::AppConfig;
use depot_server::bootstrap::ensure_admin_token;
use depot_server::reaper::reap;
use depot_server::upstream::ReqwestFetcher;
use depot_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Depot - a pull-through cache for Maven virtual registries
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "DEPOT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Destroy cache entries pending destruction, then exit
    Reap {
        /// Maximum number of entries to process (default: eviction.batch_size)
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using environment only", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Depot v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    depot_server::metrics::register_metrics();

    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = depot_metadata::from_config(&config.metadata, &config.eviction)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    match args.command.unwrap_or(Command::Serve) {
        Command::Reap { limit } => {
            let limit = limit.unwrap_or(config.eviction.batch_size);
            let stats = reap(metadata.as_ref(), storage.as_ref(), limit)
                .await
                .context("reaper run failed")?;
            if stats.errors > 0 {
                anyhow::bail!("{} of {} entries could not be reaped", stats.errors, stats.processed);
            }
            Ok(())
        }
        Command::Serve => {
            if let Some(admin) = &config.admin {
                ensure_admin_token(metadata.as_ref(), admin)
                    .await
                    .context("failed to initialize admin token")?;
            } else {
                tracing::warn!("No admin token configured");
            }

            let fetcher =
                ReqwestFetcher::new(&config.proxy).context("failed to build upstream client")?;

            let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
            let state = AppState::new(config, storage, metadata, Arc::new(fetcher));
            let app = create_router(state);

            tracing::info!("Listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind to {}", addr))?;
            axum::serve(listener, app).await?;

            Ok(())
        }
    }
}
