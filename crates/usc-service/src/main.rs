#![forbid(unsafe_code)]

//! **usc-service** — HTTP command surface and CLI face for the Universe
//! Synchronization Core. Wires every process-wide singleton — the credential
//! store, rate limiter, status bus, and universe manager — then exposes them
//! through two transports that share the same command implementations:
//! `--serve` runs the HTTP surface in `http.rs`, any other subcommand runs
//! one command directly via `cli.rs`.

mod cli;
mod commands;
mod config;
mod http;
mod provider_factory;
mod refresher;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usc_auth::PersistentAuth;
use usc_bus::{InMemoryStatusBus, StatusBus};
use usc_local_file::{DownloadOnlyBacking, LocalFileBacking, NativeFileBacking};
use usc_manager::{EngineDeps, UniverseManager};
use usc_provider::TokenSource;
use usc_rate_limiter::{BucketConfig, DashMapRateLimitStorage, TokenBucketLimiter};
use usc_store::SqliteStore;
use usc_types::Modality;

use crate::cli::Commands;
use crate::provider_factory::RestProviderFactory;
use crate::refresher::GitHubTokenRefresher;
use crate::state::AppState;

/// GitHub's REST rate limit for an authenticated user/app: 5000 requests
/// per hour, spent here as a steady refill rather than a once-an-hour
/// cliff.
const GITHUB_HOURLY_LIMIT: u64 = 5000;

#[derive(Parser, Debug)]
#[command(name = "usc-service")]
#[command(about = "Universe Synchronization Core — command surface and sync daemon")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (missing is fine; env and flags still apply).
    #[arg(long, default_value = "config/service.toml")]
    config: String,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured sqlite database path.
    #[arg(long)]
    db_path: Option<String>,

    /// Override the configured log filter.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = config::ConfigOverrides {
        port: cli.port,
        db_path: cli.db_path.clone(),
        log_level: cli.log_level.clone(),
    };
    let cfg = config::load(&cli.config, overrides)?;

    init_tracing(&cfg.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting usc-service");

    let store = Arc::new(SqliteStore::open(&cfg.db_path).await?);
    let bus: Arc<dyn StatusBus> = Arc::new(InMemoryStatusBus::new(1024));

    let refresher = Arc::new(GitHubTokenRefresher::new(
        cfg.github_oauth_client_id.clone(),
        cfg.github_oauth_client_secret.clone(),
        cfg.github_app_id.clone(),
        cfg.github_app_private_key.clone(),
    )?);
    let auth = Arc::new(PersistentAuth::new(store.clone(), refresher, bus.clone()));
    auth.auto_connect().await?;
    // `TokenSource` is implemented for `Arc<PersistentAuth<..>>` itself (the
    // trait needs `self: &Arc<Self>` for its own background-task spawning),
    // so the trait object wraps that Arc a second time.
    let token_source: Arc<dyn TokenSource> = Arc::new(auth.clone());

    let mut bucket_configs = HashMap::new();
    bucket_configs.insert(
        Modality::OAuth,
        BucketConfig { capacity: GITHUB_HOURLY_LIMIT, refill_per_second: GITHUB_HOURLY_LIMIT as f64 / 3600.0, burst: 50 },
    );
    bucket_configs.insert(
        Modality::AppInstallation,
        BucketConfig { capacity: GITHUB_HOURLY_LIMIT, refill_per_second: GITHUB_HOURLY_LIMIT as f64 / 3600.0, burst: 50 },
    );
    let rate_limiter = Arc::new(TokenBucketLimiter::new(
        Arc::new(DashMapRateLimitStorage::new()),
        bucket_configs,
    ));

    let provider_factory = Arc::new(RestProviderFactory::new(
        token_source.clone(),
        rate_limiter.clone(),
        cfg.gitea_api_base.clone(),
    ));
    let local_backing: Arc<dyn LocalFileBacking> = if cfg.local_file_supported {
        Arc::new(NativeFileBacking::new(cfg.local_file_dir.clone()))
    } else {
        tracing::info!("local_file_supported=false, universes can only use git as their backing");
        Arc::new(DownloadOnlyBacking)
    };

    let manager = Arc::new(UniverseManager::new(
        store.clone(),
        bus.clone(),
        EngineDeps {
            provider_factory,
            rate_limiter: rate_limiter.clone(),
            token_source,
            local_backing,
        },
    ));
    manager.load().await?;

    let app_state = Arc::new(AppState {
        manager,
        auth,
        bus,
        rate_limiter,
    });

    match cli.command {
        Commands::Serve => serve(app_state, cfg.bind_addr, cfg.port).await,
        other => cli::run(&app_state, other).await,
    }
}

async fn serve(state: Arc<AppState>, bind_addr: String, port: u16) -> anyhow::Result<()> {
    let router = http::router(state).layer(tower_http::trace::TraceLayer::new_for_http());
    let addr = format!("{bind_addr}:{port}");
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("usc-service shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
