use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::balancer::health::HealthChecker;
use tollgate::config::Config;
use tollgate::http::{build_router, build_state};
use tollgate::ratelimit::store::SqliteClientStore;
use tollgate::ratelimit::Engine;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Rate-limited HTTP reverse proxy with pluggable load-balancing strategies.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "tollgate.yaml")]
    config: PathBuf,

    /// Override the configured listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the configured SQLite database path.
    #[arg(long)]
    database_path: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database_path) = cli.database_path {
        config.database_path = database_path;
    }
    let config = config.validate().context("validating configuration")?;

    let store = Arc::new(SqliteClientStore::open(&config.database_path)
        .with_context(|| format!("opening client store at {}", config.database_path))?);
    let engine = Arc::new(Engine::new(store.clone()));

    let state = build_state(&config, store, engine.clone());
    let router = build_router(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    Engine::spawn_workers(
        engine,
        config.sync_interval,
        config.replenish_interval,
        config.cleanup_interval,
        config.inactive_after,
        shutdown_rx.clone(),
    );

    let health_checker = HealthChecker::new(
        state.registry.clone(),
        config.health_check_interval,
        tollgate::constants::HEALTH_CHECK_TIMEOUT,
    );
    tokio::spawn(health_checker.run(shutdown_rx));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding listener on {addr}"))?;
    info!(%addr, strategy = %config.strategy, backends = config.backends.len(), "tollgate listening");

    let server = axum::serve(listener, router.into_make_service());
    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
