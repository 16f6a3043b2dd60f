//! Multi-tenant tool-server gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────┐
//!                          │                   GATEWAY                     │
//!                          │                                               │
//!   POST /token ───────────┼─▶ auth (issue JWT)                            │
//!                          │                                               │
//!   GET /{backend}/{key} ──┼─▶ auth (verify) ─▶ backend registry           │
//!     (SSE, held open)     │        │               │                      │
//!                          │        ▼               ▼                      │
//!   POST .../messages ─────┼─▶ session registry ─▶ driver task ─▶ backend  │
//!                          │        ▲                               │      │
//!                          │        │                               ▼      │
//!                          │   idle reaper                 pool manager    │
//!                          │  (interval sweep)          (lazy, read-only)  │
//!                          │                                   ▲           │
//!                          │                       credential refresh loop │
//!                          │                      (poll + content hash)    │
//!                          └──────────────────────────────────────────────┘
//! ```
//!
//! Startup order: config → logging → metrics → token service → pool
//! manager → backend registry → session registry → background loops →
//! listener. Fatal startup errors: invalid config (including a missing
//! auth secret) and zero registered backends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use toolgate::auth::TokenService;
use toolgate::backend::BackendRegistry;
use toolgate::config::load_config;
use toolgate::gateway::{AppState, GatewayServer};
use toolgate::lifecycle::Shutdown;
use toolgate::observability::{logging, metrics};
use toolgate::pool::{FileSource, PoolManager, PoolOptions, PostgresFactory, RefreshLoop};
use toolgate::session::{IdleReaper, SessionRegistry};

#[derive(Parser, Debug)]
#[command(name = "toolgate", about = "Multi-tenant tool-server gateway")]
struct Args {
    /// Path to the gateway configuration file.
    #[arg(long, default_value = "toolgate.toml")]
    config: PathBuf,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        idle_timeout_secs = config.sessions.idle_timeout_secs,
        refresh_interval_secs = config.pool.refresh_interval_secs,
        "configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let tokens = Arc::new(TokenService::new(
        &config.auth.secret,
        Duration::from_secs(config.auth.token_ttl_secs),
    ));

    let pools = Arc::new(PoolManager::new(
        Box::new(FileSource::new(&config.pool.credentials_path)),
        Box::new(PostgresFactory),
        PoolOptions::from(&config.pool),
    ));
    // First credential load; a failure here is retried by the refresh
    // loop, it only means identifiers resolve once a read succeeds.
    if let Err(err) = pools.refresh_once().await {
        tracing::warn!(error = %err, "initial credential map load failed");
    }

    let backends = Arc::new(BackendRegistry::build(&config.backends, pools.clone()));
    if backends.is_empty() {
        return Err("no backends registered, aborting startup".into());
    }
    tracing::info!(backends = ?backends.names(), "backend registry ready");

    let sessions = Arc::new(SessionRegistry::new(config.sessions.channel_capacity));

    // Background loops start exactly once, here, never from handlers.
    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn(
        RefreshLoop::new(
            pools.clone(),
            Duration::from_secs(config.pool.refresh_interval_secs),
        )
        .run(shutdown.subscribe()),
    );
    tokio::spawn(
        IdleReaper::new(
            sessions.clone(),
            Duration::from_secs(config.sessions.reaper_interval_secs),
            Duration::from_secs(config.sessions.idle_timeout_secs),
        )
        .run(shutdown.subscribe()),
    );

    let bind_address = args
        .bind
        .unwrap_or_else(|| config.listener.bind_address.clone());
    let listener = TcpListener::bind(&bind_address).await?;

    let state = AppState {
        tokens,
        pools: pools.clone(),
        backends,
        sessions: sessions.clone(),
        metrics: metrics_handle,
        config: Arc::new(config),
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_shutdown.trigger();
        }
    });

    GatewayServer::new(state)
        .run(listener, shutdown.subscribe())
        .await?;

    // Drain what is left: sessions first (no new pool checkouts), then
    // the pools themselves.
    sessions.close_all();
    pools.close_all().await;

    tracing::info!("shutdown complete");
    Ok(())
}
