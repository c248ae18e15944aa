//! Vendra server binary
//!
//! Wires the API over one Postgres pool, spawns the outbox worker and the
//! fleet availability reactivator, and shuts everything down together on
//! SIGINT.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vendra_api::{build_router, AppState};
use vendra_core::outbox::{LogBroker, OutboxWorker, PgOutboxStore};
use vendra_core::{AvailabilityReactivator, Cache, Config};

#[derive(Debug, Parser)]
#[command(name = "vendra", about = "Order fulfillment backend")]
struct Args {
    /// Path to a TOML config file; environment variables apply otherwise
    #[arg(long, env = "VENDRA_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = match args.config {
        Some(path) => Config::load(&path).context("loading config file")?,
        None => Config::from_env().context("loading config from environment")?,
    };

    let pool = vendra_core::db::create_pool(&config.database)?;
    let cache = Cache::connect(&config.cache).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Background loops
    let worker = Arc::new(OutboxWorker::new(
        Arc::new(PgOutboxStore::new(pool.clone())),
        Arc::new(LogBroker),
        config.outbox.clone(),
    ));
    let worker_handle = {
        let worker = worker.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(rx).await })
    };

    let reactivator = AvailabilityReactivator::new(pool.clone(), config.fleet.clone());
    let reactivator_handle = {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { reactivator.run(rx).await })
    };

    // HTTP surface
    let state = AppState::new(pool, cache, &config);
    let router = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, version = vendra_core::VERSION, "vendra listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving")?;

    // Stop the background loops and wait for them to drain
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = reactivator_handle.await;

    info!("vendra stopped");
    Ok(())
}
