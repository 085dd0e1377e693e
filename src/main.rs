// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Entry point for the topology monitor core.
//!
//! - Loads environment variables and configuration
//! - Sets up structured logging
//! - Runs one-time startup cleanup against the storage backend
//! - Starts the device-polling scheduler, the batch pinger, and the
//!   retention sweep, each on its own cadence
//! - Waits for a shutdown signal and drains all three

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokio::sync::watch;

use topology_monitor::notifications::transport::HttpTransport;
use topology_monitor::scheduler::ping::PingProber;
use topology_monitor::storage::memory::InMemoryStorage;
use topology_monitor::storage::StorageBackend;
use topology_monitor::{error::Result, startup, Config, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_tracing();

    let config = Config::from_env();
    tracing::info!(
        polling_interval_secs = config.polling_interval_secs,
        concurrency_ceiling = config.concurrency_ceiling,
        ping_interval_secs = config.ping_interval_secs,
        "loaded configuration"
    );

    let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
    startup::run_startup_tasks(&storage).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let scheduler = Arc::new(Scheduler::new(storage.clone(), Arc::new(HttpTransport::new()), config.clone()));
    let ingestor = scheduler.ingestor();
    let scheduler_handle = scheduler.start(shutdown_rx.clone());

    let pinger = Arc::new(PingProber::new(
        storage.clone(),
        ingestor.clone(),
        config.ping_tool_path.clone(),
        config.ping_packet_timeout_ms,
    ));
    let ping_handle = spawn_ping_loop(pinger, config.ping_interval_secs, shutdown_rx.clone());

    let retention_handle = spawn_retention_loop(ingestor, config.retention, shutdown_rx.clone());

    tracing::info!("topology monitor running");
    let _ = scheduler_handle.await;
    let _ = ping_handle.await;
    let _ = retention_handle.await;

    Ok(())
}

fn spawn_ping_loop(pinger: Arc<PingProber>, interval_secs: u64, mut shutdown_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("stopping batch pinger");
                        break;
                    }
                }
            }
            if let Err(e) = pinger.run_cycle().await {
                tracing::error!(error = %e, "ping cycle failed");
            }
        }
    })
}

fn spawn_retention_loop(
    ingestor: Arc<topology_monitor::history::Ingestor>,
    retention: topology_monitor::config::RetentionHorizons,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("stopping retention sweep");
                        break;
                    }
                }
            }
            if let Err(e) = ingestor.run_retention_sweep(&retention).await {
                tracing::error!(error = %e, "retention sweep failed");
            }
        }
    })
}

fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
