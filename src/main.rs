//! Relaywatch - Entry Point
//!
//! Starts the source sync, availability updater and serving endpoint with
//! graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod error;
mod models;
mod parser;
mod probe;
mod scoring;
mod services;
mod whitelist;

use api::ApiServer;
use cache::CacheStore;
use config::Config;
use probe::{ProbeScheduler, SubprocessProbeEngine};
use services::{ConfigUpdater, SourceSync, SourceSyncHandle, UpdaterHandle};
use whitelist::WhitelistFilter;

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaywatch=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Relaywatch");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Load whitelists; serving without them is not an option.
    let filter = Arc::new(WhitelistFilter::from_files(
        &config.whitelist.address_path,
        &config.whitelist.sni_path,
    )?);

    let cache = Arc::new(CacheStore::new());

    // Probe pipeline
    let engine = Arc::new(SubprocessProbeEngine::new(config.probe.clone())?);
    let scheduler = ProbeScheduler::new(engine, config.probe.base_port, config.probe.min_workers);

    // Mirror sync (optional). The first fetch is part of startup: with a
    // mirror configured there is no point running without its data.
    let (source_tx, source_rx) = watch::channel(());
    let source_sync = SourceSync::from_config(&config.source)?;
    let (sync_handle, sync_shutdown) = SourceSyncHandle::new();
    let sync_task = match source_sync {
        Some(sync) => {
            sync.fetch_once().await?;
            info!("Initial source fetch complete");
            Some(tokio::spawn(async move {
                sync.run(sync_shutdown, source_tx).await;
            }))
        }
        None => {
            info!("No source mirror configured, using local file only");
            None
        }
    };

    // Availability updater
    let updater = ConfigUpdater::new(
        Arc::clone(&cache),
        filter,
        scheduler,
        config.source.local_path.clone(),
        config.probe.clone(),
    );
    let (updater_handle, updater_shutdown) = UpdaterHandle::new();
    let updater_task = tokio::spawn(async move {
        updater.run(updater_shutdown, source_rx).await;
    });

    // Serving endpoint
    let (shutdown_tx, _) = watch::channel(false);
    let api_server = ApiServer::new(config.serve.clone(), Arc::clone(&cache));
    let api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("Serving endpoint error: {}", e);
        }
    });

    info!("Serving on {}", config.serve_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    // Fan out shutdown to all services
    let _ = shutdown_tx.send(true);
    updater_handle.shutdown();
    sync_handle.shutdown();

    let _ = tokio::join!(api_task, updater_task);
    if let Some(task) = sync_task {
        let _ = task.await;
    }

    info!("Relaywatch stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
