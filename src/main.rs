//! NanoStatus - Uptime Monitoring Service
//!
//! Probes a set of monitors on a fixed cadence, keeps their check history in
//! SQLite and pushes live updates to connected dashboards.

mod config;
mod db;
mod live;
mod probe;
mod scheduler;
mod stats;
mod web;

use config::ServerConfig;
use db::Store;
use live::{Broadcaster, Debouncer};
use probe::Prober;
use scheduler::{Checker, RetentionManager, Scheduler};
use stats::{SnapshotSource, StatsAggregator};
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("nanostatus=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting NanoStatus on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Add sample monitor if none exist
    if store.list_monitors()?.is_empty() {
        tracing::info!("Adding sample monitor: Example.com");
        store.create_monitor(&db::NewMonitor {
            name: "Example.com".to_string(),
            url: "https://example.com".to_string(),
            ..Default::default()
        })?;
    }

    // Live update pipeline
    let broadcaster = Broadcaster::new(cfg.observer_buffer);
    let stats: Arc<dyn SnapshotSource> = Arc::new(StatsAggregator::new(store.clone()));
    let debouncer = Arc::new(Debouncer::start(
        cfg.debounce_window,
        stats.clone(),
        broadcaster.clone(),
    ));

    // Create scheduler
    let prober = Prober::new(cfg.probe_timeout)?;
    let checker = Arc::new(Checker::new(
        store.clone(),
        prober,
        broadcaster.clone(),
        debouncer.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        checker,
        cfg.sweep_interval,
        cfg.probe_delay,
    ));
    let retention = RetentionManager::new(store.clone(), cfg.retention_days);

    // Start background tasks
    scheduler.start();
    retention.start();

    // Start web server
    let server = Server::new(AppState {
        config: cfg,
        store,
        scheduler: scheduler.clone(),
        broadcaster: broadcaster.clone(),
        debouncer: debouncer.clone(),
        stats,
    });
    let served = server.start(shutdown_signal()).await;

    scheduler.stop();
    retention.stop();
    debouncer.stop();
    broadcaster.shutdown();
    tracing::info!("NanoStatus stopped");

    served
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
