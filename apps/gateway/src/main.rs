//! # Joule Gateway
//!
//! Composing binary for the offline-first metering gateway: opens the local
//! store, wires the sync engine, registers the four cycles, and serves the
//! read-only status endpoint until shutdown.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Gateway Startup                                │
//! │                                                                         │
//! │  1. Initialize Logging ───────────────────────────────────────────────► │
//! │     • tracing-subscriber with env filter (RUST_LOG overrides)           │
//! │                                                                         │
//! │  2. Load Configuration ───────────────────────────────────────────────► │
//! │     • built-in defaults ◄─ TOML file ◄─ JOULE_* env overrides           │
//! │                                                                         │
//! │  3. Open Local Store ─────────────────────────────────────────────────► │
//! │     • SQLite with WAL, embedded migrations                              │
//! │     • optional purge of old synchronized readings                       │
//! │                                                                         │
//! │  4. Wire the Sync Engine ─────────────────────────────────────────────► │
//! │     • HttpRemote → ConnectivityMonitor → SyncManager                    │
//! │     • ReadingBatcher → RemoteSink → SyncOrchestrator                    │
//! │                                                                         │
//! │  5. Register & Start Cycles ──────────────────────────────────────────► │
//! │     • reading-collection, reading-upload, config-sync, sync-tick        │
//! │                                                                         │
//! │  6. Serve Status, Wait for Shutdown ──────────────────────────────────► │
//! │     • GET /healthz, GET /status                                         │
//! │     • SIGINT/SIGTERM: scheduler → manager → monitor → store             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cycles;
mod sim;
mod status;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use joule_db::{Database, DbConfig};
use joule_sync::{
    ConnectivityMonitor, HttpRemote, ReadingBatcher, RemoteSink, SyncConfig, SyncManager,
    SyncOrchestrator, SyncScheduler,
};

use crate::cycles::CycleContext;
use crate::sim::SimulatedSource;
use crate::status::StatusState;

/// Offline-first metering gateway.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Joule metering gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "JOULE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, env = "JOULE_DB", default_value = "joule.db")]
    db: PathBuf,

    /// Listen address for the status endpoint.
    #[arg(long, env = "JOULE_STATUS_ADDR", default_value = "127.0.0.1:8900")]
    status_addr: String,

    /// Purge synchronized readings older than this many days at startup.
    #[arg(long, env = "JOULE_PURGE_DAYS")]
    purge_days: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();
    info!("Starting Joule gateway");

    let config = SyncConfig::load(args.config.clone())?;
    info!(remote = %config.remote.base_url, "Configuration loaded");

    let db = Arc::new(Database::new(DbConfig::new(&args.db)).await?);
    info!(path = %args.db.display(), "Local store ready");

    if let Some(days) = args.purge_days {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let purged = db.readings().purge_synchronized_before(cutoff).await?;
        info!(purged, days, "Purged old synchronized readings");
    }

    // Sync engine wiring. The monitor owns connectivity; everything else
    // reads it through handles.
    let remote = Arc::new(HttpRemote::new(&config.remote)?);
    let mut monitor = ConnectivityMonitor::new(remote.clone(), config.monitor.clone());
    let connectivity = monitor.handle();
    monitor.start();

    let batcher = Arc::new(ReadingBatcher::new(db.clone(), config.batcher.clone()));
    let sink = Arc::new(RemoteSink::new(remote.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        db.clone(),
        remote,
        batcher.clone(),
        sink.clone(),
    ));
    let manager = SyncManager::new(connectivity.clone(), orchestrator.clone());
    manager.start().await;

    // Cycles.
    let scheduler = Arc::new(SyncScheduler::new());
    let ctx = Arc::new(CycleContext {
        db: db.clone(),
        source: Arc::new(SimulatedSource::new(db.clone())),
        batcher,
        sink,
        orchestrator,
        manager: manager.clone(),
        connectivity: connectivity.clone(),
    });
    cycles::register_cycles(&scheduler, &config.cycles, ctx).await?;
    scheduler.start().await;

    // Status endpoint.
    let status_state = Arc::new(StatusState {
        db: db.clone(),
        connectivity,
        manager: manager.clone(),
        scheduler: scheduler.clone(),
        dead_letter_threshold: config.batcher.dead_letter_threshold,
    });
    let listener = tokio::net::TcpListener::bind(&args.status_addr).await?;
    info!(addr = %args.status_addr, "Status endpoint listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, status::router(status_state)).await {
            error!(error = %e, "Status server failed");
        }
    });

    shutdown_signal().await;

    info!("Shutting down");
    scheduler.stop().await;
    manager.shutdown().await;
    monitor.stop().await;
    server.abort();
    db.close().await;

    info!("Gateway stopped");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=joule_sync=trace` - Trace the sync engine only
/// - Default: INFO level, sync engine at DEBUG
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,joule_sync=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("Shutdown signal received");
}
