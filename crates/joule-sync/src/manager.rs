//! # Sync Manager
//!
//! Decides when a reconciliation pass may run and tracks its outcome.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        perform_sync()                                   │
//! │                                                                         │
//! │   remote unreachable? ──yes──► defer (Ok, nothing ran)                  │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │   pass already running? ──yes──► skip (Ok, nothing ran)                 │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │   run full pass ──► all steps ok:   last_sync_at = now, clear error    │
//! │                 ──► some step down: keep last_sync_at, record error    │
//! │                 ──► wiring broken:  record error, propagate Err        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manager also subscribes to connectivity transitions: the moment the
//! remote becomes reachable again it schedules a catch-up pass, so backlog
//! built up while offline drains without waiting for the next cycle tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::connectivity::{ConnectivityEvent, ConnectivityHandle};
use crate::error::SyncResult;
use crate::orchestrator::SyncOrchestrator;

// =============================================================================
// Sync State
// =============================================================================

/// Where the engine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Connected, no pass running.
    Idle,

    /// A pass is running right now.
    Syncing,

    /// Remote unreachable, passes are deferred.
    Deferred,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Deferred => write!(f, "deferred"),
        }
    }
}

/// Snapshot of the manager for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Derived engine state.
    pub state: SyncState,

    /// Cached connectivity verdict the manager last saw.
    pub is_client_connected: bool,

    /// When the last fully successful pass finished.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Failure summary of the most recent pass, if it had one.
    pub last_error: Option<String>,
}

// =============================================================================
// Syncing Guard
// =============================================================================

/// Holds the "a pass is running" flag; releases it on drop, also when the
/// pass exits through an error path.
struct SyncingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncingGuard<'a> {
    /// Claims the flag, or returns None if a pass already holds it.
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncingGuard { flag })
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Sync Manager
// =============================================================================

#[derive(Default)]
struct StatusInner {
    is_client_connected: bool,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct ManagerState {
    /// True while a pass runs. Guards against overlapping passes from the
    /// cycle tick and the reconnect catch-up.
    syncing: AtomicBool,

    inner: RwLock<StatusInner>,
}

/// Coordinates reconciliation passes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncManager {
    /// View of the connectivity monitor.
    connectivity: ConnectivityHandle,

    /// Runs the actual passes.
    orchestrator: Arc<SyncOrchestrator>,

    /// Shared status and the in-flight flag.
    state: Arc<ManagerState>,

    /// Shutdown sender for the event loop (set after start).
    shutdown_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl SyncManager {
    /// Creates a new manager.
    pub fn new(connectivity: ConnectivityHandle, orchestrator: Arc<SyncOrchestrator>) -> Self {
        SyncManager {
            connectivity,
            orchestrator,
            state: Arc::new(ManagerState {
                syncing: AtomicBool::new(false),
                inner: RwLock::new(StatusInner::default()),
            }),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Refreshes the cached connectivity verdict from the monitor and
    /// returns it. Never probes on its own.
    pub async fn check_client_connectivity(&self) -> bool {
        let connected = self.connectivity.is_connected().await;
        self.state.inner.write().await.is_client_connected = connected;
        connected
    }

    /// Current status snapshot.
    pub async fn status(&self) -> SyncStatus {
        let inner = self.state.inner.read().await;

        let state = if self.state.syncing.load(Ordering::SeqCst) {
            SyncState::Syncing
        } else if !inner.is_client_connected {
            SyncState::Deferred
        } else {
            SyncState::Idle
        };

        SyncStatus {
            state,
            is_client_connected: inner.is_client_connected,
            last_sync_at: inner.last_sync_at,
            last_error: inner.last_error.clone(),
        }
    }

    /// Runs one full reconciliation pass, unless the remote is unreachable
    /// or a pass is already in flight. Both of those are quiet no-ops.
    ///
    /// Returns an error only for configuration and wiring problems; a pass
    /// with failed steps records its summary and resolves Ok.
    pub async fn perform_sync(&self) -> SyncResult<()> {
        if !self.check_client_connectivity().await {
            debug!("Remote unreachable, sync deferred");
            return Ok(());
        }

        let _guard = match SyncingGuard::try_acquire(&self.state.syncing) {
            Some(guard) => guard,
            None => {
                debug!("Sync already in progress, skipping");
                return Ok(());
            }
        };

        match self.orchestrator.run_full_pass().await {
            Ok(report) => {
                let mut inner = self.state.inner.write().await;
                if report.all_succeeded() {
                    inner.last_sync_at = Some(Utc::now());
                    inner.last_error = None;
                } else {
                    inner.last_error = report.failure_summary();
                }
                Ok(())
            }
            Err(e) => {
                self.state.inner.write().await.last_error = Some(e.to_string());
                if e.is_config_error() {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Starts the connectivity event loop. On every reconnect it schedules
    /// a catch-up pass.
    pub async fn start(&self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        // Seed the cached verdict so status is right before the first event.
        let connected = self.connectivity.is_connected().await;
        self.state.inner.write().await.is_client_connected = connected;

        let manager = self.clone();
        let mut events = self.connectivity.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(ConnectivityEvent::Connected) => {
                            info!("Remote reachable again, scheduling catch-up sync");
                            manager.state.inner.write().await.is_client_connected = true;

                            // Off the event loop so a slow pass cannot stall
                            // later transitions. The in-flight flag absorbs
                            // overlap with a cycle-driven pass.
                            let catch_up = manager.clone();
                            tokio::spawn(async move {
                                if let Err(e) = catch_up.perform_sync().await {
                                    error!(error = %e, "Catch-up sync failed");
                                }
                            });
                        }
                        Ok(ConnectivityEvent::Disconnected) => {
                            info!("Remote unreachable, deferring sync");
                            manager.state.inner.write().await.is_client_connected = false;
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Connectivity events lagged, refreshing from cache");
                            let connected = manager.connectivity.is_connected().await;
                            manager.state.inner.write().await.is_client_connected = connected;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Sync manager stopped");
                        break;
                    }
                }
            }
        });

        info!("Sync manager started");
    }

    /// Stops the event loop.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
