//! # Connectivity Monitor
//!
//! Periodic reachability probing of the remote system of record.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ConnectivityMonitor                                │
//! │                                                                         │
//! │   every probe_interval:                                                 │
//! │   ┌──────────────┐  GET api/health   ┌──────────────────┐              │
//! │   │  probe loop  │ ────────────────► │  remote          │              │
//! │   │  (spawned)   │ ◄──────────────── │  (probe_timeout) │              │
//! │   └──────┬───────┘   ok / error      └──────────────────┘              │
//! │          │                                                              │
//! │          ▼ on verdict change only                                       │
//! │   ┌──────────────────┐    broadcast     ┌──────────────────────┐       │
//! │   │ cached status    │ ───────────────► │ subscribers          │       │
//! │   │ (RwLock)         │ Connected /      │ (sync manager, ...)  │       │
//! │   └──────────────────┘ Disconnected     └──────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consumers read the cached verdict through a [`ConnectivityHandle`]; they
//! never probe on their own. A probe that errors or exceeds `probe_timeout`
//! counts as unreachable. The monitor starts disconnected and reports the
//! first verdict after its initial probe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::MonitorSettings;
use crate::remote::RemoteApi;

/// Broadcast capacity for connectivity events. Transitions are rare, so a
/// small buffer is plenty; laggards fall back to the cached status.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Events and Status
// =============================================================================

/// Emitted on every connectivity transition, never on repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The remote became reachable.
    Connected,

    /// The remote became unreachable.
    Disconnected,
}

/// Snapshot of the monitor's view of the remote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectivityStatus {
    /// Verdict of the most recent probe.
    pub is_connected: bool,

    /// When the most recent probe completed.
    pub last_checked_at: Option<DateTime<Utc>>,

    /// When the verdict last flipped.
    pub last_transition_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Handle
// =============================================================================

/// Cheap clonable view of the monitor for other components.
#[derive(Clone)]
pub struct ConnectivityHandle {
    status: Arc<RwLock<ConnectivityStatus>>,
    events_tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityHandle {
    /// Cached verdict of the most recent probe.
    pub async fn is_connected(&self) -> bool {
        self.status.read().await.is_connected
    }

    /// Full status snapshot.
    pub async fn status(&self) -> ConnectivityStatus {
        self.status.read().await.clone()
    }

    /// Subscribes to connectivity transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events_tx.subscribe()
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Owns the probe loop and the cached connectivity verdict.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,

    /// Shutdown sender (set after start).
    shutdown_tx: Option<mpsc::Sender<()>>,
}

struct MonitorInner {
    remote: Arc<dyn RemoteApi>,
    settings: MonitorSettings,
    status: Arc<RwLock<ConnectivityStatus>>,
    events_tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Creates a monitor. The initial verdict is disconnected until the
    /// first probe says otherwise.
    pub fn new(remote: Arc<dyn RemoteApi>, settings: MonitorSettings) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        ConnectivityMonitor {
            inner: Arc::new(MonitorInner {
                remote,
                settings,
                status: Arc::new(RwLock::new(ConnectivityStatus::default())),
                events_tx,
            }),
            shutdown_tx: None,
        }
    }

    /// Returns a handle for consumers.
    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            status: self.inner.status.clone(),
            events_tx: self.inner.events_tx.clone(),
        }
    }

    /// Runs one probe immediately and returns its verdict.
    pub async fn probe(&self) -> bool {
        self.inner.probe().await
    }

    /// Starts the periodic probe loop. The first probe fires right away.
    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let inner = self.inner.clone();
        let probe_interval = inner.settings.probe_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(probe_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        inner.probe().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Connectivity monitor stopped");
                        break;
                    }
                }
            }
        });

        info!(
            interval_secs = self.inner.settings.probe_interval_secs,
            "Connectivity monitor started"
        );
    }

    /// Stops the probe loop.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

impl MonitorInner {
    /// Probes the remote once and records the verdict. Emits a broadcast
    /// event only when the verdict changed.
    async fn probe(&self) -> bool {
        let reachable = matches!(
            tokio::time::timeout(self.settings.probe_timeout(), self.remote.probe()).await,
            Ok(Ok(()))
        );

        // Record under the lock, emit after releasing it.
        let transitioned = {
            let mut status = self.status.write().await;
            let now = Utc::now();
            status.last_checked_at = Some(now);

            if status.is_connected != reachable {
                status.is_connected = reachable;
                status.last_transition_at = Some(now);
                true
            } else {
                false
            }
        };

        if transitioned {
            let event = if reachable {
                ConnectivityEvent::Connected
            } else {
                ConnectivityEvent::Disconnected
            };
            info!(reachable, "Remote connectivity changed");

            // No subscribers is fine.
            let _ = self.events_tx.send(event);
        } else {
            debug!(reachable, "Remote connectivity unchanged");
        }

        reachable
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use crate::remote::{RemoteDeviceRegister, RemoteMeter, RemoteRegister, UploadAck, UploadReading};
    use crate::testing::MockRemote;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Remote whose probe never completes. Everything else is unreachable.
    struct HangingRemote;

    #[async_trait]
    impl crate::remote::RemoteApi for HangingRemote {
        async fn probe(&self) -> SyncResult<()> {
            std::future::pending().await
        }

        async fn fetch_meters(&self) -> SyncResult<Vec<RemoteMeter>> {
            std::future::pending().await
        }

        async fn fetch_registers(&self) -> SyncResult<Vec<RemoteRegister>> {
            std::future::pending().await
        }

        async fn fetch_device_registers(&self) -> SyncResult<Vec<RemoteDeviceRegister>> {
            std::future::pending().await
        }

        async fn upload_readings(&self, _readings: &[UploadReading]) -> SyncResult<UploadAck> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_offline_probes_then_recovery_emits_single_event() {
        let remote = Arc::new(MockRemote::new());
        remote.script_probes(&[false, false, true]);

        let monitor = ConnectivityMonitor::new(remote, MonitorSettings::default());
        let handle = monitor.handle();
        let mut events = handle.subscribe();

        assert!(!handle.is_connected().await);

        assert!(!monitor.probe().await);
        assert!(!monitor.probe().await);
        assert!(monitor.probe().await);

        assert!(handle.is_connected().await);
        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::Connected);
        // Exactly one event for the single transition.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeated_verdict_does_not_emit() {
        let remote = Arc::new(MockRemote::new());
        remote.set_reachable(true);

        let monitor = ConnectivityMonitor::new(remote, MonitorSettings::default());
        let mut events = monitor.handle().subscribe();

        assert!(monitor.probe().await);
        assert!(monitor.probe().await);
        assert!(monitor.probe().await);

        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::Connected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_transition() {
        let remote = Arc::new(MockRemote::new());
        remote.script_probes(&[true, false]);

        let monitor = ConnectivityMonitor::new(remote, MonitorSettings::default());
        let mut events = monitor.handle().subscribe();

        monitor.probe().await;
        monitor.probe().await;

        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::Connected);
        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::Disconnected);

        let status = monitor.handle().status().await;
        assert!(!status.is_connected);
        assert!(status.last_transition_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_unreachable() {
        let settings = MonitorSettings {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
        };
        let monitor = ConnectivityMonitor::new(Arc::new(HangingRemote), settings);

        assert!(!monitor.probe().await);

        let status = monitor.handle().status().await;
        assert!(!status.is_connected);
        assert!(status.last_checked_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_loop_runs_on_interval_until_stopped() {
        let remote = Arc::new(MockRemote::new());
        remote.set_reachable(true);

        let settings = MonitorSettings {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
        };
        let mut monitor = ConnectivityMonitor::new(remote.clone(), settings);
        let handle = monitor.handle();

        monitor.start();

        // First tick fires immediately.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_connected().await);
        assert_eq!(remote.probe_count(), 1);

        // Two more ticks at t=30 and t=60.
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(remote.probe_count(), 3);

        monitor.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(remote.probe_count(), 3);
    }
}
