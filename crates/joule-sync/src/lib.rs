//! # joule-sync: Sync Engine for the Joule Gateway
//!
//! This crate provides the synchronization layer for the Joule metering
//! gateway, enabling offline-first collection with background sync to the
//! remote system of record.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Engine Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncScheduler (cycle driver)                   │  │
//! │  │                                                                  │  │
//! │  │  One driver task per registered cycle                            │  │
//! │  │  Interval cadences tick in place, cron cadences fire wall-clock  │  │
//! │  │  A tick that lands while the previous run is active is skipped   │  │
//! │  └──────┬───────────────┬───────────────┬───────────────┬──────────┘  │
//! │         ▼               ▼               ▼               ▼              │
//! │   collection         upload        config-sync      sync-tick          │
//! │   DeviceSource →     backlog →     catalog pull     full catch-up      │
//! │   validate →         batches →     from remote      pass when due      │
//! │   persist → stage    ReadingSink                                       │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │  SyncManager   │  │   SyncOrchestrator     │    │
//! │  │ Monitor        │  │                │  │                        │    │
//! │  │                │  │ Reacts to      │  │ meters → registers →   │    │
//! │  │ Probes /health │  │ transitions    │  │ device-registers →     │    │
//! │  │ on an interval │  │ Catch-up sync  │  │ readings upload        │    │
//! │  │ Broadcasts     │  │ on reconnect   │  │                        │    │
//! │  │ transitions    │  │ Single-flight  │  │ Best-effort steps,     │    │
//! │  │                │  │ guard          │  │ config errors abort    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                        ReadingBatcher                           │   │
//! │  │                                                                 │   │
//! │  │ Merges staged readings with the persisted backlog (dedup by    │   │
//! │  │ id, oldest first), splits into bounded batches, flushes with   │   │
//! │  │ per-batch retries and exponential backoff                       │   │
//! │  │ Success and exhaustion are recorded per reading; readings that  │   │
//! │  │ keep failing park as dead letters outside the flush path        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`batcher`] - Batch building and retried flushing
//! - [`config`] - Engine configuration (remote endpoint, cadences, limits)
//! - [`connectivity`] - Background reachability monitor
//! - [`error`] - Sync error types
//! - [`manager`] - Connectivity-driven sync state and catch-up
//! - [`orchestrator`] - Ordered catalog and readings passes
//! - [`remote`] - HTTP client and wire payloads
//! - [`scheduler`] - Interval and cron cycle driver
//! - [`sink`] - Destination abstraction for flushed batches
//! - [`source`] - Device readout abstraction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use joule_sync::{ConnectivityMonitor, HttpRemote, SyncConfig, SyncManager};
//!
//! let config = SyncConfig::load_or_default(None);
//! let remote = Arc::new(HttpRemote::new(&config.remote)?);
//!
//! let mut monitor = ConnectivityMonitor::new(remote.clone(), config.monitor.clone());
//! monitor.start();
//!
//! let manager = SyncManager::new(monitor.handle(), orchestrator);
//! manager.start().await;
//!
//! // Query sync status
//! let status = manager.status().await;
//! println!("state: {}", status.state);
//! println!("connected: {}", status.is_client_connected);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batcher;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod remote;
pub mod scheduler;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use batcher::{FlushReport, ReadingBatcher};
pub use config::{
    BatcherSettings, Cadence, CycleSettings, MonitorSettings, RemoteSettings, SyncConfig,
};
pub use connectivity::{
    ConnectivityEvent, ConnectivityHandle, ConnectivityMonitor, ConnectivityStatus,
};
pub use error::{SyncError, SyncResult};
pub use manager::{SyncManager, SyncState, SyncStatus};
pub use orchestrator::{PassReport, SubSyncKind, SubSyncOutcome, SyncOrchestrator};
pub use remote::{HttpRemote, RemoteApi, UploadReading};
pub use scheduler::{CycleFn, CycleFuture, CycleInfo, SyncScheduler};
pub use sink::{ReadingSink, RemoteSink, SinkError};
pub use source::DeviceSource;
