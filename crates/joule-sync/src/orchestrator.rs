//! # Sync Orchestrator
//!
//! Runs the ordered sub-syncs that make up a reconciliation pass.
//!
//! ## Pass Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Full Pass                                       │
//! │                                                                         │
//! │   1. meters            remote catalog ──► local upsert by number       │
//! │   2. registers         remote catalog ──► local upsert by code         │
//! │   3. device-registers  remote mappings ─► resolve natural keys,        │
//! │                                           upsert by (meter, register)  │
//! │   4. readings-upload   local backlog ───► batcher ──► sink             │
//! │                                                                         │
//! │   Config pass = steps 1-3 (the config-sync cycle)                      │
//! │   Full pass   = steps 1-4 (the sync-tick cycle)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sub-syncs are best-effort: a failing one is recorded in the pass report
//! and the rest still run. Only configuration or wiring errors abort the
//! pass, since every later step would fail the same way.
//!
//! Reconciliation is remote-wins for remote-owned fields. Local UUIDs and
//! creation times survive updates; entity identity is the natural key.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use joule_core::{DeviceRegister, Meter, Register, DEFAULT_TENANT_ID};
use joule_db::Database;

use crate::batcher::ReadingBatcher;
use crate::error::SyncResult;
use crate::remote::RemoteApi;
use crate::sink::ReadingSink;

// =============================================================================
// Sub-Sync Reporting
// =============================================================================

/// The individually reported reconciliation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubSyncKind {
    Meters,
    Registers,
    DeviceRegisters,
    ReadingsUpload,
}

impl std::fmt::Display for SubSyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubSyncKind::Meters => write!(f, "meters"),
            SubSyncKind::Registers => write!(f, "registers"),
            SubSyncKind::DeviceRegisters => write!(f, "device-registers"),
            SubSyncKind::ReadingsUpload => write!(f, "readings-upload"),
        }
    }
}

/// Outcome of one sub-sync.
#[derive(Debug, Clone)]
pub struct SubSyncOutcome {
    /// Which step this is.
    pub kind: SubSyncKind,

    /// Entities changed locally (or readings synchronized, for upload).
    pub applied: usize,

    /// Entities already up to date.
    pub unchanged: usize,

    /// Entities skipped (unresolvable keys, failed readings).
    pub skipped: usize,

    /// Failure message, if the step did not complete.
    pub error: Option<String>,
}

impl SubSyncOutcome {
    fn new(kind: SubSyncKind) -> Self {
        SubSyncOutcome {
            kind,
            applied: 0,
            unchanged: 0,
            skipped: 0,
            error: None,
        }
    }

    /// True if the step completed without error.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Per-step outcomes, in execution order.
    pub outcomes: Vec<SubSyncOutcome>,
}

impl PassReport {
    /// True if every step completed.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded())
    }

    /// One-line summary of the failed steps, if any.
    pub fn failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.kind, e)))
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Config pass steps, in dependency order. Mappings resolve against meters
/// and registers, so those reconcile first.
const CONFIG_PASS: [SubSyncKind; 3] = [
    SubSyncKind::Meters,
    SubSyncKind::Registers,
    SubSyncKind::DeviceRegisters,
];

/// Full pass steps.
const FULL_PASS: [SubSyncKind; 4] = [
    SubSyncKind::Meters,
    SubSyncKind::Registers,
    SubSyncKind::DeviceRegisters,
    SubSyncKind::ReadingsUpload,
];

/// Runs reconciliation passes against the remote system of record.
pub struct SyncOrchestrator {
    /// Database connection.
    db: Arc<Database>,

    /// Remote system of record.
    remote: Arc<dyn RemoteApi>,

    /// Delivery pipeline for the upload step.
    batcher: Arc<ReadingBatcher>,

    /// Destination for reading batches.
    sink: Arc<dyn ReadingSink>,
}

impl SyncOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(
        db: Arc<Database>,
        remote: Arc<dyn RemoteApi>,
        batcher: Arc<ReadingBatcher>,
        sink: Arc<dyn ReadingSink>,
    ) -> Self {
        SyncOrchestrator {
            db,
            remote,
            batcher,
            sink,
        }
    }

    /// Runs the configuration-only pass (meters, registers, mappings).
    pub async fn run_config_pass(&self) -> SyncResult<PassReport> {
        self.run(&CONFIG_PASS).await
    }

    /// Runs the full pass: configuration reconciliation plus reading upload.
    pub async fn run_full_pass(&self) -> SyncResult<PassReport> {
        self.run(&FULL_PASS).await
    }

    async fn run(&self, steps: &[SubSyncKind]) -> SyncResult<PassReport> {
        let mut report = PassReport::default();

        for kind in steps {
            let outcome = match self.run_sub_sync(*kind).await {
                Ok(outcome) => outcome,
                // Wiring problems fail every later step the same way.
                Err(e) if e.is_config_error() => return Err(e),
                Err(e) => {
                    warn!(sub_sync = %kind, error = %e, "Sub-sync failed");
                    let mut outcome = SubSyncOutcome::new(*kind);
                    outcome.error = Some(e.to_string());
                    outcome
                }
            };
            report.outcomes.push(outcome);
        }

        let applied: usize = report.outcomes.iter().map(|o| o.applied).sum();
        info!(
            steps = report.outcomes.len(),
            applied,
            succeeded = report.all_succeeded(),
            "Reconciliation pass complete"
        );

        Ok(report)
    }

    async fn run_sub_sync(&self, kind: SubSyncKind) -> SyncResult<SubSyncOutcome> {
        match kind {
            SubSyncKind::Meters => self.sync_meters().await,
            SubSyncKind::Registers => self.sync_registers().await,
            SubSyncKind::DeviceRegisters => self.sync_device_registers().await,
            SubSyncKind::ReadingsUpload => self.upload_readings().await,
        }
    }

    // =========================================================================
    // Sub-Syncs
    // =========================================================================

    async fn sync_meters(&self) -> SyncResult<SubSyncOutcome> {
        let remote_meters = self.remote.fetch_meters().await?;
        let repo = self.db.meters();
        let mut outcome = SubSyncOutcome::new(SubSyncKind::Meters);

        for rm in remote_meters {
            let now = Utc::now();
            let meter = match repo.get_by_number(&rm.meter_number).await? {
                // Known meter: remote owns the descriptive fields, local
                // identity and tenant assignment survive.
                Some(existing) => Meter {
                    name: rm.name,
                    location: rm.location,
                    is_active: rm.is_active,
                    updated_at: now,
                    ..existing
                },
                None => Meter {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: DEFAULT_TENANT_ID.to_string(),
                    meter_number: rm.meter_number,
                    name: rm.name,
                    location: rm.location,
                    is_active: rm.is_active,
                    created_at: now,
                    updated_at: now,
                },
            };

            if repo.upsert(&meter).await? {
                outcome.applied += 1;
            } else {
                outcome.unchanged += 1;
            }
        }

        Ok(outcome)
    }

    async fn sync_registers(&self) -> SyncResult<SubSyncOutcome> {
        let remote_registers = self.remote.fetch_registers().await?;
        let repo = self.db.registers();
        let mut outcome = SubSyncOutcome::new(SubSyncKind::Registers);

        for rr in remote_registers {
            let now = Utc::now();
            let register = match repo.get_by_code(&rr.register_code).await? {
                Some(existing) => Register {
                    name: rr.name,
                    data_point: rr.data_point,
                    unit: rr.unit,
                    is_active: rr.is_active,
                    updated_at: now,
                    ..existing
                },
                None => Register {
                    id: Uuid::new_v4().to_string(),
                    register_code: rr.register_code,
                    name: rr.name,
                    data_point: rr.data_point,
                    unit: rr.unit,
                    is_active: rr.is_active,
                    created_at: now,
                    updated_at: now,
                },
            };

            if repo.upsert(&register).await? {
                outcome.applied += 1;
            } else {
                outcome.unchanged += 1;
            }
        }

        Ok(outcome)
    }

    async fn sync_device_registers(&self) -> SyncResult<SubSyncOutcome> {
        let remote_links = self.remote.fetch_device_registers().await?;
        let meters = self.db.meters();
        let registers = self.db.registers();
        let repo = self.db.device_registers();
        let mut outcome = SubSyncOutcome::new(SubSyncKind::DeviceRegisters);

        for link in remote_links {
            let meter = meters.get_by_number(&link.meter_number).await?;
            let register = registers.get_by_code(&link.register_code).await?;

            let (meter, register) = match (meter, register) {
                (Some(m), Some(r)) => (m, r),
                _ => {
                    warn!(
                        meter_number = %link.meter_number,
                        register_code = %link.register_code,
                        "Skipping mapping with unknown meter or register"
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };

            let now = Utc::now();
            // The upsert keys on (meter_id, register_id); an existing row
            // keeps its id and created_at.
            let device_register = DeviceRegister {
                id: Uuid::new_v4().to_string(),
                meter_id: meter.id,
                register_id: register.id,
                scale_factor: link.scale_factor,
                is_active: link.is_active,
                created_at: now,
                updated_at: now,
            };

            if repo.upsert(&device_register).await? {
                outcome.applied += 1;
            } else {
                outcome.unchanged += 1;
            }
        }

        Ok(outcome)
    }

    async fn upload_readings(&self) -> SyncResult<SubSyncOutcome> {
        let report = self.batcher.flush_pending(self.sink.as_ref()).await?;

        let mut outcome = SubSyncOutcome::new(SubSyncKind::ReadingsUpload);
        outcome.applied = report.readings_synchronized;
        outcome.skipped = report.readings_failed;

        if report.batches_failed > 0 {
            outcome.error = Some(format!(
                "{} of {} batches failed",
                report.batches_failed,
                report.batches_failed + report.batches_flushed
            ));
        }

        Ok(outcome)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
