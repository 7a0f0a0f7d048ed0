//! Scripted doubles and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

use joule_core::{Batch, Meter, Reading, DEFAULT_TENANT_ID};
use joule_db::{Database, DbConfig};

use crate::error::{SyncError, SyncResult};
use crate::remote::{
    RemoteApi, RemoteDeviceRegister, RemoteMeter, RemoteRegister, UploadAck, UploadReading,
};
use crate::sink::{ReadingSink, SinkError};

// =============================================================================
// Database Fixtures
// =============================================================================

/// Fresh in-memory database with migrations applied.
pub async fn test_db() -> Arc<Database> {
    Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
}

/// In-memory database pre-seeded with one meter; returns its id.
pub async fn test_db_with_meter() -> (Arc<Database>, String) {
    let db = test_db().await;
    let now = Utc::now();

    let meter = Meter {
        id: Uuid::new_v4().to_string(),
        tenant_id: DEFAULT_TENANT_ID.to_string(),
        meter_number: "ELS-1021".to_string(),
        name: "Main incomer".to_string(),
        location: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.meters().upsert(&meter).await.unwrap();

    (db, meter.id)
}

/// Unsynchronized reading with a creation time that preserves `seq` order.
pub fn sample_reading(meter_id: &str, seq: i64) -> Reading {
    let base = Utc::now() - chrono::Duration::minutes(60);

    Reading {
        id: Uuid::new_v4().to_string(),
        meter_id: meter_id.to_string(),
        data_point: "active_energy_import".to_string(),
        value: seq as f64,
        unit: "kWh".to_string(),
        timestamp: base + chrono::Duration::seconds(seq),
        synchronized: false,
        retry_count: 0,
        created_at: base + chrono::Duration::seconds(seq),
    }
}

// =============================================================================
// Remote Payload Builders
// =============================================================================

pub fn remote_meter(meter_number: &str) -> RemoteMeter {
    RemoteMeter {
        meter_number: meter_number.to_string(),
        name: format!("Meter {meter_number}"),
        location: Some("Basement".to_string()),
        is_active: true,
    }
}

pub fn remote_register(register_code: &str) -> RemoteRegister {
    RemoteRegister {
        register_code: register_code.to_string(),
        name: "Active energy import".to_string(),
        data_point: "active_energy_import".to_string(),
        unit: "kWh".to_string(),
        is_active: true,
    }
}

pub fn remote_link(meter_number: &str, register_code: &str) -> RemoteDeviceRegister {
    RemoteDeviceRegister {
        meter_number: meter_number.to_string(),
        register_code: register_code.to_string(),
        scale_factor: 1.0,
        is_active: true,
    }
}

// =============================================================================
// Mock Remote
// =============================================================================

/// Scripted [`RemoteApi`]. Reachable with empty catalogs by default.
pub struct MockRemote {
    probe_script: Mutex<VecDeque<bool>>,
    reachable: AtomicBool,
    probe_calls: AtomicUsize,
    meters: Mutex<Vec<RemoteMeter>>,
    registers: Mutex<Vec<RemoteRegister>>,
    device_registers: Mutex<Vec<RemoteDeviceRegister>>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<&'static str>>,
    uploads: Mutex<Vec<Vec<UploadReading>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote {
            probe_script: Mutex::new(VecDeque::new()),
            reachable: AtomicBool::new(true),
            probe_calls: AtomicUsize::new(0),
            meters: Mutex::new(Vec::new()),
            registers: Mutex::new(Vec::new()),
            device_registers: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the next probe verdicts; once exhausted, probes fall back to
    /// the `set_reachable` default.
    pub fn script_probes(&self, verdicts: &[bool]) {
        self.probe_script.lock().unwrap().extend(verdicts);
    }

    /// Sets the unscripted verdict for probes and all endpoints.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn set_meters(&self, meters: Vec<RemoteMeter>) {
        *self.meters.lock().unwrap() = meters;
    }

    pub fn set_registers(&self, registers: Vec<RemoteRegister>) {
        *self.registers.lock().unwrap() = registers;
    }

    pub fn set_device_registers(&self, links: Vec<RemoteDeviceRegister>) {
        *self.device_registers.lock().unwrap() = links;
    }

    /// Makes one endpoint ("meters", "registers", "device-registers",
    /// "readings") fail while the rest keep working.
    pub fn fail_endpoint(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    /// Endpoint names in call order, probes included.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded upload payloads.
    pub fn uploads(&self) -> Vec<Vec<UploadReading>> {
        self.uploads.lock().unwrap().clone()
    }

    fn endpoint_call(&self, name: &'static str) -> SyncResult<()> {
        self.calls.lock().unwrap().push(name);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteUnreachable(format!(
                "{name}: scripted unreachable"
            )));
        }
        if self.failing.lock().unwrap().contains(name) {
            return Err(SyncError::RemoteUnreachable(format!(
                "{name}: scripted failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn probe(&self) -> SyncResult<()> {
        self.calls.lock().unwrap().push("probe");
        self.probe_calls.fetch_add(1, Ordering::SeqCst);

        let verdict = self
            .probe_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.reachable.load(Ordering::SeqCst));

        if verdict {
            Ok(())
        } else {
            Err(SyncError::RemoteUnreachable("probe: scripted unreachable".into()))
        }
    }

    async fn fetch_meters(&self) -> SyncResult<Vec<RemoteMeter>> {
        self.endpoint_call("meters")?;
        Ok(self.meters.lock().unwrap().clone())
    }

    async fn fetch_registers(&self) -> SyncResult<Vec<RemoteRegister>> {
        self.endpoint_call("registers")?;
        Ok(self.registers.lock().unwrap().clone())
    }

    async fn fetch_device_registers(&self) -> SyncResult<Vec<RemoteDeviceRegister>> {
        self.endpoint_call("device-registers")?;
        Ok(self.device_registers.lock().unwrap().clone())
    }

    async fn upload_readings(&self, readings: &[UploadReading]) -> SyncResult<UploadAck> {
        self.endpoint_call("readings")?;
        self.uploads.lock().unwrap().push(readings.to_vec());
        Ok(UploadAck {
            accepted: readings.len(),
        })
    }
}

// =============================================================================
// Scripted Sinks
// =============================================================================

/// [`ReadingSink`] with scripted outcomes; succeeds once the script runs dry.
pub struct ScriptedSink {
    script: Mutex<VecDeque<Result<(), SinkError>>>,
    inserted: Mutex<Vec<Vec<String>>>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        ScriptedSink {
            script: Mutex::new(VecDeque::new()),
            inserted: Mutex::new(Vec::new()),
        }
    }

    /// Appends outcomes for the next insert calls.
    pub fn script(&self, outcomes: Vec<Result<(), SinkError>>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Number of insert calls seen.
    pub fn calls(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }

    /// Reading id lists, one per insert call.
    pub fn inserted(&self) -> Vec<Vec<String>> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingSink for ScriptedSink {
    async fn insert(&self, batch: &Batch) -> Result<(), SinkError> {
        self.inserted.lock().unwrap().push(batch.reading_ids());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Sink whose insert never completes. For attempt-timeout tests.
pub struct NeverSink;

#[async_trait]
impl ReadingSink for NeverSink {
    async fn insert(&self, _batch: &Batch) -> Result<(), SinkError> {
        std::future::pending().await
    }
}
