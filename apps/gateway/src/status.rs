//! Read-only status endpoint.
//!
//! Serves two routes:
//! - `GET /healthz` - liveness, backed by a store round-trip
//! - `GET /status`  - JSON snapshot of connectivity, sync state, the cycle
//!   schedule, and the reading backlog gauges

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

use joule_db::{Database, DbError};
use joule_sync::{
    ConnectivityHandle, ConnectivityStatus, CycleInfo, SyncManager, SyncScheduler, SyncStatus,
};

/// Shared state behind the status routes.
pub struct StatusState {
    pub db: Arc<Database>,
    pub connectivity: ConnectivityHandle,
    pub manager: SyncManager,
    pub scheduler: Arc<SyncScheduler>,
    pub dead_letter_threshold: i64,
}

/// Snapshot served on `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    /// Monitor view of the remote.
    pub connectivity: ConnectivityStatus,

    /// Manager view of the engine.
    pub sync: SyncStatus,

    /// Registered cycles and their cadences.
    pub schedule: Vec<CycleInfo>,

    /// Unsynchronized readings still eligible for delivery.
    pub pending_count: i64,

    /// Readings parked past the dead-letter threshold.
    pub dead_letter_count: i64,
}

pub fn router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
    }
}

async fn status(State(state): State<Arc<StatusState>>) -> Response {
    match build_snapshot(&state).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn build_snapshot(state: &StatusState) -> Result<StatusSnapshot, DbError> {
    let readings = state.db.readings();

    Ok(StatusSnapshot {
        connectivity: state.connectivity.status().await,
        sync: state.manager.status().await,
        schedule: state.scheduler.schedule_config().await,
        pending_count: readings.count_pending(state.dead_letter_threshold).await?,
        dead_letter_count: readings
            .count_dead_letters(state.dead_letter_threshold)
            .await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use joule_core::{Meter, Reading, DEFAULT_TENANT_ID};
    use joule_db::DbConfig;
    use joule_sync::remote::{
        RemoteApi, RemoteDeviceRegister, RemoteMeter, RemoteRegister, UploadAck, UploadReading,
    };
    use joule_sync::{
        BatcherSettings, Cadence, ConnectivityMonitor, CycleFuture, MonitorSettings,
        ReadingBatcher, RemoteSink, SyncError, SyncOrchestrator, SyncResult,
    };
    use uuid::Uuid;

    struct OfflineRemote;

    #[async_trait]
    impl RemoteApi for OfflineRemote {
        async fn probe(&self) -> SyncResult<()> {
            Err(SyncError::RemoteUnreachable("offline".into()))
        }

        async fn fetch_meters(&self) -> SyncResult<Vec<RemoteMeter>> {
            Err(SyncError::RemoteUnreachable("offline".into()))
        }

        async fn fetch_registers(&self) -> SyncResult<Vec<RemoteRegister>> {
            Err(SyncError::RemoteUnreachable("offline".into()))
        }

        async fn fetch_device_registers(&self) -> SyncResult<Vec<RemoteDeviceRegister>> {
            Err(SyncError::RemoteUnreachable("offline".into()))
        }

        async fn upload_readings(&self, _readings: &[UploadReading]) -> SyncResult<UploadAck> {
            Err(SyncError::RemoteUnreachable("offline".into()))
        }
    }

    async fn state_with_readings() -> Arc<StatusState> {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
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

        // Two pending readings, one past the dead-letter threshold.
        for retry_count in [0, 0, 5] {
            let reading = Reading {
                id: Uuid::new_v4().to_string(),
                meter_id: meter.id.clone(),
                data_point: "active_energy_import".to_string(),
                value: 1.0,
                unit: "kWh".to_string(),
                timestamp: now,
                synchronized: false,
                retry_count: 0,
                created_at: now,
            };
            db.readings().insert_collected(&[reading.clone()]).await.unwrap();
            for _ in 0..retry_count {
                db.readings()
                    .record_flush_failure(&[reading.id.clone()])
                    .await
                    .unwrap();
            }
        }

        let remote: Arc<dyn RemoteApi> = Arc::new(OfflineRemote);
        let monitor = ConnectivityMonitor::new(remote.clone(), MonitorSettings::default());
        let batcher = Arc::new(ReadingBatcher::new(db.clone(), BatcherSettings::default()));
        let sink = Arc::new(RemoteSink::new(remote.clone()));
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), remote, batcher, sink));
        let manager = SyncManager::new(monitor.handle(), orchestrator);

        let scheduler = Arc::new(SyncScheduler::new());
        scheduler
            .register(
                "reading-collection",
                Cadence::IntervalSecs(60),
                Arc::new(|| -> CycleFuture { Box::pin(async { Ok(()) }) }),
            )
            .await
            .unwrap();

        Arc::new(StatusState {
            db,
            connectivity: monitor.handle(),
            manager,
            scheduler,
            dead_letter_threshold: 5,
        })
    }

    #[tokio::test]
    async fn test_snapshot_reports_backlog_gauges_and_schedule() {
        let state = state_with_readings().await;

        let snapshot = build_snapshot(&state).await.unwrap();
        assert_eq!(snapshot.pending_count, 2);
        assert_eq!(snapshot.dead_letter_count, 1);
        assert!(!snapshot.connectivity.is_connected);
        assert_eq!(snapshot.schedule.len(), 1);
        assert_eq!(snapshot.schedule[0].name, "reading-collection");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sync"]["state"], "deferred");
        assert_eq!(json["pending_count"], 2);
    }

    #[tokio::test]
    async fn test_healthz_reports_store_health() {
        let state = state_with_readings().await;

        let response = healthz(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        state.db.close().await;
        let response = healthz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
