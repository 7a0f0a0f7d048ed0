//! Cycle bodies wired into the scheduler.
//!
//! ## The Four Cycles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reading-collection (interval)                                          │
//! │    DeviceSource::collect → validate → map through device registers     │
//! │    → persist unsynchronized → stage with the batcher                    │
//! │                                                                         │
//! │  reading-upload (cron)                                                  │
//! │    skip while disconnected, otherwise flush staged + backlog            │
//! │                                                                         │
//! │  config-sync (cron)                                                     │
//! │    skip while disconnected, otherwise meters → registers → mappings     │
//! │                                                                         │
//! │  sync-tick (interval)                                                   │
//! │    SyncManager::perform_sync (full pass, defers itself when offline)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use joule_core::validation::validate_raw_reading;
use joule_core::{CoreError, Reading};
use joule_db::Database;
use joule_sync::{
    ConnectivityHandle, CycleFn, CycleFuture, CycleSettings, DeviceSource, ReadingBatcher,
    ReadingSink, SyncManager, SyncOrchestrator, SyncResult, SyncScheduler,
};

/// Everything the cycle bodies share.
pub struct CycleContext {
    pub db: Arc<Database>,
    pub source: Arc<dyn DeviceSource>,
    pub batcher: Arc<ReadingBatcher>,
    pub sink: Arc<dyn ReadingSink>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub manager: SyncManager,
    pub connectivity: ConnectivityHandle,
}

/// Registers the four gateway cycles with their configured cadences.
pub async fn register_cycles(
    scheduler: &SyncScheduler,
    settings: &CycleSettings,
    ctx: Arc<CycleContext>,
) -> SyncResult<()> {
    let collection = {
        let ctx = ctx.clone();
        Arc::new(move || -> CycleFuture {
            let ctx = ctx.clone();
            Box::pin(async move { run_collection(&ctx).await })
        }) as CycleFn
    };
    scheduler
        .register("reading-collection", settings.collection.clone(), collection)
        .await?;

    let upload = {
        let ctx = ctx.clone();
        Arc::new(move || -> CycleFuture {
            let ctx = ctx.clone();
            Box::pin(async move { run_upload(&ctx).await })
        }) as CycleFn
    };
    scheduler
        .register("reading-upload", settings.upload.clone(), upload)
        .await?;

    let config_sync = {
        let ctx = ctx.clone();
        Arc::new(move || -> CycleFuture {
            let ctx = ctx.clone();
            Box::pin(async move { run_config_sync(&ctx).await })
        }) as CycleFn
    };
    scheduler
        .register("config-sync", settings.config_sync.clone(), config_sync)
        .await?;

    let sync_tick = Arc::new(move || -> CycleFuture {
        let ctx = ctx.clone();
        Box::pin(async move { ctx.manager.perform_sync().await })
    }) as CycleFn;
    scheduler
        .register("sync-tick", settings.sync_tick.clone(), sync_tick)
        .await?;

    Ok(())
}

/// One collection pass: read the source, validate each tuple, resolve it
/// against the device register configuration, persist, stage for upload.
///
/// Tuples that fail validation, name an unknown meter, or hit a data point
/// the meter has no mapping for are dropped with a warning; they never
/// poison the rest of the pass.
async fn run_collection(ctx: &CycleContext) -> SyncResult<()> {
    let raw = ctx.source.collect().await?;
    if raw.is_empty() {
        debug!("Source produced no readings");
        return Ok(());
    }

    let now = Utc::now();
    let mut readings = Vec::new();
    let mut dropped = 0usize;

    for tuple in raw {
        if let Err(e) = validate_raw_reading(&tuple, now) {
            warn!(meter = %tuple.meter_number, error = %e, "Dropping invalid reading");
            dropped += 1;
            continue;
        }

        let meter = match ctx.db.meters().get_by_number(&tuple.meter_number).await? {
            Some(meter) => meter,
            None => {
                let e = CoreError::UnknownMeter(tuple.meter_number.clone());
                warn!(error = %e, "Dropping reading");
                dropped += 1;
                continue;
            }
        };

        let points = ctx
            .db
            .device_registers()
            .data_points_for_meter(&meter.id)
            .await?;
        let mapping = match points.iter().find(|p| p.data_point == tuple.data_point) {
            Some(mapping) => mapping,
            None => {
                let e = CoreError::UnknownDataPoint {
                    meter_number: tuple.meter_number.clone(),
                    data_point: tuple.data_point.clone(),
                };
                warn!(error = %e, "Dropping reading");
                dropped += 1;
                continue;
            }
        };

        if mapping.unit != tuple.unit {
            warn!(
                meter = %tuple.meter_number,
                data_point = %tuple.data_point,
                source_unit = %tuple.unit,
                register_unit = %mapping.unit,
                "Source unit differs from register, keeping the register unit"
            );
        }

        readings.push(Reading {
            id: Uuid::new_v4().to_string(),
            meter_id: meter.id,
            data_point: tuple.data_point,
            value: tuple.value * mapping.scale_factor,
            unit: mapping.unit.clone(),
            timestamp: tuple.timestamp,
            synchronized: false,
            retry_count: 0,
            created_at: now,
        });
    }

    if readings.is_empty() {
        debug!(dropped, "Collection pass produced nothing persistable");
        return Ok(());
    }

    let collected = readings.len();
    let inserted = ctx.db.readings().insert_collected(&readings).await?;
    info!(collected, inserted, dropped, "Collection pass complete");

    ctx.batcher.add(readings).await;
    Ok(())
}

/// One upload pass. Skips with a log line while disconnected; the backlog
/// keeps accumulating in the store until the remote comes back.
async fn run_upload(ctx: &CycleContext) -> SyncResult<()> {
    if !ctx.connectivity.is_connected().await {
        info!("Remote unreachable, skipping upload cycle");
        return Ok(());
    }

    let report = ctx.batcher.flush_pending(ctx.sink.as_ref()).await?;
    if report.batches_failed > 0 {
        warn!(
            flushed = report.batches_flushed,
            failed = report.batches_failed,
            "Upload cycle finished with failed batches"
        );
    }
    Ok(())
}

/// One configuration pass: meters, registers, device-register mappings.
async fn run_config_sync(ctx: &CycleContext) -> SyncResult<()> {
    if !ctx.connectivity.is_connected().await {
        info!("Remote unreachable, skipping config sync cycle");
        return Ok(());
    }

    let report = ctx.orchestrator.run_config_pass().await?;
    if let Some(summary) = report.failure_summary() {
        warn!(%summary, "Config sync finished with failures");
    }
    Ok(())
}
