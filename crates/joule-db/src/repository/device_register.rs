//! # Device Register Repository
//!
//! Links between a meter and the registers it exposes, with the per-link
//! scale factor applied at collection time. Reconciled by the composite
//! natural key `(meter_id, register_id)`.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use joule_core::DeviceRegister;

/// One data point a meter is known to expose, joined through the register
/// catalogue. This is what the collection path consults to decide whether
/// a raw tuple is expected and how to scale it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeterDataPoint {
    /// Register data point identifier (e.g. `active_energy_import`).
    pub data_point: String,
    /// Unit the register reports in.
    pub unit: String,
    /// Multiplier applied to raw values for this meter.
    pub scale_factor: f64,
}

/// Repository for meter/register link reconciliation.
#[derive(Debug, Clone)]
pub struct DeviceRegisterRepository {
    pool: SqlitePool,
}

impl DeviceRegisterRepository {
    /// Creates a new DeviceRegisterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRegisterRepository { pool }
    }

    /// Upserts a link by its natural key (`meter_id`, `register_id`).
    ///
    /// Unchanged links are a no-op; returns `true` when the row was
    /// inserted or its scale factor / active flag changed.
    pub async fn upsert(&self, link: &DeviceRegister) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO device_registers (
                id, meter_id, register_id, scale_factor,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (meter_id, register_id) DO UPDATE SET
                scale_factor = excluded.scale_factor,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            WHERE scale_factor IS NOT excluded.scale_factor
               OR is_active IS NOT excluded.is_active
            "#,
        )
        .bind(&link.id)
        .bind(&link.meter_id)
        .bind(&link.register_id)
        .bind(link.scale_factor)
        .bind(link.is_active)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            debug!(
                meter_id = %link.meter_id,
                register_id = %link.register_id,
                "Device register link applied"
            );
        }
        Ok(applied)
    }

    /// Fetches a link by id.
    pub async fn get(&self, id: &str) -> DbResult<DeviceRegister> {
        let link = sqlx::query_as::<_, DeviceRegister>(
            r#"
            SELECT id, meter_id, register_id, scale_factor,
                   is_active, created_at, updated_at
            FROM device_registers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        link.ok_or_else(|| DbError::not_found("DeviceRegister", id))
    }

    /// Lists links for a meter, active or not.
    pub async fn list_for_meter(&self, meter_id: &str) -> DbResult<Vec<DeviceRegister>> {
        let links = sqlx::query_as::<_, DeviceRegister>(
            r#"
            SELECT id, meter_id, register_id, scale_factor,
                   is_active, created_at, updated_at
            FROM device_registers
            WHERE meter_id = ?1
            ORDER BY register_id ASC
            "#,
        )
        .bind(meter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    /// Resolves the active data points for a meter, joining through the
    /// register catalogue. Both the link and the register must be active.
    pub async fn data_points_for_meter(&self, meter_id: &str) -> DbResult<Vec<MeterDataPoint>> {
        let points = sqlx::query_as::<_, MeterDataPoint>(
            r#"
            SELECT r.data_point AS data_point,
                   r.unit AS unit,
                   dr.scale_factor AS scale_factor
            FROM device_registers dr
            JOIN registers r ON r.id = dr.register_id
            WHERE dr.meter_id = ?1
              AND dr.is_active = 1
              AND r.is_active = 1
            ORDER BY r.data_point ASC
            "#,
        )
        .bind(meter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(points)
    }

    /// Counts all links.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM device_registers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
