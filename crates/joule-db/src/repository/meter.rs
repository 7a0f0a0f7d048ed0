//! # Meter Repository
//!
//! Reconciled meter definitions. The remote system of record owns this data;
//! the configuration sub-sync upserts it here by natural key so re-applying
//! unchanged definitions leaves no trace.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use joule_core::Meter;

/// Repository for meter reconciliation and lookup.
#[derive(Debug, Clone)]
pub struct MeterRepository {
    pool: SqlitePool,
}

impl MeterRepository {
    /// Creates a new MeterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MeterRepository { pool }
    }

    /// Upserts a meter by its natural key (`meter_number`).
    ///
    /// ## Idempotency
    /// The `ON CONFLICT` update only fires when a tracked field actually
    /// differs, so re-applying unchanged remote data leaves the row - and
    /// its `updated_at` - untouched. Returns `true` when the row was
    /// inserted or changed.
    ///
    /// On conflict the existing `id` and `created_at` are retained; the
    /// caller's fresh id is only used for brand-new rows.
    pub async fn upsert(&self, meter: &Meter) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO meters (
                id, tenant_id, meter_number, name, location,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (meter_number) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                location = excluded.location,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            WHERE tenant_id IS NOT excluded.tenant_id
               OR name IS NOT excluded.name
               OR location IS NOT excluded.location
               OR is_active IS NOT excluded.is_active
            "#,
        )
        .bind(&meter.id)
        .bind(&meter.tenant_id)
        .bind(&meter.meter_number)
        .bind(&meter.name)
        .bind(&meter.location)
        .bind(meter.is_active)
        .bind(meter.created_at)
        .bind(meter.updated_at)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            debug!(meter_number = %meter.meter_number, "Meter definition applied");
        }
        Ok(applied)
    }

    /// Fetches a meter by id.
    pub async fn get(&self, id: &str) -> DbResult<Meter> {
        let meter = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, tenant_id, meter_number, name, location,
                   is_active, created_at, updated_at
            FROM meters
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        meter.ok_or_else(|| DbError::not_found("Meter", id))
    }

    /// Looks a meter up by its natural key. Returns `None` for unknown
    /// numbers; the collection cycle treats that as a skippable tuple.
    pub async fn get_by_number(&self, meter_number: &str) -> DbResult<Option<Meter>> {
        let meter = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, tenant_id, meter_number, name, location,
                   is_active, created_at, updated_at
            FROM meters
            WHERE meter_number = ?1
            "#,
        )
        .bind(meter_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meter)
    }

    /// Lists active meters ordered by meter number.
    pub async fn list_active(&self) -> DbResult<Vec<Meter>> {
        let meters = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, tenant_id, meter_number, name, location,
                   is_active, created_at, updated_at
            FROM meters
            WHERE is_active = 1
            ORDER BY meter_number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(meters)
    }

    /// Counts all meters (active and inactive).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meters")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
