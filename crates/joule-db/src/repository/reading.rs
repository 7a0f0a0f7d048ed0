//! # Reading Repository
//!
//! The local reading outbox: collected measurements wait here until the
//! remote system of record acknowledges them.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reading Outbox Implementation                        │
//! │                                                                         │
//! │  COLLECTION CYCLE                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  INSERT INTO readings (..., synchronized = 0, retry_count = 0)  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← The reading is durable before any delivery is attempted      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 FLUSH PIPELINE (async)                          │   │
//! │  │                                                                 │   │
//! │  │  1. backlog(limit, threshold) → unsynchronized, insertion order │   │
//! │  │  2. deliver batches to the sink                                 │   │
//! │  │     a. On ack:     mark_synchronized(ids, failed_attempts)      │   │
//! │  │     b. On failure: record_flush_failure(ids)  (+1 per cycle)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A reading is never lost (it's in the local store)                   │
//! │  • Offline? No problem - readings queue up                             │
//! │  • Back online? The flush pipeline drains the backlog                  │
//! │  • At-least-once: duplicates are absorbed by the remote's upsert       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use joule_core::Reading;

/// Repository for reading outbox operations.
#[derive(Debug, Clone)]
pub struct ReadingRepository {
    pool: SqlitePool,
}

impl ReadingRepository {
    /// Creates a new ReadingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReadingRepository { pool }
    }

    /// Persists one collection pass of readings in a single transaction.
    ///
    /// All rows land with `synchronized = 0`; durability comes before any
    /// delivery attempt. Returns the number of inserted rows.
    pub async fn insert_collected(&self, readings: &[Reading]) -> DbResult<u64> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for reading in readings {
            let result = sqlx::query(
                r#"
                INSERT INTO readings (
                    id, meter_id, data_point, value, unit,
                    timestamp, synchronized, retry_count, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&reading.id)
            .bind(&reading.meter_id)
            .bind(&reading.data_point)
            .bind(reading.value)
            .bind(&reading.unit)
            .bind(reading.timestamp)
            .bind(reading.synchronized)
            .bind(reading.retry_count)
            .bind(reading.created_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(count = inserted, "Persisted collected readings");
        Ok(inserted)
    }

    /// Fetches a single reading by id.
    pub async fn get(&self, id: &str) -> DbResult<Reading> {
        let reading = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, meter_id, data_point, value, unit,
                   timestamp, synchronized, retry_count, created_at
            FROM readings
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        reading.ok_or_else(|| DbError::not_found("Reading", id))
    }

    /// Returns the delivery backlog: unsynchronized readings below the
    /// dead-letter threshold, in insertion order (oldest first).
    ///
    /// ## Arguments
    /// * `limit` - Maximum readings to return
    /// * `dead_letter_threshold` - Readings with `retry_count` at or above
    ///   this value are excluded (they stay queryable via
    ///   [`list_dead_letters`](Self::list_dead_letters))
    pub async fn backlog(&self, limit: u32, dead_letter_threshold: i64) -> DbResult<Vec<Reading>> {
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, meter_id, data_point, value, unit,
                   timestamp, synchronized, retry_count, created_at
            FROM readings
            WHERE synchronized = 0 AND retry_count < ?1
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(dead_letter_threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    /// Marks readings as acknowledged by the remote.
    ///
    /// `retry_increment` records how many failed attempts preceded the
    /// successful delivery in the flush that acknowledged them; it is shared
    /// by every reading in the batch. Already-synchronized rows are left
    /// untouched, so repeated acknowledgements are no-ops.
    ///
    /// Returns the number of rows that actually transitioned.
    pub async fn mark_synchronized(&self, ids: &[String], retry_increment: i64) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0u64;

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE readings SET
                    synchronized = 1,
                    retry_count = retry_count + ?2
                WHERE id = ?1 AND synchronized = 0
                "#,
            )
            .bind(id)
            .bind(retry_increment)
            .execute(&mut *tx)
            .await?;

            updated += result.rows_affected();
        }

        tx.commit().await?;

        debug!(count = updated, "Marked readings synchronized");
        Ok(updated)
    }

    /// Records one exhausted delivery cycle for the given readings:
    /// `retry_count` grows by exactly 1, shared by the whole batch.
    pub async fn record_flush_failure(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0u64;

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE readings SET
                    retry_count = retry_count + 1
                WHERE id = ?1 AND synchronized = 0
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            updated += result.rows_affected();
        }

        tx.commit().await?;

        debug!(count = updated, "Recorded failed delivery cycle");
        Ok(updated)
    }

    /// Counts unsynchronized readings still eligible for delivery.
    pub async fn count_pending(&self, dead_letter_threshold: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM readings WHERE synchronized = 0 AND retry_count < ?1",
        )
        .bind(dead_letter_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts readings that crossed the dead-letter threshold.
    pub async fn count_dead_letters(&self, dead_letter_threshold: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM readings WHERE synchronized = 0 AND retry_count >= ?1",
        )
        .bind(dead_letter_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Lists dead-lettered readings (oldest first) for inspection.
    ///
    /// These rows are excluded from the delivery backlog but never deleted
    /// by the engine; visibility is the whole point of the threshold.
    pub async fn list_dead_letters(
        &self,
        dead_letter_threshold: i64,
        limit: u32,
    ) -> DbResult<Vec<Reading>> {
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, meter_id, data_point, value, unit,
                   timestamp, synchronized, retry_count, created_at
            FROM readings
            WHERE synchronized = 0 AND retry_count >= ?1
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(dead_letter_threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    /// Deletes synchronized readings created before `cutoff` (startup
    /// housekeeping). Unsynchronized rows are never touched.
    ///
    /// Returns the number of deleted rows.
    pub async fn purge_synchronized_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM readings
            WHERE synchronized = 1 AND created_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use uuid::Uuid;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let meter_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO meters (id, tenant_id, meter_number, name, location, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, NULL, 1, ?5, ?5)
            "#,
        )
        .bind(&meter_id)
        .bind(joule_core::DEFAULT_TENANT_ID)
        .bind("ELS-1021")
        .bind("Main incomer")
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        (db, meter_id)
    }

    fn reading(meter_id: &str, seq: i64) -> Reading {
        let base = Utc::now() - Duration::minutes(60);
        Reading {
            id: Uuid::new_v4().to_string(),
            meter_id: meter_id.to_string(),
            data_point: "active_energy_import".to_string(),
            value: seq as f64,
            unit: "kWh".to_string(),
            timestamp: base + Duration::seconds(seq),
            synchronized: false,
            retry_count: 0,
            created_at: base + Duration::seconds(seq),
        }
    }

    #[tokio::test]
    async fn test_insert_and_backlog_order() {
        let (db, meter_id) = setup().await;
        let repo = db.readings();

        let readings: Vec<Reading> = (0..3).map(|i| reading(&meter_id, i)).collect();
        let inserted = repo.insert_collected(&readings).await.unwrap();
        assert_eq!(inserted, 3);

        let backlog = repo.backlog(10, 5).await.unwrap();
        assert_eq!(backlog.len(), 3);
        // Insertion order, oldest first
        let ids: Vec<&str> = backlog.iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<&str> = readings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_mark_synchronized_with_increment() {
        let (db, meter_id) = setup().await;
        let repo = db.readings();

        let readings: Vec<Reading> = (0..2).map(|i| reading(&meter_id, i)).collect();
        repo.insert_collected(&readings).await.unwrap();
        let ids: Vec<String> = readings.iter().map(|r| r.id.clone()).collect();

        let updated = repo.mark_synchronized(&ids, 2).await.unwrap();
        assert_eq!(updated, 2);

        let first = repo.get(&ids[0]).await.unwrap();
        assert!(first.synchronized);
        assert_eq!(first.retry_count, 2);

        // Re-acknowledging is a no-op
        let again = repo.mark_synchronized(&ids, 1).await.unwrap();
        assert_eq!(again, 0);
        let first = repo.get(&ids[0]).await.unwrap();
        assert_eq!(first.retry_count, 2);
    }

    #[tokio::test]
    async fn test_record_flush_failure_increments_by_one() {
        let (db, meter_id) = setup().await;
        let repo = db.readings();

        let readings = vec![reading(&meter_id, 0)];
        repo.insert_collected(&readings).await.unwrap();
        let ids = vec![readings[0].id.clone()];

        repo.record_flush_failure(&ids).await.unwrap();
        repo.record_flush_failure(&ids).await.unwrap();

        let stored = repo.get(&ids[0]).await.unwrap();
        assert!(!stored.synchronized);
        assert_eq!(stored.retry_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letters_leave_the_backlog() {
        let (db, meter_id) = setup().await;
        let repo = db.readings();

        let readings = vec![reading(&meter_id, 0), reading(&meter_id, 1)];
        repo.insert_collected(&readings).await.unwrap();
        let first_id = vec![readings[0].id.clone()];

        // Push the first reading past a threshold of 3
        for _ in 0..3 {
            repo.record_flush_failure(&first_id).await.unwrap();
        }

        let backlog = repo.backlog(10, 3).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, readings[1].id);

        assert_eq!(repo.count_pending(3).await.unwrap(), 1);
        assert_eq!(repo.count_dead_letters(3).await.unwrap(), 1);

        let dead = repo.list_dead_letters(3, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, readings[0].id);
    }

    #[tokio::test]
    async fn test_purge_only_touches_synchronized_rows() {
        let (db, meter_id) = setup().await;
        let repo = db.readings();

        let readings = vec![reading(&meter_id, 0), reading(&meter_id, 1)];
        repo.insert_collected(&readings).await.unwrap();
        repo.mark_synchronized(&[readings[0].id.clone()], 0)
            .await
            .unwrap();

        let purged = repo
            .purge_synchronized_before(Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        // The unsynchronized reading survives
        assert!(repo.get(&readings[1].id).await.is_ok());
        assert!(repo.get(&readings[0].id).await.is_err());
    }
}
