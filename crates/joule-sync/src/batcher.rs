//! # Reading Batcher
//!
//! Builds batches of unsynchronized readings and flushes them to a
//! [`ReadingSink`], with bounded per-batch retries and failure accounting.
//!
//! ## Flush Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ReadingBatcher                                   │
//! │                                                                         │
//! │  1. Drain staged readings handed over by the collection cycle           │
//! │  2. Load the persisted backlog (synchronized = 0, below the            │
//! │     dead-letter threshold), oldest first                                │
//! │  3. Merge (backlog first, staged deduplicated by id), split into       │
//! │     batches of at most batch_size                                       │
//! │                                                                         │
//! │  per batch:                                                             │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  attempt 1..=flush_attempts, exponential backoff in between      │  │
//! │  │                                                                  │  │
//! │  │  success on attempt k  ──► mark_synchronized(ids, k - 1)         │  │
//! │  │  all attempts fail     ──► record_flush_failure(ids)  (+1)       │  │
//! │  │  sink unavailable      ──► abort the whole pass                  │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once: a batch that lands remotely but whose
//! acknowledgement is lost stays unsynchronized locally and is redelivered
//! next cycle. The remote absorbs the duplicate by reading id.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use joule_core::{build_batches, Batch, Reading};
use joule_db::Database;

use crate::config::BatcherSettings;
use crate::error::{SyncError, SyncResult};
use crate::sink::ReadingSink;

// =============================================================================
// Flush Report
// =============================================================================

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlushReport {
    /// Batches acknowledged by the sink.
    pub batches_flushed: usize,

    /// Batches that exhausted their attempt budget.
    pub batches_failed: usize,

    /// Readings marked synchronized.
    pub readings_synchronized: usize,

    /// Readings whose failure count was bumped.
    pub readings_failed: usize,
}

/// How a single batch flush failed.
#[derive(Debug)]
enum FlushFailure {
    /// Every attempt was rejected or timed out.
    Exhausted { last_error: String },

    /// The sink reported itself unusable. Aborts the pass.
    Unavailable(String),
}

// =============================================================================
// Reading Batcher
// =============================================================================

/// Owns batching and flushing of unsynchronized readings.
pub struct ReadingBatcher {
    /// Database connection.
    db: Arc<Database>,

    /// Delivery pipeline settings.
    settings: BatcherSettings,

    /// Readings handed over by the collection cycle, not yet batched.
    staged: Mutex<Vec<Reading>>,
}

impl ReadingBatcher {
    /// Creates a new batcher.
    pub fn new(db: Arc<Database>, settings: BatcherSettings) -> Self {
        ReadingBatcher {
            db,
            settings,
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Stages freshly collected readings for the next flush pass. The
    /// readings must already be persisted.
    pub async fn add(&self, readings: Vec<Reading>) {
        if readings.is_empty() {
            return;
        }

        let mut staged = self.staged.lock().await;
        debug!(count = readings.len(), staged = staged.len(), "Staging readings");
        staged.extend(readings);
    }

    /// Number of readings currently staged.
    pub async fn staged_len(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// Builds the batches for one flush pass.
    ///
    /// Persisted backlog comes first (oldest first, dead letters excluded),
    /// then staged readings that were not already in the backlog. The staged
    /// buffer is drained even if the flush later fails; the readings are
    /// persisted and will reappear through the backlog.
    pub async fn build_flush_batches(&self) -> SyncResult<Vec<Batch>> {
        let staged: Vec<Reading> = {
            let mut guard = self.staged.lock().await;
            std::mem::take(&mut *guard)
        };

        let backlog = self
            .db
            .readings()
            .backlog(
                self.settings.backlog_limit,
                self.settings.dead_letter_threshold,
            )
            .await?;

        let mut seen: HashSet<String> = backlog.iter().map(|r| r.id.clone()).collect();
        let mut merged = backlog;
        for reading in staged {
            if seen.insert(reading.id.clone()) {
                merged.push(reading);
            }
        }

        Ok(build_batches(merged, self.settings.batch_size))
    }

    /// Flushes the given batches to the sink, one at a time.
    ///
    /// An exhausted batch does not stop the pass; later batches still get
    /// their chance. An unavailable sink aborts immediately and leaves the
    /// remaining readings untouched for the next cycle.
    pub async fn flush_batches(
        &self,
        sink: &dyn ReadingSink,
        batches: Vec<Batch>,
    ) -> SyncResult<FlushReport> {
        let mut report = FlushReport::default();

        for batch in &batches {
            match self.flush_one(sink, batch).await {
                Ok(failed_attempts) => {
                    let ids = batch.reading_ids();
                    self.db
                        .readings()
                        .mark_synchronized(&ids, failed_attempts as i64)
                        .await?;

                    report.batches_flushed += 1;
                    report.readings_synchronized += batch.len();
                }
                Err(FlushFailure::Exhausted { last_error }) => {
                    warn!(
                        readings = batch.len(),
                        error = %last_error,
                        "Batch exhausted its flush attempts"
                    );
                    let ids = batch.reading_ids();
                    self.db.readings().record_flush_failure(&ids).await?;

                    report.batches_failed += 1;
                    report.readings_failed += batch.len();
                }
                Err(FlushFailure::Unavailable(message)) => {
                    warn!(error = %message, "Sink unavailable, aborting flush pass");
                    return Err(SyncError::SinkUnavailable(message));
                }
            }
        }

        if report.batches_flushed > 0 || report.batches_failed > 0 {
            info!(
                flushed = report.batches_flushed,
                failed = report.batches_failed,
                readings = report.readings_synchronized,
                "Flush pass complete"
            );
        }

        Ok(report)
    }

    /// Builds and flushes in one step. The entry point for the upload cycle.
    pub async fn flush_pending(&self, sink: &dyn ReadingSink) -> SyncResult<FlushReport> {
        let batches = self.build_flush_batches().await?;

        if batches.is_empty() {
            debug!("Nothing to flush");
            return Ok(FlushReport::default());
        }

        self.flush_batches(sink, batches).await
    }

    /// Flushes one batch with retries.
    ///
    /// Returns the number of failed attempts that preceded the success, so
    /// the caller can fold them into the readings' failure accounting.
    async fn flush_one(&self, sink: &dyn ReadingSink, batch: &Batch) -> Result<u32, FlushFailure> {
        let mut backoff = self.create_backoff();
        let mut last_error = String::new();

        for attempt in 1..=self.settings.flush_attempts {
            match timeout(self.settings.attempt_timeout(), sink.insert(batch)).await {
                Ok(Ok(())) => {
                    debug!(attempt, readings = batch.len(), "Batch flushed");
                    return Ok(attempt - 1);
                }
                Ok(Err(e)) if e.is_unavailable() => {
                    return Err(FlushFailure::Unavailable(e.to_string()));
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Flush attempt rejected");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(
                        attempt,
                        timeout_secs = self.settings.attempt_timeout_secs,
                        "Flush attempt timed out"
                    );
                    last_error = format!(
                        "timed out after {} seconds",
                        self.settings.attempt_timeout_secs
                    );
                }
            }

            if attempt < self.settings.flush_attempts {
                if let Some(duration) = backoff.next_backoff() {
                    tokio::time::sleep(duration).await;
                }
            }
        }

        Err(FlushFailure::Exhausted { last_error })
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None, // Attempt count bounds the loop instead
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use crate::testing::{sample_reading, test_db_with_meter, NeverSink, ScriptedSink};

    fn settings() -> BatcherSettings {
        BatcherSettings {
            batch_size: 100,
            flush_attempts: 3,
            ..BatcherSettings::default()
        }
    }

    async fn insert_readings(db: &Database, meter_id: &str, count: i64) -> Vec<Reading> {
        let readings: Vec<Reading> = (0..count).map(|i| sample_reading(meter_id, i)).collect();
        db.readings().insert_collected(&readings).await.unwrap();
        readings
    }

    #[tokio::test]
    async fn test_success_on_third_attempt_records_failed_attempts() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 5).await;

        let batcher = ReadingBatcher::new(db.clone(), settings());
        let sink = ScriptedSink::new();
        sink.script(vec![
            Err(SinkError::Rejected("HTTP 503".into())),
            Err(SinkError::Rejected("HTTP 503".into())),
            Ok(()),
        ]);

        let report = batcher.flush_pending(&sink).await.unwrap();
        assert_eq!(report.batches_flushed, 1);
        assert_eq!(report.batches_failed, 0);
        assert_eq!(report.readings_synchronized, 5);
        assert_eq!(sink.calls(), 3);

        // Two failed attempts preceded the success.
        for r in &readings {
            let stored = db.readings().get(&r.id).await.unwrap();
            assert!(stored.synchronized);
            assert_eq!(stored.retry_count, 2);
        }
    }

    #[tokio::test]
    async fn test_exhausted_batch_bumps_failure_count_once() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 2).await;

        let batcher = ReadingBatcher::new(db.clone(), settings());
        let sink = ScriptedSink::new();
        sink.script(vec![
            Err(SinkError::Rejected("HTTP 500".into())),
            Err(SinkError::Rejected("HTTP 500".into())),
            Err(SinkError::Rejected("HTTP 500".into())),
        ]);

        let report = batcher.flush_pending(&sink).await.unwrap();
        assert_eq!(report.batches_flushed, 0);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.readings_failed, 2);
        // Exactly the attempt budget, no more.
        assert_eq!(sink.calls(), 3);

        for r in &readings {
            let stored = db.readings().get(&r.id).await.unwrap();
            assert!(!stored.synchronized);
            assert_eq!(stored.retry_count, 1);
        }
    }

    #[tokio::test]
    async fn test_exhausted_batch_does_not_stop_later_batches() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 4).await;

        let batcher = ReadingBatcher::new(
            db.clone(),
            BatcherSettings {
                batch_size: 2,
                flush_attempts: 3,
                ..BatcherSettings::default()
            },
        );
        let sink = ScriptedSink::new();
        sink.script(vec![
            // First batch exhausts its three attempts.
            Err(SinkError::Rejected("HTTP 500".into())),
            Err(SinkError::Rejected("HTTP 500".into())),
            Err(SinkError::Rejected("HTTP 500".into())),
            // Second batch succeeds first try.
            Ok(()),
        ]);

        let report = batcher.flush_pending(&sink).await.unwrap();
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_flushed, 1);

        // The second batch carried the remaining two readings.
        let delivered = sink.inserted();
        assert_eq!(delivered.len(), 4);
        assert_eq!(
            delivered[3],
            vec![readings[2].id.clone(), readings[3].id.clone()]
        );

        let first = db.readings().get(&readings[0].id).await.unwrap();
        assert!(!first.synchronized);
        assert_eq!(first.retry_count, 1);

        let third = db.readings().get(&readings[2].id).await.unwrap();
        assert!(third.synchronized);
        assert_eq!(third.retry_count, 0);
    }

    #[tokio::test]
    async fn test_unavailable_sink_aborts_the_pass() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 4).await;

        let batcher = ReadingBatcher::new(
            db.clone(),
            BatcherSettings {
                batch_size: 2,
                ..BatcherSettings::default()
            },
        );
        let sink = ScriptedSink::new();
        sink.script(vec![Err(SinkError::Unavailable("pool exhausted".into()))]);

        let err = batcher.flush_pending(&sink).await.unwrap_err();
        assert!(matches!(err, SyncError::SinkUnavailable(_)));
        // No retries, no second batch.
        assert_eq!(sink.calls(), 1);

        // Nothing was marked or bumped.
        for r in &readings {
            let stored = db.readings().get(&r.id).await.unwrap();
            assert!(!stored.synchronized);
            assert_eq!(stored.retry_count, 0);
        }
    }

    #[tokio::test]
    async fn test_batches_keep_insertion_order_and_dedup_staged() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 3).await;

        let batcher = ReadingBatcher::new(db.clone(), settings());
        // The collection cycle stages what it just persisted; the backlog
        // already contains the same rows.
        batcher.add(readings.clone()).await;
        assert_eq!(batcher.staged_len().await, 3);

        let batches = batcher.build_flush_batches().await.unwrap();
        assert_eq!(batches.len(), 1);

        let expected: Vec<String> = readings.iter().map(|r| r.id.clone()).collect();
        assert_eq!(batches[0].reading_ids(), expected);

        // Staging buffer drained by the pass.
        assert_eq!(batcher.staged_len().await, 0);
    }

    #[tokio::test]
    async fn test_dead_letters_are_excluded_from_batches() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 2).await;

        let batcher = ReadingBatcher::new(
            db.clone(),
            BatcherSettings {
                dead_letter_threshold: 2,
                ..BatcherSettings::default()
            },
        );

        let first = vec![readings[0].id.clone()];
        db.readings().record_flush_failure(&first).await.unwrap();
        db.readings().record_flush_failure(&first).await.unwrap();

        let batches = batcher.build_flush_batches().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].reading_ids(), vec![readings[1].id.clone()]);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let (db, meter_id) = test_db_with_meter().await;
        let readings = insert_readings(&db, &meter_id, 1).await;

        let batcher = ReadingBatcher::new(
            db.clone(),
            BatcherSettings {
                flush_attempts: 2,
                attempt_timeout_secs: 30,
                ..BatcherSettings::default()
            },
        );

        let sink = NeverSink;
        let report = batcher.flush_pending(&sink).await.unwrap();
        assert_eq!(report.batches_failed, 1);

        let stored = db.readings().get(&readings[0].id).await.unwrap();
        assert!(!stored.synchronized);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_empty_flush_is_a_no_op() {
        let (db, _meter_id) = test_db_with_meter().await;

        let batcher = ReadingBatcher::new(db, settings());
        let sink = ScriptedSink::new();

        let report = batcher.flush_pending(&sink).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(sink.calls(), 0);
    }
}
