//! # Reading Sink
//!
//! Destination abstraction for flushed reading batches. The batcher only
//! talks to this trait; the production implementation uploads batches to
//! the remote system of record, and tests substitute scripted sinks.
//!
//! ## Failure Classes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  REJECTED                           │  UNAVAILABLE                      │
//! │  ────────                           │  ───────────                      │
//! │  • This batch was refused or the    │  • The sink as a whole cannot     │
//! │    transfer failed transiently      │    accept data (wiring broken,    │
//! │  • Retried within the per-batch     │    local store down)              │
//! │    attempt budget, then reported    │  • Aborts the entire flush pass   │
//! │    failed for that cycle            │    immediately                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use joule_core::Batch;

use crate::error::SyncError;
use crate::remote::{RemoteApi, UploadReading};

// =============================================================================
// Sink Error
// =============================================================================

/// Error from a single sink insert.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The sink cannot accept data at all right now. Retrying other batches
    /// in the same pass is pointless.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused this batch or the transfer failed. Other batches may
    /// still succeed; this one is retried within its attempt budget.
    #[error("Batch rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Returns true if this failure should abort the whole flush pass.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

impl From<SinkError> for SyncError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Unavailable(msg) => SyncError::SinkUnavailable(msg),
            SinkError::Rejected(msg) => SyncError::BatchRejected(msg),
        }
    }
}

// =============================================================================
// Reading Sink Trait
// =============================================================================

/// Destination for reading batches.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Delivers one batch.
    ///
    /// Must be idempotent per reading: redelivering a batch that already
    /// partially landed must not duplicate data at the destination.
    async fn insert(&self, batch: &Batch) -> Result<(), SinkError>;
}

// =============================================================================
// Remote Sink
// =============================================================================

/// Production sink: uploads batches to the remote system of record.
///
/// The remote keys readings by their UUID, so redelivery after a lost
/// acknowledgement is absorbed server-side.
pub struct RemoteSink {
    remote: Arc<dyn RemoteApi>,
}

impl RemoteSink {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        RemoteSink { remote }
    }
}

#[async_trait]
impl ReadingSink for RemoteSink {
    async fn insert(&self, batch: &Batch) -> Result<(), SinkError> {
        let payload: Vec<UploadReading> =
            batch.readings().iter().map(UploadReading::from).collect();

        let ack = self.remote.upload_readings(&payload).await.map_err(|e| {
            if e.is_config_error() {
                SinkError::Unavailable(e.to_string())
            } else {
                SinkError::Rejected(e.to_string())
            }
        })?;

        debug!(
            batch_size = payload.len(),
            accepted = ack.accepted,
            "Batch uploaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_reading, MockRemote};
    use joule_core::build_batches;

    #[test]
    fn test_sink_error_classification() {
        assert!(SinkError::Unavailable("pool exhausted".into()).is_unavailable());
        assert!(!SinkError::Rejected("HTTP 503".into()).is_unavailable());
    }

    #[test]
    fn test_sink_error_conversion() {
        let err: SyncError = SinkError::Unavailable("pool exhausted".into()).into();
        assert!(matches!(err, SyncError::SinkUnavailable(_)));
        assert!(err.is_config_error());

        let err: SyncError = SinkError::Rejected("HTTP 503".into()).into();
        assert!(matches!(err, SyncError::BatchRejected(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_remote_sink_uploads_batch() {
        let remote = Arc::new(MockRemote::new());
        let sink = RemoteSink::new(remote.clone());

        let readings = vec![sample_reading("m-1", 0), sample_reading("m-1", 1)];
        let expected: Vec<String> = readings.iter().map(|r| r.id.clone()).collect();
        let batches = build_batches(readings, 10);

        sink.insert(&batches[0]).await.unwrap();

        assert_eq!(remote.calls(), vec!["readings"]);
        let uploads = remote.uploads();
        assert_eq!(uploads.len(), 1);
        let uploaded: Vec<String> = uploads[0].iter().map(|u| u.reading_id.clone()).collect();
        assert_eq!(uploaded, expected);
    }

    #[tokio::test]
    async fn test_remote_sink_maps_transfer_failure_to_rejected() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_endpoint("readings");
        let sink = RemoteSink::new(remote.clone());

        let batches = build_batches(vec![sample_reading("m-1", 0)], 10);
        let err = sink.insert(&batches[0]).await.unwrap_err();

        assert!(!err.is_unavailable());
        assert!(matches!(err, SinkError::Rejected(_)));
    }
}
