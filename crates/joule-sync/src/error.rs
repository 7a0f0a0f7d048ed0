//! # Sync Error Types
//!
//! Error types for the synchronization engine.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │     Delivery            │ │
//! │  │  (fail fast)    │  │  (retryable)    │  │                         │ │
//! │  │                 │  │                 │  │  BatchRejected          │ │
//! │  │  InvalidConfig  │  │  Unreachable    │  │  (absorbed per batch,   │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │   bounded retry budget) │ │
//! │  │  InvalidCadence │  │  HttpStatus     │  │                         │ │
//! │  │  SinkUnavailable│  │  RequestFailed  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ Reconciliation  │  │    Database     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  SubSyncFailed  │  │  DatabaseError  │  │  ShuttingDown           │ │
//! │  │  (partial, pass │  │                 │  │  ChannelError           │ │
//! │  │   continues)    │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only configuration-class errors are allowed to surface as hard failures;
//! everything else is either retried within a bounded budget or absorbed
//! into status fields (`last_error`, per-reading `retry_count`).

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible engine failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors (fail fast, never retried)
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Invalid remote base URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// A cycle cadence that cannot be scheduled (e.g. malformed cron).
    #[error("Invalid cadence: {0}")]
    InvalidCadence(String),

    /// The reading sink capability itself is unusable (wiring error),
    /// as opposed to a transient write failure.
    #[error("Reading sink unavailable: {0}")]
    SinkUnavailable(String),

    // =========================================================================
    // Remote Errors (transient, retried within bounded budgets)
    // =========================================================================
    /// The remote endpoint could not be reached.
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// An operation exceeded its timeout.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// The remote answered with a non-success HTTP status.
    #[error("Remote returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// A request failed for a reason other than reachability.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The remote payload could not be decoded.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// A single flush attempt was rejected by the sink.
    #[error("Batch rejected: {0}")]
    BatchRejected(String),

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// One sub-sync of an orchestrated pass failed.
    #[error("Sub-sync '{name}' failed: {message}")]
    SubSyncFailed { name: String, message: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<joule_db::DbError> for SyncError {
    fn from(err: joule_db::DbError) -> Self {
        // A pool that cannot hand out connections means the local store is
        // down as a whole, not that one write went wrong.
        if err.is_unavailable() {
            SyncError::SinkUnavailable(err.to_string())
        } else {
            SyncError::DatabaseError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DeserializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SyncError::HttpStatus {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if err.is_timeout() || err.is_connect() {
            SyncError::RemoteUnreachable(err.to_string())
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the operation can be
    /// retried within a bounded budget.
    ///
    /// ## Retryable Errors
    /// - Reachability failures and timeouts
    /// - Server-side HTTP errors (5xx)
    /// - Rejected flush attempts
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Client-side HTTP errors (4xx)
    /// - Malformed payloads
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteUnreachable(_)
            | SyncError::Timeout(_)
            | SyncError::RequestFailed(_)
            | SyncError::BatchRejected(_) => true,
            SyncError::HttpStatus { status } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration/wiring problem
    /// that must surface as a hard failure rather than be retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::InvalidUrl(_)
                | SyncError::InvalidCadence(_)
                | SyncError::SinkUnavailable(_)
        )
    }
}
