//! # Error Types
//!
//! Domain-specific error types for joule-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  joule-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Raw reading validation failures                │
//! │                                                                         │
//! │  joule-db errors (separate crate)                                      │
//! │  └── DbError          - Local store operation failures                 │
//! │                                                                         │
//! │  joule-sync errors (separate crate)                                    │
//! │  └── SyncError        - Engine failures (taxonomy per cycle)           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → status/lastError      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (meter number, data point, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These represent domain rule violations; the engine records them per
/// reading or per cycle rather than letting them abort sibling work.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A raw reading named a meter the gateway does not know.
    ///
    /// Happens when a device reports before configuration reconciliation
    /// has pulled its meter definition, or when a meter was deactivated
    /// remotely while the device keeps transmitting.
    #[error("Unknown meter: {0}")]
    UnknownMeter(String),

    /// A raw reading named a data point no active register defines.
    #[error("Unknown data point '{data_point}' for meter {meter_number}")]
    UnknownDataPoint {
        meter_number: String,
        data_point: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Raw reading validation errors.
///
/// These occur when a device source produces tuples that don't meet the
/// persistence requirements. Used for early validation before any row is
/// created.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is not finite (NaN or infinity).
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// Invalid format (bad characters, malformed identifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Timestamp is implausible (far future).
    #[error("timestamp {value} is further than {max_skew_secs}s into the future")]
    FutureTimestamp { value: String, max_skew_secs: i64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownDataPoint {
            meter_number: "ELS-1021".to_string(),
            data_point: "reactive_power".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown data point 'reactive_power' for meter ELS-1021"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "data_point".to_string(),
        };
        assert_eq!(err.to_string(), "data_point is required");

        let err = ValidationError::NotFinite {
            field: "value".to_string(),
        };
        assert_eq!(err.to_string(), "value must be a finite number");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "unit".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
