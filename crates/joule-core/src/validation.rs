//! # Validation Module
//!
//! Raw reading validation for Joule Gateway.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Device source                                                │
//! │  ├── Protocol-level framing and CRC checks                             │
//! │  └── Produces RawReading tuples                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Collection cycle (Rust)                                      │
//! │  ├── THIS MODULE: tuple validation before any row exists               │
//! │  └── Invalid tuples are logged and skipped, never persisted            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: Multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use joule_core::validation::{validate_data_point, validate_value};
//!
//! // Validate the measured quantity identifier
//! validate_data_point("active_energy_import").unwrap();
//!
//! // Reject NaN before it reaches the store
//! validate_value(230.4).unwrap();
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;
use crate::types::RawReading;
use crate::{MAX_IDENTIFIER_LEN, MAX_UNIT_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// How far into the future a device timestamp may drift before the tuple
/// is rejected. Covers skewed device clocks without admitting garbage.
pub const MAX_FUTURE_SKEW_SECS: i64 = 300;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a meter number as reported by a device source.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 64 characters
/// - Only alphanumeric characters, hyphens, underscores, dots
pub fn validate_meter_number(meter_number: &str) -> ValidationResult<()> {
    validate_identifier("meter_number", meter_number)
}

/// Validates a data point identifier.
///
/// ## Rules
/// Same charset rules as meter numbers; data points name the measured
/// quantity ("active_energy_import") and travel on every reading row.
pub fn validate_data_point(data_point: &str) -> ValidationResult<()> {
    validate_identifier("data_point", data_point)
}

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ':')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, dots and colons"
                .to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Value Validators
// =============================================================================

/// Validates a measured value.
///
/// ## Rules
/// - Must be finite (NaN and infinities are rejected - they would poison
///   downstream aggregation and cannot round-trip through JSON)
pub fn validate_value(value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "value".to_string(),
        });
    }
    Ok(())
}

/// Validates a unit symbol.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 16 characters
pub fn validate_unit(unit: &str) -> ValidationResult<()> {
    let unit = unit.trim();

    if unit.is_empty() {
        return Err(ValidationError::Required {
            field: "unit".to_string(),
        });
    }

    if unit.len() > MAX_UNIT_LEN {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: MAX_UNIT_LEN,
        });
    }

    Ok(())
}

/// Validates a device timestamp against a reference instant.
///
/// ## Rules
/// - Must not lie more than [`MAX_FUTURE_SKEW_SECS`] beyond `now`
///   (past timestamps are fine: devices buffer during outages)
pub fn validate_timestamp(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> ValidationResult<()> {
    if timestamp > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
        return Err(ValidationError::FutureTimestamp {
            value: timestamp.to_rfc3339(),
            max_skew_secs: MAX_FUTURE_SKEW_SECS,
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validator
// =============================================================================

/// Validates a complete raw reading tuple before meter resolution.
///
/// Checks run in field order and the first failure wins; the collection
/// cycle logs the failure with the offending tuple and moves on.
pub fn validate_raw_reading(raw: &RawReading, now: DateTime<Utc>) -> ValidationResult<()> {
    validate_meter_number(&raw.meter_number)?;
    validate_data_point(&raw.data_point)?;
    validate_value(raw.value)?;
    validate_unit(&raw.unit)?;
    validate_timestamp(raw.timestamp, now)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
