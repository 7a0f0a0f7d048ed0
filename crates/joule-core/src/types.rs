//! # Domain Types
//!
//! Core domain types used throughout Joule Gateway.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Meter       │   │    Register     │   │ DeviceRegister  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  meter_number   │   │  register_code  │   │  meter_id (FK)  │       │
//! │  │  name           │   │  data_point     │   │  register_id(FK)│       │
//! │  │  location       │   │  unit           │   │  scale_factor   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │   RawReading    │   │     Reading     │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  meter_number   │   │  id (UUID)      │                             │
//! │  │  data_point     │──►│  meter_id (FK)  │                             │
//! │  │  value, unit    │   │  synchronized   │                             │
//! │  │  timestamp      │   │  retry_count    │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every configuration entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Natural key: (meter_number, register_code, meter+register pair) - the
//!   identity the remote system of record speaks, used for idempotent upsert

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Meter
// =============================================================================

/// A metering device known to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Meter {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this meter belongs to.
    pub tenant_id: String,

    /// Meter number - natural key, as printed on the device and as known
    /// by the remote system of record.
    pub meter_number: String,

    /// Display name shown in status output and dashboards.
    pub name: String,

    /// Optional physical location ("basement, riser 2").
    pub location: Option<String>,

    /// Whether the meter is active (soft delete).
    pub is_active: bool,

    /// When the meter row was created locally.
    pub created_at: DateTime<Utc>,

    /// When the meter row was last updated by reconciliation.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Register
// =============================================================================

/// A register definition: one measurable quantity a meter can report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Register {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Register code - natural key (e.g. OBIS code "1-0:1.8.0").
    pub register_code: String,

    /// Display name ("Active energy import").
    pub name: String,

    /// Identifier of the measured quantity as carried on readings.
    pub data_point: String,

    /// Unit symbol ("kWh", "m³").
    pub unit: String,

    /// Whether the register is active (soft delete).
    pub is_active: bool,

    /// When the register row was created locally.
    pub created_at: DateTime<Utc>,

    /// When the register row was last updated by reconciliation.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Device Register
// =============================================================================

/// A meter-to-register mapping: "this meter reports this register".
///
/// The natural key is the `(meter_id, register_id)` pair; the remote side
/// identifies mappings by `(meter_number, register_code)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DeviceRegister {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Meter side of the mapping.
    pub meter_id: String,

    /// Register side of the mapping.
    pub register_id: String,

    /// Multiplier applied to raw device values (CT/VT ratios, unit scaling).
    pub scale_factor: f64,

    /// Whether the mapping is active (soft delete).
    pub is_active: bool,

    /// When the mapping row was created locally.
    pub created_at: DateTime<Utc>,

    /// When the mapping row was last updated by reconciliation.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Raw Reading
// =============================================================================

/// One raw measurement tuple as produced by a device source, before meter
/// resolution and validation. Transient: never persisted in this form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Device identity as reported by the source (matches `Meter::meter_number`).
    pub meter_number: String,

    /// Identifier of the measured quantity.
    pub data_point: String,

    /// Measured value.
    pub value: f64,

    /// Unit symbol.
    pub unit: String,

    /// Collection instant as reported by the source.
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Reading
// =============================================================================

/// One persisted measurement instance.
///
/// Immutable after creation except for `synchronized` and `retry_count`,
/// which only the flush pipeline mutates. Never deleted by the sync core;
/// retention is an external concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Reading {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Meter this reading belongs to.
    pub meter_id: String,

    /// Identifier of the measured quantity.
    pub data_point: String,

    /// Measured value.
    pub value: f64,

    /// Unit symbol.
    pub unit: String,

    /// Collection instant as reported by the device source.
    pub timestamp: DateTime<Utc>,

    /// True once the remote system of record acknowledged this reading.
    pub synchronized: bool,

    /// Failed delivery accounting. Grows by one per exhausted flush of a
    /// containing batch, and by the number of failed attempts that preceded
    /// an eventually successful flush.
    pub retry_count: i64,

    /// When the reading row was created locally (insertion order anchor).
    pub created_at: DateTime<Utc>,
}

impl Reading {
    /// Whether this reading still needs delivery.
    #[inline]
    pub fn flush_eligible(&self) -> bool {
        !self.synchronized
    }

    /// Whether this reading has crossed the dead-letter threshold and should
    /// be excluded from further batching passes.
    #[inline]
    pub fn is_dead_letter(&self, threshold: i64) -> bool {
        !self.synchronized && self.retry_count >= threshold
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
