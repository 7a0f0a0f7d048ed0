//! # joule-core: Pure Domain Logic for Joule Gateway
//!
//! This crate is the **heart** of Joule Gateway. It contains the domain
//! model of the telemetry pipeline as plain types and pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Joule Gateway Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/gateway (binary)                        │   │
//! │  │    cycle wiring ──► status endpoint ──► shutdown handling      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    joule-sync (engine)                          │   │
//! │  │    monitor, batcher, manager, scheduler, orchestrator          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ joule-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   batch   │  │ validation│  │   error   │  │   │
//! │  │   │  Reading  │  │   Batch   │  │   rules   │  │ CoreError │  │   │
//! │  │   │   Meter   │  │ chunking  │  │  checks   │  │Validation │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    joule-db (local store)                       │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Reading, Meter, Register, DeviceRegister)
//! - [`batch`] - Bounded, order-preserving batch construction
//! - [`error`] - Domain error types
//! - [`validation`] - Raw reading validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics
//! 4. **Order Matters**: Readings keep their collection order through batching

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use joule_core::Reading` instead of
// `use joule_core::types::Reading`

pub use batch::{build_batches, Batch};
pub use error::{CoreError, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID for v0.1 (single-tenant runtime with multi-tenant schema)
///
/// The schema carries tenant_id for future multi-tenancy; until tenant
/// resolution exists, every locally created row uses this constant.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum length for business identifiers (meter numbers, register codes,
/// data point names).
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Maximum length for display names.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length for unit symbols ("kWh", "m³", "°C").
pub const MAX_UNIT_LEN: usize = 16;
