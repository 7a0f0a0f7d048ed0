//! # joule-db: Local Store for Joule Gateway
//!
//! This crate provides local persistence for the gateway. It uses SQLite
//! for on-device storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Joule Gateway Data Flow                            │
//! │                                                                         │
//! │  Sync engine (collection / flush / reconciliation)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     joule-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (reading.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ ReadingRepo   │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │◄───│ MeterRepo     │    │ ...          │  │   │
//! │  │   │ Management    │    │ RegisterRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │          /var/lib/joule/joule.db (WAL mode)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (reading, meter, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use joule_db::{Database, DbConfig};
//!
//! // Create database with default config
//! let config = DbConfig::new("path/to/joule.db");
//! let db = Database::new(config).await?;
//!
//! // Use repositories
//! let backlog = db.readings().backlog(500, 5).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::device_register::{DeviceRegisterRepository, MeterDataPoint};
pub use repository::meter::MeterRepository;
pub use repository::reading::ReadingRepository;
pub use repository::register::RegisterRepository;
