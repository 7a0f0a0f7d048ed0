//! # Repository Module
//!
//! Database repository implementations for Joule Gateway.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Sync engine                                                           │
//! │       │                                                                 │
//! │       │  db.readings().backlog(500, 5)                                 │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  ReadingRepository                                                     │
//! │  ├── insert_collected(&self, readings)                                 │
//! │  ├── backlog(&self, limit, dead_letter_threshold)                      │
//! │  ├── mark_synchronized(&self, ids, retry_increment)                    │
//! │  └── record_flush_failure(&self, ids)                                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • SQL is isolated in one place                                        │
//! │  • The delivery bookkeeping (synchronized/retry_count) has exactly     │
//! │    one write path                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`reading::ReadingRepository`] - Reading outbox: insert, backlog, delivery bookkeeping
//! - [`meter::MeterRepository`] - Meter reconciliation (upsert by meter number)
//! - [`register::RegisterRepository`] - Register reconciliation (upsert by register code)
//! - [`device_register::DeviceRegisterRepository`] - Mapping reconciliation

pub mod device_register;
pub mod meter;
pub mod reading;
pub mod register;
