//! # Device Source
//!
//! Abstraction over where raw readings come from. The production gateway
//! polls physical meters; tests and demos plug in scripted or simulated
//! sources.

use async_trait::async_trait;

use joule_core::RawReading;

use crate::error::SyncResult;

/// A source of raw device readings.
///
/// `collect` is invoked by the reading-collection cycle. Implementations
/// should return every reading gathered since the previous call and must
/// not block beyond a single poll of the underlying devices.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Collects the next batch of raw readings from the devices.
    async fn collect(&self) -> SyncResult<Vec<RawReading>>;
}
