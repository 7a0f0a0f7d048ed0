//! # Batch Construction
//!
//! Pure, order-preserving grouping of readings into bounded batches.
//!
//! ## Batching Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Batching Pass                                   │
//! │                                                                         │
//! │  input (insertion order):  [r1, r2, r3(sync), r4, r5, r6, r7]          │
//! │                                      │                                  │
//! │          already-synchronized readings are dropped                      │
//! │                                      ▼                                  │
//! │  eligible:                 [r1, r2, r4, r5, r6, r7]                    │
//! │                                      │                                  │
//! │                 chunked at max_batch_size = 3                           │
//! │                                      ▼                                  │
//! │  batches (flush order):    [r1 r2 r4] [r5 r6 r7]                       │
//! │                                                                         │
//! │  • order within and across batches is input order, never timestamp     │
//! │    order (preserves causal grouping per collection pass)                │
//! │  • every batch holds at most max_batch_size readings                   │
//! │  • every member is unsynchronized                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::types::Reading;

// =============================================================================
// Batch
// =============================================================================

/// An ordered, bounded grouping of readings awaiting a single flush attempt.
///
/// Transient: batches are rebuilt for every flush and never persisted as
/// their own records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    readings: Vec<Reading>,
}

impl Batch {
    /// Number of readings in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when the batch holds no readings.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// The readings, in insertion order.
    #[inline]
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Ids of the contained readings, in insertion order.
    pub fn reading_ids(&self) -> Vec<String> {
        self.readings.iter().map(|r| r.id.clone()).collect()
    }
}

// =============================================================================
// Batch Building
// =============================================================================

/// Chunks readings into batches of at most `max_batch_size`, preserving
/// input order and dropping readings that are no longer flush-eligible.
///
/// A `max_batch_size` of zero is treated as one, so no input is ever
/// silently discarded by a degenerate configuration.
pub fn build_batches(readings: Vec<Reading>, max_batch_size: usize) -> Vec<Batch> {
    let size = max_batch_size.max(1);

    let eligible: Vec<Reading> = readings.into_iter().filter(Reading::flush_eligible).collect();

    let mut batches = Vec::with_capacity(eligible.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(eligible.len()));

    for reading in eligible {
        current.push(reading);
        if current.len() == size {
            batches.push(Batch {
                readings: std::mem::take(&mut current),
            });
        }
    }

    if !current.is_empty() {
        batches.push(Batch { readings: current });
    }

    batches
}

// =============================================================================
// Unit Tests
// =============================================================================
