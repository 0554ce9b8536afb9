//! Slot/block production timing information
//!
//! One record per observed slot, appended by the chain poller and consumed
//! by the slot clock. Superseded entries are evicted by age, never mutated.

use serde::{Deserialize, Serialize};

/// A single observed slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot: u64,
    pub parent_slot: u64,
    /// Identity of the producer/leader for this slot.
    pub leader: String,
    /// Wall-clock observation time, milliseconds since epoch.
    pub timestamp_ms: u64,
    pub transaction_count: u32,
    pub finalized: bool,
}

impl SlotInfo {
    pub fn new(slot: u64, timestamp_ms: u64) -> Self {
        Self {
            slot,
            parent_slot: slot.saturating_sub(1),
            leader: String::new(),
            timestamp_ms,
            transaction_count: 0,
            finalized: false,
        }
    }
}
