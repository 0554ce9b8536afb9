//! Slot clock
//!
//! Tracks chain slot progression for submission targeting. Observed slots
//! come from the slot poller; between observations the clock extrapolates
//! from the configured slot cadence. Regressions (a reorged or late
//! observation) are discarded so the published slot is monotone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use sentinel_config::SlotConfig;
use sentinel_types::SlotInfo;

pub struct SlotClock {
    current_slot: AtomicU64,
    /// Wall-clock ms timestamp of the last observation, for extrapolation.
    last_observed_at_ms: AtomicU64,
    slot_duration_ms: u64,
    propagation_lag_slots: u64,
    history: Mutex<VecDeque<SlotInfo>>,
    history_limit: usize,
}

impl SlotClock {
    pub fn new(config: &SlotConfig) -> Self {
        Self {
            current_slot: AtomicU64::new(0),
            last_observed_at_ms: AtomicU64::new(0),
            slot_duration_ms: config.slot_duration_ms,
            propagation_lag_slots: config.propagation_lag_slots,
            history: Mutex::new(VecDeque::with_capacity(config.history_limit)),
            history_limit: config.history_limit,
        }
    }

    /// Record an observed slot. Returns `false` if the observation is not
    /// newer than the current slot and was discarded.
    pub fn observe_slot(&self, info: SlotInfo, now_ms: u64) -> bool {
        let mut current = self.current_slot.load(Ordering::Acquire);
        loop {
            if info.slot <= current && current != 0 {
                debug!("Discarding stale slot observation {} (current {})", info.slot, current);
                return false;
            }
            match self.current_slot.compare_exchange_weak(
                current,
                info.slot,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.last_observed_at_ms.store(now_ms, Ordering::Release);

        let mut history = self.history.lock();
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(info);
        true
    }

    /// Current slot, extrapolated forward from the last observation by the
    /// configured cadence.
    pub fn current_slot(&self, now_ms: u64) -> u64 {
        let observed = self.current_slot.load(Ordering::Acquire);
        let observed_at = self.last_observed_at_ms.load(Ordering::Acquire);
        if observed_at == 0 || now_ms <= observed_at {
            return observed;
        }
        observed + (now_ms - observed_at) / self.slot_duration_ms
    }

    /// Time until the start of `slot`, or zero if it has already begun.
    pub fn time_until(&self, slot: u64, now_ms: u64) -> Duration {
        let current = self.current_slot(now_ms);
        if slot <= current {
            return Duration::ZERO;
        }
        let mut millis = (slot - current) * self.slot_duration_ms;
        // Credit time already elapsed inside the current slot.
        let observed_at = self.last_observed_at_ms.load(Ordering::Acquire);
        if observed_at != 0 && now_ms > observed_at {
            let into_slot = (now_ms - observed_at) % self.slot_duration_ms;
            millis = millis.saturating_sub(into_slot);
        }
        Duration::from_millis(millis)
    }

    /// Earliest execution slot a bundle created now can realistically land
    /// in, accounting for propagation lag. Drives target-slot selection.
    pub fn next_target_slot(&self, now_ms: u64) -> u64 {
        self.current_slot(now_ms) + self.propagation_lag_slots
    }

    /// Slot at which a bundle should go on the wire so it lands in the
    /// desired execution slot: the target minus the relay's propagation
    /// lag.
    pub fn predict_submission_slot(&self, target_execution_slot: u64) -> u64 {
        target_execution_slot.saturating_sub(self.propagation_lag_slots)
    }

    /// Whether `slot` has already passed.
    pub fn slot_passed(&self, slot: u64, now_ms: u64) -> bool {
        self.current_slot(now_ms) > slot
    }

    pub fn recent_slots(&self, count: usize) -> Vec<SlotInfo> {
        let history = self.history.lock();
        history.iter().rev().take(count).cloned().collect()
    }
}
