//! Admission classification
//!
//! ## Purpose
//!
//! Decides in bounded, allocation-free time whether an observed transaction
//! enters the pipeline at all. Checks run in a fixed order — deny-list,
//! selector bloom filter, value floor, gas floors, per-sender rate limit —
//! each O(1), so the worst-case cost per transaction is a handful of loads
//! and one hash-map probe. Everything that will ever reject a transaction
//! happens here, before it is enqueued; workers never un-accept.
//!
//! Rejections are counted per reason by the caller, not logged: at mempool
//! rates a log line per rejection would itself be a denial of service.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use std::collections::HashMap;

use sentinel_config::FilterConfig;
use sentinel_types::Transaction;

use crate::bloom::BloomPreFilter;
use crate::metrics::RejectReason;

/// Classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

/// Sliding one-second acceptance window for a single sender.
#[derive(Debug, Clone, Copy)]
struct SenderWindow {
    window_start_ns: u64,
    accepted: u32,
}

/// Fixed-order admission filter.
pub struct TransactionClassifier {
    bloom: Arc<BloomPreFilter>,
    deny_list: HashSet<u64>,
    min_gas_price: u64,
    min_priority_fee: u64,
    min_value_wei: u128,
    max_per_sender_per_sec: u32,
    /// Per-sender acceptance windows, keyed by the truncated address key.
    /// This is the only mutable classifier state; lock order puts it first
    /// (classifier state -> bundle table -> slot table).
    sender_windows: Mutex<HashMap<u64, SenderWindow>>,
}

const WINDOW_NS: u64 = 1_000_000_000;

impl TransactionClassifier {
    pub fn new(config: &FilterConfig, bloom: Arc<BloomPreFilter>) -> anyhow::Result<Self> {
        let deny_list = config
            .deny_list()?
            .into_iter()
            .map(|addr| addr.as_key())
            .collect();
        Ok(Self {
            bloom,
            deny_list,
            min_gas_price: config.min_gas_price,
            min_priority_fee: config.min_priority_fee,
            min_value_wei: config.min_value_wei,
            max_per_sender_per_sec: config.max_tx_per_sender_per_sec,
            sender_windows: Mutex::new(HashMap::new()),
        })
    }

    /// Classify a transaction. The only side effect is the per-sender
    /// window update, and only on the acceptance path.
    pub fn classify(&self, tx: &Transaction, now_ns: u64) -> Verdict {
        // 1. Deny-list: cheapest definitive rejection first.
        if self.deny_list.contains(&tx.to.as_key()) {
            return Verdict::Reject(RejectReason::DeniedAddress);
        }

        // 2. Selector pre-filter. Configured overrides were folded into the
        // filter at construction, so a miss here is definitive.
        if !self.bloom.might_contain(tx.selector()) {
            return Verdict::Reject(RejectReason::UnknownSelector);
        }

        // 3. Value floor.
        if tx.value < self.min_value_wei {
            return Verdict::Reject(RejectReason::ValueBelowFloor);
        }

        // 4. Gas floors: both the legacy price and the priority fee must
        // clear their minimums.
        if tx.gas_price < self.min_gas_price && tx.max_fee_per_gas < self.min_gas_price {
            return Verdict::Reject(RejectReason::GasBelowFloor);
        }
        if tx.priority_fee() < self.min_priority_fee {
            return Verdict::Reject(RejectReason::GasBelowFloor);
        }

        // 5. Per-sender rate limit, last so cheap rejections never touch
        // the map.
        if self.is_rate_limited(tx.from.as_key(), now_ns) {
            return Verdict::Reject(RejectReason::RateLimited);
        }

        Verdict::Accept
    }

    fn is_rate_limited(&self, sender_key: u64, now_ns: u64) -> bool {
        let mut windows = self.sender_windows.lock();
        let window = windows.entry(sender_key).or_insert(SenderWindow {
            window_start_ns: now_ns,
            accepted: 0,
        });
        if now_ns.saturating_sub(window.window_start_ns) >= WINDOW_NS {
            window.window_start_ns = now_ns;
            window.accepted = 0;
        }
        if window.accepted >= self.max_per_sender_per_sec {
            return true;
        }
        window.accepted += 1;
        false
    }

    /// Number of senders currently tracked by the rate limiter.
    pub fn tracked_senders(&self) -> usize {
        self.sender_windows.lock().len()
    }
}
