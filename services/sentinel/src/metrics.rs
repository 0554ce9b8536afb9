//! Pipeline counters and gauges
//!
//! Fire-and-forget atomic counters updated from the hot path and background
//! threads. Nothing here blocks, allocates, or fails; a slow or absent
//! metrics consumer cannot stall the pipeline. `snapshot()` produces a
//! plain struct for periodic reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use sentinel_types::MevAttackType;

/// Reasons a transaction is rejected at admission. Counted, never logged
/// as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DeniedAddress,
    UnknownSelector,
    ValueBelowFloor,
    GasBelowFloor,
    RateLimited,
}

/// All pipeline metrics. USD totals are stored as integer cents so the
/// counters stay lock-free.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    // Admission
    pub transactions_seen: AtomicU64,
    pub rejected_deny_list: AtomicU64,
    pub rejected_selector: AtomicU64,
    pub rejected_value: AtomicU64,
    pub rejected_gas: AtomicU64,
    pub rejected_rate_limit: AtomicU64,
    pub queue_overflows: AtomicU64,
    pub transactions_processed: AtomicU64,

    // Detection
    pub detection_failures: AtomicU64,
    pub threats_sandwich: AtomicU64,
    pub threats_frontrun: AtomicU64,
    pub threats_backrun: AtomicU64,
    pub threats_jit: AtomicU64,
    pub threats_liquidation: AtomicU64,
    pub threats_arbitrage: AtomicU64,

    // Bundles
    pub bundles_created: AtomicU64,
    pub bundles_submitted: AtomicU64,
    pub bundles_landed: AtomicU64,
    pub bundles_failed: AtomicU64,
    pub bundles_expired: AtomicU64,
    pub bundles_cancelled: AtomicU64,
    pub tips_paid: AtomicU64,
    pub value_protected_usd_cents: AtomicU64,

    // Gauges
    pub current_slot: AtomicU64,
    pub queue_depth: AtomicU64,
}

impl PipelineMetrics {
    pub fn record_rejection(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::DeniedAddress => &self.rejected_deny_list,
            RejectReason::UnknownSelector => &self.rejected_selector,
            RejectReason::ValueBelowFloor => &self.rejected_value,
            RejectReason::GasBelowFloor => &self.rejected_gas,
            RejectReason::RateLimited => &self.rejected_rate_limit,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_threat(&self, attack_type: MevAttackType) {
        let counter = match attack_type {
            MevAttackType::Sandwich => &self.threats_sandwich,
            MevAttackType::FrontRun => &self.threats_frontrun,
            MevAttackType::BackRun => &self.threats_backrun,
            MevAttackType::JitLiquidity => &self.threats_jit,
            MevAttackType::Liquidation => &self.threats_liquidation,
            MevAttackType::Arbitrage => &self.threats_arbitrage,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_protected(&self, usd: f64) {
        if usd > 0.0 {
            self.value_protected_usd_cents
                .fetch_add((usd * 100.0) as u64, Ordering::Relaxed);
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_deny_list.load(Ordering::Relaxed)
            + self.rejected_selector.load(Ordering::Relaxed)
            + self.rejected_value.load(Ordering::Relaxed)
            + self.rejected_gas.load(Ordering::Relaxed)
            + self.rejected_rate_limit.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_seen: self.transactions_seen.load(Ordering::Relaxed),
            transactions_rejected: self.rejected_total(),
            transactions_processed: self.transactions_processed.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            threats_detected: self.threats_sandwich.load(Ordering::Relaxed)
                + self.threats_frontrun.load(Ordering::Relaxed)
                + self.threats_backrun.load(Ordering::Relaxed)
                + self.threats_jit.load(Ordering::Relaxed)
                + self.threats_liquidation.load(Ordering::Relaxed)
                + self.threats_arbitrage.load(Ordering::Relaxed),
            bundles_created: self.bundles_created.load(Ordering::Relaxed),
            bundles_submitted: self.bundles_submitted.load(Ordering::Relaxed),
            bundles_landed: self.bundles_landed.load(Ordering::Relaxed),
            bundles_failed: self.bundles_failed.load(Ordering::Relaxed),
            bundles_expired: self.bundles_expired.load(Ordering::Relaxed),
            bundles_cancelled: self.bundles_cancelled.load(Ordering::Relaxed),
            tips_paid: self.tips_paid.load(Ordering::Relaxed),
            value_protected_usd: self.value_protected_usd_cents.load(Ordering::Relaxed) as f64
                / 100.0,
            current_slot: self.current_slot.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub transactions_seen: u64,
    pub transactions_rejected: u64,
    pub transactions_processed: u64,
    pub queue_overflows: u64,
    pub detection_failures: u64,
    pub threats_detected: u64,
    pub bundles_created: u64,
    pub bundles_submitted: u64,
    pub bundles_landed: u64,
    pub bundles_failed: u64,
    pub bundles_expired: u64,
    pub bundles_cancelled: u64,
    pub tips_paid: u64,
    pub value_protected_usd: f64,
    pub current_slot: u64,
    pub queue_depth: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reasons_count_separately() {
        let metrics = PipelineMetrics::default();
        metrics.record_rejection(RejectReason::GasBelowFloor);
        metrics.record_rejection(RejectReason::GasBelowFloor);
        metrics.record_rejection(RejectReason::RateLimited);
        assert_eq!(metrics.rejected_gas.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rejected_rate_limit.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rejected_total(), 3);
    }

    #[test]
    fn value_protected_accumulates_cents() {
        let metrics = PipelineMetrics::default();
        metrics.record_value_protected(12.34);
        metrics.record_value_protected(0.66);
        assert_eq!(metrics.snapshot().value_protected_usd, 13.0);
    }
}
