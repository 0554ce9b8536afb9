//! Detected MEV threat descriptions
//!
//! A threat is the output of the detection engine: an attack-type tag, a
//! confidence score in `[0, 1]`, a heuristic value estimate, and the hashes
//! of the transactions that together form the pattern. Threats reference
//! transactions by hash only — they never own pipeline records.

use serde::{Deserialize, Serialize};

use crate::transaction::TxHash;

/// MEV attack pattern classes recognized by the detection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MevAttackType {
    /// Front + back run wrapped around a victim transaction.
    Sandwich,
    /// Executes before an observed pending transaction.
    FrontRun,
    /// Executes after a target transaction for profit.
    BackRun,
    /// Just-in-time liquidity provision around a large swap.
    JitLiquidity,
    /// Lending-protocol liquidation capture.
    Liquidation,
    /// Cross-venue price-difference capture.
    Arbitrage,
}

/// One detected threat against (or embodied by) a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevThreat {
    pub attack_type: MevAttackType,
    /// Detection confidence in `[0, 1]`. Heuristic, not a probability.
    pub confidence: f64,
    /// Estimated extractable (or at-risk) value in USD. Heuristic.
    pub estimated_value_usd: f64,
    /// Nanosecond wall-clock timestamp at detection.
    pub detected_at_ns: u64,
    /// Hashes of the transactions that constitute the pattern.
    pub related: Vec<TxHash>,
}

impl MevThreat {
    /// Whether this threat clears the given confidence threshold.
    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.confidence >= threshold && self.estimated_value_usd > 0.0
    }

    /// Clamp confidence into `[0, 1]` after additive scoring.
    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}
