//! MEV threat detection
//!
//! ## Purpose
//!
//! Inspects each accepted transaction against a bounded window of recently
//! seen transactions and classifies it as a sandwich attempt, front-run
//! attempt, arbitrage, just-in-time liquidity play, liquidation, or benign.
//! Output is heuristic: a confidence score in `[0, 1]` and a value estimate,
//! never a proof.
//!
//! ## Bounded work
//!
//! The window is capacity-bounded and age-evicted, so detection cost is
//! independent of total mempool size. Each heuristic is one linear pass
//! over the window, nothing else.
//!
//! Heuristics in priority order:
//! 1. **Sandwich** — same pool as a recent trade in the opposite direction;
//!    confidence scales with proximity in time and relative trade size.
//! 2. **Front-run** — materially higher priority fee than a pending
//!    transaction on the same pool and function; confidence proportional to
//!    the fee delta.
//! 3. **Arbitrage / JIT / liquidation** — classified by function selector
//!    and compute magnitude, with base confidences from configuration.

use std::collections::VecDeque;

use sentinel_config::DetectorConfig;
use sentinel_types::{MevAttackType, MevThreat, Selector, Transaction, TxHash};

use crate::bloom::selectors;

/// Trade direction inferred from the function selector, where it is
/// inferable at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradeDirection {
    /// Native in, tokens out.
    Buy,
    /// Tokens in, native out.
    Sell,
}

fn trade_direction(selector: Selector) -> Option<TradeDirection> {
    match selector {
        selectors::SWAP_EXACT_ETH_FOR_TOKENS | selectors::EXACT_OUTPUT_SINGLE => {
            Some(TradeDirection::Buy)
        }
        selectors::SWAP_EXACT_TOKENS_FOR_ETH | selectors::EXACT_INPUT_SINGLE => {
            Some(TradeDirection::Sell)
        }
        _ => None,
    }
}

fn is_swap(selector: Selector) -> bool {
    matches!(
        selector,
        selectors::SWAP_EXACT_TOKENS_FOR_TOKENS
            | selectors::SWAP_EXACT_TOKENS_FOR_ETH
            | selectors::SWAP_EXACT_ETH_FOR_TOKENS
            | selectors::EXACT_INPUT_SINGLE
            | selectors::EXACT_OUTPUT_SINGLE
            | selectors::EXACT_INPUT
            | selectors::EXACT_OUTPUT
            | selectors::EXECUTE
    )
}

fn is_liquidity(selector: Selector) -> bool {
    selectors::liquidity_selectors().contains(&selector)
}

/// Compact copy of the fields the heuristics need; one entry per recently
/// accepted transaction.
#[derive(Debug, Clone)]
struct WindowEntry {
    hash: TxHash,
    sender_key: u64,
    pool_key: u64,
    selector: Selector,
    priority_fee: u64,
    value: u128,
    seen_at_ns: u64,
}

impl WindowEntry {
    fn from_tx(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash,
            sender_key: tx.from.as_key(),
            pool_key: tx.to.as_key(),
            selector: tx.selector(),
            priority_fee: tx.priority_fee(),
            value: tx.value,
            seen_at_ns: tx.seen_at_ns,
        }
    }
}

/// Bounded, time-ordered window of recently classified transactions. The
/// struct itself is single-threaded; the engine shares one instance across
/// its workers behind a mutex.
pub struct RecentWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
    max_age_ns: u64,
}

impl RecentWindow {
    pub fn new(capacity: usize, max_age_ns: u64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_age_ns,
        }
    }

    /// Record a transaction, evicting by capacity and by age.
    pub fn record(&mut self, tx: &Transaction, now_ns: u64) {
        self.evict(now_ns);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry::from_tx(tx));
    }

    fn evict(&mut self, now_ns: u64) {
        while let Some(front) = self.entries.front() {
            if now_ns.saturating_sub(front.seen_at_ns) > self.max_age_ns {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stateless heuristic engine; per-worker window state lives in
/// [`RecentWindow`].
pub struct ThreatDetectionEngine {
    config: DetectorConfig,
}

impl ThreatDetectionEngine {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Confidence threshold above which a threat is worth acting on.
    pub fn threshold(&self) -> f64 {
        self.config.detection_threshold
    }

    /// Analyze one transaction against the recent window. Returns every
    /// pattern with nonzero confidence; the caller applies the actionable
    /// threshold.
    pub fn detect(&self, tx: &Transaction, window: &RecentWindow, now_ns: u64) -> Vec<MevThreat> {
        let mut threats = Vec::new();
        if let Some(threat) = self.detect_sandwich(tx, window, now_ns) {
            threats.push(threat);
        }
        if let Some(threat) = self.detect_frontrun(tx, window, now_ns) {
            threats.push(threat);
        }
        if let Some(threat) = self.classify_by_selector(tx, window, now_ns) {
            threats.push(threat);
        }
        threats
    }

    fn value_usd(&self, wei: u128) -> f64 {
        (wei as f64 / 1e18) * self.config.native_token_usd
    }

    /// Proximity factor in (0, 1]: entries at the old edge of the window
    /// contribute half as much as brand-new ones.
    fn proximity(&self, entry_seen_ns: u64, now_ns: u64) -> f64 {
        let age = now_ns.saturating_sub(entry_seen_ns) as f64;
        let span = (self.config.window_max_age_ms as f64) * 1e6;
        1.0 - 0.5 * (age / span).min(1.0)
    }

    fn detect_sandwich(
        &self,
        tx: &Transaction,
        window: &RecentWindow,
        now_ns: u64,
    ) -> Option<MevThreat> {
        let direction = trade_direction(tx.selector())?;
        let pool_key = tx.to.as_key();

        let mut confidence = 0.0;
        let mut related = Vec::new();

        for entry in &window.entries {
            if entry.pool_key != pool_key {
                continue;
            }
            let Some(entry_dir) = trade_direction(entry.selector) else {
                continue;
            };
            if entry_dir == direction {
                continue;
            }
            // Opposite-direction trade on the same pool inside the window:
            // the closer and the larger relative to us, the stronger the
            // signal. A reversal from the same sender is the attacker
            // closing their own position and counts at full weight.
            let size_ratio = if tx.value == 0 {
                1.0
            } else {
                (entry.value as f64 / tx.value as f64).min(1.0)
            };
            let sender_factor = if entry.sender_key == tx.from.as_key() {
                1.0
            } else {
                0.5
            };
            let scale =
                self.proximity(entry.seen_at_ns, now_ns) * (0.5 + 0.5 * size_ratio) * sender_factor;
            confidence += self.config.sandwich_opposite_direction_weight * scale;
            related.push(entry.hash);
        }

        if related.is_empty() {
            return None;
        }

        // Large trades with an opposite-direction partner are the classic
        // sandwich shape.
        if tx.value >= self.config.sandwich_large_trade_wei {
            confidence += self.config.sandwich_large_trade_weight;
        }

        let estimated_value_usd = self.value_usd(tx.value) * self.config.sandwich_loss_fraction;
        related.push(tx.hash);
        Some(
            MevThreat {
                attack_type: MevAttackType::Sandwich,
                confidence,
                estimated_value_usd,
                detected_at_ns: now_ns,
                related,
            }
            .clamp_confidence(),
        )
    }

    fn detect_frontrun(
        &self,
        tx: &Transaction,
        window: &RecentWindow,
        now_ns: u64,
    ) -> Option<MevThreat> {
        if !is_swap(tx.selector()) {
            return None;
        }
        let pool_key = tx.to.as_key();
        let priority_fee = tx.priority_fee();

        let mut confidence = 0.0;
        let mut related = Vec::new();

        for entry in &window.entries {
            if entry.pool_key != pool_key || entry.selector != tx.selector() {
                continue;
            }
            if entry.priority_fee == 0 {
                continue;
            }
            let fee_ratio = priority_fee as f64 / entry.priority_fee as f64;
            if fee_ratio < self.config.frontrun_fee_delta_ratio {
                continue;
            }
            // Proportional to how far above the already-pending fee we bid.
            let delta = (fee_ratio - 1.0).min(1.0);
            confidence += self.config.frontrun_match_weight * delta
                * self.proximity(entry.seen_at_ns, now_ns);
            related.push(entry.hash);
        }

        if related.is_empty() {
            return None;
        }

        if tx.value >= self.config.frontrun_high_value_wei {
            confidence += self.config.frontrun_high_value_weight;
        }

        let estimated_value_usd = self.value_usd(tx.value) * self.config.frontrun_value_fraction;
        related.push(tx.hash);
        Some(
            MevThreat {
                attack_type: MevAttackType::FrontRun,
                confidence,
                estimated_value_usd,
                detected_at_ns: now_ns,
                related,
            }
            .clamp_confidence(),
        )
    }

    /// Selector + compute-magnitude classification for the patterns that do
    /// not need a counterparty in the window.
    fn classify_by_selector(
        &self,
        tx: &Transaction,
        window: &RecentWindow,
        now_ns: u64,
    ) -> Option<MevThreat> {
        let selector = tx.selector();

        // JIT liquidity: liquidity add/remove while a large swap on the
        // same pool sits in the window.
        if is_liquidity(selector) {
            let pool_key = tx.to.as_key();
            let partner = window.entries.iter().find(|entry| {
                entry.pool_key == pool_key
                    && is_swap(entry.selector)
                    && entry.value >= self.config.jit_min_swap_wei
            })?;
            let estimated_value_usd =
                self.value_usd(partner.value) * self.config.jit_value_fraction;
            return Some(MevThreat {
                attack_type: MevAttackType::JitLiquidity,
                confidence: self.config.jit_liquidity_weight,
                estimated_value_usd,
                detected_at_ns: now_ns,
                related: vec![partner.hash, tx.hash],
            });
        }

        // Liquidation: dedicated selector, or any market call whose compute
        // demand is far beyond a simple swap.
        if selector == selectors::LIQUIDATION_CALL
            || (tx.gas_limit >= self.config.liquidation_min_gas_limit && !is_swap(selector))
        {
            let estimated_value_usd =
                self.value_usd(tx.value) * self.config.liquidation_value_fraction;
            return Some(MevThreat {
                attack_type: MevAttackType::Liquidation,
                confidence: self.config.liquidation_base_confidence,
                estimated_value_usd,
                detected_at_ns: now_ns,
                related: vec![tx.hash],
            });
        }

        // Arbitrage: large swap with no victim relationship required.
        if is_swap(selector) && tx.value >= self.config.arbitrage_min_value_wei {
            let estimated_value_usd =
                self.value_usd(tx.value) * self.config.arbitrage_value_fraction;
            return Some(MevThreat {
                attack_type: MevAttackType::Arbitrage,
                confidence: self.config.arbitrage_base_confidence,
                estimated_value_usd,
                detected_at_ns: now_ns,
                related: vec![tx.hash],
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::{Address, TxHash};

    fn engine() -> ThreatDetectionEngine {
        ThreatDetectionEngine::new(DetectorConfig::default())
    }

    fn window() -> RecentWindow {
        let config = DetectorConfig::default();
        RecentWindow::new(config.window_capacity, config.window_max_age_ms * 1_000_000)
    }

    fn tx(
        hash_byte: u8,
        sender: u8,
        pool: u8,
        selector: Selector,
        priority_fee: u64,
        value: u128,
        seen_at_ns: u64,
    ) -> Transaction {
        Transaction::new(
            TxHash([hash_byte; 32]),
            Address([sender; 20]),
            Address([pool; 20]),
            0,
            priority_fee,
            priority_fee,
            priority_fee,
            200_000,
            selector.to_be_bytes(),
            value,
            seen_at_ns,
        )
    }

    const GWEI: u64 = 1_000_000_000;
    const ETH: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn sandwich_flagged_on_reversed_direction_same_pool() {
        let engine = engine();
        let mut window = window();

        let buy = tx(1, 10, 42, selectors::SWAP_EXACT_ETH_FOR_TOKENS, 2 * GWEI, 60 * ETH, 0);
        window.record(&buy, 0);

        let sell = tx(2, 11, 42, selectors::SWAP_EXACT_TOKENS_FOR_ETH, 2 * GWEI, 60 * ETH, 1000);
        let threats = engine.detect(&sell, &window, 1000);

        let sandwich = threats
            .iter()
            .find(|t| t.attack_type == MevAttackType::Sandwich)
            .expect("sandwich threat expected");
        assert!(sandwich.confidence > 0.0);
        assert!(sandwich.estimated_value_usd > 0.0);
        assert!(sandwich.related.contains(&buy.hash));
    }

    #[test]
    fn same_sender_reversal_scores_higher() {
        let engine = engine();
        let mut window = window();
        let buy = tx(1, 10, 42, selectors::SWAP_EXACT_ETH_FOR_TOKENS, 2 * GWEI, 10 * ETH, 0);
        window.record(&buy, 0);

        let conf = |sender: u8| {
            let sell = tx(2, sender, 42, selectors::SWAP_EXACT_TOKENS_FOR_ETH, 2 * GWEI, 10 * ETH, 500);
            engine
                .detect(&sell, &window, 500)
                .into_iter()
                .find(|t| t.attack_type == MevAttackType::Sandwich)
                .map(|t| t.confidence)
                .unwrap_or(0.0)
        };
        assert!(conf(10) > conf(11));
    }

    #[test]
    fn no_sandwich_across_different_pools() {
        let engine = engine();
        let mut window = window();
        let buy = tx(1, 10, 42, selectors::SWAP_EXACT_ETH_FOR_TOKENS, 2 * GWEI, 60 * ETH, 0);
        window.record(&buy, 0);

        let sell = tx(2, 11, 99, selectors::SWAP_EXACT_TOKENS_FOR_ETH, 2 * GWEI, 60 * ETH, 1000);
        let threats = engine.detect(&sell, &window, 1000);
        assert!(!threats
            .iter()
            .any(|t| t.attack_type == MevAttackType::Sandwich));
    }

    #[test]
    fn frontrun_confidence_grows_with_fee_delta() {
        let engine = engine();
        let mut window = window();
        let victim = tx(1, 10, 42, selectors::EXACT_INPUT, 2 * GWEI, 30 * ETH, 0);
        window.record(&victim, 0);

        let modest = tx(2, 11, 42, selectors::EXACT_INPUT, 3 * GWEI, 30 * ETH, 500);
        let aggressive = tx(3, 12, 42, selectors::EXACT_INPUT, 10 * GWEI, 30 * ETH, 500);

        let conf = |t: &Transaction| {
            engine
                .detect(t, &window, 500)
                .into_iter()
                .find(|th| th.attack_type == MevAttackType::FrontRun)
                .map(|th| th.confidence)
                .unwrap_or(0.0)
        };
        let modest_conf = conf(&modest);
        let aggressive_conf = conf(&aggressive);
        assert!(modest_conf > 0.0);
        assert!(aggressive_conf > modest_conf);
    }

    #[test]
    fn small_fee_bump_is_not_a_frontrun() {
        let engine = engine();
        let mut window = window();
        let victim = tx(1, 10, 42, selectors::EXACT_INPUT, 100 * GWEI, 30 * ETH, 0);
        window.record(&victim, 0);

        // 5% above: below the 1.1x materiality ratio.
        let bump = tx(2, 11, 42, selectors::EXACT_INPUT, 105 * GWEI, 30 * ETH, 100);
        assert!(!engine
            .detect(&bump, &window, 100)
            .iter()
            .any(|t| t.attack_type == MevAttackType::FrontRun));
    }

    #[test]
    fn large_swap_classified_as_arbitrage() {
        let engine = engine();
        let window = window();
        let swap = tx(1, 10, 42, selectors::SWAP_EXACT_TOKENS_FOR_TOKENS, 2 * GWEI, 10 * ETH, 0);
        let threats = engine.detect(&swap, &window, 0);
        let arb = threats
            .iter()
            .find(|t| t.attack_type == MevAttackType::Arbitrage)
            .expect("arbitrage classification expected");
        assert_eq!(arb.confidence, 0.3);
    }

    #[test]
    fn jit_requires_large_swap_partner() {
        let engine = engine();
        let mut window = window();

        let add = tx(1, 10, 42, selectors::ADD_LIQUIDITY, 2 * GWEI, ETH, 100);
        assert!(engine.detect(&add, &window, 100).is_empty());

        let swap = tx(2, 11, 42, selectors::EXACT_INPUT, 2 * GWEI, 60 * ETH, 0);
        window.record(&swap, 0);
        let threats = engine.detect(&add, &window, 100);
        assert!(threats
            .iter()
            .any(|t| t.attack_type == MevAttackType::JitLiquidity));
    }

    #[test]
    fn liquidation_selector_is_flagged() {
        let engine = engine();
        let window = window();
        let liq = tx(1, 10, 42, selectors::LIQUIDATION_CALL, 2 * GWEI, 5 * ETH, 0);
        let threats = engine.detect(&liq, &window, 0);
        assert!(threats
            .iter()
            .any(|t| t.attack_type == MevAttackType::Liquidation));
    }

    #[test]
    fn window_evicts_by_age_and_capacity() {
        let mut window = RecentWindow::new(2, 1_000);
        let a = tx(1, 1, 1, selectors::EXACT_INPUT, GWEI, ETH, 0);
        let b = tx(2, 1, 1, selectors::EXACT_INPUT, GWEI, ETH, 10);
        let c = tx(3, 1, 1, selectors::EXACT_INPUT, GWEI, ETH, 20);
        window.record(&a, 0);
        window.record(&b, 10);
        window.record(&c, 20); // capacity 2: evicts a
        assert_eq!(window.len(), 2);

        let d = tx(4, 1, 1, selectors::EXACT_INPUT, GWEI, ETH, 5_000);
        window.record(&d, 5_000); // age: evicts b and c
        assert_eq!(window.len(), 1);
    }
}
