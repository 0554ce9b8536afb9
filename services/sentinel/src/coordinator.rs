//! Bundle coordination
//!
//! ## Purpose
//!
//! Owns the bundle lifecycle from creation to a terminal state. Validates
//! bundle shape, assigns target slots from the slot clock, computes tips,
//! applies the protection policy (shuffling, decoys, jitter), and reconciles
//! relay-reported dispositions into the status machine.
//!
//! ## Lifecycle
//!
//! ```text
//! create_bundle -> Pending -> submit -> Submitted -> Confirmed | Failed | Expired
//!                     \-> Cancelled | Expired
//! ```
//!
//! Status transitions go through `PendingBundle::transition`, which enforces
//! the legal-transition matrix; terminal bundles move to a bounded history
//! ring so `status_of` keeps answering after the active table forgets them.
//! Listeners fire on every transition, always outside the table lock.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{debug, info, warn};

use sentinel_config::BundleConfig;
use sentinel_types::{
    BundleError, BundleId, BundleStatus, PendingBundle, SignedTransaction,
};

use crate::metrics::PipelineMetrics;
use crate::protection::{ProtectionLevel, ProtectionStrategySelector};
use crate::relay::{RelayBundle, RelayStatus, ReceiptId};
use crate::slot_clock::SlotClock;

/// Default compute estimate for a transaction that did not declare one.
const DEFAULT_COMPUTE_UNITS: u64 = 200_000;

/// Callback invoked on every bundle status transition. Shared so the
/// coordinator can snapshot the list and invoke outside its locks.
pub type StatusListener = Arc<dyn Fn(BundleId, BundleStatus) + Send + Sync>;

/// Work item handed to the relay worker.
#[derive(Debug)]
pub struct SubmissionRequest {
    pub bundle_id: BundleId,
    /// Stealth delay before the bundle goes on the wire.
    pub jitter: Option<Duration>,
}

/// Active bundle plus the protection level it was created under; the level
/// drives jitter and decoy decisions at submission time.
struct Tracked {
    bundle: PendingBundle,
    level: ProtectionLevel,
}

/// Relay acceptance tracking for dynamic tips.
#[derive(Debug, Default)]
struct AcceptanceStats {
    attempts: u64,
    accepted: u64,
}

impl AcceptanceStats {
    /// Fraction of recent submissions the relay accepted; optimistic 1.0
    /// before any data.
    fn rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.accepted as f64 / self.attempts as f64
        }
    }
}

pub struct BundleCoordinator {
    config: BundleConfig,
    slot_clock: Arc<SlotClock>,
    metrics: Arc<PipelineMetrics>,
    selector: ProtectionStrategySelector,
    bundles: Mutex<HashMap<BundleId, Tracked>>,
    /// Terminal bundles, newest last. Bounded by `config.history_limit`.
    history: Mutex<VecDeque<(BundleId, BundleStatus)>>,
    listeners: Mutex<Vec<StatusListener>>,
    acceptance: Mutex<AcceptanceStats>,
    submissions: mpsc::Sender<SubmissionRequest>,
}

impl BundleCoordinator {
    pub fn new(
        config: BundleConfig,
        slot_clock: Arc<SlotClock>,
        metrics: Arc<PipelineMetrics>,
        selector: ProtectionStrategySelector,
        submissions: mpsc::Sender<SubmissionRequest>,
    ) -> Self {
        Self {
            config,
            slot_clock,
            metrics,
            selector,
            bundles: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(16)),
            listeners: Mutex::new(Vec::new()),
            acceptance: Mutex::new(AcceptanceStats::default()),
            submissions,
        }
    }

    /// Register a status listener. Listeners run on whichever thread drives
    /// the transition, after every coordinator lock has been released, so
    /// they may call back into the coordinator.
    pub fn add_listener(&self, listener: StatusListener) {
        self.listeners.lock().push(listener);
    }

    /// Validate and register a new bundle in `Pending` state.
    pub fn create_bundle(
        &self,
        mut transactions: Vec<SignedTransaction>,
        level: ProtectionLevel,
        now_ns: u64,
    ) -> Result<BundleId, BundleError> {
        if transactions.is_empty() {
            return Err(BundleError::Empty);
        }
        if transactions.len() > self.config.max_bundle_size {
            return Err(BundleError::TooManyTransactions {
                count: transactions.len(),
                max: self.config.max_bundle_size,
            });
        }
        let compute_units: u64 = transactions
            .iter()
            .map(|tx| {
                if tx.compute_units == 0 {
                    DEFAULT_COMPUTE_UNITS
                } else {
                    tx.compute_units
                }
            })
            .sum();
        if compute_units > self.config.max_compute_units {
            return Err(BundleError::ComputeBudgetExceeded {
                units: compute_units,
                max: self.config.max_compute_units,
            });
        }

        let policy = self.selector.policy_for(level);
        // Ordering of the first and last entries is what makes a protection
        // bundle work; only the interior may be shuffled.
        if policy.shuffle_noncritical && transactions.len() > 2 {
            let end = transactions.len() - 1;
            transactions[1..end].shuffle(&mut rand::thread_rng());
        }

        let estimated_value_usd: f64 = transactions
            .iter()
            .map(|tx| tx.estimated_value_usd)
            .sum();
        let now_ms = now_ns / 1_000_000;
        let target_slot = self.slot_clock.next_target_slot(now_ms);
        let tip = self.compute_tip(level, estimated_value_usd);

        let id = BundleId::generate();
        let bundle = PendingBundle {
            id,
            transactions,
            target_slot,
            created_at_ns: now_ns,
            tip,
            status: BundleStatus::Pending,
            compute_units,
            estimated_value_usd,
            receipt_id: None,
        };
        info!(
            "📦 Bundle {} created: {} txs, slot {}, tip {} ({})",
            id,
            bundle.transactions.len(),
            target_slot,
            tip,
            level
        );
        self.bundles.lock().insert(id, Tracked { bundle, level });
        self.metrics
            .bundles_created
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(id)
    }

    /// Tip in lamport-denominated relay units. Monotone non-decreasing in
    /// both protection priority and protected value, capped at `max_tip`.
    fn compute_tip(&self, level: ProtectionLevel, estimated_value_usd: f64) -> u64 {
        let policy = self.selector.policy_for(level);
        let base = self.config.base_tip * (1 + level.priority() as u64);
        let value_component = (estimated_value_usd * self.config.tip_per_value_usd) as u64;
        let mut tip = base.saturating_add(value_component);
        if policy.dynamic_tip {
            // Falling acceptance pushes the tip up, factor in [1.0, 2.0].
            let factor = 2.0 - self.acceptance.lock().rate();
            tip = (tip as f64 * factor) as u64;
        }
        tip.min(self.config.max_tip).max(self.config.base_tip)
    }

    /// Queue a pending bundle for relay submission. Transitions it to
    /// `Submitted` and hands it to the relay worker; when `wait` is set,
    /// blocks up to the submission timeout and reports the status reached.
    pub fn submit(&self, id: BundleId, wait: bool) -> Result<BundleStatus, BundleError> {
        let jitter = {
            let mut bundles = self.bundles.lock();
            let tracked = bundles.get_mut(&id).ok_or(BundleError::NotFound { id })?;
            tracked.bundle.transition(BundleStatus::Submitted)?;
            self.selector
                .sample_jitter(&self.selector.policy_for(tracked.level))
        };
        self.notify(id, BundleStatus::Submitted);

        if self
            .submissions
            .send(SubmissionRequest {
                bundle_id: id,
                jitter,
            })
            .is_err()
        {
            // Relay worker gone: fail the bundle rather than strand it.
            warn!("❌ Relay worker unavailable, failing bundle {}", id);
            self.finalize(id, BundleStatus::Failed).ok();
            return Ok(BundleStatus::Failed);
        }

        if !wait {
            return Ok(BundleStatus::Submitted);
        }

        let deadline = std::time::Instant::now()
            + Duration::from_millis(self.config.submission_timeout_ms);
        loop {
            let status = self.status_of(id).unwrap_or(BundleStatus::Failed);
            if status.is_terminal() || std::time::Instant::now() >= deadline {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Cancel a bundle that has not yet been handed to the relay. The
    /// single `Pending -> Cancelled` transition happens inside `finalize`
    /// so the bundle also moves to history, counts, and notifies.
    pub fn cancel(&self, id: BundleId) -> Result<(), BundleError> {
        self.finalize(id, BundleStatus::Cancelled)
    }

    /// Status lookup covering both active bundles and the terminal history.
    pub fn status_of(&self, id: BundleId) -> Option<BundleStatus> {
        if let Some(tracked) = self.bundles.lock().get(&id) {
            return Some(tracked.bundle.status);
        }
        self.history
            .lock()
            .iter()
            .rev()
            .find(|(hid, _)| *hid == id)
            .map(|(_, status)| *status)
    }

    pub fn active_count(&self) -> usize {
        self.bundles.lock().len()
    }

    // --- relay worker interface -------------------------------------------

    /// Wire form of a bundle for relay submission.
    pub fn wire_bundle(&self, id: BundleId) -> Option<RelayBundle> {
        let bundles = self.bundles.lock();
        let bundle = &bundles.get(&id)?.bundle;
        Some(RelayBundle {
            id,
            payloads: bundle
                .transactions
                .iter()
                .map(|tx| format!("0x{}", hex::encode(&tx.payload)))
                .collect(),
            target_slot: bundle.target_slot,
            tip: bundle.tip,
        })
    }

    /// Decoy bundles accompanying a stealth/high submission: same shape and
    /// tip, random payloads. Their receipts are never tracked.
    pub fn decoy_bundles(&self, id: BundleId) -> Vec<RelayBundle> {
        let (target_slot, tip, payload_count, level) = {
            let bundles = self.bundles.lock();
            match bundles.get(&id) {
                Some(t) => (
                    t.bundle.target_slot,
                    t.bundle.tip,
                    t.bundle.transactions.len(),
                    t.level,
                ),
                None => return Vec::new(),
            }
        };
        let policy = self.selector.policy_for(level);
        let mut rng = rand::thread_rng();
        (0..policy.decoy_count)
            .map(|_| RelayBundle {
                id: BundleId::generate(),
                payloads: (0..payload_count)
                    .map(|_| {
                        let mut bytes = [0u8; 64];
                        rng.fill_bytes(&mut bytes);
                        format!("0x{}", hex::encode(bytes))
                    })
                    .collect(),
                target_slot,
                tip,
            })
            .collect()
    }

    /// Relay accepted the bundle.
    pub fn record_receipt(&self, id: BundleId, receipt: ReceiptId) {
        let mut bundles = self.bundles.lock();
        if let Some(tracked) = bundles.get_mut(&id) {
            tracked.bundle.receipt_id = Some(receipt);
            self.metrics
                .bundles_submitted
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        let mut acceptance = self.acceptance.lock();
        acceptance.attempts += 1;
        acceptance.accepted += 1;
    }

    /// Relay submission failed outright.
    pub fn record_submission_failure(&self, id: BundleId) {
        {
            let mut acceptance = self.acceptance.lock();
            acceptance.attempts += 1;
        }
        self.finalize(id, BundleStatus::Failed).ok();
    }

    /// Submitted bundles with receipts, for the reconciliation poll.
    pub fn receipts_to_poll(&self) -> Vec<(BundleId, ReceiptId)> {
        self.bundles
            .lock()
            .iter()
            .filter(|(_, t)| t.bundle.status == BundleStatus::Submitted)
            .filter_map(|(id, t)| t.bundle.receipt_id.clone().map(|r| (*id, r)))
            .collect()
    }

    /// Fold a relay-reported disposition into the status machine.
    pub fn apply_relay_status(&self, id: BundleId, status: RelayStatus) {
        match status {
            RelayStatus::Pending => {}
            RelayStatus::Included { slot } => {
                debug!("Bundle {} landed in slot {}", id, slot);
                let (tip, value) = {
                    let bundles = self.bundles.lock();
                    match bundles.get(&id) {
                        Some(t) => (t.bundle.tip, t.bundle.estimated_value_usd),
                        None => return,
                    }
                };
                if self.finalize(id, BundleStatus::Confirmed).is_ok() {
                    self.metrics
                        .tips_paid
                        .fetch_add(tip, std::sync::atomic::Ordering::Relaxed);
                    self.metrics.record_value_protected(value);
                }
            }
            RelayStatus::Rejected { reason } => {
                warn!("❌ Bundle {} rejected by relay: {}", id, reason);
                self.finalize(id, BundleStatus::Failed).ok();
            }
        }
    }

    /// Deadline sweep, run by the relay worker each poll cycle:
    /// - `Pending` bundles with no activity before the submission timeout
    ///   expire;
    /// - `Submitted` bundles the relay never acknowledged within the
    ///   submission timeout fail (not silently dropped);
    /// - acknowledged bundles whose target slot passed without a
    ///   confirmation inside the confirmation window expire.
    pub fn expire_overdue(&self, now_ns: u64) {
        let now_ms = now_ns / 1_000_000;
        let submission_timeout_ns = self.config.submission_timeout_ms * 1_000_000;
        let confirmation_window_ns = self.config.confirmation_window_ms * 1_000_000;

        let overdue: Vec<(BundleId, BundleStatus)> = {
            let bundles = self.bundles.lock();
            bundles
                .iter()
                .filter_map(|(id, t)| {
                    let age_ns = now_ns.saturating_sub(t.bundle.created_at_ns);
                    let terminal = match t.bundle.status {
                        BundleStatus::Pending if age_ns > submission_timeout_ns => {
                            BundleStatus::Expired
                        }
                        BundleStatus::Submitted
                            if t.bundle.receipt_id.is_none()
                                && age_ns > submission_timeout_ns =>
                        {
                            BundleStatus::Failed
                        }
                        BundleStatus::Submitted
                            if self.slot_clock.slot_passed(t.bundle.target_slot, now_ms)
                                && age_ns > confirmation_window_ns =>
                        {
                            BundleStatus::Expired
                        }
                        _ => return None,
                    };
                    Some((*id, terminal))
                })
                .collect()
        };
        for (id, terminal) in overdue {
            debug!("Bundle {} overdue, marking {}", id, terminal);
            self.finalize(id, terminal).ok();
        }
    }

    /// Drive a bundle to a terminal state, move it to history, bump the
    /// matching counter, and notify listeners. Background callers discard
    /// the error so racing relay reports cannot corrupt state; `cancel`
    /// surfaces it.
    fn finalize(&self, id: BundleId, terminal: BundleStatus) -> Result<(), BundleError> {
        debug_assert!(terminal.is_terminal());
        {
            let mut bundles = self.bundles.lock();
            let tracked = bundles.get_mut(&id).ok_or(BundleError::NotFound { id })?;
            tracked.bundle.transition(terminal)?;
            bundles.remove(&id);
            let mut history = self.history.lock();
            if history.len() == self.config.history_limit {
                history.pop_front();
            }
            history.push_back((id, terminal));
        }
        let counter = match terminal {
            BundleStatus::Confirmed => &self.metrics.bundles_landed,
            BundleStatus::Failed => &self.metrics.bundles_failed,
            BundleStatus::Expired => &self.metrics.bundles_expired,
            BundleStatus::Cancelled => &self.metrics.bundles_cancelled,
            _ => unreachable!("finalize called with non-terminal status"),
        };
        counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.notify(id, terminal);
        Ok(())
    }

    fn notify(&self, id: BundleId, status: BundleStatus) {
        // Clone the list under the lock, invoke after releasing it, so a
        // listener can re-enter the coordinator or register more listeners.
        let listeners: Vec<StatusListener> = self.listeners.lock().clone();
        for listener in &listeners {
            listener(id, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_config::SlotConfig;
    use sentinel_types::{SlotInfo, TxHash};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signed_tx(byte: u8, compute: u64, value_usd: f64) -> SignedTransaction {
        SignedTransaction {
            hash: TxHash([byte; 32]),
            payload: vec![byte; 32],
            compute_units: compute,
            estimated_value_usd: value_usd,
        }
    }

    struct Fixture {
        coordinator: BundleCoordinator,
        requests: mpsc::Receiver<SubmissionRequest>,
    }

    fn fixture() -> Fixture {
        fixture_with(BundleConfig::default())
    }

    fn fixture_with(config: BundleConfig) -> Fixture {
        let slot_clock = Arc::new(SlotClock::new(&SlotConfig::default()));
        slot_clock.observe_slot(SlotInfo::new(100, 0), 0);
        let metrics = Arc::new(PipelineMetrics::default());
        let selector = ProtectionStrategySelector::new(
            ProtectionLevel::Standard,
            Duration::from_millis(250),
        );
        let (tx, rx) = mpsc::channel();
        Fixture {
            coordinator: BundleCoordinator::new(config, slot_clock, metrics, selector, tx),
            requests: rx,
        }
    }

    #[test]
    fn create_validates_shape() {
        let f = fixture();
        assert!(matches!(
            f.coordinator
                .create_bundle(Vec::new(), ProtectionLevel::Standard, 0),
            Err(BundleError::Empty)
        ));

        let too_many: Vec<_> = (0..6).map(|i| signed_tx(i, 100_000, 1.0)).collect();
        assert!(matches!(
            f.coordinator
                .create_bundle(too_many, ProtectionLevel::Standard, 0),
            Err(BundleError::TooManyTransactions { count: 6, max: 5 })
        ));

        let heavy = vec![signed_tx(1, 8_000_000, 1.0)];
        assert!(matches!(
            f.coordinator
                .create_bundle(heavy, ProtectionLevel::Standard, 0),
            Err(BundleError::ComputeBudgetExceeded { .. })
        ));
        assert_eq!(f.coordinator.active_count(), 0);
    }

    #[test]
    fn created_bundle_targets_a_future_slot() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        let wire = f.coordinator.wire_bundle(id).unwrap();
        // Slot 100 observed, 2 slots of propagation lag.
        assert_eq!(wire.target_slot, 102);
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Pending));
    }

    #[test]
    fn tip_is_monotone_in_value_and_capped() {
        let f = fixture();
        let small = f.coordinator.compute_tip(ProtectionLevel::Standard, 1.0);
        let large = f.coordinator.compute_tip(ProtectionLevel::Standard, 100.0);
        let huge = f.coordinator.compute_tip(ProtectionLevel::Standard, 1e9);
        assert!(small <= large);
        assert!(large <= huge);
        assert_eq!(huge, BundleConfig::default().max_tip);
        assert!(small >= BundleConfig::default().base_tip);
    }

    #[test]
    fn falling_acceptance_raises_the_dynamic_tip() {
        let f = fixture();
        let before = f.coordinator.compute_tip(ProtectionLevel::High, 10.0);
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 1.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.submit(id, false).unwrap();
        f.coordinator.record_submission_failure(id);
        let after = f.coordinator.compute_tip(ProtectionLevel::High, 10.0);
        assert!(after > before);
    }

    #[test]
    fn submit_hands_off_and_reports_submitted() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        let status = f.coordinator.submit(id, false).unwrap();
        assert_eq!(status, BundleStatus::Submitted);
        let request = f.requests.try_recv().unwrap();
        assert_eq!(request.bundle_id, id);
    }

    #[test]
    fn double_submit_is_rejected() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.submit(id, false).unwrap();
        assert!(matches!(
            f.coordinator.submit(id, false),
            Err(BundleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_only_while_pending() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.cancel(id).unwrap();
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Cancelled));
        // Terminal: no further transitions, but status stays queryable.
        assert!(f.coordinator.cancel(id).is_err());
        assert_eq!(f.coordinator.active_count(), 0);
    }

    #[test]
    fn included_report_confirms_and_records_value() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 50.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.submit(id, false).unwrap();
        f.coordinator.record_receipt(id, "r-1".to_string());
        f.coordinator
            .apply_relay_status(id, RelayStatus::Included { slot: 102 });
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Confirmed));
        let snapshot = f.coordinator.metrics.snapshot();
        assert_eq!(snapshot.bundles_landed, 1);
        assert!(snapshot.tips_paid > 0);
        assert_eq!(snapshot.value_protected_usd, 50.0);
    }

    #[test]
    fn overdue_pending_bundle_expires() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        // Default submission timeout is 2s; nothing expires at 1s.
        f.coordinator.expire_overdue(1_000_000_000);
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Pending));
        f.coordinator.expire_overdue(3_000_000_000);
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Expired));
    }

    #[test]
    fn unacknowledged_submission_fails_after_timeout() {
        let f = fixture();
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.submit(id, false).unwrap();
        // No receipt recorded: the relay never answered.
        f.coordinator.expire_overdue(3_000_000_000);
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Failed));
    }

    #[test]
    fn listeners_observe_every_transition() {
        let f = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        f.coordinator.add_listener(Arc::new(move |_, _| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        }));
        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 10.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.submit(id, false).unwrap();
        f.coordinator.record_receipt(id, "r-1".to_string());
        f.coordinator
            .apply_relay_status(id, RelayStatus::Included { slot: 102 });
        // Submitted + Confirmed.
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn cancellation_reaches_history_metrics_and_listeners() {
        let f = fixture();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&statuses);
        f.coordinator
            .add_listener(Arc::new(move |_, status| captured.lock().push(status)));

        let id = f
            .coordinator
            .create_bundle(vec![signed_tx(1, 0, 1.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        f.coordinator.cancel(id).unwrap();

        assert_eq!(f.coordinator.active_count(), 0);
        assert_eq!(f.coordinator.status_of(id), Some(BundleStatus::Cancelled));
        assert_eq!(f.coordinator.metrics.snapshot().bundles_cancelled, 1);
        assert_eq!(*statuses.lock(), vec![BundleStatus::Cancelled]);
    }

    #[test]
    fn listener_can_reenter_the_coordinator() {
        let slot_clock = Arc::new(SlotClock::new(&SlotConfig::default()));
        slot_clock.observe_slot(SlotInfo::new(100, 0), 0);
        let metrics = Arc::new(PipelineMetrics::default());
        let selector = ProtectionStrategySelector::new(
            ProtectionLevel::Standard,
            Duration::from_millis(250),
        );
        let (tx, _rx) = mpsc::channel();
        let coordinator = Arc::new(BundleCoordinator::new(
            BundleConfig::default(),
            slot_clock,
            metrics,
            selector,
            tx,
        ));

        let first = coordinator
            .create_bundle(vec![signed_tx(1, 0, 1.0)], ProtectionLevel::Standard, 0)
            .unwrap();
        let second = coordinator
            .create_bundle(vec![signed_tx(2, 0, 1.0)], ProtectionLevel::Standard, 0)
            .unwrap();

        // Chain: submitting the first bundle triggers submission of the
        // second from inside the notification.
        let chained = Arc::clone(&coordinator);
        coordinator.add_listener(Arc::new(move |id, status| {
            if id == first && status == BundleStatus::Submitted {
                chained.submit(second, false).unwrap();
            }
        }));
        coordinator.submit(first, false).unwrap();
        assert_eq!(
            coordinator.status_of(second),
            Some(BundleStatus::Submitted)
        );
    }

    #[test]
    fn stealth_keeps_first_and_last_fixed() {
        let slot_clock = Arc::new(SlotClock::new(&SlotConfig::default()));
        slot_clock.observe_slot(SlotInfo::new(100, 0), 0);
        let metrics = Arc::new(PipelineMetrics::default());
        let selector = ProtectionStrategySelector::new(
            ProtectionLevel::Stealth,
            Duration::from_millis(0),
        );
        let (tx, _rx) = mpsc::channel();
        let coordinator = BundleCoordinator::new(
            BundleConfig::default(),
            slot_clock,
            metrics,
            selector,
            tx,
        );
        let txs: Vec<_> = (0..5).map(|i| signed_tx(i, 0, 1.0)).collect();
        let id = coordinator
            .create_bundle(txs, ProtectionLevel::Stealth, 0)
            .unwrap();
        let wire = coordinator.wire_bundle(id).unwrap();
        assert_eq!(wire.payloads[0], format!("0x{}", hex::encode(vec![0u8; 32])));
        assert_eq!(wire.payloads[4], format!("0x{}", hex::encode(vec![4u8; 32])));
    }

    #[test]
    fn history_keeps_terminal_statuses_queryable() {
        let config = BundleConfig {
            history_limit: 2,
            ..BundleConfig::default()
        };
        let f = fixture_with(config);
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = f
                .coordinator
                .create_bundle(vec![signed_tx(i, 0, 1.0)], ProtectionLevel::Standard, 0)
                .unwrap();
            f.coordinator.cancel(id).unwrap();
            ids.push(id);
        }
        // Oldest entry fell out of the bounded history.
        assert_eq!(f.coordinator.status_of(ids[0]), None);
        assert_eq!(f.coordinator.status_of(ids[2]), Some(BundleStatus::Cancelled));
    }
}
