//! Pipeline engine
//!
//! ## Purpose
//!
//! Wires the stages together and owns the threads. The admission path
//! (`ingest`) classifies and enqueues on the caller's thread in bounded
//! time; worker threads run detection; a dedicated relay thread drives
//! submission and reconciliation; a slot poller keeps the slot clock
//! moving.
//!
//! ## Threading model
//!
//! ```text
//! feed ──ingest──> [SPSC queue] ──> worker 0 (detector + window)
//!              \─> [SPSC queue] ──> worker 1 ...
//!
//! coordinator ──mpsc──> relay worker (tokio current-thread, block_on)
//! slot poller ──> slot clock
//! ```
//!
//! Each worker owns one queue's consumer side. Workers share one bounded
//! detection window behind a short-lived lock, since round-robin admission
//! can split a sandwich pair across workers. The only async code in the
//! process lives inside the relay worker thread.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use sentinel_config::SentinelConfig;
use sentinel_types::{
    BundleError, BundleId, BundleStatus, MevThreat, SignedTransaction, SlotInfo, Transaction,
};

use crate::bloom::BloomPreFilter;
use crate::classifier::{TransactionClassifier, Verdict};
use crate::coordinator::{BundleCoordinator, StatusListener, SubmissionRequest};
use crate::detector::{RecentWindow, ThreatDetectionEngine};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::protection::{ProtectionLevel, ProtectionStrategySelector};
use crate::relay::RelayClient;
use crate::ring::IngestionQueue;
use crate::slot_clock::SlotClock;

/// Callback invoked for every actionable threat. Shared so workers can
/// snapshot the list and invoke outside the listeners lock.
pub type ThreatListener = Arc<dyn Fn(&MevThreat) + Send + Sync>;

/// Bounded store of recently detected threats for `recent_threats`.
const THREAT_HISTORY_LIMIT: usize = 512;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

pub struct SentinelEngine {
    config: SentinelConfig,
    classifier: Arc<TransactionClassifier>,
    detector: Arc<ThreatDetectionEngine>,
    coordinator: Arc<BundleCoordinator>,
    selector: ProtectionStrategySelector,
    slot_clock: Arc<SlotClock>,
    metrics: Arc<PipelineMetrics>,
    relay: Arc<dyn RelayClient>,
    queues: Vec<Arc<IngestionQueue<Transaction>>>,
    next_queue: AtomicUsize,
    /// Recent-transaction window shared by the detection workers.
    window: Arc<Mutex<RecentWindow>>,
    threats: Arc<Mutex<std::collections::VecDeque<MevThreat>>>,
    threat_listeners: Arc<Mutex<Vec<ThreatListener>>>,
    running: Arc<AtomicBool>,
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
    /// Receiver side of the submission channel, taken by the relay worker
    /// at startup.
    submission_rx: Mutex<Option<mpsc::Receiver<SubmissionRequest>>>,
}

impl SentinelEngine {
    pub fn new(config: SentinelConfig, relay: Arc<dyn RelayClient>) -> anyhow::Result<Self> {
        config.validate()?;

        let bloom = Arc::new(BloomPreFilter::with_market_selectors(
            config.filter.bloom_bits,
            config.filter.bloom_hashes,
            &config.filter.selector_overrides()?,
        ));
        let classifier = Arc::new(TransactionClassifier::new(&config.filter, bloom)?);
        let detector = Arc::new(ThreatDetectionEngine::new(config.detector.clone()));
        let slot_clock = Arc::new(SlotClock::new(&config.slots));
        let metrics = Arc::new(PipelineMetrics::default());

        let default_level: ProtectionLevel = config.bundles.default_protection_level.parse()?;
        let stealth_jitter = Duration::from_millis(config.bundles.stealth_max_jitter_ms);
        let (submission_tx, submission_rx) = mpsc::channel();
        let coordinator = Arc::new(BundleCoordinator::new(
            config.bundles.clone(),
            Arc::clone(&slot_clock),
            Arc::clone(&metrics),
            ProtectionStrategySelector::new(default_level, stealth_jitter),
            submission_tx,
        ));
        let selector = ProtectionStrategySelector::new(default_level, stealth_jitter);

        let queues = (0..config.engine.worker_threads)
            .map(|_| Arc::new(IngestionQueue::with_capacity(config.engine.queue_capacity)))
            .collect();
        let window = Arc::new(Mutex::new(RecentWindow::new(
            config.detector.window_capacity,
            config.detector.window_max_age_ms * 1_000_000,
        )));

        Ok(Self {
            config,
            classifier,
            detector,
            coordinator,
            selector,
            slot_clock,
            metrics,
            relay,
            queues,
            next_queue: AtomicUsize::new(0),
            window,
            threats: Arc::new(Mutex::new(std::collections::VecDeque::with_capacity(
                THREAT_HISTORY_LIMIT,
            ))),
            threat_listeners: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            submission_rx: Mutex::new(Some(submission_rx)),
        })
    }

    /// Admit one observed transaction. Returns `true` if it was accepted
    /// and enqueued. Runs entirely on the caller's thread, never blocks,
    /// and may be called from multiple feed threads concurrently.
    pub fn ingest(&self, tx: Transaction) -> bool {
        self.metrics
            .transactions_seen
            .fetch_add(1, Ordering::Relaxed);

        match self.classifier.classify(&tx, now_ns()) {
            Verdict::Reject(reason) => {
                self.metrics.record_rejection(reason);
                return false;
            }
            Verdict::Accept => {}
        }

        let index = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        if self.queues[index].push(tx).is_err() {
            self.metrics.queue_overflows.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let depth: usize = self.queues.iter().map(|q| q.len()).sum();
        self.metrics
            .queue_depth
            .store(depth as u64, Ordering::Relaxed);
        true
    }

    /// Spawn worker, relay, and slot poller threads. Idempotent start is
    /// not supported; call once.
    pub fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::Release);
        let mut handles = self.handles.lock();

        for (index, queue) in self.queues.iter().enumerate() {
            handles.push(self.spawn_worker(index, Arc::clone(queue))?);
        }
        if let Some(rx) = self.submission_rx.lock().take() {
            handles.push(self.spawn_relay_worker(rx)?);
        }
        handles.push(self.spawn_slot_poller()?);
        info!(
            "🚀 Sentinel engine started: {} workers, queue capacity {}",
            self.queues.len(),
            self.queues[0].capacity()
        );
        Ok(())
    }

    /// Stop all threads and wait for them to finish.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("❌ Pipeline thread panicked during shutdown");
            }
        }
        info!("✅ Sentinel engine stopped");
    }

    fn spawn_worker(
        &self,
        index: usize,
        queue: Arc<IngestionQueue<Transaction>>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        let running = Arc::clone(&self.running);
        let detector = Arc::clone(&self.detector);
        let metrics = Arc::clone(&self.metrics);
        let threats = Arc::clone(&self.threats);
        let listeners = Arc::clone(&self.threat_listeners);
        let window = Arc::clone(&self.window);

        std::thread::Builder::new()
            .name(format!("sentinel-worker-{index}"))
            .spawn(move || {
                loop {
                    let Some(tx) = queue.pop() else {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        std::thread::sleep(Duration::from_micros(50));
                        continue;
                    };
                    // Exactly-once: whoever wins the flag processes.
                    if !tx.mark_processed() {
                        continue;
                    }
                    let now = now_ns();
                    let detected = {
                        let mut window = window.lock();
                        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                            detector.detect(&tx, &window, now)
                        }));
                        window.record(&tx, now);
                        result
                    };
                    metrics
                        .transactions_processed
                        .fetch_add(1, Ordering::Relaxed);

                    let found = match detected {
                        Ok(found) => found,
                        Err(_) => {
                            metrics.detection_failures.fetch_add(1, Ordering::Relaxed);
                            error!("❌ Detection panicked on tx {}", tx.hash);
                            continue;
                        }
                    };
                    for threat in found {
                        metrics.record_threat(threat.attack_type);
                        if threat.is_actionable(detector.threshold()) {
                            info!(
                                "🚨 {:?} threat detected: confidence {:.2}, est ${:.2}",
                                threat.attack_type, threat.confidence, threat.estimated_value_usd
                            );
                            // Snapshot then release, so a listener can
                            // register more listeners or drive bundles.
                            let snapshot: Vec<ThreatListener> = listeners.lock().clone();
                            for listener in &snapshot {
                                listener(&threat);
                            }
                        }
                        let mut store = threats.lock();
                        if store.len() == THREAT_HISTORY_LIMIT {
                            store.pop_front();
                        }
                        store.push_back(threat);
                    }
                }
            })
    }

    /// The only async island in the process: a current-thread runtime
    /// driving the relay client, fed by the coordinator's channel.
    fn spawn_relay_worker(
        &self,
        rx: mpsc::Receiver<SubmissionRequest>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        let running = Arc::clone(&self.running);
        let coordinator = Arc::clone(&self.coordinator);
        let relay = Arc::clone(&self.relay);
        let slot_clock = Arc::clone(&self.slot_clock);
        let poll_interval = Duration::from_millis(self.config.relay.poll_interval_ms);

        std::thread::Builder::new()
            .name("sentinel-relay".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("❌ Relay worker failed to build runtime: {e}");
                        return;
                    }
                };

                loop {
                    // Drain submissions, then reconcile, then wait out the
                    // poll interval on the channel.
                    match rx.recv_timeout(poll_interval) {
                        Ok(request) => {
                            if let Some(delay) = request.jitter {
                                std::thread::sleep(delay);
                            }
                            Self::submit_one(
                                &runtime,
                                &coordinator,
                                &slot_clock,
                                relay.as_ref(),
                                &request,
                            );
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }

                    for (id, receipt) in coordinator.receipts_to_poll() {
                        match runtime.block_on(relay.poll_status(&receipt)) {
                            Ok(status) => coordinator.apply_relay_status(id, status),
                            Err(e) => warn!("⚠️ Status poll for bundle {} failed: {e}", id),
                        }
                    }
                    coordinator.expire_overdue(now_ns());

                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                }
            })
    }

    fn submit_one(
        runtime: &tokio::runtime::Runtime,
        coordinator: &BundleCoordinator,
        slot_clock: &SlotClock,
        relay: &dyn RelayClient,
        request: &SubmissionRequest,
    ) {
        let Some(wire) = coordinator.wire_bundle(request.bundle_id) else {
            return;
        };
        // Hold the bundle until its wire slot: the target execution slot
        // minus propagation lag. Zero for freshly created bundles.
        let wire_slot = slot_clock.predict_submission_slot(wire.target_slot);
        let hold = slot_clock.time_until(wire_slot, now_ns() / 1_000_000);
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        // Decoys go first so the real bundle does not stand out as the
        // earliest arrival.
        for decoy in coordinator.decoy_bundles(request.bundle_id) {
            if let Err(e) = runtime.block_on(relay.submit_bundle(&decoy)) {
                warn!("⚠️ Decoy submission failed: {e}");
            }
        }
        match runtime.block_on(relay.submit_bundle(&wire)) {
            Ok(receipt) => coordinator.record_receipt(request.bundle_id, receipt),
            Err(e) => {
                warn!("❌ Bundle {} submission failed: {e}", request.bundle_id);
                coordinator.record_submission_failure(request.bundle_id);
            }
        }
    }

    /// Keeps the slot clock advancing between external observations by
    /// synthesizing cadence-based observations from wall time.
    fn spawn_slot_poller(&self) -> std::io::Result<std::thread::JoinHandle<()>> {
        let running = Arc::clone(&self.running);
        let slot_clock = Arc::clone(&self.slot_clock);
        let metrics = Arc::clone(&self.metrics);
        let poll_interval = Duration::from_millis(self.config.slots.poll_interval_ms);
        let slot_duration_ms = self.config.slots.slot_duration_ms;

        std::thread::Builder::new()
            .name("sentinel-slots".to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    let now_ms = now_ns() / 1_000_000;
                    let slot = now_ms / slot_duration_ms;
                    slot_clock.observe_slot(SlotInfo::new(slot, now_ms), now_ms);
                    metrics
                        .current_slot
                        .store(slot_clock.current_slot(now_ms), Ordering::Relaxed);
                    std::thread::sleep(poll_interval);
                }
            })
    }

    /// Feed an externally observed slot (e.g. from a chain subscription).
    pub fn observe_slot(&self, info: SlotInfo) -> bool {
        self.slot_clock.observe_slot(info, now_ns() / 1_000_000)
    }

    /// Create a protection bundle for the given signed transactions.
    pub fn protect(
        &self,
        transactions: Vec<SignedTransaction>,
        level: ProtectionLevel,
    ) -> Result<BundleId, BundleError> {
        self.coordinator.create_bundle(transactions, level, now_ns())
    }

    pub fn submit_bundle(&self, id: BundleId, wait: bool) -> Result<BundleStatus, BundleError> {
        self.coordinator.submit(id, wait)
    }

    pub fn cancel_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.coordinator.cancel(id)
    }

    pub fn bundle_status(&self, id: BundleId) -> Option<BundleStatus> {
        self.coordinator.status_of(id)
    }

    /// Threats detected within the lookback window, newest first.
    pub fn recent_threats(&self, lookback: Duration) -> Vec<MevThreat> {
        let cutoff = now_ns().saturating_sub(lookback.as_nanos() as u64);
        self.threats
            .lock()
            .iter()
            .rev()
            .take_while(|t| t.detected_at_ns >= cutoff)
            .cloned()
            .collect()
    }

    pub fn add_threat_listener(&self, listener: ThreatListener) {
        self.threat_listeners.lock().push(listener);
    }

    pub fn add_bundle_listener(&self, listener: StatusListener) {
        self.coordinator.add_listener(listener);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Recommended protection level for a detected threat.
    pub fn recommend_level(&self, threat: &MevThreat) -> ProtectionLevel {
        self.selector.level_for_threat(threat)
    }
}

impl Drop for SentinelEngine {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::selectors;
    use crate::relay::MockRelay;
    use sentinel_types::{Address, TxHash};

    fn engine() -> SentinelEngine {
        let mut config = SentinelConfig::default();
        config.engine.worker_threads = 1;
        config.relay.primary_url = "http://localhost:0".to_string();
        SentinelEngine::new(config, Arc::new(MockRelay::new())).unwrap()
    }

    fn swap_tx(hash_byte: u8) -> Transaction {
        Transaction::new(
            TxHash([hash_byte; 32]),
            Address([hash_byte; 20]),
            Address([3u8; 20]),
            0,
            2_000_000_000,
            2_000_000_000,
            2_000_000_000,
            200_000,
            selectors::SWAP_EXACT_TOKENS_FOR_TOKENS.to_be_bytes(),
            1_000_000_000_000_000_000,
            now_ns(),
        )
    }

    #[test]
    fn ingest_counts_accepts_and_rejections() {
        let engine = engine();
        assert!(engine.ingest(swap_tx(1)));

        let mut dust = swap_tx(2);
        dust.value = 1;
        assert!(!engine.ingest(dust));

        let snapshot = engine.metrics();
        assert_eq!(snapshot.transactions_seen, 2);
        assert_eq!(snapshot.transactions_rejected, 1);
    }

    #[test]
    fn overflow_is_counted_not_fatal() {
        let mut config = SentinelConfig::default();
        config.engine.worker_threads = 1;
        config.engine.queue_capacity = 2;
        let engine = SentinelEngine::new(config, Arc::new(MockRelay::new())).unwrap();

        // Workers not started: the queue fills and overflows.
        assert!(engine.ingest(swap_tx(1)));
        assert!(engine.ingest(swap_tx(2)));
        assert!(!engine.ingest(swap_tx(3)));
        assert_eq!(engine.metrics().queue_overflows, 1);
    }

    #[test]
    fn protect_rejects_oversized_bundles_without_side_effects() {
        let engine = engine();
        let txs: Vec<_> = (0..6)
            .map(|i| SignedTransaction {
                hash: TxHash([i; 32]),
                payload: vec![i; 16],
                compute_units: 100_000,
                estimated_value_usd: 1.0,
            })
            .collect();
        assert!(engine.protect(txs, ProtectionLevel::Standard).is_err());
        assert_eq!(engine.metrics().bundles_created, 0);
    }

    #[test]
    fn recent_threats_is_empty_without_traffic() {
        let engine = engine();
        assert!(engine.recent_threats(Duration::from_secs(60)).is_empty());
    }
}
