//! # MEV Sentinel - Mempool Threat Detection and Bundle Protection
//!
//! ## Purpose
//!
//! Real-time pipeline that watches a high-rate transaction feed, filters it
//! down to market-relevant traffic, classifies MEV attack patterns, and
//! protects victim transactions by wrapping them in atomic bundles submitted
//! privately to a block-builder relay.
//!
//! ## Integration Points
//!
//! - **Input Sources**: Mempool transaction feed via [`SentinelEngine::ingest`],
//!   slot observations via [`SentinelEngine::observe_slot`]
//! - **Output Destinations**: Block-builder relay (JSON-RPC `sendBundle`),
//!   threat and bundle-status listeners
//! - **Detection**: Sandwich, front-run, arbitrage, JIT liquidity and
//!   liquidation heuristics over a bounded recent-transaction window
//! - **Protection**: Ordered protection levels mapping to atomicity, decoy,
//!   tip and timing policies
//!
//! ## Architecture Role
//!
//! ```text
//! Mempool Feed → [Admission Filter] → [SPSC Queues] → [Detection Workers]
//!                      ↓                                      ↓
//!               Bloom + Floors                         Threat Listeners
//!                                                            ↓
//! Victim Txs → [Bundle Coordinator] → [Relay Worker] → Builder Relay
//!                      ↓                     ↓
//!               Tip + Policy          Status Reconciliation
//! ```
//!
//! The admission path and the detection workers are plain OS threads sharing
//! nothing but lock-free queues and atomic counters; the only async code in
//! the process is the relay transport, confined to one dedicated thread.

pub mod bloom;
pub mod classifier;
pub mod coordinator;
pub mod detector;
pub mod engine;
pub mod metrics;
pub mod protection;
pub mod relay;
pub mod ring;
pub mod slot_clock;

pub use bloom::BloomPreFilter;
pub use classifier::{TransactionClassifier, Verdict};
pub use coordinator::BundleCoordinator;
pub use detector::{RecentWindow, ThreatDetectionEngine};
pub use engine::SentinelEngine;
pub use metrics::{MetricsSnapshot, PipelineMetrics, RejectReason};
pub use protection::{BundlePolicy, ProtectionLevel, ProtectionStrategySelector};
pub use relay::{HttpRelayClient, MockRelay, RelayBundle, RelayClient, RelayStatus};
pub use slot_clock::SlotClock;
