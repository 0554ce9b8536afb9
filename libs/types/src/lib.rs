//! # Sentinel Types - Core Pipeline Data Model
//!
//! ## Purpose
//!
//! Unified type definitions shared by every stage of the MEV Sentinel
//! pipeline: the fixed-layout pending-transaction record observed from the
//! mempool, detected MEV threats, protective bundles and their lifecycle
//! state machine, and slot/block timing information.
//!
//! ## Design Philosophy
//!
//! - **Fixed layout on the hot path**: the [`Transaction`] record is a flat,
//!   cache-friendly struct of scalars and fixed-width byte arrays. No heap
//!   pointers are chased while a worker classifies or inspects it.
//! - **Idempotent delivery**: each transaction carries a single atomic
//!   processed flag that transitions `false → true` exactly once, so
//!   re-delivery from upstream feeds cannot double-fire side effects.
//! - **Forward-only lifecycle**: [`BundleStatus`] transitions are validated
//!   at the type level; terminal states are absorbing.
//! - **References, not ownership**: a [`MevThreat`] names the transactions
//!   that constitute the pattern by hash only.
//!
//! ## Integration Points
//!
//! - **Classifier / detector**: consume [`Transaction`] and produce
//!   [`MevThreat`] values.
//! - **Bundle coordinator**: owns [`PendingBundle`] records until they reach
//!   a terminal [`BundleStatus`].
//! - **Slot clock**: ingests [`SlotInfo`] observations from chain polling.

pub mod bundle;
pub mod errors;
pub mod slot;
pub mod threat;
pub mod transaction;

pub use bundle::{BundleId, BundleStatus, PendingBundle, SignedTransaction};
pub use errors::{BundleError, RelayError};
pub use slot::SlotInfo;
pub use threat::{MevAttackType, MevThreat};
pub use transaction::{Address, Selector, Transaction, TxHash};
