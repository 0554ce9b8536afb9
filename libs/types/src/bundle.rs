//! Protective bundle records and their lifecycle state machine
//!
//! A bundle is an ordered group of already-signed transactions submitted
//! atomically through a private relay. The coordinator owns each
//! [`PendingBundle`] exclusively until it reaches a terminal state; the
//! transition rules here are the single source of truth for what the
//! lifecycle allows.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BundleError;
use crate::transaction::TxHash;

/// Opaque bundle identifier handed back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bundle lifecycle states.
///
/// Forward-only: `Pending → Submitted → {Confirmed, Failed}`, with
/// `Expired` reachable from either non-terminal state and `Cancelled` only
/// before submission. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundleStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Expired,
    Cancelled,
}

impl BundleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BundleStatus::Confirmed
                | BundleStatus::Failed
                | BundleStatus::Expired
                | BundleStatus::Cancelled
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: BundleStatus) -> bool {
        use BundleStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Submitted, Expired)
        )
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Submitted => "submitted",
            BundleStatus::Confirmed => "confirmed",
            BundleStatus::Failed => "failed",
            BundleStatus::Expired => "expired",
            BundleStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// An already-signed transaction carried through the pipeline as opaque
/// bytes. This pipeline never signs; payloads arrive signed from the
/// external signer collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hash: TxHash,
    /// Wire-encoded signed transaction, opaque to the pipeline.
    pub payload: Vec<u8>,
    /// Estimated compute units this transaction consumes.
    pub compute_units: u64,
    /// Heuristic extractable/protected value estimate, USD.
    pub estimated_value_usd: f64,
}

/// A bundle tracked by the coordinator from creation to terminal state.
#[derive(Debug, Clone)]
pub struct PendingBundle {
    pub id: BundleId,
    /// Ordered transactions; order is the submission order.
    pub transactions: Vec<SignedTransaction>,
    pub target_slot: u64,
    pub created_at_ns: u64,
    /// Tip offered to the producer, in the chain's native minor unit.
    pub tip: u64,
    pub status: BundleStatus,
    /// Sum of per-transaction compute estimates.
    pub compute_units: u64,
    /// Sum of per-transaction value estimates, USD.
    pub estimated_value_usd: f64,
    /// Relay receipt, present once submitted.
    pub receipt_id: Option<String>,
}

impl PendingBundle {
    /// Apply a lifecycle transition, enforcing the forward-only rules.
    pub fn transition(&mut self, next: BundleStatus) -> Result<(), BundleError> {
        if !self.status.can_transition_to(next) {
            return Err(BundleError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}
