//! Error types shared across the pipeline
//!
//! Structured errors for bundle lifecycle violations and relay transport
//! failures. Admission rejections and queue overflows are deliberately not
//! errors — they are counted events on the hot path.

use thiserror::Error;

use crate::bundle::{BundleId, BundleStatus};

/// Bundle construction and lifecycle failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BundleError {
    /// Attempted lifecycle transition the state machine forbids.
    #[error("bundle {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: BundleId,
        from: BundleStatus,
        to: BundleStatus,
    },

    /// More transactions than the configured bundle maximum.
    #[error("bundle rejected: {count} transactions exceeds maximum {max}")]
    TooManyTransactions { count: usize, max: usize },

    /// Summed compute estimate exceeds the per-bundle ceiling.
    #[error("bundle rejected: {units} compute units exceeds ceiling {max}")]
    ComputeBudgetExceeded { units: u64, max: u64 },

    /// Bundle must contain at least one transaction.
    #[error("bundle rejected: no transactions")]
    Empty,

    /// Unknown bundle id.
    #[error("bundle {id} not found")]
    NotFound { id: BundleId },
}

/// Relay submission and status-polling failures.
///
/// These surface through the bundle's status query, never as panics or
/// errors thrown back into worker threads.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay transport error: {0}")]
    Transport(String),

    #[error("relay rejected bundle: {reason}")]
    Rejected { reason: String },

    #[error("relay response missing or malformed: {0}")]
    MalformedResponse(String),

    #[error("relay submission timed out after {millis}ms")]
    Timeout { millis: u64 },
}
