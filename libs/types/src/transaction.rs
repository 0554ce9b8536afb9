//! Fixed-layout pending-transaction record
//!
//! The ingestion hot path copies one of these per observed mempool
//! transaction. Everything a worker needs for classification and threat
//! analysis is inline: scalars, fixed-width byte arrays, and the leading
//! calldata bytes from which the function selector is derived. The record is
//! immutable after construction except for the atomic processed flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub const ZERO: TxHash = TxHash([0u8; 32]);
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Collapse to a u64 key for hash-map lookups on the hot path.
    ///
    /// Truncation is acceptable here: the key is only used for rate-limit
    /// and deny-list bucketing, never for identity on chain.
    pub fn as_key(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 4-byte function selector, big-endian.
pub type Selector = u32;

/// A pending transaction as seen in the mempool.
///
/// `#[repr(C)]` keeps the field order (and therefore cache behavior)
/// predictable: hot scalars first, byte arrays after, the atomic flag last.
#[repr(C)]
#[derive(Debug)]
pub struct Transaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    /// Legacy gas price, wei per gas. Zero for pure EIP-1559 transactions.
    pub gas_price: u64,
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
    pub gas_limit: u32,
    /// Leading calldata bytes; the function selector lives here.
    pub calldata_prefix: [u8; 4],
    /// Value transferred, wei.
    pub value: u128,
    /// Wall clock at which this pipeline first saw the transaction.
    pub seen_at_ns: u64,
    processed: AtomicBool,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hash: TxHash,
        from: Address,
        to: Address,
        nonce: u64,
        gas_price: u64,
        max_fee_per_gas: u64,
        max_priority_fee_per_gas: u64,
        gas_limit: u32,
        calldata_prefix: [u8; 4],
        value: u128,
        seen_at_ns: u64,
    ) -> Self {
        Self {
            hash,
            from,
            to,
            nonce,
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            gas_limit,
            calldata_prefix,
            value,
            seen_at_ns,
            processed: AtomicBool::new(false),
        }
    }

    /// Function selector derived from the leading calldata bytes.
    #[inline]
    pub fn selector(&self) -> Selector {
        u32::from_be_bytes(self.calldata_prefix)
    }

    /// Effective priority fee offered to the producer.
    #[inline]
    pub fn priority_fee(&self) -> u64 {
        if self.max_priority_fee_per_gas > 0 {
            self.max_priority_fee_per_gas
        } else {
            self.gas_price
        }
    }

    /// Claim this transaction for processing.
    ///
    /// Returns `true` for exactly one caller; every subsequent (or
    /// concurrent) claim observes `false`. This is the re-delivery
    /// idempotence guarantee: side effects key off the return value.
    #[inline]
    pub fn mark_processed(&self) -> bool {
        !self.processed.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_high_value(&self, threshold_wei: u128) -> bool {
        self.value > threshold_wei
    }

    #[inline]
    pub fn is_high_gas(&self, threshold_wei: u64) -> bool {
        self.priority_fee() > threshold_wei
    }
}

// AtomicBool is not Clone; a cloned record snapshots the current flag.
impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            from: self.from,
            to: self.to,
            nonce: self.nonce,
            gas_price: self.gas_price,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            gas_limit: self.gas_limit,
            calldata_prefix: self.calldata_prefix,
            value: self.value,
            seen_at_ns: self.seen_at_ns,
            processed: AtomicBool::new(self.processed.load(Ordering::Acquire)),
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new(
            TxHash::ZERO,
            Address::ZERO,
            Address::ZERO,
            0,
            0,
            0,
            0,
            0,
            [0u8; 4],
            0,
            0,
        )
    }
}
