//! Bloom pre-filter over function selectors
//!
//! ## Purpose
//!
//! Constant-time, allocation-free rejection of transactions that cannot
//! possibly interact with a known market contract. The filter is populated
//! once at pipeline construction from the static selector table below plus
//! any configured overrides, then shared read-only with every worker — it is
//! never mutated per-transaction.
//!
//! ## Guarantees
//!
//! - No false negatives: every inserted selector always reports present.
//! - Bounded false positives: with the default 4096-bit vector, 3 hash
//!   functions and a few dozen inserted selectors, the false-positive rate
//!   sits well under 1%.

use sentinel_types::Selector;

/// Well-known DEX router and liquidity function selectors.
///
/// The leading four calldata bytes of the common swap/liquidity entry points
/// across Uniswap V2/V3-style routers. A transaction whose selector misses
/// all of these (and the configured overrides) is not a market interaction.
pub mod selectors {
    use sentinel_types::Selector;

    // Uniswap V2-style routers
    pub const SWAP_EXACT_TOKENS_FOR_TOKENS: Selector = 0x38ed1739;
    pub const SWAP_EXACT_TOKENS_FOR_ETH: Selector = 0x18cbafe5;
    pub const SWAP_EXACT_ETH_FOR_TOKENS: Selector = 0x7ff36ab5;
    pub const ADD_LIQUIDITY: Selector = 0xe8e33700;
    pub const ADD_LIQUIDITY_ETH: Selector = 0xf305d719;
    pub const REMOVE_LIQUIDITY: Selector = 0xbaa2abde;

    // Uniswap V3-style routers
    pub const EXACT_INPUT_SINGLE: Selector = 0x04e45aaf;
    pub const EXACT_OUTPUT_SINGLE: Selector = 0x5023b4df;
    pub const EXACT_INPUT: Selector = 0x0b24c7e0;
    pub const EXACT_OUTPUT: Selector = 0x09b81346;

    // Universal router
    pub const EXECUTE: Selector = 0x3593564c;

    // Lending pool liquidation entry point
    pub const LIQUIDATION_CALL: Selector = 0x00a718a9;

    /// The full built-in market-interaction selector set.
    pub fn known_market_selectors() -> &'static [Selector] {
        &[
            SWAP_EXACT_TOKENS_FOR_TOKENS,
            SWAP_EXACT_TOKENS_FOR_ETH,
            SWAP_EXACT_ETH_FOR_TOKENS,
            ADD_LIQUIDITY,
            ADD_LIQUIDITY_ETH,
            REMOVE_LIQUIDITY,
            EXACT_INPUT_SINGLE,
            EXACT_OUTPUT_SINGLE,
            EXACT_INPUT,
            EXACT_OUTPUT,
            EXECUTE,
            LIQUIDATION_CALL,
        ]
    }

    /// Selectors that signal liquidity add/remove rather than a swap.
    pub fn liquidity_selectors() -> &'static [Selector] {
        &[ADD_LIQUIDITY, ADD_LIQUIDITY_ETH, REMOVE_LIQUIDITY]
    }
}

/// Fixed-size probabilistic selector set.
#[derive(Debug)]
pub struct BloomPreFilter {
    words: Vec<u64>,
    /// Bit-index mask; `bits` is a validated power of two.
    mask: u64,
    hashes: usize,
    inserted: usize,
}

impl BloomPreFilter {
    /// `bits` must be a nonzero power of two (enforced by config
    /// validation); `hashes` in `1..=8`.
    pub fn new(bits: usize, hashes: usize) -> Self {
        debug_assert!(bits.is_power_of_two());
        Self {
            words: vec![0u64; bits / 64],
            mask: (bits as u64) - 1,
            hashes,
            inserted: 0,
        }
    }

    /// Build a filter pre-populated with the built-in market selectors plus
    /// any configured overrides.
    pub fn with_market_selectors(bits: usize, hashes: usize, overrides: &[Selector]) -> Self {
        let mut filter = Self::new(bits, hashes);
        for &sel in selectors::known_market_selectors() {
            filter.add(sel);
        }
        for &sel in overrides {
            filter.add(sel);
        }
        filter
    }

    #[inline]
    fn bit_index(&self, key: Selector, seed: u64) -> u64 {
        // Multiplicative hash with the seed folded in before mixing, so
        // each hash function lands on an independent bit.
        let mixed = (key as u64) ^ seed.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        (mixed.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 15) & self.mask
    }

    pub fn add(&mut self, key: Selector) {
        for seed in 0..self.hashes as u64 {
            let bit = self.bit_index(key, seed);
            self.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// Membership test. `false` is definitive; `true` may be a false
    /// positive.
    #[inline]
    pub fn might_contain(&self, key: Selector) -> bool {
        for seed in 0..self.hashes as u64 {
            let bit = self.bit_index(key, seed);
            if self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    /// Number of keys inserted so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }
}
