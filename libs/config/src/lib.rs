//! # Sentinel Configuration - Pipeline Parameter Management
//!
//! ## Purpose
//!
//! Central configuration authority for every pipeline component: admission
//! filtering thresholds, bloom filter geometry, detection heuristics, bundle
//! and tip policy, relay endpoints, and slot timing. Loaded from TOML with
//! environment-variable overrides and validated completely before the
//! pipeline is constructed — an invalid value prevents initialization, it
//! never fails at runtime.
//!
//! ## Integration Points
//!
//! - **Input Sources**: TOML configuration file, `SENTINEL_*` environment
//!   variables.
//! - **Output Destinations**: engine construction (`Engine::new` consumes a
//!   validated [`SentinelConfig`]).
//! - **Validation**: `validate()` checks every numeric bound and parses
//!   every address/selector string, with failures reported via `anyhow`
//!   context chains.
//!
//! Heuristic coefficients (tip curve, detection confidence increments,
//! value-estimate fractions) are configuration rather than code: they are
//! placeholder policy numbers, and deployments tune them without rebuilds.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use sentinel_types::{Address, Selector};

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub engine: EngineConfig,
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub bundles: BundleConfig,
    pub relay: RelayConfig,
    pub slots: SlotConfig,
}

/// Worker pool and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of OS worker threads, each owning one ingestion queue.
    pub worker_threads: usize,
    /// Per-worker queue capacity; rounded up to the next power of two.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_capacity: 65_536,
        }
    }
}

/// Admission filtering thresholds and allow/deny lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Bloom filter bit-vector size.
    pub bloom_bits: usize,
    /// Bloom filter hash-function count.
    pub bloom_hashes: usize,
    /// Minimum legacy gas price, wei. 1 gwei default.
    pub min_gas_price: u64,
    /// Minimum priority fee, wei. 1 gwei default.
    pub min_priority_fee: u64,
    /// Minimum transferred value, wei. 0.01 ETH default.
    pub min_value_wei: u128,
    /// Per-sender acceptance budget within a one-second window.
    pub max_tx_per_sender_per_sec: u32,
    /// Destination addresses rejected unconditionally, hex-encoded.
    pub denied_addresses: Vec<String>,
    /// Selectors accepted even when the bloom filter misses, hex-encoded
    /// (explicit allowlist override).
    pub allowed_selectors: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bloom_bits: 4096,
            bloom_hashes: 3,
            min_gas_price: 1_000_000_000,
            min_priority_fee: 1_000_000_000,
            min_value_wei: 10_000_000_000_000_000,
            max_tx_per_sender_per_sec: 100,
            denied_addresses: Vec::new(),
            allowed_selectors: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Parse the configured deny-list into addresses. Called at startup;
    /// a malformed entry fails initialization.
    pub fn deny_list(&self) -> Result<Vec<Address>> {
        self.denied_addresses
            .iter()
            .map(|s| parse_address(s).with_context(|| format!("bad deny-list entry '{s}'")))
            .collect()
    }

    /// Parse the configured selector allowlist overrides.
    pub fn selector_overrides(&self) -> Result<Vec<Selector>> {
        self.allowed_selectors
            .iter()
            .map(|s| parse_selector(s).with_context(|| format!("bad selector override '{s}'")))
            .collect()
    }
}

/// Threat-detection window bounds and heuristic coefficients.
///
/// The coefficients are additive confidence increments and value-estimate
/// fractions; none of them is semantically load-bearing beyond "larger means
/// more suspicious".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum transactions retained in the recent window.
    pub window_capacity: usize,
    /// Age beyond which window entries are evicted.
    pub window_max_age_ms: u64,
    /// Threats below this confidence are dropped.
    pub detection_threshold: f64,

    // Sandwich heuristics
    pub sandwich_opposite_direction_weight: f64,
    pub sandwich_large_trade_weight: f64,
    pub sandwich_large_trade_wei: u128,
    pub sandwich_loss_fraction: f64,

    // Front-run heuristics
    pub frontrun_fee_delta_ratio: f64,
    pub frontrun_match_weight: f64,
    pub frontrun_high_value_weight: f64,
    pub frontrun_high_value_wei: u128,
    pub frontrun_value_fraction: f64,

    // Selector/compute classified patterns
    pub arbitrage_base_confidence: f64,
    pub arbitrage_min_value_wei: u128,
    pub arbitrage_value_fraction: f64,
    pub jit_min_swap_wei: u128,
    pub jit_liquidity_weight: f64,
    pub jit_value_fraction: f64,
    pub liquidation_base_confidence: f64,
    pub liquidation_min_gas_limit: u32,
    pub liquidation_value_fraction: f64,

    /// Rough USD value of one native token, used only for the heuristic
    /// value estimates attached to threats.
    pub native_token_usd: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_capacity: 256,
            window_max_age_ms: 2_000,
            detection_threshold: 0.3,
            sandwich_opposite_direction_weight: 0.3,
            sandwich_large_trade_weight: 0.4,
            sandwich_large_trade_wei: 50_000_000_000_000_000_000, // 50 native
            sandwich_loss_fraction: 0.002,
            frontrun_fee_delta_ratio: 1.1,
            frontrun_match_weight: 0.4,
            frontrun_high_value_weight: 0.2,
            frontrun_high_value_wei: 25_000_000_000_000_000_000,
            frontrun_value_fraction: 0.01,
            arbitrage_base_confidence: 0.3,
            arbitrage_min_value_wei: 5_000_000_000_000_000_000,
            arbitrage_value_fraction: 0.005,
            jit_min_swap_wei: 25_000_000_000_000_000_000,
            jit_liquidity_weight: 0.5,
            jit_value_fraction: 0.001,
            liquidation_base_confidence: 0.5,
            liquidation_min_gas_limit: 800_000,
            liquidation_value_fraction: 0.01,
            native_token_usd: 2_000.0,
        }
    }
}

impl DetectorConfig {
    pub fn window_max_age(&self) -> Duration {
        Duration::from_millis(self.window_max_age_ms)
    }
}

/// Bundle composition limits, tip policy, and lifecycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    pub max_bundle_size: usize,
    /// Per-bundle compute-unit ceiling.
    pub max_compute_units: u64,
    /// Baseline tip, native minor units.
    pub base_tip: u64,
    /// Tip never exceeds this, regardless of value or priority.
    pub max_tip: u64,
    /// Additional tip per estimated USD of extractable value.
    pub tip_per_value_usd: f64,
    /// Submission must be acknowledged within this window or the bundle
    /// fails.
    pub submission_timeout_ms: u64,
    /// Submitted bundles older than this are reconciled against the relay.
    pub confirmation_window_ms: u64,
    /// Terminal bundles retained for status queries.
    pub history_limit: usize,
    /// Default protection level applied when a caller does not specify one.
    pub default_protection_level: String,
    /// Upper bound of the randomized stealth submission delay.
    pub stealth_max_jitter_ms: u64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: 5,
            max_compute_units: 1_400_000 * 5,
            base_tip: 10_000,
            max_tip: 100_000,
            tip_per_value_usd: 50.0,
            submission_timeout_ms: 2_000,
            confirmation_window_ms: 4_000,
            history_limit: 1_024,
            default_protection_level: "standard".to_string(),
            stealth_max_jitter_ms: 250,
        }
    }
}

impl BundleConfig {
    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }
}

/// Relay endpoints and polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Primary relay endpoint; every bundle goes here.
    pub primary_url: String,
    /// Optional mirror endpoints; submission is fanned out best-effort.
    pub mirror_urls: Vec<String>,
    /// Status poll interval for submitted bundles.
    pub poll_interval_ms: u64,
    /// HTTP request timeout.
    pub request_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://relay.invalid/api/v1/bundles".to_string(),
            mirror_urls: Vec::new(),
            poll_interval_ms: 200,
            request_timeout_ms: 1_500,
        }
    }
}

/// Slot cadence and submission-timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// Expected slot duration. ~400ms on Solana-style chains.
    pub slot_duration_ms: u64,
    /// Typical relay propagation lag, expressed in slots; subtracted when
    /// predicting the submission slot for a target execution slot.
    pub propagation_lag_slots: u64,
    /// Slot poller interval.
    pub poll_interval_ms: u64,
    /// Slot history entries retained before age eviction.
    pub history_limit: usize,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            slot_duration_ms: 400,
            propagation_lag_slots: 2,
            poll_interval_ms: 100,
            history_limit: 1_024,
        }
    }
}

impl SentinelConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: SentinelConfig =
            toml::from_str(&raw).with_context(|| format!("invalid TOML in {}", path.display()))?;
        config.apply_env_overrides()?;
        info!("📂 Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Environment overrides for the handful of deploy-time knobs.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTINEL_RELAY_URL") {
            self.relay.primary_url = url;
        }
        if let Ok(threads) = std::env::var("SENTINEL_WORKER_THREADS") {
            self.engine.worker_threads = threads
                .parse()
                .context("SENTINEL_WORKER_THREADS must be an integer")?;
        }
        if let Ok(tip) = std::env::var("SENTINEL_MAX_TIP") {
            self.bundles.max_tip = tip.parse().context("SENTINEL_MAX_TIP must be an integer")?;
        }
        Ok(())
    }

    /// Validate every parameter. Called once before pipeline construction;
    /// any failure here aborts initialization.
    pub fn validate(&self) -> Result<()> {
        if self.engine.worker_threads == 0 {
            bail!("engine.worker_threads must be at least 1");
        }
        if self.engine.queue_capacity < 2 {
            bail!("engine.queue_capacity must be at least 2");
        }
        if self.filter.bloom_bits == 0 || !self.filter.bloom_bits.is_power_of_two() {
            bail!(
                "filter.bloom_bits must be a nonzero power of two, got {}",
                self.filter.bloom_bits
            );
        }
        if !(1..=8).contains(&self.filter.bloom_hashes) {
            bail!(
                "filter.bloom_hashes must be in 1..=8, got {}",
                self.filter.bloom_hashes
            );
        }
        if self.filter.max_tx_per_sender_per_sec == 0 {
            bail!("filter.max_tx_per_sender_per_sec must be at least 1");
        }
        self.filter.deny_list()?;
        self.filter.selector_overrides()?;

        if !(0.0..=1.0).contains(&self.detector.detection_threshold) {
            bail!(
                "detector.detection_threshold must be in [0, 1], got {}",
                self.detector.detection_threshold
            );
        }
        if self.detector.window_capacity == 0 {
            bail!("detector.window_capacity must be at least 1");
        }

        if self.bundles.max_bundle_size == 0 {
            bail!("bundles.max_bundle_size must be at least 1");
        }
        if self.bundles.max_compute_units == 0 {
            bail!("bundles.max_compute_units must be nonzero");
        }
        if self.bundles.max_tip < self.bundles.base_tip {
            bail!(
                "bundles.max_tip ({}) must be >= bundles.base_tip ({})",
                self.bundles.max_tip,
                self.bundles.base_tip
            );
        }
        if self.bundles.submission_timeout_ms == 0 {
            bail!("bundles.submission_timeout_ms must be nonzero");
        }
        parse_protection_level(&self.bundles.default_protection_level)?;

        if self.relay.primary_url.is_empty() {
            bail!("relay.primary_url must be set");
        }
        if self.relay.poll_interval_ms == 0 {
            bail!("relay.poll_interval_ms must be nonzero");
        }

        if self.slots.slot_duration_ms == 0 {
            bail!("slots.slot_duration_ms must be nonzero");
        }
        Ok(())
    }
}

/// Protection levels recognized in configuration.
pub const PROTECTION_LEVELS: [&str; 6] =
    ["none", "basic", "standard", "high", "maximum", "stealth"];

fn parse_protection_level(name: &str) -> Result<()> {
    if PROTECTION_LEVELS.contains(&name) {
        Ok(())
    } else {
        bail!(
            "unknown protection level '{name}', expected one of {:?}",
            PROTECTION_LEVELS
        )
    }
}

fn parse_address(s: &str) -> Result<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).context("address is not valid hex")?;
    if bytes.len() != 20 {
        bail!("address must be 20 bytes, got {}", bytes.len());
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(Address(out))
}

fn parse_selector(s: &str) -> Result<Selector> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(stripped, 16).context("selector is not valid hex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        SentinelConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = SentinelConfig::default();
        config.engine.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_bloom() {
        let mut config = SentinelConfig::default();
        config.filter.bloom_bits = 4000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_tip_bounds() {
        let mut config = SentinelConfig::default();
        config.bundles.base_tip = 200;
        config.bundles.max_tip = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_protection_level() {
        let mut config = SentinelConfig::default();
        config.bundles.default_protection_level = "paranoid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_deny_list_entry() {
        let mut config = SentinelConfig::default();
        config.filter.denied_addresses = vec!["0x1234".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_selector_overrides() {
        let mut config = SentinelConfig::default();
        config.filter.allowed_selectors = vec!["0x38ed1739".to_string()];
        assert_eq!(config.filter.selector_overrides().unwrap(), vec![0x38ed1739]);
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[engine]
worker_threads = 2

[bundles]
max_bundle_size = 3
"#
        )
        .unwrap();
        let config = SentinelConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.worker_threads, 2);
        assert_eq!(config.bundles.max_bundle_size, 3);
        // Untouched sections keep defaults
        assert_eq!(config.filter.bloom_bits, 4096);
        config.validate().unwrap();
    }
}
