//! Protection strategy selection
//!
//! Maps a protection level to a concrete bundle policy: whether the bundle
//! is atomic, whether decoy bundles accompany it, whether the tip adapts to
//! relay acceptance, and whether submission timing is jittered. Levels are
//! ordered; a higher level never weakens a guarantee a lower level grants.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use sentinel_types::{MevAttackType, MevThreat};

/// How aggressively a bundle is protected from observation and reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtectionLevel {
    /// Plain submission, no protections.
    None,
    /// Single-transaction bundle, fixed tip.
    Basic,
    /// Decoy buffer around the transaction, moderate fixed tip.
    Standard,
    /// Atomic all-or-nothing bundle, tip driven by relay acceptance.
    High,
    /// High plus additional decoys.
    Maximum,
    /// Maximum plus timing jitter and intra-bundle shuffling.
    Stealth,
}

impl ProtectionLevel {
    /// Relative priority for tip scaling; stealth pays the most.
    pub fn priority(&self) -> u8 {
        match self {
            ProtectionLevel::None => 0,
            ProtectionLevel::Basic => 1,
            ProtectionLevel::Standard => 2,
            ProtectionLevel::High => 3,
            ProtectionLevel::Maximum => 4,
            ProtectionLevel::Stealth => 5,
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectionLevel::None => "none",
            ProtectionLevel::Basic => "basic",
            ProtectionLevel::Standard => "standard",
            ProtectionLevel::High => "high",
            ProtectionLevel::Maximum => "maximum",
            ProtectionLevel::Stealth => "stealth",
        };
        f.write_str(name)
    }
}

impl FromStr for ProtectionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ProtectionLevel::None),
            "basic" => Ok(ProtectionLevel::Basic),
            "standard" => Ok(ProtectionLevel::Standard),
            "high" => Ok(ProtectionLevel::High),
            "maximum" => Ok(ProtectionLevel::Maximum),
            "stealth" => Ok(ProtectionLevel::Stealth),
            other => Err(anyhow::anyhow!("unknown protection level '{other}'")),
        }
    }
}

/// Concrete knobs derived from a protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundlePolicy {
    /// All-or-nothing inclusion.
    pub atomic: bool,
    /// Number of decoy bundles submitted alongside the real one.
    pub decoy_count: u8,
    /// Scale the tip with relay acceptance rate.
    pub dynamic_tip: bool,
    /// Randomized submission delay, if any.
    pub max_jitter: Option<Duration>,
    /// Shuffle non-critical bundle entries before submission.
    pub shuffle_noncritical: bool,
}

/// Derives bundle policies and recommends levels for detected threats.
pub struct ProtectionStrategySelector {
    default_level: ProtectionLevel,
    stealth_max_jitter: Duration,
}

impl ProtectionStrategySelector {
    pub fn new(default_level: ProtectionLevel, stealth_max_jitter: Duration) -> Self {
        Self {
            default_level,
            stealth_max_jitter,
        }
    }

    pub fn default_level(&self) -> ProtectionLevel {
        self.default_level
    }

    /// Policy table. Monotone: every knob a level enables stays enabled at
    /// every higher level.
    pub fn policy_for(&self, level: ProtectionLevel) -> BundlePolicy {
        match level {
            ProtectionLevel::None => BundlePolicy {
                atomic: false,
                decoy_count: 0,
                dynamic_tip: false,
                max_jitter: None,
                shuffle_noncritical: false,
            },
            ProtectionLevel::Basic => BundlePolicy {
                atomic: false,
                decoy_count: 0,
                dynamic_tip: false,
                max_jitter: None,
                shuffle_noncritical: false,
            },
            ProtectionLevel::Standard => BundlePolicy {
                atomic: false,
                decoy_count: 1,
                dynamic_tip: false,
                max_jitter: None,
                shuffle_noncritical: false,
            },
            ProtectionLevel::High => BundlePolicy {
                atomic: true,
                decoy_count: 1,
                dynamic_tip: true,
                max_jitter: None,
                shuffle_noncritical: false,
            },
            ProtectionLevel::Maximum => BundlePolicy {
                atomic: true,
                decoy_count: 2,
                dynamic_tip: true,
                max_jitter: None,
                shuffle_noncritical: false,
            },
            ProtectionLevel::Stealth => BundlePolicy {
                atomic: true,
                decoy_count: 2,
                dynamic_tip: true,
                max_jitter: Some(self.stealth_max_jitter),
                shuffle_noncritical: true,
            },
        }
    }

    /// Recommended level for a detected threat: scale with confidence, and
    /// treat sandwich and front-run patterns one notch more seriously since
    /// they target a specific victim.
    pub fn level_for_threat(&self, threat: &MevThreat) -> ProtectionLevel {
        let base = if threat.confidence >= 0.9 {
            ProtectionLevel::Maximum
        } else if threat.confidence >= 0.7 {
            ProtectionLevel::High
        } else if threat.confidence >= 0.4 {
            ProtectionLevel::Standard
        } else {
            ProtectionLevel::Basic
        };
        let targeted = matches!(
            threat.attack_type,
            MevAttackType::Sandwich | MevAttackType::FrontRun
        );
        let level = if targeted { bump(base) } else { base };
        level.max(self.default_level)
    }

    /// Sample a concrete delay from the policy's jitter bound.
    pub fn sample_jitter(&self, policy: &BundlePolicy) -> Option<Duration> {
        let max = policy.max_jitter?;
        if max.is_zero() {
            return Some(Duration::ZERO);
        }
        let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
        Some(Duration::from_millis(millis))
    }
}

fn bump(level: ProtectionLevel) -> ProtectionLevel {
    match level {
        ProtectionLevel::None => ProtectionLevel::Basic,
        ProtectionLevel::Basic => ProtectionLevel::Standard,
        ProtectionLevel::Standard => ProtectionLevel::High,
        ProtectionLevel::High => ProtectionLevel::Maximum,
        ProtectionLevel::Maximum | ProtectionLevel::Stealth => level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::TxHash;

    fn selector() -> ProtectionStrategySelector {
        ProtectionStrategySelector::new(ProtectionLevel::Standard, Duration::from_millis(250))
    }

    fn threat(attack_type: MevAttackType, confidence: f64) -> MevThreat {
        MevThreat {
            attack_type,
            confidence,
            estimated_value_usd: 100.0,
            detected_at_ns: 0,
            related: vec![TxHash([1u8; 32])],
        }
    }

    #[test]
    fn levels_are_ordered() {
        assert!(ProtectionLevel::None < ProtectionLevel::Basic);
        assert!(ProtectionLevel::Maximum < ProtectionLevel::Stealth);
    }

    #[test]
    fn policies_are_monotone() {
        let s = selector();
        let levels = [
            ProtectionLevel::None,
            ProtectionLevel::Basic,
            ProtectionLevel::Standard,
            ProtectionLevel::High,
            ProtectionLevel::Maximum,
            ProtectionLevel::Stealth,
        ];
        for pair in levels.windows(2) {
            let lower = s.policy_for(pair[0]);
            let higher = s.policy_for(pair[1]);
            assert!(higher.atomic >= lower.atomic);
            assert!(higher.decoy_count >= lower.decoy_count);
            assert!(higher.dynamic_tip >= lower.dynamic_tip);
            assert!(higher.max_jitter.is_some() >= lower.max_jitter.is_some());
            assert!(higher.shuffle_noncritical >= lower.shuffle_noncritical);
        }
    }

    #[test]
    fn only_stealth_jitters_and_shuffles() {
        let s = selector();
        assert!(s.policy_for(ProtectionLevel::Maximum).max_jitter.is_none());
        let stealth = s.policy_for(ProtectionLevel::Stealth);
        assert_eq!(stealth.max_jitter, Some(Duration::from_millis(250)));
        assert!(stealth.shuffle_noncritical);
    }

    #[test]
    fn sandwich_gets_bumped_one_level() {
        let s = selector();
        assert_eq!(
            s.level_for_threat(&threat(MevAttackType::Arbitrage, 0.75)),
            ProtectionLevel::High
        );
        assert_eq!(
            s.level_for_threat(&threat(MevAttackType::Sandwich, 0.75)),
            ProtectionLevel::Maximum
        );
    }

    #[test]
    fn recommendation_never_drops_below_default() {
        let s = ProtectionStrategySelector::new(
            ProtectionLevel::High,
            Duration::from_millis(250),
        );
        assert_eq!(
            s.level_for_threat(&threat(MevAttackType::Arbitrage, 0.1)),
            ProtectionLevel::High
        );
    }

    #[test]
    fn jitter_sample_respects_bound() {
        let s = selector();
        let stealth = s.policy_for(ProtectionLevel::Stealth);
        for _ in 0..100 {
            let jitter = s.sample_jitter(&stealth).unwrap();
            assert!(jitter <= Duration::from_millis(250));
        }
        assert!(s.sample_jitter(&s.policy_for(ProtectionLevel::High)).is_none());
    }

    #[test]
    fn parses_every_level_case_insensitively() {
        assert_eq!(
            "STEALTH".parse::<ProtectionLevel>().unwrap(),
            ProtectionLevel::Stealth
        );
        assert!("paranoid".parse::<ProtectionLevel>().is_err());
    }
}
