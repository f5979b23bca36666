use serde::{Deserialize, Serialize};

/// Tunable thresholds, cooldowns, and intervals behind every guard. Every
/// numeric default mirrors the figure named in the governing specification;
/// loadable from an optional TOML file, falling back to [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum health score to promote Tier 1 → Tier 2.
    pub health_threshold_t2: u32,
    /// Minimum health score to promote Tier 2 → Tier 3 at boot time.
    pub health_threshold_t3_boot: u32,
    /// Minimum health score to promote/hold Tier 3 once the runtime monitor
    /// is driving (stricter than the boot-time threshold).
    pub health_threshold_t3_runtime: u32,
    /// Boots a BROWNOUT flag must persist before Tier-2 promotion is
    /// reconsidered.
    pub brownout_cooldown_boots: u64,
    /// Consecutive failed verifier-reachability polls before an attestation
    /// sanity re-check is attempted at Tier 3.
    pub verifier_unreachable_threshold: u32,
    /// Consecutive sub-threshold health polls before Tier-2 degradation.
    pub sustained_low_health_threshold: u32,
    /// Seconds after first observing Tier 3 during which degradation checks
    /// are suppressed.
    pub t3_grace_seconds: u64,
    /// Runtime monitor tick period, in seconds.
    pub monitor_tick_seconds: u64,
    /// Timeout for a single verifier-reachability probe, in seconds.
    pub reachability_timeout_seconds: u64,
    /// Window over which network stability must hold before Tier-3
    /// promotion, in seconds.
    pub network_stability_window_seconds: u64,
    /// Poll interval within the network-stability window, in seconds.
    pub network_stability_poll_seconds: u64,
    /// Minimum free `/var` bytes required to remain at Tier 3.
    pub var_free_min_bytes_t3: u64,
    /// Minimum free `/var` bytes required to remain at Tier 2.
    pub var_free_min_bytes_t2: u64,
    /// Minimum free-memory percentage required to remain at Tier 3.
    pub mem_free_pct_min_t3: u8,
    /// Minimum free-memory percentage required to remain at Tier 2.
    pub mem_free_pct_min_t2: u8,
    /// When retries are exhausted at Tier 1→2, also set EMERGENCY and
    /// QUARANTINE rather than simply staying at Tier 1.
    pub emergency_on_exhaustion: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            health_threshold_t2: 3,
            health_threshold_t3_boot: 6,
            health_threshold_t3_runtime: 9,
            brownout_cooldown_boots: 2,
            verifier_unreachable_threshold: 2,
            sustained_low_health_threshold: 2,
            t3_grace_seconds: 10,
            monitor_tick_seconds: 10,
            reachability_timeout_seconds: 2,
            network_stability_window_seconds: 60,
            network_stability_poll_seconds: 5,
            var_free_min_bytes_t3: 10 * 1024 * 1024,
            var_free_min_bytes_t2: 5 * 1024 * 1024,
            mem_free_pct_min_t3: 5,
            mem_free_pct_min_t2: 3,
            emergency_on_exhaustion: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_figures() {
        let cfg = PolicyConfig::default();
        assert_eq!(cfg.health_threshold_t2, 3);
        assert_eq!(cfg.health_threshold_t3_boot, 6);
        assert_eq!(cfg.brownout_cooldown_boots, 2);
        assert_eq!(cfg.t3_grace_seconds, 10);
        assert_eq!(cfg.monitor_tick_seconds, 10);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let parsed: PolicyConfig = toml::from_str("health_threshold_t2 = 4\n").unwrap();
        assert_eq!(parsed.health_threshold_t2, 4);
        assert_eq!(parsed.health_threshold_t3_boot, 6); // default
    }
}
