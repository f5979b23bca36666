//! The guard evaluators (C8): `may_promote` and `must_degrade` are the only
//! two functions in this crate that make a tier decision. Both are pure given
//! their inputs — all time-varying state (the Tier-3 grace window, the
//! consecutive-failure streaks) lives in the caller-owned [`DegradeState`],
//! never behind a global.

use std::time::{Duration, Instant};

use pac_bootctl_common::{BootRecord, ReasonCode, Tier};
use pac_bootctl_health::{HealthReport, Probes};
use pac_bootctl_journal::{flags, retry};

use crate::attestation::AttestationProcedure;
use crate::config::PolicyConfig;

/// Mutable, caller-owned state the degrade guards need across ticks: the
/// moment Tier 3 was first observed (for the grace window) and the
/// consecutive-failure streaks that gate the "sustained" guards. A fresh
/// boot, or a promotion into a tier, should start from [`DegradeState::new`].
#[derive(Debug)]
pub struct DegradeState {
    t3_entered_at: Option<Instant>,
    verifier_unreachable_streak: u32,
    low_health_streak: u32,
}

impl DegradeState {
    pub fn new() -> Self {
        Self {
            t3_entered_at: None,
            verifier_unreachable_streak: 0,
            low_health_streak: 0,
        }
    }

    /// Call once when the monitor starts observing Tier 3; idempotent.
    pub fn note_tier3_entry(&mut self) {
        if self.t3_entered_at.is_none() {
            self.t3_entered_at = Some(Instant::now());
        }
    }

    /// Call when the monitor leaves Tier 3 (demoted or rebooted into a
    /// different tier), so a later re-entry gets a fresh grace window.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for DegradeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether promotion from `from` to `to` is currently allowed. The first
/// failing guard, in the order listed for that tier transition, is returned;
/// callers never need to disambiguate a tie because only one reason is ever
/// produced for a promotion check.
pub fn may_promote(
    cfg: &PolicyConfig,
    record: &BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
    from: Tier,
    to: Tier,
) -> Result<(), ReasonCode> {
    match (from, to) {
        (Tier::One, Tier::Two) => may_promote_to_t2(cfg, record, health, probes),
        (Tier::Two, Tier::Three) => may_promote_to_t3(cfg, record, health, probes),
        _ => {
            debug_assert_eq!(from.next(), Some(to), "may_promote called on a non-adjacent tier pair");
            Err(ReasonCode::RetriesExhausted)
        }
    }
}

fn may_promote_to_t2(
    cfg: &PolicyConfig,
    record: &BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
) -> Result<(), ReasonCode> {
    if flags::is_quarantined(record) {
        return Err(ReasonCode::Quarantined);
    }
    if retry::exhausted(record, Tier::Two).unwrap_or(true) {
        return Err(ReasonCode::RetriesExhausted);
    }
    if flags::is_brownout(record) {
        let elapsed_boots = record.boot_count.saturating_sub(record.brownout_since_boot);
        // Must *exceed* the cooldown, not merely reach it: a flag set at
        // boot N with a 2-boot cooldown blocks boots N+1 and N+2, and
        // clears starting at N+3.
        if elapsed_boots <= cfg.brownout_cooldown_boots {
            return Err(ReasonCode::BrownoutCooldown);
        }
    }
    if !probes.tier_root_present(Tier::Two) {
        return Err(ReasonCode::TierRootMissing);
    }
    if health.score() < cfg.health_threshold_t2 {
        return Err(ReasonCode::HealthBelowThreshold);
    }
    if !health.check("memory") || !health.check("storage") {
        return Err(ReasonCode::HealthBelowThreshold);
    }
    Ok(())
}

fn may_promote_to_t3(
    cfg: &PolicyConfig,
    record: &BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
) -> Result<(), ReasonCode> {
    if retry::exhausted(record, Tier::Three).unwrap_or(true) {
        return Err(ReasonCode::RetriesExhausted);
    }
    if !probes.tier_root_present(Tier::Three) {
        return Err(ReasonCode::TierRootMissing);
    }
    if health.score() < cfg.health_threshold_t3_boot {
        return Err(ReasonCode::HealthBelowThreshold);
    }
    let reachability_timeout = Duration::from_secs(cfg.reachability_timeout_seconds);
    if !probes.verifier_reachable(reachability_timeout) {
        return Err(ReasonCode::VerifierUnreachable);
    }
    let window = Duration::from_secs(cfg.network_stability_window_seconds);
    let poll = Duration::from_secs(cfg.network_stability_poll_seconds);
    if !probes.network_stable_for(window, poll) {
        return Err(ReasonCode::NetworkUnstable);
    }
    Ok(())
}

/// Whether the runtime monitor must demote out of `at`. Returns `None` while
/// the tier is sound (or, for Tier 1, always — there is nowhere lower to
/// go). When demotion is required, the first guard that failed this tick is
/// the primary reason; every other guard that also failed this tick is
/// reported as secondary, per the tie-break rule that degradation always
/// wins over promotion and primary reasons are never ambiguous.
pub fn must_degrade(
    cfg: &PolicyConfig,
    record: &BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
    attestation: &dyn AttestationProcedure,
    at: Tier,
    state: &mut DegradeState,
) -> Option<(ReasonCode, Vec<ReasonCode>)> {
    match at {
        Tier::One => None,
        Tier::Two => must_degrade_t2(cfg, health, state),
        Tier::Three => must_degrade_t3(cfg, health, probes, attestation, record, state),
    }
}

fn must_degrade_t2(
    cfg: &PolicyConfig,
    health: &HealthReport,
    state: &mut DegradeState,
) -> Option<(ReasonCode, Vec<ReasonCode>)> {
    // Pushed in the order the guard list is given: health, /var, mem. The
    // first push becomes the primary reason.
    let mut reasons = Vec::new();

    if health.score() < cfg.health_threshold_t2 {
        state.low_health_streak = state.low_health_streak.saturating_add(1);
    } else {
        state.low_health_streak = 0;
    }
    if state.low_health_streak >= cfg.sustained_low_health_threshold {
        reasons.push(ReasonCode::HealthBelowThreshold);
    }

    if health.var_free_bytes() < cfg.var_free_min_bytes_t2 {
        reasons.push(ReasonCode::DiskCritical);
    }
    if health.mem_free_pct() < cfg.mem_free_pct_min_t2 {
        reasons.push(ReasonCode::MemoryCritical);
    }

    split_reasons(reasons)
}

fn must_degrade_t3(
    cfg: &PolicyConfig,
    health: &HealthReport,
    probes: &dyn Probes,
    attestation: &dyn AttestationProcedure,
    record: &BootRecord,
    state: &mut DegradeState,
) -> Option<(ReasonCode, Vec<ReasonCode>)> {
    state.note_tier3_entry();
    let entered_at = state.t3_entered_at.expect("note_tier3_entry just set this");
    if entered_at.elapsed() < Duration::from_secs(cfg.t3_grace_seconds) {
        return None;
    }

    // Pushed in the order the guard list is given: health, verifier, IMA,
    // disk, mem, brownout. The first push becomes the primary reason.
    let mut reasons = Vec::new();

    if health.score() < cfg.health_threshold_t3_runtime {
        reasons.push(ReasonCode::HealthBelowThreshold);
    }

    let reachability_timeout = Duration::from_secs(cfg.reachability_timeout_seconds);
    let verifier_ok = probes.verifier_reachable(reachability_timeout);
    if verifier_ok {
        state.verifier_unreachable_streak = 0;
    } else if flags::is_network_gated(record) {
        // NETWORK_GATED: a single probe failure is enough, no streak or
        // attestation sanity-check needed.
        reasons.push(ReasonCode::VerifierUnreachable);
    } else {
        state.verifier_unreachable_streak = state.verifier_unreachable_streak.saturating_add(1);
        if state.verifier_unreachable_streak >= cfg.verifier_unreachable_threshold
            && !attestation.attest().is_pass()
        {
            reasons.push(ReasonCode::VerifierUnreachable);
            reasons.push(ReasonCode::AttestationFailed);
        }
    }

    if health.ima_violations() > 0 {
        reasons.push(ReasonCode::ImaViolation);
    }
    if health.var_free_bytes() < cfg.var_free_min_bytes_t3 {
        reasons.push(ReasonCode::DiskCritical);
    }
    if health.mem_free_pct() < cfg.mem_free_pct_min_t3 {
        reasons.push(ReasonCode::MemoryCritical);
    }
    if flags::is_brownout(record) {
        reasons.push(ReasonCode::BrownoutCooldown);
    }

    split_reasons(reasons)
}

fn split_reasons(mut reasons: Vec<ReasonCode>) -> Option<(ReasonCode, Vec<ReasonCode>)> {
    if reasons.is_empty() {
        return None;
    }
    let primary = reasons.remove(0);
    Some((primary, reasons))
}
