//! The boot controller (C9): a single pass of the tier ladder, executed once
//! per boot. One promotion attempt per invocation — from whatever tier the
//! journal committed last boot — since a successful promotion requires a
//! different root filesystem and therefore a reboot before the ladder can be
//! climbed further.

use pac_bootctl_common::{flag, ReasonCode, Tier};
use pac_bootctl_health::{HealthReport, Probes};
use pac_bootctl_journal::{flags, retry, JournalHandle};
use pac_bootctl_policy::{may_promote, AttestationOutcome, AttestationProcedure, PolicyConfig};

/// The terminal state a single boot sequence ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Tier1,
    Tier2,
    Tier3,
    Emergency,
}

/// Runs one boot-time pass: increments `boot_count`, checks the emergency
/// escape hatch, then attempts exactly one tier promotion. Every branch
/// commits before returning — by the time this function returns, the journal
/// reflects the decision.
pub fn run_boot_sequence(
    handle: &mut JournalHandle,
    health: &HealthReport,
    probes: &dyn Probes,
    attestation: &dyn AttestationProcedure,
    cfg: &PolicyConfig,
) -> Result<BootOutcome, pac_bootctl_common::BootCtlError> {
    let record = handle.read()?;
    let mut record = pac_bootctl_common::BootRecord {
        boot_count: record.boot_count.saturating_add(1),
        ..record
    };
    handle.write(&record)?;

    if flags::is_emergency(&record) {
        tracing::warn!("boot controller: EMERGENCY flag set, staying at Tier 1");
        return Ok(BootOutcome::Emergency);
    }

    if record.tries_t2 == 0 && cfg.emergency_on_exhaustion {
        tracing::error!("boot controller: tries_t2 exhausted, entering EMERGENCY");
        record = flags::set(record, flag::EMERGENCY);
        record = flags::set(record, flag::QUARANTINE);
        record.tier = Tier::One;
        handle.write(&record)?;
        return Ok(BootOutcome::Emergency);
    }

    match record.tier {
        Tier::One => attempt_t1_to_t2(handle, record, health, probes, cfg),
        Tier::Two => attempt_t2_to_t3(handle, record, health, probes, attestation, cfg),
        Tier::Three => Ok(BootOutcome::Tier3),
    }
}

fn attempt_t1_to_t2(
    handle: &mut JournalHandle,
    mut record: pac_bootctl_common::BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
    cfg: &PolicyConfig,
) -> Result<BootOutcome, pac_bootctl_common::BootCtlError> {
    match may_promote(cfg, &record, health, probes, Tier::One, Tier::Two) {
        Ok(()) => {
            record.tier = Tier::Two;
            record = flags::clear(record, flag::DIRTY);
            record = flags::clear_brownout(record);
            handle.write(&record)?;
            tracing::info!(tier = ?Tier::Two, "promoted");
            Ok(BootOutcome::Tier2)
        }
        Err(reason) => {
            tracing::info!(reason = %reason, "promotion to Tier 2 denied, staying at Tier 1");
            record = flags::set(record, flag::DIRTY);
            handle.write(&record)?;
            Ok(BootOutcome::Tier1)
        }
    }
}

fn attempt_t2_to_t3(
    handle: &mut JournalHandle,
    mut record: pac_bootctl_common::BootRecord,
    health: &HealthReport,
    probes: &dyn Probes,
    attestation: &dyn AttestationProcedure,
    cfg: &PolicyConfig,
) -> Result<BootOutcome, pac_bootctl_common::BootCtlError> {
    match may_promote(cfg, &record, health, probes, Tier::Two, Tier::Three) {
        Ok(()) => match attestation.attest() {
            AttestationOutcome::Pass => {
                record.tier = Tier::Three;
                handle.write(&record)?;
                tracing::info!(tier = ?Tier::Three, "promoted");
                Ok(BootOutcome::Tier3)
            }
            outcome => {
                tracing::warn!(?outcome, reason = %ReasonCode::AttestationFailed, "attestation failed, staying at Tier 2");
                record = retry::decrement(record, Tier::Three)?;
                handle.write(&record)?;
                Ok(BootOutcome::Tier2)
            }
        },
        Err(reason) => {
            tracing::info!(reason = %reason, "promotion to Tier 3 denied, staying at Tier 2");
            Ok(BootOutcome::Tier2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pac_bootctl_common::BootRecord;
    use pac_bootctl_health::FakeProbes;
    use pac_bootctl_policy::FakeAttestation;
    use tempfile::NamedTempFile;

    fn temp_path() -> std::path::PathBuf {
        NamedTempFile::new().unwrap().into_temp_path().to_path_buf()
    }

    fn healthy_report() -> HealthReport {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            format!(
                r#"{{"overall_score": 9, "overall_status": "healthy",
                    "checks": {{"memory": true, "storage": true}}, "timestamp": {now}}}"#,
                now = pac_bootctl_common::now_seconds()
            ),
        )
        .unwrap();
        HealthReport::load(tmp.path())
    }

    #[test]
    fn fresh_device_climbs_one_tier_per_boot() {
        let cfg = PolicyConfig::default();
        let path = temp_path();
        let probes = FakeProbes::new();
        let attestation = FakeAttestation::always(AttestationOutcome::Pass);
        let health = healthy_report();

        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        assert_eq!(
            run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap(),
            BootOutcome::Tier2
        );

        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        assert_eq!(
            run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap(),
            BootOutcome::Tier3
        );

        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        assert_eq!(
            run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap(),
            BootOutcome::Tier3
        );

        let record = handle.read().unwrap();
        assert_eq!(record.tier, Tier::Three);
        assert_eq!(record.boot_count, 3);
        assert_eq!(record.flags, pac_bootctl_common::Flags::empty());
        assert_eq!(record.tries_t2, 3);
        assert_eq!(record.tries_t3, 3);
    }

    #[test]
    fn retries_exhausted_triggers_emergency_and_quarantine() {
        let cfg = PolicyConfig::default();
        let path = temp_path();
        {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let mut record = BootRecord::default_record();
            record.tries_t2 = 0;
            handle.write(&record).unwrap();
        }

        let probes = FakeProbes::new();
        let attestation = FakeAttestation::always(AttestationOutcome::Pass);
        let health = healthy_report();
        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let outcome = run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap();
        assert_eq!(outcome, BootOutcome::Emergency);

        let record = handle.read().unwrap();
        assert_eq!(record.tier, Tier::One);
        assert!(flags::is_emergency(&record));
        assert!(flags::is_quarantined(&record));
    }

    #[test]
    fn brownout_cooldown_holds_at_tier_1_until_elapsed() {
        let cfg = PolicyConfig::default();
        let path = temp_path();
        {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let mut record = BootRecord::default_record();
            record = flags::set_brownout(record, 0);
            handle.write(&record).unwrap();
        }

        let probes = FakeProbes::new();
        let attestation = FakeAttestation::always(AttestationOutcome::Pass);
        let health = healthy_report();

        // Boots N+1, N+2: still under cooldown (brownout set at boot 0;
        // cooldown elapses once boot_count - brownout_since_boot >= 2).
        for _ in 0..2 {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let outcome = run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap();
            assert_eq!(outcome, BootOutcome::Tier1);
        }

        // Boot N+3: cooldown has elapsed, promotion succeeds.
        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let outcome = run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap();
        assert_eq!(outcome, BootOutcome::Tier2);
    }

    #[test]
    fn failed_attestation_decrements_tries_t3_and_stays_at_tier_2() {
        let cfg = PolicyConfig::default();
        let path = temp_path();
        {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let record = BootRecord {
                tier: Tier::Two,
                ..BootRecord::default_record()
            };
            handle.write(&record).unwrap();
        }

        let probes = FakeProbes::new();
        let attestation = FakeAttestation::always(AttestationOutcome::Fail);
        let health = healthy_report();
        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let outcome = run_boot_sequence(&mut handle, &health, &probes, &attestation, &cfg).unwrap();
        assert_eq!(outcome, BootOutcome::Tier2);

        let record = handle.read().unwrap();
        assert_eq!(record.tier, Tier::Two);
        assert_eq!(record.tries_t3, 2);
    }
}
