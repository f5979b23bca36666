//! The runtime monitor (C10): the long-running loop started after a terminal
//! boot state of Tier 2 or Tier 3. It is the only journal writer once it has
//! started — see the single-writer invariant in the concurrency model.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pac_bootctl_common::{flag, BootCtlError, Tier};
use pac_bootctl_health::{HealthReport, Probes};
use pac_bootctl_journal::{flags, retry, JournalHandle};
use pac_bootctl_policy::{may_promote, must_degrade, AttestationOutcome, AttestationProcedure, DegradeState, PolicyConfig};

use crate::rebooter::Rebooter;

/// What happened on one tick, for logging and for tests that want to assert
/// on monitor behavior without reading the journal back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// EMERGENCY is set; the tick did nothing but sleep.
    CoolingDown,
    /// Current tier is sound; nothing changed.
    Steady,
    /// Current tier is sound but a promotion attempt did not land (attested
    /// failure at Tier 2→3 decremented `tries_t3` without a tier change).
    PromotionAttemptFailed,
    /// A tier change was committed; a reboot was requested to apply it.
    Promoted { to: Tier },
    Demoted { to: Tier },
}

pub struct RuntimeMonitor<'a> {
    journal_path: PathBuf,
    probes: &'a dyn Probes,
    attestation: &'a dyn AttestationProcedure,
    rebooter: &'a dyn Rebooter,
    health_path: PathBuf,
    cfg: PolicyConfig,
    degrade_state: DegradeState,
}

impl<'a> RuntimeMonitor<'a> {
    pub fn new(
        journal_path: PathBuf,
        health_path: PathBuf,
        probes: &'a dyn Probes,
        attestation: &'a dyn AttestationProcedure,
        rebooter: &'a dyn Rebooter,
        cfg: PolicyConfig,
    ) -> Self {
        Self {
            journal_path,
            probes,
            attestation,
            rebooter,
            health_path,
            cfg,
            degrade_state: DegradeState::new(),
        }
    }

    /// Runs ticks until `shutdown` is cancelled. Each tick is sequential —
    /// two ticks never overlap — and the sleep between ticks is the only
    /// suspension point that honors cancellation.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), BootCtlError> {
        loop {
            let outcome = self.tick()?;
            tracing::info!(?outcome, "monitor tick complete");

            let sleep_for = match outcome {
                TickOutcome::CoolingDown => Duration::from_secs(self.cfg.monitor_tick_seconds * 6),
                _ => Duration::from_secs(self.cfg.monitor_tick_seconds),
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("monitor received shutdown signal, exiting after current tick");
                    return Ok(());
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// One read-evaluate-act pass. Exposed separately from `run` so tests can
    /// drive individual ticks without a runtime.
    pub fn tick(&mut self) -> Result<TickOutcome, BootCtlError> {
        let mut handle = JournalHandle::open_or_init(&self.journal_path)?;
        let record = handle.read()?;

        if flags::is_emergency(&record) {
            return Ok(TickOutcome::CoolingDown);
        }

        let health = HealthReport::load(&self.health_path);
        let tier = record.tier;

        if let Some((primary, secondary)) = must_degrade(
            &self.cfg,
            &record,
            &health,
            self.probes,
            self.attestation,
            tier,
            &mut self.degrade_state,
        ) {
            let to = tier.prev().expect("must_degrade never fires at Tier 1");
            tracing::warn!(from = ?tier, to = ?to, reason = %primary, secondary = ?secondary, "demoting");
            let demoted = pac_bootctl_common::BootRecord { tier: to, ..record };
            handle.write(&demoted)?;
            self.degrade_state.reset();
            self.rebooter.request_reboot(&format!("demoted {tier} -> {to}: {primary}"));
            return Ok(TickOutcome::Demoted { to });
        }

        let Some(next) = tier.next() else {
            return Ok(TickOutcome::Steady);
        };

        match may_promote(&self.cfg, &record, &health, self.probes, tier, next) {
            Err(reason) => {
                tracing::debug!(from = ?tier, to = ?next, reason = %reason, "promotion denied");
                Ok(TickOutcome::Steady)
            }
            Ok(()) => self.apply_promotion(&mut handle, record, tier, next),
        }
    }

    fn apply_promotion(
        &mut self,
        handle: &mut JournalHandle,
        mut record: pac_bootctl_common::BootRecord,
        from: Tier,
        to: Tier,
    ) -> Result<TickOutcome, BootCtlError> {
        match (from, to) {
            (Tier::One, Tier::Two) => {
                record.tier = Tier::Two;
                record = flags::clear(record, flag::DIRTY);
                record = flags::clear_brownout(record);
                handle.write(&record)?;
                self.rebooter.request_reboot("promoted T1 -> T2");
                Ok(TickOutcome::Promoted { to: Tier::Two })
            }
            (Tier::Two, Tier::Three) => match self.attestation.attest() {
                AttestationOutcome::Pass => {
                    record.tier = Tier::Three;
                    handle.write(&record)?;
                    self.degrade_state.reset();
                    self.rebooter.request_reboot("promoted T2 -> T3");
                    Ok(TickOutcome::Promoted { to: Tier::Three })
                }
                _ => {
                    record = retry::decrement(record, Tier::Three)?;
                    handle.write(&record)?;
                    Ok(TickOutcome::PromotionAttemptFailed)
                }
            },
            _ => unreachable!("may_promote only ever returns Ok for adjacent tier pairs"),
        }
    }
}
