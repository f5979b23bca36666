//! Reboot-as-cancellation (DESIGN NOTES §9): every committed tier change is
//! followed by a forced reboot, since a tier change only takes effect against
//! a different root filesystem. Production code shells out; test harnesses
//! inject a stub and assert on what would have happened without actually
//! tearing down the process.

use std::process::Command;

pub trait Rebooter: Send + Sync {
    fn request_reboot(&self, reason: &str);
}

/// Shells out to `reboot`. Errors are logged, not propagated — by the time a
/// reboot is requested, the journal write it depends on has already landed,
/// so a failed `reboot` call just means the device sits at the new state
/// until the next external trigger.
pub struct ProcessRebooter;

impl Rebooter for ProcessRebooter {
    fn request_reboot(&self, reason: &str) {
        tracing::warn!(reason, "requesting reboot to apply committed tier change");
        if let Err(e) = Command::new("reboot").status() {
            tracing::error!(error = %e, "reboot command failed");
        }
    }
}

/// Records requested reboots in-process instead of executing one, so a
/// caller (or test) can re-enter the boot controller directly.
#[derive(Default)]
pub struct FakeRebooter {
    reasons: std::sync::Mutex<Vec<String>>,
}

impl FakeRebooter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }

    pub fn was_requested(&self) -> bool {
        !self.reasons.lock().unwrap().is_empty()
    }
}

impl Rebooter for FakeRebooter {
    fn request_reboot(&self, reason: &str) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}
