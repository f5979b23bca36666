//! The boot controller and runtime monitor (C9/C10): the two processes that
//! actually drive tier transitions. Everything else in this workspace exists
//! to give these two a correct, testable substrate.

pub mod boot;
pub mod monitor;
pub mod rebooter;

pub use boot::{run_boot_sequence, BootOutcome};
pub use monitor::{RuntimeMonitor, TickOutcome};
pub use rebooter::{FakeRebooter, ProcessRebooter, Rebooter};
