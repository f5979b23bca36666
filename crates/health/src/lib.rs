//! The health oracle adapter (C6) and external probes (C7): the core's only
//! windows onto the outside world. Both sides treat "no data" as "fails all
//! guards," never as "healthy."

pub mod probes;
pub mod report;

pub use probes::{FakeProbes, Probes, RealProbes};
pub use report::{HealthReport, OverallStatus};
