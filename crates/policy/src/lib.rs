pub mod attestation;
pub mod config;
pub mod guards;

pub use attestation::{AttestationOutcome, AttestationProcedure, FakeAttestation};
pub use config::PolicyConfig;
pub use guards::{may_promote, must_degrade, DegradeState};
