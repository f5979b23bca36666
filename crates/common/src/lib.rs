use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, clamped to 0 on a clock that predates it.
pub fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// One of the three operational tiers a device may boot into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Minimal safe tier. Always reachable.
    One = 1,
    /// Network-enabled, integrity-verified root.
    Two = 2,
    /// Full-feature, remote-attested, measured-integrity root.
    Three = 3,
}

impl Tier {
    /// Decode a raw tier byte, rejecting anything outside {1,2,3} per §3.1.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Tier::One),
            2 => Some(Tier::Two),
            3 => Some(Tier::Three),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The next tier up, if one exists.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::One => Some(Tier::Two),
            Tier::Two => Some(Tier::Three),
            Tier::Three => None,
        }
    }

    /// The tier one step down, if one exists.
    pub fn prev(self) -> Option<Tier> {
        match self {
            Tier::One => None,
            Tier::Two => Some(Tier::One),
            Tier::Three => Some(Tier::Two),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// Flag algebra (C4) — typed bitset over boot status flags
// ---------------------------------------------------------------------------

pub mod flag {
    pub const EMERGENCY: u32 = 1;
    pub const QUARANTINE: u32 = 2;
    pub const BROWNOUT: u32 = 4;
    pub const DIRTY: u32 = 8;
    pub const NETWORK_GATED: u32 = 16;

    /// All flag bits that are currently defined; anything outside this mask
    /// is preserved on read but never set by this implementation.
    pub const ALL: u32 = EMERGENCY | QUARANTINE | BROWNOUT | DIRTY | NETWORK_GATED;

    pub fn name_to_bit(name: &str) -> Option<u32> {
        match name {
            "emergency" => Some(EMERGENCY),
            "quarantine" => Some(QUARANTINE),
            "brownout" => Some(BROWNOUT),
            "dirty" => Some(DIRTY),
            "network_gated" => Some(NETWORK_GATED),
            _ => None,
        }
    }
}

/// Bitset over the flags in [`flag`]. `set`/`clear`/`test` are total and
/// idempotent: applying the same operation twice leaves the set unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u32);

impl Flags {
    pub fn empty() -> Self {
        Flags(0)
    }

    pub fn set(self, bit: u32) -> Self {
        Flags(self.0 | bit)
    }

    pub fn clear(self, bit: u32) -> Self {
        Flags(self.0 & !bit)
    }

    pub fn test(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

// ---------------------------------------------------------------------------
// BootRecord — the journal's payload (§3.1)
// ---------------------------------------------------------------------------

pub const LAYOUT_VERSION: u32 = 1;
pub const MAGIC: u32 = 0xA771A771;
pub const INITIAL_TRIES: u8 = 3;

/// Durable boot-controller state. Mutated only via the journal store's
/// read-modify-write cycle (`crc32` and `timestamp` are codec-level and not
/// held here — they're derived at write time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRecord {
    pub version: u32,
    pub tier: Tier,
    pub tries_t2: u8,
    pub tries_t3: u8,
    pub rollback_idx: u8,
    pub flags: Flags,
    pub boot_count: u64,
    pub timestamp: u64,
    /// `boot_count` at which the BROWNOUT flag was last set; used by the
    /// brownout-cooldown guard (measured in boots elapsed, not wall time).
    /// Not named in the original field table — see DESIGN.md for why it was
    /// added to the layout.
    pub brownout_since_boot: u64,
}

impl BootRecord {
    /// The record written when a journal is first initialized.
    pub fn default_record() -> Self {
        Self {
            version: LAYOUT_VERSION,
            tier: Tier::One,
            tries_t2: INITIAL_TRIES,
            tries_t3: INITIAL_TRIES,
            rollback_idx: 0,
            flags: Flags::empty(),
            boot_count: 0,
            timestamp: 0,
            brownout_since_boot: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// ReasonCode / TierDecision (§3.4)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    HealthBelowThreshold,
    RetriesExhausted,
    VerifierUnreachable,
    AttestationFailed,
    NetworkUnstable,
    TierRootMissing,
    Quarantined,
    BrownoutCooldown,
    ImaViolation,
    DiskCritical,
    MemoryCritical,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::HealthBelowThreshold => "health-below-threshold",
            ReasonCode::RetriesExhausted => "retries-exhausted",
            ReasonCode::VerifierUnreachable => "verifier-unreachable",
            ReasonCode::AttestationFailed => "attestation-failed",
            ReasonCode::NetworkUnstable => "network-unstable",
            ReasonCode::TierRootMissing => "tier-root-missing",
            ReasonCode::Quarantined => "quarantined",
            ReasonCode::BrownoutCooldown => "brownout-cooldown",
            ReasonCode::ImaViolation => "ima-violation",
            ReasonCode::DiskCritical => "disk-critical",
            ReasonCode::MemoryCritical => "memory-critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierDecision {
    Promote { to: Tier },
    Stay { at: Tier, reason: ReasonCode },
    Demote {
        from: Tier,
        to: Tier,
        reason: ReasonCode,
        secondary: Vec<ReasonCode>,
    },
    Emergency { reason: ReasonCode },
}

// ---------------------------------------------------------------------------
// Error taxonomy (§7)
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BootCtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad page layout: expected {expected} bytes, got {got}")]
    BadLayout { expected: usize, got: usize },

    #[error("bad tier for retry accounting: {0}")]
    BadTier(u8),

    #[error("journal corrupted: {0}")]
    Corrupt(String),

    #[error("health report unavailable or malformed: {0}")]
    Config(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_round_trips_through_u8() {
        for t in [Tier::One, Tier::Two, Tier::Three] {
            assert_eq!(Tier::from_u8(t.as_u8()), Some(t));
        }
    }

    #[test]
    fn tier_rejects_out_of_range() {
        for bad in [0u8, 4, 255] {
            assert_eq!(Tier::from_u8(bad), None);
        }
    }

    #[test]
    fn flags_set_is_idempotent() {
        let f = Flags::empty().set(flag::DIRTY);
        assert_eq!(f.set(flag::DIRTY), f);
    }

    #[test]
    fn flags_clear_set_clear_equals_clear() {
        let f = Flags::empty();
        let once = f.clear(flag::DIRTY).set(flag::DIRTY).clear(flag::DIRTY);
        assert_eq!(once, f.clear(flag::DIRTY));
    }

    #[test]
    fn flags_test_reflects_set_and_clear() {
        let f = Flags::empty().set(flag::QUARANTINE);
        assert!(f.test(flag::QUARANTINE));
        assert!(!f.test(flag::BROWNOUT));
        let f = f.clear(flag::QUARANTINE);
        assert!(!f.test(flag::QUARANTINE));
    }
}
