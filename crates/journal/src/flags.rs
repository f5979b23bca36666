//! Record-level flag algebra (C4). Thin wrappers over the bitset primitive in
//! `pac-bootctl-common` carrying the flag semantics described in the boot
//! record's specification: EMERGENCY pins the device to Tier 1 until cleared
//! administratively, QUARANTINE forces retry budgets to read as exhausted,
//! BROWNOUT gates promotion until a cooldown elapses, DIRTY is informational,
//! and NETWORK_GATED tightens Tier-3 degradation sensitivity.

use pac_bootctl_common::{flag, BootRecord};

pub fn set(record: BootRecord, bit: u32) -> BootRecord {
    BootRecord {
        flags: record.flags.set(bit),
        ..record
    }
}

pub fn clear(record: BootRecord, bit: u32) -> BootRecord {
    BootRecord {
        flags: record.flags.clear(bit),
        ..record
    }
}

pub fn test(record: &BootRecord, bit: u32) -> bool {
    record.flags.test(bit)
}

pub fn is_emergency(record: &BootRecord) -> bool {
    test(record, flag::EMERGENCY)
}

pub fn is_quarantined(record: &BootRecord) -> bool {
    test(record, flag::QUARANTINE)
}

pub fn is_brownout(record: &BootRecord) -> bool {
    test(record, flag::BROWNOUT)
}

pub fn is_dirty(record: &BootRecord) -> bool {
    test(record, flag::DIRTY)
}

pub fn is_network_gated(record: &BootRecord) -> bool {
    test(record, flag::NETWORK_GATED)
}

/// Sets BROWNOUT and stamps the boot ordinal it was set at, so the
/// brownout-cooldown guard can measure elapsed boots across reboots.
pub fn set_brownout(record: BootRecord, at_boot_count: u64) -> BootRecord {
    BootRecord {
        flags: record.flags.set(flag::BROWNOUT),
        brownout_since_boot: at_boot_count,
        ..record
    }
}

/// Clears BROWNOUT. Does not reset `brownout_since_boot` — it is only
/// meaningful while the flag is set.
pub fn clear_brownout(record: BootRecord) -> BootRecord {
    clear(record, flag::BROWNOUT)
}
