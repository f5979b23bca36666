//! Retry-budget accounting (C5): per-tier decrement, reset, exhaustion.

use pac_bootctl_common::{flag, BootCtlError, BootRecord, Tier};

/// Saturating subtraction at 0. Fails with `BadTier` for tiers other than
/// Two or Three (retry budgets don't apply to Tier 1).
pub fn decrement(record: BootRecord, tier: Tier) -> Result<BootRecord, BootCtlError> {
    match tier {
        Tier::Two => Ok(BootRecord {
            tries_t2: record.tries_t2.saturating_sub(1),
            ..record
        }),
        Tier::Three => Ok(BootRecord {
            tries_t3: record.tries_t3.saturating_sub(1),
            ..record
        }),
        Tier::One => Err(BootCtlError::BadTier(tier.as_u8())),
    }
}

/// Restores both retry budgets to their initial value.
pub fn reset(record: BootRecord) -> BootRecord {
    BootRecord {
        tries_t2: pac_bootctl_common::INITIAL_TRIES,
        tries_t3: pac_bootctl_common::INITIAL_TRIES,
        ..record
    }
}

/// Whether promotion to `tier` is forbidden by retry-budget exhaustion.
/// Tier 2 also reads as exhausted while QUARANTINE is set, regardless of the
/// numeric counter.
pub fn exhausted(record: &BootRecord, tier: Tier) -> Result<bool, BootCtlError> {
    match tier {
        Tier::Two => Ok(record.tries_t2 == 0 || record.flags.test(flag::QUARANTINE)),
        Tier::Three => Ok(record.tries_t3 == 0),
        Tier::One => Err(BootCtlError::BadTier(tier.as_u8())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pac_bootctl_common::Flags;

    #[test]
    fn decrement_saturates_at_zero() {
        let mut record = BootRecord::default_record();
        for _ in 0..10 {
            record = decrement(record, Tier::Two).unwrap();
        }
        assert_eq!(record.tries_t2, 0);
        // Idempotent thereafter.
        record = decrement(record, Tier::Two).unwrap();
        assert_eq!(record.tries_t2, 0);
    }

    #[test]
    fn decrement_rejects_tier_one() {
        let record = BootRecord::default_record();
        assert!(matches!(decrement(record, Tier::One), Err(BootCtlError::BadTier(1))));
    }

    #[test]
    fn reset_is_idempotent() {
        let record = BootRecord::default_record();
        let once = reset(reset(record));
        assert_eq!(once, reset(record));
    }

    #[test]
    fn exhausted_tier2_true_when_quarantined_even_with_tries_left() {
        let record = BootRecord {
            flags: Flags::empty().set(pac_bootctl_common::flag::QUARANTINE),
            ..BootRecord::default_record()
        };
        assert!(exhausted(&record, Tier::Two).unwrap());
    }

    #[test]
    fn exhausted_tier3_checks_numeric_only() {
        let mut record = BootRecord::default_record();
        assert!(!exhausted(&record, Tier::Three).unwrap());
        record.tries_t3 = 0;
        assert!(exhausted(&record, Tier::Three).unwrap());
    }
}
