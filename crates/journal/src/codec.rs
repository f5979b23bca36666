use pac_bootctl_common::{BootCtlError, BootRecord, Flags, Tier, INITIAL_TRIES, LAYOUT_VERSION, MAGIC};

use crate::crc::crc32;

/// On-disk size of one page: the serialized size of one [`BootRecord`] plus
/// its CRC and trailer. No padding, no alignment gaps — field order exactly
/// matches the table in the journal format's specification.
///
/// version(4) + tier(1) + tries_t2(1) + tries_t3(1) + rollback_idx(1)
/// + flags(4) + boot_count(8) + timestamp(8) + brownout_since_boot(8)
/// + crc32(4) + trailer(4)
pub const PAGE_SIZE: usize = 44;

const CRC_COVERED_LEN: usize = 36; // everything before the crc32 field

/// A page's fields as read off disk, before validity judgment. Kept separate
/// from [`BootRecord`] because `tier` may be out of range on a corrupt page.
#[derive(Debug, Clone, Copy)]
pub struct RawPage {
    pub version: u32,
    pub tier_raw: u8,
    pub tries_t2: u8,
    pub tries_t3: u8,
    pub rollback_idx: u8,
    pub flags: u32,
    pub boot_count: u64,
    pub timestamp: u64,
    pub brownout_since_boot: u64,
    pub crc32: u32,
    pub trailer: u32,
}

/// Serialize a [`BootRecord`] plus an explicit timestamp into one page.
/// Refreshes (computes) the CRC and trailer; the caller does not supply them.
pub fn encode(record: &BootRecord, timestamp: u64) -> [u8; PAGE_SIZE] {
    let mut buf = [0u8; PAGE_SIZE];
    buf[0..4].copy_from_slice(&record.version.to_le_bytes());
    buf[4] = record.tier.as_u8();
    buf[5] = record.tries_t2;
    buf[6] = record.tries_t3;
    buf[7] = record.rollback_idx;
    buf[8..12].copy_from_slice(&record.flags.0.to_le_bytes());
    buf[12..20].copy_from_slice(&record.boot_count.to_le_bytes());
    buf[20..28].copy_from_slice(&timestamp.to_le_bytes());
    buf[28..36].copy_from_slice(&record.brownout_since_boot.to_le_bytes());

    let crc = crc32(&buf[0..CRC_COVERED_LEN]);
    buf[36..40].copy_from_slice(&crc.to_le_bytes());
    buf[40..44].copy_from_slice(&MAGIC.to_le_bytes());
    buf
}

/// Parse raw bytes into a [`RawPage`]. Fails with `BadLayout` if the buffer
/// length does not equal [`PAGE_SIZE`] — this is a structural failure, not a
/// content-validity judgment (see [`validate`]).
pub fn decode_raw(bytes: &[u8]) -> Result<RawPage, BootCtlError> {
    if bytes.len() != PAGE_SIZE {
        return Err(BootCtlError::BadLayout {
            expected: PAGE_SIZE,
            got: bytes.len(),
        });
    }

    Ok(RawPage {
        version: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        tier_raw: bytes[4],
        tries_t2: bytes[5],
        tries_t3: bytes[6],
        rollback_idx: bytes[7],
        flags: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        boot_count: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
        timestamp: u64::from_le_bytes(bytes[20..28].try_into().unwrap()),
        brownout_since_boot: u64::from_le_bytes(bytes[28..36].try_into().unwrap()),
        crc32: u32::from_le_bytes(bytes[36..40].try_into().unwrap()),
        trailer: u32::from_le_bytes(bytes[40..44].try_into().unwrap()),
    })
}

/// Check every invariant of a page's validity: trailer, version, tier range,
/// and CRC. A page failing any of these is not safely readable as a record.
pub fn validate(bytes: &[u8], raw: &RawPage) -> bool {
    if raw.trailer != MAGIC {
        return false;
    }
    if raw.version != LAYOUT_VERSION {
        return false;
    }
    if Tier::from_u8(raw.tier_raw).is_none() {
        return false;
    }
    let expected_crc = crc32(&bytes[0..CRC_COVERED_LEN]);
    raw.crc32 == expected_crc
}

/// Convert an already-validated [`RawPage`] into a [`BootRecord`]. Out-of-range
/// retry counters clamp to 0 per the soft invariant in the journal format's
/// specification; callers must have already confirmed `validate` returned true.
pub fn into_record(raw: &RawPage) -> BootRecord {
    let tier = Tier::from_u8(raw.tier_raw).expect("validate() must be called before into_record()");
    BootRecord {
        version: raw.version,
        tier,
        tries_t2: clamp_tries(raw.tries_t2),
        tries_t3: clamp_tries(raw.tries_t3),
        rollback_idx: raw.rollback_idx,
        flags: Flags(raw.flags),
        boot_count: raw.boot_count,
        timestamp: raw.timestamp,
        brownout_since_boot: raw.brownout_since_boot,
    }
}

fn clamp_tries(v: u8) -> u8 {
    if v > INITIAL_TRIES {
        0
    } else {
        v
    }
}
