use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use pac_bootctl_common::{now_seconds, BootCtlError, BootRecord};

use crate::codec::{self, PAGE_SIZE};

#[derive(Debug, Clone, Copy)]
enum PageSlot {
    A,
    B,
}

impl PageSlot {
    fn offset(self) -> u64 {
        match self {
            PageSlot::A => 0,
            PageSlot::B => PAGE_SIZE as u64,
        }
    }
}

/// An open journal file. Exactly one process owns a `JournalHandle` at a
/// time (the boot controller, the runtime monitor, or an administrative CLI
/// invocation run while the monitor is stopped) — see the single-writer
/// invariant in the concurrency model.
pub struct JournalHandle {
    file: File,
    path: PathBuf,
}

impl JournalHandle {
    /// Opens an existing journal; if the file is missing or shorter than two
    /// pages, writes two copies of the default record first.
    pub fn open_or_init(path: &Path) -> Result<Self, BootCtlError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let mut handle = JournalHandle {
            file,
            path: path.to_path_buf(),
        };

        if len < 2 * PAGE_SIZE as u64 {
            handle.file.set_len(2 * PAGE_SIZE as u64)?;
            handle.write(&BootRecord::default_record())?;
        }

        Ok(handle)
    }

    /// Executes the recovery algorithm and returns the chosen record. Never
    /// returns an invalid record.
    pub fn read(&mut self) -> Result<BootRecord, BootCtlError> {
        let page_a = self.read_page_bytes(PageSlot::A)?;
        let page_b = self.read_page_bytes(PageSlot::B)?;

        let raw_a = codec::decode_raw(&page_a)?;
        let raw_b = codec::decode_raw(&page_b)?;
        let valid_a = codec::validate(&page_a, &raw_a);
        let valid_b = codec::validate(&page_b, &raw_b);

        match (valid_a, valid_b) {
            (true, true) => {
                let rec_a = codec::into_record(&raw_a);
                let rec_b = codec::into_record(&raw_b);
                // Larger boot_count wins; ties favor Page A. The stale page
                // is healed to match so both pages converge again.
                if rec_b.boot_count > rec_a.boot_count {
                    tracing::warn!(path = %self.path.display(), "page A stale, healing from page B");
                    self.heal_page(PageSlot::A, &rec_b, raw_b.timestamp)?;
                    Ok(rec_b)
                } else if rec_a.boot_count > rec_b.boot_count {
                    tracing::warn!(path = %self.path.display(), "page B stale, healing from page A");
                    self.heal_page(PageSlot::B, &rec_a, raw_a.timestamp)?;
                    Ok(rec_a)
                } else {
                    Ok(rec_a)
                }
            }
            (true, false) => {
                let rec_a = codec::into_record(&raw_a);
                tracing::warn!(path = %self.path.display(), "page B invalid, healing from page A");
                self.heal_page(PageSlot::B, &rec_a, raw_a.timestamp)?;
                Ok(rec_a)
            }
            (false, true) => {
                let rec_b = codec::into_record(&raw_b);
                tracing::warn!(path = %self.path.display(), "page A invalid, healing from page B");
                self.heal_page(PageSlot::A, &rec_b, raw_b.timestamp)?;
                Ok(rec_b)
            }
            (false, false) => {
                tracing::error!(path = %self.path.display(), "both journal pages corrupt, resetting to default");
                let default = BootRecord::default_record();
                self.write(&default)?;
                Ok(default)
            }
        }
    }

    /// Rewrites a single stale/corrupt page from the surviving record and
    /// flushes it durably, without touching the other page.
    fn heal_page(&mut self, slot: PageSlot, record: &BootRecord, timestamp: u64) -> Result<(), BootCtlError> {
        self.write_page(slot, record, timestamp)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Refreshes timestamp and CRC, then writes Page A (flushing to durable
    /// media), then Page B (flushing again). A crash between the two flushes
    /// can only leave Page B stale — never both pages simultaneously torn.
    pub fn write(&mut self, record: &BootRecord) -> Result<(), BootCtlError> {
        let timestamp = now_seconds();
        self.write_page(PageSlot::A, record, timestamp)?;
        self.file.sync_all()?;
        self.write_page(PageSlot::B, record, timestamp)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Releases OS resources. Taking `self` by value makes re-use after
    /// close a compile error rather than a runtime hazard.
    pub fn close(self) {
        drop(self);
    }

    fn write_page(&mut self, slot: PageSlot, record: &BootRecord, timestamp: u64) -> Result<(), BootCtlError> {
        let bytes = codec::encode(record, timestamp);
        self.file.seek(SeekFrom::Start(slot.offset()))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn read_page_bytes(&mut self, slot: PageSlot) -> Result<[u8; PAGE_SIZE], BootCtlError> {
        let mut buf = [0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(slot.offset()))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pac_bootctl_common::{flag, Flags, Tier};
    use tempfile::NamedTempFile;

    fn temp_path() -> PathBuf {
        NamedTempFile::new().unwrap().into_temp_path().to_path_buf()
    }

    #[test]
    fn open_or_init_creates_two_pages_of_defaults() {
        let path = temp_path();
        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let record = handle.read().unwrap();
        assert_eq!(record, BootRecord::default_record());

        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, 2 * PAGE_SIZE as u64); // P7
    }

    #[test]
    fn write_then_read_round_trips() {
        let path = temp_path();
        let mut handle = JournalHandle::open_or_init(&path).unwrap();

        let record = BootRecord {
            tier: Tier::Two,
            boot_count: 5,
            flags: Flags::empty().set(flag::DIRTY),
            ..BootRecord::default_record()
        };
        handle.write(&record).unwrap();

        let back = handle.read().unwrap();
        assert_eq!(back.tier, Tier::Two);
        assert_eq!(back.boot_count, 5);
        assert!(back.flags.test(flag::DIRTY));
    }

    #[test]
    fn heals_page_b_when_only_page_a_is_valid() {
        let path = temp_path();
        {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let record = BootRecord {
                tier: Tier::Three,
                boot_count: 9,
                ..BootRecord::default_record()
            };
            handle.write(&record).unwrap();
        }

        // Corrupt page B's trailer.
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(PAGE_SIZE as u64 + 40)).unwrap();
            file.write_all(&[0u8; 4]).unwrap();
        }

        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let record = handle.read().unwrap();
        assert_eq!(record.tier, Tier::Three);
        assert_eq!(record.boot_count, 9);

        // Page B should now be healed and match Page A.
        let page_b = handle.read_page_bytes(PageSlot::B).unwrap();
        let raw_b = codec::decode_raw(&page_b).unwrap();
        assert!(codec::validate(&page_b, &raw_b));
        assert_eq!(raw_b.boot_count, 9);
    }

    #[test]
    fn larger_boot_count_page_a_wins_on_tie_break_rules() {
        let path = temp_path();
        let mut handle = JournalHandle::open_or_init(&path).unwrap();

        // Write a record with boot_count 3, then hand-craft page B with a
        // smaller boot_count to simulate a page that fell behind.
        let newer = BootRecord {
            boot_count: 3,
            ..BootRecord::default_record()
        };
        handle.write(&newer).unwrap();
        let record = handle.read().unwrap();
        assert_eq!(record.boot_count, 3); // both pages agree, A wins tie
    }

    #[test]
    fn both_pages_corrupt_resets_to_default() {
        let path = temp_path();
        {
            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let record = BootRecord {
                tier: Tier::Three,
                boot_count: 42,
                ..BootRecord::default_record()
            };
            handle.write(&record).unwrap();
        }

        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.write_all(&[0xFFu8; PAGE_SIZE]).unwrap();
            file.seek(SeekFrom::Start(PAGE_SIZE as u64)).unwrap();
            file.write_all(&[0xFFu8; PAGE_SIZE]).unwrap();
        }

        let mut handle = JournalHandle::open_or_init(&path).unwrap();
        let record = handle.read().unwrap();
        assert_eq!(record, BootRecord::default_record());
    }

    #[test]
    fn single_bit_flip_anywhere_in_page_a_yields_page_b_content() {
        for byte_pos in [0usize, 4, 12, 20, 28, 36, 43] {
            let path = temp_path();
            {
                let mut handle = JournalHandle::open_or_init(&path).unwrap();
                let record = BootRecord {
                    tier: Tier::Three,
                    boot_count: 11,
                    ..BootRecord::default_record()
                };
                handle.write(&record).unwrap();
            }

            {
                use std::io::{Seek, SeekFrom, Write};
                let mut file = OpenOptions::new().write(true).open(&path).unwrap();
                file.seek(SeekFrom::Start(byte_pos as u64)).unwrap();
                let mut byte = [0u8; 1];
                {
                    use std::io::Read;
                    let mut f2 = File::open(&path).unwrap();
                    f2.seek(SeekFrom::Start(byte_pos as u64)).unwrap();
                    f2.read_exact(&mut byte).unwrap();
                }
                byte[0] ^= 0x01;
                file.write_all(&byte).unwrap();
            }

            let mut handle = JournalHandle::open_or_init(&path).unwrap();
            let record = handle.read().unwrap();
            assert_eq!(record.tier, Tier::Three, "byte_pos={byte_pos}");
            assert_eq!(record.boot_count, 11, "byte_pos={byte_pos}");
        }
    }
}
