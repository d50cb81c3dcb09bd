//! Crash and corruption helpers.
//!
//! A crash while writing leaves a segment that ends early; disk damage
//! leaves flipped bits. These helpers produce both on segment files so
//! tests can check that readers report them and that repair recovers
//! the intact prefix.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidewal_testkit::crash::{flip_bit, segment_path};
//!
//! flip_bit(&segment_path(dir, 0), 12, 3);
//! ```

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tidewal_core::dir::segment_name;
use tidewal_core::RECORD_HEADER_SIZE;
use tidewal_storage::{FileBackend, StorageBackend};

/// Returns the path of segment `index` in `dir`.
pub fn segment_path(dir: &Path, index: u64) -> PathBuf {
    segment_name(dir, index)
}

/// Flips one bit of the byte at `offset`.
pub fn flip_bit(path: &Path, offset: u64, bit: u8) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("Failed to open segment");
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
    file.read_exact(&mut byte).expect("Failed to read byte");
    byte[0] ^= 1 << (bit % 8);
    file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
    file.write_all(&byte).expect("Failed to write byte");
}

/// Cuts a segment file down to `len` bytes, as a crash mid-write would.
pub fn truncate_segment(path: &Path, len: u64) {
    let mut backend = FileBackend::open(path).expect("Failed to open segment");
    backend.truncate(len).expect("Failed to truncate segment");
    backend.sync().expect("Failed to sync segment");
}

/// Returns the size of a segment file.
pub fn segment_size(path: &Path) -> u64 {
    fs::metadata(path).expect("Failed to stat segment").len()
}

/// Byte ranges of the payloads of records written back to back into the
/// first page of a segment, uncompressed.
pub fn payload_ranges(lengths: &[usize]) -> Vec<(u64, u64)> {
    let mut offset = 0u64;
    lengths
        .iter()
        .map(|&len| {
            let start = offset + RECORD_HEADER_SIZE as u64;
            offset = start + len as u64;
            (start, offset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{read_records, try_read_records, TempWal};
    use crate::generators::{nonzero_payload_strategy, PropTestConfig};
    use proptest::prelude::*;
    use tidewal_core::{ReadError, Wal, WalError, WalOptions};

    fn write_single_page(records: &[Vec<u8>]) -> TempWal {
        let mut wal = TempWal::with_pages(4);
        for rec in records {
            wal.log(&[rec]).unwrap();
        }
        wal.close();
        wal
    }

    fn repair(dir: &Path, err: &WalError) {
        let wal = Wal::open(dir, WalOptions::new().segment_pages(4)).unwrap();
        wal.repair(err).unwrap();
        wal.close().unwrap();
    }

    #[test]
    fn test_flip_bit_changes_one_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, [0u8, 0xff]).unwrap();
        flip_bit(&path, 1, 7);
        assert_eq!(fs::read(&path).unwrap(), vec![0x00, 0x7f]);
    }

    #[test]
    fn test_truncate_segment() {
        let wal = write_single_page(&[vec![1; 100]]);
        let path = segment_path(wal.path(), 0);
        truncate_segment(&path, 50);
        assert_eq!(segment_size(&path), 50);
    }

    #[test]
    fn test_payload_ranges() {
        assert_eq!(payload_ranges(&[1, 2, 0]), vec![(7, 8), (15, 17), (24, 24)]);
    }

    #[test]
    fn test_torn_multi_page_record() {
        let mut wal = TempWal::with_pages(4);
        wal.log(&[vec![7u8; 40_000]]).unwrap();
        wal.close();

        // Keep only the first fragment.
        let path = segment_path(wal.path(), 0);
        truncate_segment(&path, tidewal_core::PAGE_SIZE as u64);

        let (records, err) = try_read_records(wal.path());
        assert!(records.is_empty());
        let err = err.unwrap();
        assert!(err.is_torn_record());
        assert_eq!(err.as_corruption().unwrap().segment, Some(0));

        repair(wal.path(), &err);
        assert!(read_records(wal.path()).is_empty());
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn flipped_payload_bits_are_detected(
            records in prop::collection::vec(nonzero_payload_strategy(1000), 1..20),
            pick in any::<prop::sample::Index>(),
            byte in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let wal = write_single_page(&records);
            let lengths: Vec<usize> = records.iter().map(Vec::len).collect();
            let ranges = payload_ranges(&lengths);

            let victim = pick.index(records.len());
            let (start, end) = ranges[victim];
            let offset = start + byte.index((end - start) as usize) as u64;
            flip_bit(&segment_path(wal.path(), 0), offset, bit);

            let (read, err) = try_read_records(wal.path());
            prop_assert_eq!(&read[..], &records[..victim]);
            let err = err.expect("corruption not detected");
            let cerr = err.as_corruption().expect("not a corruption error");
            let is_checksum = matches!(cerr.cause, ReadError::ChecksumMismatch { .. });
            prop_assert!(is_checksum);
            prop_assert_eq!(cerr.segment, Some(0));
        }

        #[test]
        fn repair_recovers_prefix_of_torn_segment(
            records in prop::collection::vec(nonzero_payload_strategy(1000), 1..20),
            pick in any::<prop::sample::Index>(),
            cut in any::<prop::sample::Index>(),
        ) {
            let wal = write_single_page(&records);
            let lengths: Vec<usize> = records.iter().map(Vec::len).collect();
            let ranges = payload_ranges(&lengths);

            let victim = pick.index(records.len());
            let (start, end) = ranges[victim];
            let len = start + cut.index((end - start) as usize) as u64;
            truncate_segment(&segment_path(wal.path(), 0), len);

            let (read, err) = try_read_records(wal.path());
            prop_assert_eq!(&read[..], &records[..victim]);
            let err = err.expect("torn write not detected");

            repair(wal.path(), &err);
            let (read, err) = try_read_records(wal.path());
            prop_assert!(err.is_none());
            prop_assert_eq!(&read[..], &records[..victim]);

            // A second pass finds nothing to repair.
            let (again, err) = try_read_records(wal.path());
            prop_assert!(err.is_none());
            prop_assert_eq!(again, read);
        }
    }
}
