//! Cross-crate integration test helpers.
//!
//! Provides checks that span the writer, readers, checkpointing and the
//! watcher.

use std::path::Path;
use tidewal_core::{Reader, SegmentBufReader, WalResult};

use crate::fixtures::segment_indexes;

/// Reads every segment of `dir` on its own and returns the records of
/// each, in segment order.
///
/// A record split across two segments makes one of the reads fail, so
/// this also checks that records never cross a segment boundary.
pub fn read_segments_independently(dir: &Path) -> WalResult<Vec<Vec<Vec<u8>>>> {
    segment_indexes(dir)
        .into_iter()
        .map(|index| {
            let mut reader = Reader::from_segments(SegmentBufReader::open_segment(dir, index)?);
            let mut records = Vec::new();
            while reader.next()? {
                records.push(reader.record().to_vec());
            }
            Ok(records)
        })
        .collect()
}

/// Test writer and reader integration.
pub mod replay {
    use super::*;
    use crate::fixtures::{read_records, TempWal};

    /// Logs `batches`, reopens the WAL and checks that every record comes
    /// back in order, both through one reader and segment by segment.
    pub fn check_roundtrip(wal: &mut TempWal, batches: &[Vec<Vec<u8>>]) {
        for batch in batches {
            wal.log(batch).expect("Failed to log batch");
        }
        let expected: Vec<Vec<u8>> = batches.iter().flatten().cloned().collect();

        assert_eq!(wal.reopen_and_read(), expected);

        let per_segment = read_segments_independently(wal.path()).expect("Segment read failed");
        let joined: Vec<Vec<u8>> = per_segment.into_iter().flatten().collect();
        assert_eq!(joined, expected);
        assert_eq!(read_records(wal.path()), expected);
    }
}

/// Test checkpoint and watcher integration.
pub mod watching {
    use crate::fixtures::RecordingSink;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Polls `sink` until `check` holds, for up to ten seconds.
    pub fn wait_for(
        sink: &RecordingSink,
        check: impl Fn(&crate::fixtures::Recorded) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if sink.with(&check) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::watching::wait_for;
    use super::*;
    use crate::crash::{segment_path, truncate_segment};
    use crate::fixtures::{
        read_records, samples_record, series_record, try_read_records, RecordingSink, TempWal,
    };
    use crate::generators::{batches_strategy, PropTestConfig};
    use proptest::prelude::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tidewal_core::{
        checkpoint, last_checkpoint, Wal, WalOptions, Watcher, WatcherOptions, PAGE_SIZE,
    };

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn logged_batches_read_back_in_order(
            batches in batches_strategy(8),
            compress in any::<bool>(),
        ) {
            let mut wal = TempWal::new(WalOptions::new().segment_pages(4).compress(compress));
            replay::check_roundtrip(&mut wal, &batches);
        }
    }

    #[test]
    fn records_never_cross_segments() {
        let mut wal = TempWal::with_pages(2);
        let sizes = [20_000, 50_000, 10, 60_000, 0, 33_000, 70_000, 5];
        let batches: Vec<Vec<Vec<u8>>> = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| vec![vec![i as u8 + 1; n]])
            .collect();

        replay::check_roundtrip(&mut wal, &batches);
        assert!(wal.segment_indexes().len() > 3);
    }

    #[test]
    fn segments_are_page_aligned_after_close() {
        let mut wal = TempWal::with_pages(4);
        for i in 0..50u32 {
            wal.log(&[vec![i as u8; 3_000 + i as usize * 100]]).unwrap();
        }
        wal.close();

        for index in wal.segment_indexes() {
            let len = crate::crash::segment_size(&segment_path(wal.path(), index));
            assert_eq!(len % PAGE_SIZE as u64, 0, "segment {index}");
        }
    }

    #[test]
    fn writing_continues_after_repair() {
        let mut wal = TempWal::with_pages(4);
        let before: Vec<Vec<u8>> = (1..=5u8).map(|i| vec![i; 100]).collect();
        wal.log(&before).unwrap();
        wal.close();

        // Tear the payload of the fourth record.
        truncate_segment(&segment_path(wal.path(), 0), 3 * 107 + 50);
        let (read, err) = try_read_records(wal.path());
        assert_eq!(read, before[..3]);
        let err = err.unwrap();

        wal.reopen();
        wal.repair(&err).unwrap();
        wal.log(&[b"after".as_slice()]).unwrap();
        wal.close();

        let mut expected = before[..3].to_vec();
        expected.push(b"after".to_vec());
        assert_eq!(read_records(wal.path()), expected);
    }

    #[test]
    fn repair_torn_record_followed_by_newer_segment() {
        let mut wal = TempWal::with_pages(4);
        wal.log(&[b"keep".to_vec(), vec![3u8; 40_000]]).unwrap();
        wal.close();
        truncate_segment(&segment_path(wal.path(), 0), PAGE_SIZE as u64);

        // Reopening starts segment 1 behind the torn record.
        wal.reopen();
        let (read, err) = try_read_records(wal.path());
        assert_eq!(read, vec![b"keep".to_vec()]);
        let err = err.unwrap();
        assert_eq!(err.as_corruption().unwrap().segment, Some(0));

        wal.repair(&err).unwrap();
        wal.log(&[b"after".as_slice()]).unwrap();
        wal.close();

        assert_eq!(read_records(wal.path()), vec![b"keep".to_vec(), b"after".to_vec()]);
        assert_eq!(wal.segment_indexes(), vec![0, 1]);
    }

    #[test]
    fn checkpoint_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new().segment_pages(4)).unwrap();
        wal.log(&[series_record(&[1, 2, 3]), samples_record(&[(1, 10, 1.0), (2, 90, 2.0)])])
            .unwrap();
        wal.next_segment().unwrap();
        wal.log(&[samples_record(&[(3, 95, 3.0)])]).unwrap();
        wal.next_segment().unwrap();
        wal.log(&[series_record(&[4])]).unwrap();

        let stats = checkpoint(&wal, 0, 1, |r| r != 2, 50).unwrap();
        assert_eq!(stats.dropped_series, 1);
        assert_eq!(stats.dropped_samples, 1);
        wal.truncate(2).unwrap();
        wal.close().unwrap();

        let (cp_dir, index) = last_checkpoint(dir.path()).unwrap().unwrap();
        assert_eq!(index, 1);
        let records = read_records(&cp_dir);
        assert_eq!(records[0], series_record(&[1, 3]));
        assert_eq!(records[1], samples_record(&[(2, 90, 2.0)]));
        assert_eq!(records[2], samples_record(&[(3, 95, 3.0)]));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn watcher_follows_checkpoint_and_live_segments() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new().segment_pages(4)).unwrap();
        wal.log(&[series_record(&[1]), samples_record(&[(1, 50, 1.0)])]).unwrap();
        wal.next_segment().unwrap();
        wal.log(&[series_record(&[2])]).unwrap();

        checkpoint(&wal, 0, 0, |_| true, 0).unwrap();
        wal.truncate(1).unwrap();

        // The watcher only forwards samples newer than its start time.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let sink = RecordingSink::new();
        let handle = Watcher::new(
            WatcherOptions::new("e2e", dir.path())
                .read_period(Duration::from_millis(1))
                .segment_check_period(Duration::from_millis(5)),
            Box::new(sink.clone()),
        )
        .start()
        .unwrap();

        assert!(wait_for(&sink, |r| r.series.contains(&(2, 1))));
        wal.log(&[samples_record(&[(2, now + 60_000, 2.0)])]).unwrap();
        assert!(wait_for(&sink, |r| r.samples.iter().any(|s| s.series_ref == 2)));

        wal.next_segment().unwrap();
        wal.log(&[series_record(&[3]), samples_record(&[(3, now + 60_000, 3.0)])]).unwrap();
        assert!(wait_for(&sink, |r| r.samples.iter().any(|s| s.series_ref == 3)));

        let metrics = std::sync::Arc::clone(handle.metrics());
        handle.stop();
        wal.close().unwrap();

        sink.with(|r| {
            // Series from the checkpoint carry its index.
            assert!(r.series.contains(&(1, 0)));
            assert!(r.series.contains(&(3, 2)));
            // Checkpoint samples are never sent.
            assert!(r.samples.iter().all(|s| s.series_ref != 1));
        });
        assert_eq!(metrics.current_segment(), 2);
    }
}
