//! Test fixtures and WAL helpers.
//!
//! Provides temporary log directories, record builders and a recording
//! watcher sink.

use parking_lot::Mutex;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tidewal_core::dir::list_segments;
use tidewal_core::{Reader, SegmentRange, Wal, WalError, WalOptions, WriteTo};
use tidewal_record::{RecordEncoder, RefSample, RefSeries, Tombstone};

/// A WAL in a temporary directory with automatic cleanup.
pub struct TempWal {
    wal: Option<Wal>,
    options: WalOptions,
    dir: TempDir,
}

impl TempWal {
    /// Opens a WAL with the given options in a fresh directory.
    pub fn new(options: WalOptions) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let wal = Wal::open(dir.path(), options.clone()).expect("Failed to open WAL");
        Self {
            wal: Some(wal),
            options,
            dir,
        }
    }

    /// Opens an uncompressed WAL whose segments hold `pages` pages.
    pub fn with_pages(pages: u64) -> Self {
        Self::new(WalOptions::new().segment_pages(pages))
    }

    /// Returns the WAL directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the WAL. Reading the directory afterwards sees every record.
    pub fn close(&mut self) {
        if let Some(wal) = self.wal.take() {
            wal.close().expect("Failed to close WAL");
        }
    }

    /// Closes and reopens the WAL, which starts a new segment.
    pub fn reopen(&mut self) {
        self.close();
        self.wal = Some(Wal::open(self.dir.path(), self.options.clone()).expect("Failed to reopen WAL"));
    }

    /// Closes the WAL, reads every record back and reopens it.
    pub fn reopen_and_read(&mut self) -> Vec<Vec<u8>> {
        self.close();
        let records = read_records(self.dir.path());
        self.reopen();
        records
    }

    /// Returns the indexes of the segment files on disk.
    pub fn segment_indexes(&self) -> Vec<u64> {
        segment_indexes(self.dir.path())
    }
}

impl Deref for TempWal {
    type Target = Wal;

    fn deref(&self) -> &Self::Target {
        self.wal.as_ref().expect("WAL is closed")
    }
}

/// Reads every record of the segments in `dir`, panicking on errors.
pub fn read_records(dir: &Path) -> Vec<Vec<u8>> {
    let (records, err) = try_read_records(dir);
    if let Some(e) = err {
        panic!("Failed to read {}: {e}", dir.display());
    }
    records
}

/// Reads the records of `dir` up to the first error.
pub fn try_read_records(dir: &Path) -> (Vec<Vec<u8>>, Option<WalError>) {
    let mut reader = match Reader::open(&[SegmentRange::all(dir)]) {
        Ok(r) => r,
        Err(e) => return (Vec::new(), Some(e)),
    };
    let mut records = Vec::new();
    loop {
        match reader.next() {
            Ok(true) => records.push(reader.record().to_vec()),
            Ok(false) => return (records, None),
            Err(e) => return (records, Some(e)),
        }
    }
}

/// Returns the segment indexes in `dir`.
pub fn segment_indexes(dir: &Path) -> Vec<u64> {
    list_segments(dir)
        .expect("Failed to list segments")
        .iter()
        .map(|s| s.index)
        .collect()
}

/// Encodes a series record with one `job` label per reference.
pub fn series_record(refs: &[u64]) -> Vec<u8> {
    let series: Vec<RefSeries> = refs
        .iter()
        .map(|&r| RefSeries::new(r, [("job", format!("job-{r}"))]))
        .collect();
    let mut buf = Vec::new();
    RecordEncoder::new().series(&series, &mut buf);
    buf
}

/// Encodes a samples record from `(ref, timestamp, value)` triples.
pub fn samples_record(samples: &[(u64, i64, f64)]) -> Vec<u8> {
    let samples: Vec<RefSample> = samples
        .iter()
        .map(|&(r, t, v)| RefSample::new(r, t, v))
        .collect();
    let mut buf = Vec::new();
    RecordEncoder::new().samples(&samples, &mut buf);
    buf
}

/// Encodes a tombstones record from `(ref, mint, maxt)` triples.
pub fn tombstones_record(tombstones: &[(u64, i64, i64)]) -> Vec<u8> {
    let tombstones: Vec<Tombstone> = tombstones
        .iter()
        .map(|&(r, mint, maxt)| Tombstone::new(r, mint, maxt))
        .collect();
    let mut buf = Vec::new();
    RecordEncoder::new().tombstones(&tombstones, &mut buf);
    buf
}

/// Everything a [`RecordingSink`] has received.
#[derive(Debug, Default)]
pub struct Recorded {
    /// `(series ref, segment)` pairs, in arrival order.
    pub series: Vec<(u64, u64)>,
    /// Samples, in arrival order.
    pub samples: Vec<RefSample>,
    /// Checkpoint indexes passed to `series_reset`.
    pub resets: Vec<u64>,
}

/// A [`WriteTo`] that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Recorded>>);

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the recorded calls.
    pub fn with<R>(&self, f: impl FnOnce(&Recorded) -> R) -> R {
        f(&self.0.lock())
    }
}

impl WriteTo for RecordingSink {
    fn append(&mut self, samples: &[RefSample]) -> bool {
        self.0.lock().samples.extend_from_slice(samples);
        true
    }

    fn store_series(&mut self, series: &[RefSeries], segment: u64) {
        self.0
            .lock()
            .series
            .extend(series.iter().map(|s| (s.series_ref, segment)));
    }

    fn series_reset(&mut self, checkpoint_index: u64) {
        self.0.lock().resets.push(checkpoint_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_wal_roundtrip() {
        let mut wal = TempWal::with_pages(4);
        wal.log(&[b"one".as_slice(), b"two".as_slice()]).unwrap();
        assert_eq!(wal.reopen_and_read(), vec![b"one".to_vec(), b"two".to_vec()]);
        // Each open starts a new segment.
        assert_eq!(wal.segment_indexes(), vec![0, 1]);
    }

    #[test]
    fn test_try_read_reports_missing_dir() {
        let (records, err) = try_read_records(Path::new("/nonexistent/tidewal"));
        assert!(records.is_empty());
        assert!(err.is_some());
    }

    #[test]
    fn test_recording_sink_shares_state() {
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        writer.store_series(&[RefSeries::new(3, [("a", "b")])], 7);
        writer.series_reset(5);
        assert!(writer.append(&[RefSample::new(3, 1, 2.0)]));

        sink.with(|r| {
            assert_eq!(r.series, vec![(3, 7)]);
            assert_eq!(r.resets, vec![5]);
            assert_eq!(r.samples.len(), 1);
        });
    }
}
