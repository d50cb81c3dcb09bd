//! Metrics for the writer, live reader and watcher.
//!
//! All counters are atomic and can be read while operations are in progress.
//! Each metrics type has a serializable [`snapshot`](WalMetrics::snapshot).
//!
//! ```rust,ignore
//! let metrics = Arc::new(WalMetrics::new());
//! let wal = Wal::open(dir, WalOptions::new().metrics(Arc::clone(&metrics)))?;
//! wal.log(&[b"record"])?;
//! println!("{}", serde_json::to_string(&metrics.snapshot())?);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tidewal_record::RecordType;

/// Writer metrics.
#[derive(Debug, Default)]
pub struct WalMetrics {
    fsyncs: AtomicU64,
    fsync_micros: AtomicU64,
    page_flushes: AtomicU64,
    page_completions: AtomicU64,
    truncations_total: AtomicU64,
    truncations_failed: AtomicU64,
    writes_failed: AtomicU64,
    /// Gauge.
    current_segment: AtomicU64,
}

/// Point-in-time copy of [`WalMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalMetricsSnapshot {
    /// Completed segment fsyncs.
    pub fsyncs: u64,
    /// Total time spent in segment fsyncs.
    pub fsync_micros: u64,
    /// Page writes to a segment, partial or complete.
    pub page_flushes: u64,
    /// Pages written out completely.
    pub page_completions: u64,
    /// Truncation attempts.
    pub truncations_total: u64,
    /// Failed truncations.
    pub truncations_failed: u64,
    /// Failed `log` calls.
    pub writes_failed: u64,
    /// Index of the segment being written.
    pub current_segment: u64,
}

impl WalMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_fsync(&self, elapsed: Duration) {
        self.fsyncs.fetch_add(1, Ordering::Relaxed);
        self.fsync_micros.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub(crate) fn record_page_flush(&self, completed: bool) {
        self.page_flushes.fetch_add(1, Ordering::Relaxed);
        if completed {
            self.page_completions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_truncation(&self, failed: bool) {
        self.truncations_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.truncations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_write_failure(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_current_segment(&self, index: u64) {
        self.current_segment.store(index, Ordering::Relaxed);
    }

    /// Returns the number of completed segment fsyncs.
    pub fn fsyncs(&self) -> u64 {
        self.fsyncs.load(Ordering::Relaxed)
    }

    /// Returns the number of page flushes.
    pub fn page_flushes(&self) -> u64 {
        self.page_flushes.load(Ordering::Relaxed)
    }

    /// Returns the number of completed pages.
    pub fn page_completions(&self) -> u64 {
        self.page_completions.load(Ordering::Relaxed)
    }

    /// Returns the number of failed `log` calls.
    pub fn writes_failed(&self) -> u64 {
        self.writes_failed.load(Ordering::Relaxed)
    }

    /// Returns the index of the segment being written.
    pub fn current_segment(&self) -> u64 {
        self.current_segment.load(Ordering::Relaxed)
    }

    /// Returns a copy of all values.
    pub fn snapshot(&self) -> WalMetricsSnapshot {
        WalMetricsSnapshot {
            fsyncs: self.fsyncs(),
            fsync_micros: self.fsync_micros.load(Ordering::Relaxed),
            page_flushes: self.page_flushes(),
            page_completions: self.page_completions(),
            truncations_total: self.truncations_total.load(Ordering::Relaxed),
            truncations_failed: self.truncations_failed.load(Ordering::Relaxed),
            writes_failed: self.writes_failed(),
            current_segment: self.current_segment(),
        }
    }
}

/// Live reader metrics.
#[derive(Debug, Default)]
pub struct LiveReaderMetrics {
    record_span_page: AtomicU64,
}

/// Point-in-time copy of [`LiveReaderMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveReaderMetricsSnapshot {
    /// Records tolerated although they crossed a page boundary.
    pub record_span_page: u64,
}

impl LiveReaderMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_span_page(&self) {
        self.record_span_page.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the corruption count for a reason label.
    pub fn corruptions(&self, reason: &str) -> u64 {
        match reason {
            "record_span_page" => self.record_span_page.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Returns a copy of all values.
    pub fn snapshot(&self) -> LiveReaderMetricsSnapshot {
        LiveReaderMetricsSnapshot {
            record_span_page: self.record_span_page.load(Ordering::Relaxed),
        }
    }
}

/// Watcher metrics.
#[derive(Debug, Default)]
pub struct WatcherMetrics {
    series_read: AtomicU64,
    samples_read: AtomicU64,
    tombstones_read: AtomicU64,
    invalid_read: AtomicU64,
    decode_failures: AtomicU64,
    sample_records_skipped: AtomicU64,
    samples_sent_pre_tailing: AtomicU64,
    /// Gauge.
    current_segment: AtomicU64,
}

/// Point-in-time copy of [`WatcherMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatcherMetricsSnapshot {
    /// Series records read.
    pub series_read: u64,
    /// Sample records read.
    pub samples_read: u64,
    /// Tombstone records read.
    pub tombstones_read: u64,
    /// Records of unknown type.
    pub invalid_read: u64,
    /// Records that failed to decode.
    pub decode_failures: u64,
    /// Sample records skipped while replaying segments.
    pub sample_records_skipped: u64,
    /// Samples forwarded from the record that ended replay.
    pub samples_sent_pre_tailing: u64,
    /// Segment being read.
    pub current_segment: u64,
}

impl WatcherMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, typ: RecordType) {
        let counter = match typ {
            RecordType::Series => &self.series_read,
            RecordType::Samples => &self.samples_read,
            RecordType::Tombstones => &self.tombstones_read,
            RecordType::Invalid => &self.invalid_read,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sample_record_skipped(&self) {
        self.sample_records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_samples_sent_pre_tailing(&self, count: usize) {
        self.samples_sent_pre_tailing
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_current_segment(&self, index: u64) {
        self.current_segment.store(index, Ordering::Relaxed);
    }

    /// Returns the number of records read of the given type.
    pub fn records_read(&self, typ: RecordType) -> u64 {
        match typ {
            RecordType::Series => self.series_read.load(Ordering::Relaxed),
            RecordType::Samples => self.samples_read.load(Ordering::Relaxed),
            RecordType::Tombstones => self.tombstones_read.load(Ordering::Relaxed),
            RecordType::Invalid => self.invalid_read.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of records that failed to decode.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of sample records skipped during replay.
    pub fn sample_records_skipped(&self) -> u64 {
        self.sample_records_skipped.load(Ordering::Relaxed)
    }

    /// Returns the number of samples forwarded before the watcher caught
    /// up with the start timestamp.
    pub fn samples_sent_pre_tailing(&self) -> u64 {
        self.samples_sent_pre_tailing.load(Ordering::Relaxed)
    }

    /// Returns the segment being read.
    pub fn current_segment(&self) -> u64 {
        self.current_segment.load(Ordering::Relaxed)
    }

    /// Returns a copy of all values.
    pub fn snapshot(&self) -> WatcherMetricsSnapshot {
        WatcherMetricsSnapshot {
            series_read: self.records_read(RecordType::Series),
            samples_read: self.records_read(RecordType::Samples),
            tombstones_read: self.records_read(RecordType::Tombstones),
            invalid_read: self.records_read(RecordType::Invalid),
            decode_failures: self.decode_failures(),
            sample_records_skipped: self.sample_records_skipped(),
            samples_sent_pre_tailing: self.samples_sent_pre_tailing(),
            current_segment: self.current_segment(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_metrics_counters() {
        let m = WalMetrics::new();
        m.record_page_flush(false);
        m.record_page_flush(true);
        m.record_truncation(false);
        m.record_truncation(true);
        m.record_fsync(Duration::from_micros(250));
        m.set_current_segment(7);

        let s = m.snapshot();
        assert_eq!(s.page_flushes, 2);
        assert_eq!(s.page_completions, 1);
        assert_eq!(s.truncations_total, 2);
        assert_eq!(s.truncations_failed, 1);
        assert_eq!(s.fsyncs, 1);
        assert_eq!(s.fsync_micros, 250);
        assert_eq!(s.current_segment, 7);
    }

    #[test]
    fn live_reader_reasons() {
        let m = LiveReaderMetrics::new();
        m.record_span_page();
        assert_eq!(m.corruptions("record_span_page"), 1);
        assert_eq!(m.corruptions("other"), 0);
    }

    #[test]
    fn watcher_snapshot_serializes() {
        let m = WatcherMetrics::new();
        m.record_read(RecordType::Samples);
        m.record_read(RecordType::Samples);
        m.record_decode_failure();

        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["samples_read"], 2);
        assert_eq!(json["decode_failures"], 1);
    }
}
