//! Configuration for the WAL, live reader and watcher.

use crate::metrics::{LiveReaderMetrics, WalMetrics};
use crate::wal::PAGE_SIZE;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default size of a segment file.
pub const DEFAULT_SEGMENT_SIZE: u64 = 128 * 1024 * 1024;

/// Options for opening a [`Wal`](crate::Wal).
#[derive(Debug, Clone)]
pub struct WalOptions {
    /// Size at which the writer rotates to a new segment.
    /// Must be a multiple of [`PAGE_SIZE`].
    pub segment_size: u64,

    /// Whether records are snappy-compressed when that makes them smaller.
    pub compress: bool,

    /// Whether to take an exclusive lock on the directory.
    pub lock_dir: bool,

    /// Shared metrics, created on open when unset.
    pub metrics: Option<Arc<WalMetrics>>,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            compress: false,
            lock_dir: true,
            metrics: None,
        }
    }
}

impl WalOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment size.
    #[must_use]
    pub fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the segment size as a number of pages.
    #[must_use]
    pub fn segment_pages(mut self, pages: u64) -> Self {
        self.segment_size = pages * PAGE_SIZE as u64;
        self
    }

    /// Enables or disables record compression.
    #[must_use]
    pub fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }

    /// Enables or disables the directory lock.
    #[must_use]
    pub fn lock_dir(mut self, value: bool) -> Self {
        self.lock_dir = value;
        self
    }

    /// Shares a metrics instance with the writer.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<WalMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn pages_per_segment(&self) -> u64 {
        self.segment_size / PAGE_SIZE as u64
    }
}

/// Options for a [`LiveReader`](crate::LiveReader).
#[derive(Debug, Clone)]
pub struct LiveReaderOptions {
    /// Tolerate records that appear to span a page boundary.
    pub permissive: bool,

    /// Shared metrics, created per reader when unset.
    pub metrics: Option<Arc<LiveReaderMetrics>>,
}

impl Default for LiveReaderOptions {
    fn default() -> Self {
        Self {
            permissive: true,
            metrics: None,
        }
    }
}

impl LiveReaderOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets permissive mode.
    #[must_use]
    pub fn permissive(mut self, value: bool) -> Self {
        self.permissive = value;
        self
    }

    /// Shares a metrics instance with the reader.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<LiveReaderMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Options for a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Name used in log events.
    pub name: String,
    /// Directory of the WAL being watched.
    pub wal_dir: PathBuf,
    /// Delay between reads of the tailed segment.
    pub read_period: Duration,
    /// Delay between checks for a newer segment.
    pub segment_check_period: Duration,
    /// Delay between checks for a newer checkpoint.
    pub checkpoint_period: Duration,
    /// Delay before restarting after a failed run.
    pub retry_delay: Duration,
    /// Stop after this segment has been read.
    pub max_segment: Option<u64>,
}

impl WatcherOptions {
    /// Creates options for watching `wal_dir` with default periods.
    pub fn new(name: impl Into<String>, wal_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            wal_dir: wal_dir.into(),
            read_period: Duration::from_millis(10),
            segment_check_period: Duration::from_millis(100),
            checkpoint_period: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            max_segment: None,
        }
    }

    /// Sets the read period.
    #[must_use]
    pub fn read_period(mut self, period: Duration) -> Self {
        self.read_period = period;
        self
    }

    /// Sets the segment check period.
    #[must_use]
    pub fn segment_check_period(mut self, period: Duration) -> Self {
        self.segment_check_period = period;
        self
    }

    /// Sets the checkpoint check period.
    #[must_use]
    pub fn checkpoint_period(mut self, period: Duration) -> Self {
        self.checkpoint_period = period;
        self
    }

    /// Sets the retry delay.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Stops the watcher after the given segment.
    #[must_use]
    pub fn max_segment(mut self, segment: u64) -> Self {
        self.max_segment = Some(segment);
        self
    }
}
