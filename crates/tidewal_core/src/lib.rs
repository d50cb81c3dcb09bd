//! # Tidewal Core
//!
//! Write-ahead log for time-series data.
//!
//! This crate provides:
//! - [`Wal`]: page-buffered, segmented log with optional Snappy compression
//! - [`Reader`] and [`LiveReader`] for finished and still-growing segments
//! - [`checkpoint()`]: compaction of a log prefix into `checkpoint.<N>`
//! - [`Watcher`]: tails a log directory and forwards records to a consumer
//!
//! Record payloads are opaque to the log; the series, sample and tombstone
//! codecs live in `tidewal_record`.
//!
//! ```no_run
//! use tidewal_core::{Reader, SegmentRange, Wal, WalOptions};
//!
//! # fn main() -> tidewal_core::WalResult<()> {
//! let wal = Wal::open("data/wal", WalOptions::new().compress(true))?;
//! wal.log(&[b"first".as_slice(), b"second".as_slice()])?;
//! wal.close()?;
//!
//! let mut reader = Reader::open(&[SegmentRange::all("data/wal")])?;
//! while reader.next()? {
//!     println!("{} bytes", reader.record().len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
mod config;
pub mod dir;
mod error;
mod metrics;
pub mod wal;
mod watcher;

pub use checkpoint::{checkpoint, last_checkpoint, CheckpointStats};
pub use config::{LiveReaderOptions, WalOptions, WatcherOptions, DEFAULT_SEGMENT_SIZE};
pub use error::{CorruptionError, ExitKind, ReadError, WalError, WalResult};
pub use metrics::{
    LiveReaderMetrics, LiveReaderMetricsSnapshot, WalMetrics, WalMetricsSnapshot, WatcherMetrics,
    WatcherMetricsSnapshot,
};
pub use wal::{
    FragmentType, LiveReader, Reader, Records, Segment, SegmentBufReader, SegmentLocation,
    SegmentRange, Wal, PAGE_SIZE, RECORD_HEADER_SIZE,
};
pub use watcher::{Watcher, WatcherHandle, WriteTo};
