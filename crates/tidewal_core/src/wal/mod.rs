//! Write-ahead log: segments, page framing, writer and readers.
//!
//! ## On-disk format
//!
//! A WAL directory holds segment files named by an 8-digit index. Each
//! segment is a sequence of 32 KiB pages. Records are framed as one or more
//! fragments, each with a 7-byte header:
//!
//! ```text
//! | type (1) | length (2, BE) | crc32c (4, BE) | data (length) |
//! ```
//!
//! The low three bits of `type` are the fragment kind (`Full`, `First`,
//! `Middle`, `Last`), bit 3 marks snappy-compressed data. A zero byte
//! where a header is expected means the rest of the page is padding.
//!
//! ## Recovery Policy
//!
//! - A fragment never crosses a page boundary and a record never crosses
//!   a segment boundary, so a segment can be repaired without looking at
//!   its neighbours.
//! - The batch [`Reader`] treats every checksum, sequence or padding
//!   violation as corruption and reports the segment and offset, which is
//!   what [`Wal::repair`] consumes.
//! - A log that ends after a `First` or `Middle` fragment is reported as a
//!   torn record rather than a clean end.
//! - The [`LiveReader`] reports "no data yet" as `Ok(false)` and only fails
//!   on data that can never become valid.

mod fragment;
mod live_reader;
mod page;
mod reader;
mod segment;
mod writer;

pub use fragment::FragmentType;
pub use live_reader::LiveReader;
pub use reader::{Reader, Records, SegmentBufReader, SegmentLocation, SegmentRange};
pub use segment::Segment;
pub use writer::Wal;

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 32 * 1024;

/// Size of a fragment header in bytes.
pub const RECORD_HEADER_SIZE: usize = 7;
