//! # tidewal record codec
//!
//! Encodes and decodes the logical records stored in a tidewal log:
//! series declarations, samples and tombstones. The write-ahead log itself
//! treats records as opaque bytes; this crate is used by the checkpoint
//! engine and the watcher to interpret them.
//!
//! ## Wire format
//!
//! Every record starts with a one-byte [`RecordType`]. Integers are
//! big-endian fixed width or LEB128 varints (zigzag for signed values).
//!
//! | type | body |
//! |------|------|
//! | series | `{ be64 ref, uvarint n, n × (uvarint-len name, uvarint-len value) }*` |
//! | samples | `be64 base_ref, be64 base_t, { varint dref, varint dt, be64 value }*` |
//! | tombstones | `{ be64 ref, varint mint, varint maxt }*` |
//!
//! ## Usage
//!
//! ```
//! use tidewal_record::{RecordDecoder, RecordEncoder, RecordType, RefSample};
//!
//! let mut buf = Vec::new();
//! RecordEncoder::new().samples(&[RefSample::new(1, 1000, 0.5)], &mut buf);
//!
//! let dec = RecordDecoder::new();
//! assert_eq!(dec.record_type(&buf), RecordType::Samples);
//!
//! let mut samples = Vec::new();
//! dec.samples(&buf, &mut samples).unwrap();
//! assert_eq!(samples[0].t, 1000);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod types;

pub use decoder::RecordDecoder;
pub use encoder::RecordEncoder;
pub use error::{CodecError, CodecResult};
pub use types::{Interval, Label, RecordType, RefSample, RefSeries, Tombstone};
