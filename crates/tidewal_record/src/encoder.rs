//! Record encoder.
//!
//! Encoding appends to a caller-owned buffer so several records can be
//! batched into one allocation, as the checkpoint engine does.

use crate::types::{RecordType, RefSample, RefSeries, Tombstone};

/// Encodes series, samples and tombstones into records.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordEncoder;

impl RecordEncoder {
    /// Creates an encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Appends a series record to `buf`.
    pub fn series(&self, series: &[RefSeries], buf: &mut Vec<u8>) {
        buf.push(RecordType::Series.as_byte());

        for s in series {
            put_be64(buf, s.series_ref);
            put_uvarint(buf, s.labels.len() as u64);

            for label in &s.labels {
                put_uvarint_str(buf, &label.name);
                put_uvarint_str(buf, &label.value);
            }
        }
    }

    /// Appends a samples record to `buf`.
    ///
    /// References and timestamps are delta-encoded against the first sample.
    #[allow(clippy::cast_possible_wrap)]
    pub fn samples(&self, samples: &[RefSample], buf: &mut Vec<u8>) {
        buf.push(RecordType::Samples.as_byte());

        let Some(first) = samples.first() else {
            return;
        };

        put_be64(buf, first.series_ref);
        put_be64(buf, first.t as u64);

        for s in samples {
            put_varint(buf, (s.series_ref as i64).wrapping_sub(first.series_ref as i64));
            put_varint(buf, s.t.wrapping_sub(first.t));
            put_be64(buf, s.v.to_bits());
        }
    }

    /// Appends a tombstones record to `buf`, one entry per interval.
    pub fn tombstones(&self, tombstones: &[Tombstone], buf: &mut Vec<u8>) {
        buf.push(RecordType::Tombstones.as_byte());

        for stone in tombstones {
            for iv in &stone.intervals {
                put_be64(buf, stone.series_ref);
                put_varint(buf, iv.mint);
                put_varint(buf, iv.maxt);
            }
        }
    }
}

fn put_be64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn put_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

#[allow(clippy::cast_sign_loss)]
pub(crate) fn put_varint(buf: &mut Vec<u8>, v: i64) {
    // zigzag
    let mut ux = (v as u64) << 1;
    if v < 0 {
        ux = !ux;
    }
    put_uvarint(buf, ux);
}

fn put_uvarint_str(buf: &mut Vec<u8>, s: &str) {
    put_uvarint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}
