//! Record decoder.

use crate::error::{CodecError, CodecResult};
use crate::types::{Interval, Label, RecordType, RefSample, RefSeries, Tombstone};

/// Decodes records produced by [`RecordEncoder`](crate::RecordEncoder).
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDecoder;

impl RecordDecoder {
    /// Creates a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the type of the record. Empty input is [`RecordType::Invalid`].
    #[must_use]
    pub fn record_type(&self, rec: &[u8]) -> RecordType {
        rec.first()
            .map_or(RecordType::Invalid, |&b| RecordType::from_byte(b))
    }

    /// Decodes a series record, appending to `out`.
    pub fn series(&self, rec: &[u8], out: &mut Vec<RefSeries>) -> CodecResult<()> {
        let mut dec = DecBuf::for_type(rec, RecordType::Series)?;

        while !dec.is_empty() {
            let series_ref = dec.be64()?;
            let count = dec.uvarint()?;

            let mut labels = Vec::with_capacity(usize::try_from(count).unwrap_or(0).min(64));
            for _ in 0..count {
                let name = dec.uvarint_str()?;
                let value = dec.uvarint_str()?;
                labels.push(Label { name, value });
            }
            labels.sort();

            out.push(RefSeries { series_ref, labels });
        }
        Ok(())
    }

    /// Decodes a samples record, appending to `out`.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn samples(&self, rec: &[u8], out: &mut Vec<RefSample>) -> CodecResult<()> {
        let mut dec = DecBuf::for_type(rec, RecordType::Samples)?;

        if dec.is_empty() {
            return Ok(());
        }

        let base_ref = dec.be64()?;
        let base_t = dec.be64()? as i64;
        let mut decoded = 0usize;

        while !dec.is_empty() {
            let sample = (|| {
                let dref = dec.varint()?;
                let dt = dec.varint()?;
                let v = f64::from_bits(dec.be64()?);
                Ok::<_, CodecError>(RefSample {
                    series_ref: (base_ref as i64).wrapping_add(dref) as u64,
                    t: base_t.wrapping_add(dt),
                    v,
                })
            })()
            .map_err(|e| CodecError::after(decoded, e))?;

            out.push(sample);
            decoded += 1;
        }
        Ok(())
    }

    /// Decodes a tombstones record, appending to `out`.
    ///
    /// Each encoded entry becomes one [`Tombstone`] with a single interval.
    pub fn tombstones(&self, rec: &[u8], out: &mut Vec<Tombstone>) -> CodecResult<()> {
        let mut dec = DecBuf::for_type(rec, RecordType::Tombstones)?;

        while !dec.is_empty() {
            let series_ref = dec.be64()?;
            let mint = dec.varint()?;
            let maxt = dec.varint()?;
            out.push(Tombstone {
                series_ref,
                intervals: vec![Interval { mint, maxt }],
            });
        }
        Ok(())
    }
}

/// Cursor over the bytes of one record.
struct DecBuf<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DecBuf<'a> {
    fn for_type(rec: &'a [u8], expected: RecordType) -> CodecResult<Self> {
        match rec.first() {
            None => Err(CodecError::UnexpectedEof),
            Some(&b) if b != expected.as_byte() => Err(CodecError::InvalidRecordType {
                expected: expected.as_byte(),
                actual: b,
            }),
            Some(_) => Ok(Self { data: rec, pos: 1 }),
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            // A partial final entry counts as trailing garbage.
            return Err(CodecError::TrailingBytes {
                count: self.data.len() - self.pos,
            });
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn be64(&mut self) -> CodecResult<u64> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    fn uvarint(&mut self) -> CodecResult<u64> {
        let mut x = 0u64;
        let mut shift = 0u32;

        for i in 0..10 {
            let Some(&b) = self.data.get(self.pos + i) else {
                return Err(CodecError::TrailingBytes {
                    count: self.data.len() - self.pos,
                });
            };
            if b < 0x80 {
                if i == 9 && b > 1 {
                    return Err(CodecError::VarintOverflow);
                }
                self.pos += i + 1;
                return Ok(x | u64::from(b) << shift);
            }
            x |= u64::from(b & 0x7f) << shift;
            shift += 7;
        }
        Err(CodecError::VarintOverflow)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn varint(&mut self) -> CodecResult<i64> {
        let ux = self.uvarint()?;
        let x = (ux >> 1) as i64;
        Ok(if ux & 1 != 0 { !x } else { x })
    }

    fn uvarint_str(&mut self) -> CodecResult<String> {
        let len = usize::try_from(self.uvarint()?).map_err(|_| CodecError::VarintOverflow)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{put_uvarint, put_varint};
    use crate::RecordEncoder;
    use proptest::prelude::*;

    #[test]
    fn record_type_of_empty_is_invalid() {
        let dec = RecordDecoder::new();
        assert_eq!(dec.record_type(&[]), RecordType::Invalid);
        assert_eq!(dec.record_type(&[9]), RecordType::Invalid);
        assert_eq!(dec.record_type(&[2, 0]), RecordType::Samples);
    }

    #[test]
    fn series_labels_sorted_after_decode() {
        let mut buf = vec![RecordType::Series.as_byte()];
        buf.extend_from_slice(&7u64.to_be_bytes());
        put_uvarint(&mut buf, 2);
        for s in ["zone", "eu", "job", "api"] {
            put_uvarint(&mut buf, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }

        let mut out = Vec::new();
        RecordDecoder::new().series(&buf, &mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].series_ref, 7);
        assert_eq!(out[0].labels[0], Label::new("job", "api"));
        assert_eq!(out[0].labels[1], Label::new("zone", "eu"));
    }

    #[test]
    fn samples_roundtrip_with_negative_deltas() {
        let samples = vec![
            RefSample::new(100, 1_000, 1.5),
            RefSample::new(98, 990, -2.0),
            RefSample::new(150, 2_000, f64::INFINITY),
        ];
        let mut buf = Vec::new();
        RecordEncoder::new().samples(&samples, &mut buf);

        let mut out = Vec::new();
        RecordDecoder::new().samples(&buf, &mut out).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn empty_samples_decode_to_nothing() {
        let mut out = Vec::new();
        RecordDecoder::new()
            .samples(&[RecordType::Samples.as_byte()], &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let mut buf = Vec::new();
        RecordEncoder::new().samples(&[RefSample::new(1, 1, 1.0)], &mut buf);

        let err = RecordDecoder::new().series(&buf, &mut Vec::new()).unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidRecordType {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = Vec::new();
        RecordEncoder::new().tombstones(&[Tombstone::new(1, 0, 5)], &mut buf);
        buf.push(0xff);

        let err = RecordDecoder::new()
            .tombstones(&buf, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { .. }));
    }

    #[test]
    fn truncated_samples_report_progress() {
        let mut buf = Vec::new();
        RecordEncoder::new().samples(
            &[RefSample::new(1, 1, 1.0), RefSample::new(2, 2, 2.0)],
            &mut buf,
        );
        buf.truncate(buf.len() - 3);

        let mut out = Vec::new();
        let err = RecordDecoder::new().samples(&buf, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::Partial { decoded: 1, .. }));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn overlong_varint_overflows() {
        let mut buf = vec![RecordType::Tombstones.as_byte()];
        buf.extend_from_slice(&1u64.to_be_bytes());
        buf.extend_from_slice(&[0xff; 11]);

        let err = RecordDecoder::new()
            .tombstones(&buf, &mut Vec::new())
            .unwrap_err();
        assert_eq!(err, CodecError::VarintOverflow);
    }

    #[test]
    fn invalid_utf8_label() {
        let mut buf = vec![RecordType::Series.as_byte()];
        buf.extend_from_slice(&1u64.to_be_bytes());
        put_uvarint(&mut buf, 1);
        put_uvarint(&mut buf, 1);
        buf.push(0xff);
        put_uvarint(&mut buf, 0);

        let err = RecordDecoder::new().series(&buf, &mut Vec::new()).unwrap_err();
        assert_eq!(err, CodecError::InvalidUtf8);
    }

    proptest! {
        #[test]
        fn varint_roundtrip(v in any::<i64>()) {
            let mut buf = vec![RecordType::Tombstones.as_byte()];
            buf.extend_from_slice(&0u64.to_be_bytes());
            put_varint(&mut buf, v);
            put_varint(&mut buf, v);

            let mut out = Vec::new();
            RecordDecoder::new().tombstones(&buf, &mut out).unwrap();
            prop_assert_eq!(out[0].intervals[0], Interval { mint: v, maxt: v });
        }

        #[test]
        fn series_roundtrip(
            series in prop::collection::vec(
                (any::<u64>(), prop::collection::btree_map("[a-z_]{1,8}", "\\PC{0,12}", 0..5)),
                0..8,
            )
        ) {
            let input: Vec<RefSeries> = series
                .into_iter()
                .map(|(r, labels)| RefSeries::new(r, labels))
                .collect();
            let mut buf = Vec::new();
            RecordEncoder::new().series(&input, &mut buf);

            let mut out = Vec::new();
            RecordDecoder::new().series(&buf, &mut out).unwrap();
            prop_assert_eq!(out, input);
        }
    }
}
