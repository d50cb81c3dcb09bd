//! Reader for segments that are still being written.

use super::fragment::{checksum, decode_header_tail, validate_sequence, FragmentType, SNAPPY_MASK};
use super::reader::decompress;
use super::{PAGE_SIZE, RECORD_HEADER_SIZE};
use crate::config::LiveReaderOptions;
use crate::error::{CorruptionError, ReadError, WalError, WalResult};
use crate::metrics::LiveReaderMetrics;
use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;
use tracing::warn;

/// Tails a segment while a writer appends to it.
///
/// Data is buffered one page at a time. When the buffered bytes do not yet
/// hold a whole record, [`next`](LiveReader::next) returns `Ok(false)` and
/// can be called again once more data has been written. An `Err` is final.
///
/// In permissive mode, records that cross a page boundary are accepted
/// with a warning. Such records are never produced by [`Wal`](super::Wal)
/// but have been seen in logs written by older writers.
pub struct LiveReader<R> {
    rdr: R,
    permissive: bool,
    metrics: Arc<LiveReaderMetrics>,
    buf: Box<[u8]>,
    read_index: usize,
    write_index: usize,
    total: u64,
    rec: Vec<u8>,
    snappy_buf: Vec<u8>,
    decoder: snap::raw::Decoder,
    hdr: [u8; RECORD_HEADER_SIZE],
    /// Fragments of the current record read so far.
    position: usize,
}

impl<R: Read> LiveReader<R> {
    /// Creates a permissive reader.
    pub fn new(rdr: R) -> Self {
        Self::with_options(rdr, LiveReaderOptions::default())
    }

    /// Creates a reader with the given options.
    pub fn with_options(rdr: R, options: LiveReaderOptions) -> Self {
        Self {
            rdr,
            permissive: options.permissive,
            metrics: options.metrics.unwrap_or_default(),
            buf: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            read_index: 0,
            write_index: 0,
            total: 0,
            rec: Vec::new(),
            snappy_buf: Vec::new(),
            decoder: snap::raw::Decoder::new(),
            hdr: [0; RECORD_HEADER_SIZE],
            position: 0,
        }
    }

    /// Advances to the next record.
    ///
    /// Returns `Ok(true)` when a record is available, `Ok(false)` when the
    /// data read so far ends before a complete record.
    pub fn next(&mut self) -> WalResult<bool> {
        loop {
            match self.build_record() {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(cause) => return Err(self.corruption(cause)),
            }

            // A full buffer without a record means records have started
            // to span pages.
            if self.permissive && self.write_index == PAGE_SIZE && self.read_index > 0 {
                self.buf.copy_within(self.read_index.., 0);
                self.write_index -= self.read_index;
                self.read_index = 0;
                continue;
            }

            if self.read_index == PAGE_SIZE {
                self.read_index = 0;
                self.write_index = 0;
            }

            if self.write_index != PAGE_SIZE {
                let n = loop {
                    match self.rdr.read(&mut self.buf[self.write_index..]) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(self.corruption(e.into())),
                    }
                };
                if n == 0 {
                    return Ok(false);
                }
                self.write_index += n;
            }
        }
    }

    /// Returns the current record. Valid until the next call to `next`.
    #[must_use]
    pub fn record(&self) -> &[u8] {
        &self.rec
    }

    /// Returns the number of bytes consumed so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.total
    }

    /// Returns the reader metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<LiveReaderMetrics> {
        &self.metrics
    }

    fn corruption(&self, cause: ReadError) -> WalError {
        CorruptionError {
            dir: None,
            segment: None,
            offset: self.total,
            cause,
        }
        .into()
    }

    /// Assembles fragments from the buffer. `Ok(false)` means more data
    /// is needed.
    fn build_record(&mut self) -> Result<bool, ReadError> {
        loop {
            if self.write_index <= self.read_index {
                return Ok(false);
            }

            let Some((range, n)) = self.read_fragment()? else {
                return Ok(false);
            };
            self.read_index += n;
            self.total += n as u64;

            // Page padding.
            let Some(range) = range else {
                continue;
            };

            let typ = FragmentType::from_header(self.hdr[0]).map_err(ReadError::InvalidRecordType)?;
            if matches!(typ, FragmentType::First | FragmentType::Full) {
                self.rec.clear();
                self.snappy_buf.clear();
            }

            let compressed = self.hdr[0] & SNAPPY_MASK != 0;
            if compressed {
                self.snappy_buf.extend_from_slice(&self.buf[range]);
            } else {
                self.rec.extend_from_slice(&self.buf[range]);
            }

            if !validate_sequence(typ, self.position) {
                let position = self.position;
                self.position = 0;
                return Err(ReadError::UnexpectedFragment {
                    kind: typ.as_byte(),
                    position,
                });
            }

            if typ.is_terminal() {
                self.position = 0;
                if compressed && !self.snappy_buf.is_empty() {
                    decompress(&mut self.decoder, &self.snappy_buf, &mut self.rec)?;
                }
                return Ok(true);
            }
            self.position += 1;
        }
    }

    /// Reads one fragment or one run of page padding from the buffer.
    ///
    /// Returns the payload range (`None` for padding) and the number of
    /// bytes consumed, or `Ok(None)` if the buffer ends first.
    fn read_fragment(&mut self) -> Result<Option<(Option<Range<usize>>, usize)>, ReadError> {
        let start = self.read_index;

        if self.buf[start] == FragmentType::PageTerm.as_byte() {
            // Records spanning pages can leave the buffer misaligned, so
            // the page end comes from the total offset.
            #[allow(clippy::cast_possible_truncation)]
            let remaining = PAGE_SIZE - (self.total % PAGE_SIZE as u64) as usize;
            if start + remaining > self.write_index {
                return Ok(None);
            }
            if self.buf[start..start + remaining].iter().any(|&b| b != 0) {
                return Err(ReadError::NonZeroPadding);
            }
            return Ok(Some((None, remaining)));
        }

        if self.write_index - start < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        self.hdr
            .copy_from_slice(&self.buf[start..start + RECORD_HEADER_SIZE]);
        let (length, crc) = decode_header_tail(&self.hdr[1..]);
        let end = start + RECORD_HEADER_SIZE + length;

        if end > PAGE_SIZE {
            if !self.permissive {
                return Err(ReadError::PageOverflow {
                    length: RECORD_HEADER_SIZE + length,
                    page_offset: start,
                });
            }
            self.metrics.record_span_page();
            warn!(
                start,
                end = RECORD_HEADER_SIZE + length,
                page_size = PAGE_SIZE,
                "record spans page boundaries"
            );
        }
        if RECORD_HEADER_SIZE + length > PAGE_SIZE {
            return Err(ReadError::InvalidLength(length));
        }
        if end > self.write_index {
            return Ok(None);
        }

        let payload = start + RECORD_HEADER_SIZE..end;
        let actual = checksum(&self.buf[payload.clone()]);
        if actual != crc {
            return Err(ReadError::ChecksumMismatch {
                expected: crc,
                actual,
            });
        }
        Ok(Some((Some(payload), RECORD_HEADER_SIZE + length)))
    }
}
