//! Batch reader for complete segments.
//!
//! Used at startup to replay the log and by the checkpoint engine. Unlike
//! the [`LiveReader`](super::LiveReader), every anomaly is corruption: the
//! segments are expected to be complete.

use super::fragment::{checksum, decode_header_tail, validate_sequence, FragmentType, SNAPPY_MASK};
use super::{PAGE_SIZE, RECORD_HEADER_SIZE};
use crate::dir::{list_segments, segment_name};
use crate::error::{CorruptionError, ReadError, WalError, WalResult};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// A range of segments in one directory. `None` bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRange {
    /// Directory holding the segments.
    pub dir: PathBuf,
    /// First segment to read, inclusive.
    pub first: Option<u64>,
    /// Last segment to read, inclusive.
    pub last: Option<u64>,
}

impl SegmentRange {
    /// Creates a range.
    pub fn new(dir: impl Into<PathBuf>, first: Option<u64>, last: Option<u64>) -> Self {
        Self {
            dir: dir.into(),
            first,
            last,
        }
    }

    /// Covers every segment in `dir`.
    pub fn all(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, None, None)
    }

    fn contains(&self, index: u64) -> bool {
        self.first.map_or(true, |f| index >= f) && self.last.map_or(true, |l| index <= l)
    }
}

/// Position of a reader inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLocation {
    /// Directory of the segment.
    pub dir: PathBuf,
    /// Segment index.
    pub segment: u64,
    /// Bytes consumed from the segment.
    pub offset: u64,
}

struct OpenSegment {
    dir: PathBuf,
    index: u64,
    reader: BufReader<File>,
}

/// Presents a list of segments as a sequence of byte streams.
///
/// A segment whose size is not a multiple of [`PAGE_SIZE`] is followed by
/// synthesized zero padding up to the page boundary. Reads return `Ok(0)`
/// at the end of each segment; [`SegmentBufReader::next_segment`] moves on
/// to the next one.
pub struct SegmentBufReader {
    pending: VecDeque<(PathBuf, u64, File)>,
    current: Option<OpenSegment>,
    off: usize,
}

impl SegmentBufReader {
    /// Opens the segments of all `ranges`, in order.
    pub fn open(ranges: &[SegmentRange]) -> WalResult<Self> {
        let mut pending = VecDeque::new();

        for range in ranges {
            for seg in list_segments(&range.dir)? {
                if range.last.is_some_and(|l| seg.index > l) {
                    break;
                }
                if !range.contains(seg.index) {
                    continue;
                }
                let file = File::open(range.dir.join(&seg.name))?;
                pending.push_back((range.dir.clone(), seg.index, file));
            }
        }

        Ok(Self::from_files(pending))
    }

    /// Reads a single segment file.
    pub fn open_segment(dir: &Path, index: u64) -> WalResult<Self> {
        let file = File::open(segment_name(dir, index))?;
        Ok(Self::from_files(VecDeque::from([(dir.to_path_buf(), index, file)])))
    }

    fn from_files(mut pending: VecDeque<(PathBuf, u64, File)>) -> Self {
        let current = pending.pop_front().map(Self::wrap);
        Self {
            pending,
            current,
            off: 0,
        }
    }

    fn wrap((dir, index, file): (PathBuf, u64, File)) -> OpenSegment {
        OpenSegment {
            dir,
            index,
            reader: BufReader::with_capacity(16 * PAGE_SIZE, file),
        }
    }

    /// Returns the segment being read and the offset within it.
    #[must_use]
    pub fn location(&self) -> Option<SegmentLocation> {
        self.current.as_ref().map(|c| SegmentLocation {
            dir: c.dir.clone(),
            segment: c.index,
            offset: self.off as u64,
        })
    }

    /// Moves to the next segment. Returns `false` if none is left, in which
    /// case the reader stays on the last segment.
    pub fn next_segment(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(next) => {
                self.current = Some(Self::wrap(next));
                self.off = 0;
                true
            }
            None => false,
        }
    }
}

impl Read for SegmentBufReader {
    fn read(&mut self, b: &mut [u8]) -> io::Result<usize> {
        if b.is_empty() {
            return Ok(0);
        }

        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };

        let n = current.reader.read(b)?;
        if n > 0 {
            self.off += n;
            return Ok(n);
        }

        // Pad short segments instead of growing them on disk.
        let partial = self.off % PAGE_SIZE;
        if partial != 0 {
            let k = (PAGE_SIZE - partial).min(b.len());
            b[..k].fill(0);
            self.off += k;
            return Ok(k);
        }
        Ok(0)
    }
}

/// Decodes records from a stream of pages.
///
/// ```rust,ignore
/// let mut reader = Reader::open(&[SegmentRange::all(dir)])?;
/// while reader.next()? {
///     handle(reader.record());
/// }
/// ```
pub struct Reader<R> {
    rdr: R,
    locate: fn(&R) -> Option<SegmentLocation>,
    advance: fn(&mut R) -> bool,
    buf: Box<[u8]>,
    rec: Vec<u8>,
    snappy_buf: Vec<u8>,
    decoder: snap::raw::Decoder,
    total: u64,
    last_fragment: Option<FragmentType>,
}

impl<R: Read> Reader<R> {
    /// Creates a reader over any byte stream. Errors carry the total
    /// offset instead of a segment position.
    pub fn new(rdr: R) -> Self {
        Self::with_hooks(rdr, |_| None, |_| false)
    }

    fn with_hooks(
        rdr: R,
        locate: fn(&R) -> Option<SegmentLocation>,
        advance: fn(&mut R) -> bool,
    ) -> Self {
        Self {
            rdr,
            locate,
            advance,
            buf: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            rec: Vec::new(),
            snappy_buf: Vec::new(),
            decoder: snap::raw::Decoder::new(),
            total: 0,
            last_fragment: None,
        }
    }

    /// Advances to the next record.
    ///
    /// Returns `Ok(false)` at a clean end of the log.
    pub fn next(&mut self) -> WalResult<bool> {
        match self.next_record() {
            Ok(true) => Ok(true),
            Ok(false) if self.last_fragment.is_some_and(FragmentType::is_partial) => {
                Err(self.corruption(ReadError::TornRecord))
            }
            Ok(false) => Ok(false),
            Err(cause) => Err(self.corruption(cause)),
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

    /// Returns the segment being read, if reading segment files.
    #[must_use]
    pub fn segment(&self) -> Option<u64> {
        (self.locate)(&self.rdr).map(|l| l.segment)
    }

    /// Returns an iterator of owned records.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            finished: false,
        }
    }

    fn corruption(&self, cause: ReadError) -> WalError {
        let err = match (self.locate)(&self.rdr) {
            Some(loc) => CorruptionError {
                dir: Some(loc.dir),
                segment: Some(loc.segment),
                offset: loc.offset,
                cause,
            },
            None => CorruptionError {
                dir: None,
                segment: None,
                offset: self.total,
                cause,
            },
        };
        err.into()
    }

    fn next_record(&mut self) -> Result<bool, ReadError> {
        self.rec.clear();
        self.snappy_buf.clear();
        let mut position = 0;

        loop {
            let mut first = [0u8; 1];
            if !read_full(&mut self.rdr, &mut first)? {
                // A record never continues into the next segment.
                if position > 0 {
                    return Err(ReadError::TornRecord);
                }
                if (self.advance)(&mut self.rdr) {
                    self.last_fragment = None;
                    continue;
                }
                return Ok(false);
            }
            self.total += 1;

            let typ = FragmentType::from_header(first[0]).map_err(ReadError::InvalidRecordType)?;
            self.last_fragment = Some(typ);
            let compressed = first[0] & SNAPPY_MASK != 0;

            if typ == FragmentType::PageTerm {
                #[allow(clippy::cast_possible_truncation)]
                let k = PAGE_SIZE - (self.total % PAGE_SIZE as u64) as usize;
                if k == PAGE_SIZE {
                    // The zero was the last byte of the page.
                    continue;
                }
                if !read_full(&mut self.rdr, &mut self.buf[..k])? {
                    return Ok(false);
                }
                self.total += k as u64;

                if self.buf[..k].iter().any(|&b| b != 0) {
                    return Err(ReadError::NonZeroPadding);
                }
                continue;
            }

            let mut hdr = [0u8; RECORD_HEADER_SIZE - 1];
            if !read_full(&mut self.rdr, &mut hdr)? {
                return Ok(false);
            }
            self.total += hdr.len() as u64;

            let (length, crc) = decode_header_tail(&hdr);
            if length > PAGE_SIZE - RECORD_HEADER_SIZE {
                return Err(ReadError::InvalidLength(length));
            }
            if !read_full(&mut self.rdr, &mut self.buf[..length])? {
                return Ok(false);
            }
            self.total += length as u64;

            let data = &self.buf[..length];
            let actual = checksum(data);
            if actual != crc {
                return Err(ReadError::ChecksumMismatch {
                    expected: crc,
                    actual,
                });
            }

            if compressed {
                self.snappy_buf.extend_from_slice(data);
            } else {
                self.rec.extend_from_slice(data);
            }

            if !validate_sequence(typ, position) {
                return Err(ReadError::UnexpectedFragment {
                    kind: typ.as_byte(),
                    position,
                });
            }

            if typ.is_terminal() {
                if compressed && !self.snappy_buf.is_empty() {
                    decompress(&mut self.decoder, &self.snappy_buf, &mut self.rec)?;
                }
                return Ok(true);
            }
            position += 1;
        }
    }
}

impl Reader<SegmentBufReader> {
    /// Creates a reader over segment files. Errors carry the segment index
    /// and in-segment offset.
    pub fn from_segments(rdr: SegmentBufReader) -> Self {
        Self::with_hooks(rdr, SegmentBufReader::location, SegmentBufReader::next_segment)
    }

    /// Opens a reader over the given ranges.
    pub fn open(ranges: &[SegmentRange]) -> WalResult<Self> {
        Ok(Self::from_segments(SegmentBufReader::open(ranges)?))
    }
}

/// Iterator over owned records, see [`Reader::records`].
///
/// Stops after the first error.
pub struct Records<'a, R> {
    reader: &'a mut Reader<R>,
    finished: bool,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = WalResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.reader.next() {
            Ok(true) => Some(Ok(self.reader.record().to_vec())),
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Decodes a snappy block into `out`, replacing its contents.
pub(crate) fn decompress(
    decoder: &mut snap::raw::Decoder,
    input: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), ReadError> {
    let len = snap::raw::decompress_len(input)?;
    out.clear();
    out.resize(len, 0);
    let n = decoder.decompress(input, out)?;
    out.truncate(n);
    Ok(())
}

/// Fills `buf` completely.
///
/// Returns `Ok(false)` if the stream ended before any byte was read and
/// [`ReadError::UnexpectedEof`] if it ended part way.
fn read_full<R: Read>(rdr: &mut R, buf: &mut [u8]) -> Result<bool, ReadError> {
    let mut read = 0;
    while read < buf.len() {
        match rdr.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    if read == buf.len() {
        Ok(true)
    } else if read == 0 {
        Ok(false)
    } else {
        Err(ReadError::UnexpectedEof)
    }
}
