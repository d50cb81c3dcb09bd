//! WAL writer.

use super::fragment::{encode_header, FragmentType};
use super::page::Page;
use super::reader::Reader;
use super::segment::Segment;
use super::{PAGE_SIZE, RECORD_HEADER_SIZE};
use crate::config::WalOptions;
use crate::dir::{dir_size, list_segments, segment_name, segment_range, DirLock};
use crate::error::{WalError, WalResult};
use crate::metrics::WalMetrics;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Capacity of the queue of segments waiting to be fsynced and closed.
pub(crate) const WORKER_QUEUE_CAPACITY: usize = 100;

/// A write-ahead log over a directory of segment files.
///
/// All mutating operations are serialized by an internal mutex. Rotated
/// segments are fsynced and closed by a background thread so that
/// [`log`](Wal::log) never waits on a previous segment's fsync.
///
/// # Example
///
/// ```rust,ignore
/// use tidewal_core::{Wal, WalOptions};
///
/// let wal = Wal::open("data/wal", WalOptions::default())?;
/// wal.log(&[b"first".as_slice(), b"second".as_slice()])?;
/// wal.close()?;
/// ```
pub struct Wal {
    dir: PathBuf,
    compress: bool,
    pages_per_segment: u64,
    metrics: Arc<WalMetrics>,
    inner: Mutex<WalInner>,
    _lock: Option<DirLock>,
}

struct WalInner {
    segment: Option<Segment>,
    page: Page,
    /// Pages of the active segment already written out completely.
    done_pages: u64,
    snappy_buf: Vec<u8>,
    encoder: snap::raw::Encoder,
    closer: Option<SegmentCloser>,
    closed: bool,
}

impl Wal {
    /// Opens the WAL in `dir`, creating the directory if needed.
    ///
    /// Writing always starts in a fresh segment after the last existing
    /// one, so a segment that was being written during a crash is never
    /// appended to.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The segment size is not a positive multiple of [`PAGE_SIZE`]
    /// - Existing segments are not numbered sequentially
    /// - Another process holds the directory lock
    /// - I/O errors occur
    pub fn open(dir: impl AsRef<Path>, options: WalOptions) -> WalResult<Self> {
        let dir = dir.as_ref();
        if options.segment_size == 0 || options.segment_size % PAGE_SIZE as u64 != 0 {
            return Err(WalError::invalid_config(format!(
                "segment size {} is not a multiple of the page size {PAGE_SIZE}",
                options.segment_size
            )));
        }

        fs::create_dir_all(dir)?;
        let lock = if options.lock_dir {
            Some(DirLock::acquire(dir)?)
        } else {
            None
        };

        let write_index = match segment_range(dir)? {
            Some((_, last)) => last + 1,
            None => 0,
        };
        let segment = Segment::create(dir, write_index)?;

        let metrics = options.metrics.clone().unwrap_or_default();
        let closer = SegmentCloser::spawn(Arc::clone(&metrics))?;

        let wal = Self {
            dir: dir.to_path_buf(),
            compress: options.compress,
            pages_per_segment: options.pages_per_segment(),
            metrics,
            inner: Mutex::new(WalInner {
                segment: None,
                page: Page::new(),
                done_pages: 0,
                snappy_buf: Vec::new(),
                encoder: snap::raw::Encoder::new(),
                closer: Some(closer),
                closed: false,
            }),
            _lock: lock,
        };
        wal.set_segment(&mut wal.inner.lock(), segment)?;

        info!(
            dir = %dir.display(),
            segment = write_index,
            compress = options.compress,
            "opened wal"
        );
        Ok(wal)
    }

    /// Returns the WAL directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns whether records are compressed.
    #[must_use]
    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    /// Returns the shared metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<WalMetrics> {
        &self.metrics
    }

    /// Returns the index of the segment being written.
    pub fn current_segment(&self) -> Option<u64> {
        self.inner.lock().segment.as_ref().map(Segment::index)
    }

    /// Returns the first and last index of the segments on disk.
    pub fn segments(&self) -> WalResult<Option<(u64, u64)>> {
        segment_range(&self.dir)
    }

    /// Returns the total size of the WAL directory, including checkpoints.
    pub fn size(&self) -> WalResult<u64> {
        Ok(dir_size(&self.dir)?)
    }

    /// Writes a batch of records.
    ///
    /// The page is written to the segment after the last record, but not
    /// fsynced. A failure part way leaves earlier records of the batch in
    /// the log.
    pub fn log<R: AsRef<[u8]>>(&self, records: &[R]) -> WalResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WalError::Closed);
        }

        let result = self.log_batch(&mut inner, records);
        if result.is_err() {
            self.metrics.record_write_failure();
        }
        result
    }

    /// Closes the active segment and starts a new one.
    ///
    /// Returns the index of the new segment.
    pub fn next_segment(&self) -> WalResult<u64> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WalError::Closed);
        }
        self.next_segment_locked(&mut inner)
    }

    /// Writes out the page and fsyncs the active segment.
    pub fn sync(&self) -> WalResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WalError::Closed);
        }
        if inner.page.flushed < inner.page.alloc {
            self.flush_page(&mut inner, false)?;
        }
        let start = Instant::now();
        inner.segment.as_mut().ok_or(WalError::Closed)?.sync()?;
        self.metrics.record_fsync(start.elapsed());
        Ok(())
    }

    /// Deletes all segments with an index below `index`.
    ///
    /// Checkpoints are not touched.
    pub fn truncate(&self, index: u64) -> WalResult<()> {
        let _inner = self.inner.lock();
        let result = self.remove_segments_below(index);
        self.metrics.record_truncation(result.is_err());
        result
    }

    fn remove_segments_below(&self, index: u64) -> WalResult<()> {
        for seg in list_segments(&self.dir)? {
            if seg.index >= index {
                break;
            }
            fs::remove_file(self.dir.join(&seg.name))?;
        }
        Ok(())
    }

    /// Repairs the log after `err` was returned by a [`Reader`].
    ///
    /// Segments after the corrupt one are deleted. Records of the corrupt
    /// segment that end before the corruption offset are rewritten into a
    /// fresh segment with the same index, and writing continues in the
    /// segment after it.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Unrepairable`] unless `err` is a corruption
    /// error that names a segment.
    pub fn repair(&self, err: &WalError) -> WalResult<()> {
        let cerr = err
            .as_corruption()
            .ok_or_else(|| WalError::unrepairable(format!("not a corruption error: {err}")))?;
        let corrupt = cerr.segment.ok_or_else(|| {
            WalError::unrepairable("corruption error does not specify a segment")
        })?;
        if cerr.dir.as_deref().is_some_and(|d| d != self.dir) {
            return Err(WalError::unrepairable(format!(
                "corruption is outside the log directory: {cerr}"
            )));
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WalError::Closed);
        }

        warn!(segment = corrupt, offset = cerr.offset, "starting corruption repair");

        // The active segment is either deleted or replaced below.
        if let Some(active) = inner.segment.take() {
            close_segment(active, &self.metrics);
        }
        inner.page.reset();

        warn!(segment = corrupt, "deleting all segments newer than corrupted segment");
        for seg in list_segments(&self.dir)? {
            if seg.index > corrupt {
                fs::remove_file(self.dir.join(&seg.name))?;
            }
        }

        warn!(segment = corrupt, "rewriting corrupted segment");
        let path = segment_name(&self.dir, corrupt);
        let mut repair_path = path.clone().into_os_string();
        repair_path.push(".repair");
        let repair_path = PathBuf::from(repair_path);
        fs::rename(&path, &repair_path)?;

        let fresh = Segment::create(&self.dir, corrupt)?;
        self.set_segment(&mut inner, fresh)?;

        let mut reader = Reader::new(BufReader::new(File::open(&repair_path)?));
        let mut kept = 0u64;
        // Stops at the corruption, the error is expected.
        while let Ok(true) = reader.next() {
            if reader.offset() >= cerr.offset {
                break;
            }
            self.log_record(&mut inner, reader.record(), false)?;
            kept += 1;
        }
        drop(reader);

        // An empty page is not written, so a segment with no kept records
        // stays empty.
        if inner.page.alloc > 0 {
            self.flush_page(&mut inner, true)?;
        }
        fs::remove_file(&repair_path)?;

        let next = Segment::create(&self.dir, corrupt + 1)?;
        if let Some(repaired) = self.set_segment(&mut inner, next)? {
            close_segment(repaired, &self.metrics);
        }

        warn!(segment = corrupt, records = kept, "repair completed");
        Ok(())
    }

    /// Flushes the page, stops the background worker and closes the
    /// active segment.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Closed`] if already closed, or the error of the
    /// final page write.
    pub fn close(&self) -> WalResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WalError::Closed);
        }
        inner.closed = true;

        let flushed = if inner.segment.is_some() && inner.page.alloc > 0 {
            self.flush_page(&mut inner, true)
        } else {
            Ok(())
        };

        if let Some(closer) = inner.closer.take() {
            closer.shutdown();
        }
        if let Some(segment) = inner.segment.take() {
            close_segment(segment, &self.metrics);
        }

        info!(dir = %self.dir.display(), "closed wal");
        flushed
    }

    fn log_batch<R: AsRef<[u8]>>(&self, inner: &mut WalInner, records: &[R]) -> WalResult<()> {
        for (i, rec) in records.iter().enumerate() {
            self.log_record(inner, rec.as_ref(), i + 1 == records.len())?;
        }
        Ok(())
    }

    /// Writes one record. `last` records leave the page flushed to the
    /// segment.
    fn log_record(&self, inner: &mut WalInner, rec: &[u8], last: bool) -> WalResult<()> {
        if inner.page.full() {
            self.flush_page(inner, true)?;
        }

        // A record never spans segments.
        #[allow(clippy::cast_possible_wrap)]
        let fits = {
            let pages_left = self.pages_per_segment as i64 - inner.done_pages as i64 - 1;
            let free = (inner.page.remaining() - RECORD_HEADER_SIZE) as i64
                + (PAGE_SIZE - RECORD_HEADER_SIZE) as i64 * pages_left;
            rec.len() as i64 <= free
        };
        if !fits {
            self.next_segment_locked(inner)?;
        }

        let mut snappy_buf = std::mem::take(&mut inner.snappy_buf);
        let result = self.write_fragments(inner, rec, &mut snappy_buf);
        inner.snappy_buf = snappy_buf;
        result?;

        if last && inner.page.alloc > 0 {
            self.flush_page(inner, false)?;
        }
        Ok(())
    }

    fn write_fragments(
        &self,
        inner: &mut WalInner,
        rec: &[u8],
        snappy_buf: &mut Vec<u8>,
    ) -> WalResult<()> {
        let mut data = rec;
        let mut compressed = false;

        if self.compress && !rec.is_empty() {
            let max = snap::raw::max_compress_len(rec.len());
            if max > 0 {
                snappy_buf.resize(max, 0);
                let n = inner
                    .encoder
                    .compress(rec, snappy_buf)
                    .map_err(io::Error::from)?;
                if n < rec.len() {
                    data = &snappy_buf[..n];
                    compressed = true;
                }
            }
        }

        // At least one pass so empty records are written.
        let mut position = 0;
        loop {
            let room = PAGE_SIZE - inner.page.alloc - RECORD_HEADER_SIZE;
            let (part, rest) = data.split_at(data.len().min(room));

            let typ = match (position == 0, rest.is_empty()) {
                (true, true) => FragmentType::Full,
                (false, true) => FragmentType::Last,
                (true, false) => FragmentType::First,
                (false, false) => FragmentType::Middle,
            };
            inner.page.put(&encode_header(typ, compressed, part));
            inner.page.put(part);

            if inner.page.full() {
                self.flush_page(inner, true)?;
            }

            data = rest;
            position += 1;
            if data.is_empty() {
                return Ok(());
            }
        }
    }

    /// Writes unflushed page bytes to the segment. With `clear`, or when
    /// the page is full, the page is zero padded, written whole and reset.
    fn flush_page(&self, inner: &mut WalInner, clear: bool) -> WalResult<()> {
        let clear = clear || inner.page.full();
        if clear {
            inner.page.alloc = PAGE_SIZE;
        }

        let segment = inner.segment.as_mut().ok_or(WalError::Closed)?;
        let pending = inner.page.pending();
        let n = pending.len();
        segment.write(pending)?;
        inner.page.flushed += n;

        if clear {
            inner.page.reset();
            inner.done_pages += 1;
        }
        self.metrics.record_page_flush(clear);
        Ok(())
    }

    fn next_segment_locked(&self, inner: &mut WalInner) -> WalResult<u64> {
        if inner.page.alloc > 0 {
            self.flush_page(inner, true)?;
        }

        let current = inner.segment.as_ref().ok_or(WalError::Closed)?.index();
        let next = Segment::create(&self.dir, current + 1)?;
        if let Some(prev) = self.set_segment(inner, next)? {
            match inner.closer.as_ref() {
                Some(closer) => closer.submit(prev),
                None => close_segment(prev, &self.metrics),
            }
        }

        debug!(segment = current + 1, "started new segment");
        Ok(current + 1)
    }

    /// Makes `segment` the active one and returns the previous one.
    fn set_segment(&self, inner: &mut WalInner, segment: Segment) -> WalResult<Option<Segment>> {
        inner.done_pages = segment.size()? / PAGE_SIZE as u64;
        self.metrics.set_current_segment(segment.index());
        Ok(inner.segment.replace(segment))
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if !self.inner.lock().closed {
            if let Err(e) = self.close() {
                error!(error = %e, "closing wal on drop");
            }
        }
    }
}

/// Fsyncs and closes segments handed off on rotation.
struct SegmentCloser {
    tx: SyncSender<Segment>,
    handle: JoinHandle<()>,
    metrics: Arc<WalMetrics>,
}

impl SegmentCloser {
    fn spawn(metrics: Arc<WalMetrics>) -> WalResult<Self> {
        let (tx, rx) = mpsc::sync_channel::<Segment>(WORKER_QUEUE_CAPACITY);
        let worker_metrics = Arc::clone(&metrics);
        let handle = thread::Builder::new()
            .name("tidewal-segment-closer".into())
            .spawn(move || {
                for segment in rx {
                    close_segment(segment, &worker_metrics);
                }
            })?;

        Ok(Self {
            tx,
            handle,
            metrics,
        })
    }

    /// Queues a segment. Blocks only while the queue is full.
    fn submit(&self, segment: Segment) {
        if let Err(mpsc::SendError(segment)) = self.tx.send(segment) {
            close_segment(segment, &self.metrics);
        }
    }

    /// Drains the queue and joins the worker.
    fn shutdown(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            error!("segment closer thread panicked");
        }
    }
}

fn close_segment(mut segment: Segment, metrics: &WalMetrics) {
    let index = segment.index();
    let start = Instant::now();
    match segment.sync() {
        Ok(()) => metrics.record_fsync(start.elapsed()),
        Err(e) => error!(segment = index, error = %e, "sync segment"),
    }
    if let Err(e) = segment.close() {
        error!(segment = index, error = %e, "close segment");
    }
}
