//! Tails a WAL directory and forwards its records to a consumer.
//!
//! On each run the watcher reads series from the latest checkpoint, replays
//! older segments for series only and then tails the newest segment,
//! forwarding samples newer than its start time. New checkpoints are picked
//! up while tailing so the consumer can drop series that no longer exist.

use crate::checkpoint::{checkpoint_index, last_checkpoint};
use crate::config::{LiveReaderOptions, WatcherOptions};
use crate::dir::{list_segments, segment_name};
use crate::error::{WalError, WalResult};
use crate::metrics::{LiveReaderMetrics, WatcherMetrics};
use crate::wal::{LiveReader, Segment};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tidewal_record::{RecordDecoder, RecordType, RefSample, RefSeries};
use tracing::{debug, error, info, warn};

/// Consumer of the records a [`Watcher`] reads.
pub trait WriteTo: Send {
    /// Receives samples read while tailing.
    ///
    /// Returns `false` if the samples were not accepted.
    fn append(&mut self, samples: &[RefSample]) -> bool;

    /// Receives series read from `segment`.
    ///
    /// Series read from a checkpoint carry the checkpoint index.
    fn store_series(&mut self, series: &[RefSeries], segment: u64);

    /// Drops series last seen in a segment below `checkpoint_index`.
    fn series_reset(&mut self, checkpoint_index: u64);
}

/// Reads a WAL directory on behalf of a [`WriteTo`] consumer.
pub struct Watcher {
    options: WatcherOptions,
    sink: Box<dyn WriteTo>,
    metrics: Arc<WatcherMetrics>,
    reader_metrics: Arc<LiveReaderMetrics>,
    decoder: RecordDecoder,
    quit_tx: Option<Sender<()>>,
    quit_rx: Receiver<()>,
    quit: bool,
    start_timestamp: i64,
    started: Instant,
    last_checkpoint: Option<PathBuf>,
    send_samples: bool,
}

impl Watcher {
    /// Creates a watcher. Nothing is read until [`run`](Self::run) or
    /// [`start`](Self::start) is called.
    pub fn new(options: WatcherOptions, sink: Box<dyn WriteTo>) -> Self {
        let (quit_tx, quit_rx) = mpsc::channel();
        Self {
            options,
            sink,
            metrics: Arc::new(WatcherMetrics::new()),
            reader_metrics: Arc::new(LiveReaderMetrics::new()),
            decoder: RecordDecoder::new(),
            quit_tx: Some(quit_tx),
            quit_rx,
            quit: false,
            start_timestamp: 0,
            started: Instant::now(),
            last_checkpoint: None,
            send_samples: false,
        }
    }

    /// Returns the watcher metrics.
    pub fn metrics(&self) -> &Arc<WatcherMetrics> {
        &self.metrics
    }

    /// Returns the metrics shared by the segment readers.
    pub fn reader_metrics(&self) -> &Arc<LiveReaderMetrics> {
        &self.reader_metrics
    }

    /// Only samples with a timestamp after `millis` are forwarded.
    pub fn set_start_timestamp(&mut self, millis: i64) {
        self.start_timestamp = millis;
        self.started = Instant::now();
    }

    /// Runs the watcher on a background thread until stopped.
    ///
    /// Failed runs are logged and retried after the configured delay. The
    /// start time is reset to the current time on every attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(mut self) -> WalResult<WatcherHandle> {
        let quit = self
            .quit_tx
            .take()
            .ok_or_else(|| WalError::invalid_config("watcher has already been started"))?;
        let metrics = Arc::clone(&self.metrics);
        let handle = thread::Builder::new()
            .name(format!("tidewal-watcher-{}", self.options.name))
            .spawn(move || self.run_loop())?;
        Ok(WatcherHandle {
            quit,
            handle,
            metrics,
        })
    }

    fn run_loop(mut self) {
        info!(name = %self.options.name, "starting WAL watcher");
        while !self.should_quit() {
            self.set_start_timestamp(now_millis());
            if let Err(e) = self.run() {
                error!(name = %self.options.name, error = %e, "error tailing WAL");
            }
            if self.wait(self.options.retry_delay) {
                break;
            }
        }
        info!(name = %self.options.name, "WAL watcher stopped");
    }

    /// Reads the checkpoint and every segment, tailing the last one.
    ///
    /// Returns once the configured maximum segment has been read or the
    /// watcher is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed, the checkpoint
    /// cannot be read completely, or a tailed segment is corrupt.
    pub fn run(&mut self) -> WalResult<()> {
        let last = self.last_segment()?;
        self.send_samples = false;

        info!(name = %self.options.name, "replaying WAL");

        let checkpoint = last_checkpoint(&self.options.wal_dir)?;
        let mut checkpoint_idx = 0;
        if let Some((dir, index)) = &checkpoint {
            self.read_checkpoint(dir, *index)?;
            checkpoint_idx = *index;
        }
        self.last_checkpoint = checkpoint.map(|(dir, _)| dir);

        let mut current = self.find_segment_for_index(checkpoint_idx)?;
        debug!(
            name = %self.options.name,
            checkpoint = ?self.last_checkpoint,
            checkpoint_idx,
            current,
            last = ?last,
            "tailing WAL"
        );

        while !self.should_quit() {
            self.metrics.set_current_segment(current);
            debug!(name = %self.options.name, segment = current, "processing segment");

            let tail = last.map_or(true, |last| current >= last);
            self.watch(current, tail)?;

            if self.options.max_segment == Some(current) {
                return Ok(());
            }
            current += 1;
        }
        Ok(())
    }

    fn last_segment(&self) -> WalResult<Option<u64>> {
        Ok(list_segments(&self.options.wal_dir)?.last().map(|s| s.index))
    }

    fn find_segment_for_index(&self, index: u64) -> WalResult<u64> {
        list_segments(&self.options.wal_dir)?
            .into_iter()
            .map(|s| s.index)
            .find(|&i| i >= index)
            .ok_or_else(|| {
                WalError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no segment at or after {index}"),
                ))
            })
    }

    fn watch(&mut self, segment: u64, tail: bool) -> WalResult<()> {
        let file = Segment::open_read(&self.options.wal_dir, segment)?;
        let mut reader = LiveReader::with_options(
            file,
            LiveReaderOptions::new().metrics(Arc::clone(&self.reader_metrics)),
        );

        if !tail {
            let size = fs::metadata(segment_name(&self.options.wal_dir, segment))?.len();
            match self.read_segment(&mut reader, segment, false) {
                Err(e) => warn!(
                    name = %self.options.name,
                    segment,
                    error = %e,
                    "ignoring error reading to end of segment, may have dropped data"
                ),
                Ok(()) if reader.offset() != size => warn!(
                    name = %self.options.name,
                    segment,
                    read = reader.offset(),
                    size,
                    "expected to have read whole segment, may have dropped data"
                ),
                Ok(()) => {}
            }
            return Ok(());
        }

        let mut last_segment_check = Instant::now();
        let mut last_checkpoint_check = Instant::now();
        loop {
            if self.wait(self.options.read_period) {
                return Ok(());
            }
            self.read_segment(&mut reader, segment, true)?;

            if last_checkpoint_check.elapsed() >= self.options.checkpoint_period {
                last_checkpoint_check = Instant::now();
                if let Err(e) = self.garbage_collect_series(segment) {
                    warn!(name = %self.options.name, error = %e, "error processing checkpoint");
                }
            }

            if last_segment_check.elapsed() >= self.options.segment_check_period {
                last_segment_check = Instant::now();
                if self.last_segment()?.is_some_and(|last| last > segment) {
                    // The writer has moved on, so this segment is complete.
                    self.read_segment(&mut reader, segment, true)?;
                    return Ok(());
                }
            }
        }
    }

    /// Reads series from a checkpoint newer than the last one seen and
    /// resets the consumer's series below it.
    pub(crate) fn garbage_collect_series(&mut self, segment: u64) -> WalResult<()> {
        let Some((dir, index)) = last_checkpoint(&self.options.wal_dir)? else {
            return Ok(());
        };
        if self.last_checkpoint.as_ref() == Some(&dir) {
            return Ok(());
        }
        self.last_checkpoint = Some(dir.clone());

        if index >= segment {
            debug!(
                name = %self.options.name,
                segment,
                checkpoint = %dir.display(),
                "current segment is behind the checkpoint, skipping it"
            );
            return Ok(());
        }

        debug!(name = %self.options.name, checkpoint = %dir.display(), segment, "new checkpoint detected");
        self.read_checkpoint(&dir, index)?;
        self.sink.series_reset(index);
        Ok(())
    }

    /// Reads every segment of a checkpoint to its end.
    fn read_checkpoint(&mut self, dir: &Path, index: u64) -> WalResult<()> {
        debug!(name = %self.options.name, checkpoint = %dir.display(), "reading checkpoint");
        debug_assert_eq!(checkpoint_index(dir), Some(index));

        for seg in list_segments(dir)? {
            let path = dir.join(&seg.name);
            let size = fs::metadata(&path)?.len();
            let file = Segment::open_read(dir, seg.index)?;
            let mut reader = LiveReader::with_options(
                file,
                LiveReaderOptions::new().metrics(Arc::clone(&self.reader_metrics)),
            );
            self.read_segment(&mut reader, index, false)?;
            if reader.offset() != size {
                return Err(WalError::invalid_checkpoint(format!(
                    "read {} of {size} bytes from {}",
                    reader.offset(),
                    path.display()
                )));
            }
        }
        debug!(name = %self.options.name, checkpoint = %dir.display(), "read series from checkpoint");
        Ok(())
    }

    /// Forwards the records available in `reader`. Samples are only
    /// decoded when tailing.
    fn read_segment<R: Read>(
        &mut self,
        reader: &mut LiveReader<R>,
        segment: u64,
        tail: bool,
    ) -> WalResult<()> {
        let mut series = Vec::new();
        let mut samples = Vec::new();
        let mut send = Vec::new();

        while reader.next()? {
            let rec = reader.record();
            let typ = self.decoder.record_type(rec);
            self.metrics.record_read(typ);

            match typ {
                RecordType::Series => {
                    series.clear();
                    if let Err(e) = self.decoder.series(rec, &mut series) {
                        self.metrics.record_decode_failure();
                        return Err(e.into());
                    }
                    self.sink.store_series(&series, segment);
                }
                RecordType::Samples => {
                    if !tail {
                        self.metrics.record_sample_record_skipped();
                        continue;
                    }
                    samples.clear();
                    if let Err(e) = self.decoder.samples(rec, &mut samples) {
                        self.metrics.record_decode_failure();
                        return Err(e.into());
                    }
                    let replaying = !self.send_samples;
                    for s in &samples {
                        if s.t <= self.start_timestamp {
                            continue;
                        }
                        if !self.send_samples {
                            self.send_samples = true;
                            info!(
                                name = %self.options.name,
                                duration = ?self.started.elapsed(),
                                "done replaying WAL"
                            );
                        }
                        send.push(*s);
                    }
                    if !send.is_empty() {
                        if replaying {
                            self.metrics.record_samples_sent_pre_tailing(send.len());
                        }
                        if !self.sink.append(&send) {
                            debug!(name = %self.options.name, count = send.len(), "samples not accepted");
                        }
                        send.clear();
                    }
                }
                RecordType::Tombstones => {}
                RecordType::Invalid => {
                    // Corruption, or a record type from a newer writer.
                    self.metrics.record_decode_failure();
                }
            }

            if self.should_quit() {
                break;
            }
        }
        Ok(())
    }

    fn should_quit(&mut self) -> bool {
        if !self.quit {
            match self.quit_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => self.quit = true,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.quit
    }

    /// Sleeps for `timeout` unless stopped first. Returns whether to stop.
    fn wait(&mut self, timeout: Duration) -> bool {
        if !self.quit {
            match self.quit_rx.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => self.quit = true,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.quit
    }
}

/// Handle to a watcher running on a background thread.
///
/// Dropping the handle also stops the watcher, without waiting for it.
pub struct WatcherHandle {
    quit: Sender<()>,
    handle: JoinHandle<()>,
    metrics: Arc<WatcherMetrics>,
}

impl WatcherHandle {
    /// Returns the watcher metrics.
    pub fn metrics(&self) -> &Arc<WatcherMetrics> {
        &self.metrics
    }

    /// Stops the watcher and waits for its thread to exit.
    pub fn stop(self) {
        // The thread may already be gone after a panic.
        let _ = self.quit.send(());
        if self.handle.join().is_err() {
            error!("WAL watcher thread panicked");
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
