//! Checkpoints: compacted copies of a prefix of the log.
//!
//! A checkpoint `checkpoint.<N>` holds, in the regular segment format, every
//! record of segments up to and including `N` (and of the previous
//! checkpoint) that is still relevant. Series no longer kept, samples older
//! than the cut-off time and tombstones ending before it are dropped.
//!
//! ## Atomicity
//!
//! The checkpoint is written to `checkpoint.<N>.tmp`, fsynced, and renamed
//! into place. A crash leaves at most a stale `.tmp` directory, which is
//! never considered by [`last_checkpoint`] and is removed by the next run.

use crate::dir::sync_dir;
use crate::error::{WalError, WalResult};
use crate::wal::{Reader, SegmentRange, Wal};
use crate::config::WalOptions;
use serde::Serialize;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tidewal_record::{RecordDecoder, RecordEncoder, RecordType};
use tracing::{info, warn};

/// Name prefix of checkpoint directories.
pub const CHECKPOINT_PREFIX: &str = "checkpoint.";

/// Buffered record bytes after which a batch is written to the checkpoint.
pub const CHECKPOINT_FLUSH_THRESHOLD: usize = 1024 * 1024;

/// Counts of records seen and dropped while checkpointing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointStats {
    /// Series not carried over.
    pub dropped_series: usize,
    /// Samples older than the cut-off.
    pub dropped_samples: usize,
    /// Tombstones ending before the cut-off.
    pub dropped_tombstones: usize,
    /// Series read.
    pub total_series: usize,
    /// Samples read.
    pub total_samples: usize,
    /// Tombstones read.
    pub total_tombstones: usize,
}

/// Returns the path of checkpoint `index` in `dir`.
#[must_use]
pub fn checkpoint_dir(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{CHECKPOINT_PREFIX}{index:08}"))
}

/// Parses the index out of a checkpoint directory name.
#[must_use]
pub fn checkpoint_index(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let suffix = name.strip_prefix(CHECKPOINT_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Finds the checkpoint with the highest index in `dir`.
///
/// # Errors
///
/// Returns [`WalError::InvalidCheckpoint`] if an entry with the checkpoint
/// prefix is not a directory.
pub fn last_checkpoint(dir: &Path) -> WalResult<Option<(PathBuf, u64)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(CHECKPOINT_PREFIX) {
            entries.push((name, entry.file_type()?.is_dir()));
        }
    }
    entries.sort();

    // Stale checkpoints may still be around.
    for (name, is_dir) in entries.into_iter().rev() {
        if !is_dir {
            return Err(WalError::invalid_checkpoint(format!(
                "checkpoint {name} is not a directory"
            )));
        }
        let path = dir.join(&name);
        if let Some(index) = checkpoint_index(&path) {
            return Ok(Some((path, index)));
        }
    }
    Ok(None)
}

/// Removes all checkpoints in `dir` with an index below `max_index`.
///
/// Every candidate is attempted; the first failure is returned.
pub fn delete_checkpoints(dir: &Path, max_index: u64) -> WalResult<()> {
    let mut first_err = None;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        match checkpoint_index(&path) {
            Some(index) if index < max_index => {
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "delete checkpoint");
                    first_err.get_or_insert(e);
                }
            }
            _ => {}
        }
    }

    match first_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Compacts segments `from..=to` of `wal` into `checkpoint.<to>`.
///
/// If a checkpoint already exists, its contents are carried over and
/// reading starts right after it; `from` may not leave a gap.
/// Series are kept if `keep(ref)` holds, samples if `t >= mint`, and
/// tombstones if any interval ends at or after `mint`.
///
/// # Errors
///
/// Any read corruption is fatal: a repaired log could no longer tell
/// which series were lost. The temporary directory is removed on error.
pub fn checkpoint<F>(
    wal: &Wal,
    from: u64,
    to: u64,
    keep: F,
    mint: i64,
) -> WalResult<CheckpointStats>
where
    F: FnMut(u64) -> bool,
{
    let mut from = from;
    let mut ranges = Vec::with_capacity(2);

    if let Some((dir, index)) = last_checkpoint(wal.dir())? {
        if from > index + 1 {
            return Err(WalError::CheckpointGap {
                expected: index + 1,
                requested: from,
            });
        }
        // Segments below the checkpoint should not exist anyway.
        from = index + 1;
        ranges.push(SegmentRange::all(dir));
    }
    ranges.push(SegmentRange::new(wal.dir(), Some(from), Some(to)));

    info!(from, to, mint, "creating checkpoint");

    let cpdir = checkpoint_dir(wal.dir(), to);
    let tmp = tmp_dir(&cpdir);
    if tmp.exists() {
        fs::remove_dir_all(&tmp)?;
    }
    fs::create_dir_all(&tmp)?;

    let result = write_checkpoint(wal, &ranges, &tmp, keep, mint);
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            if let Err(rm) = fs::remove_dir_all(&tmp) {
                warn!(path = %tmp.display(), error = %rm, "remove temporary checkpoint");
            }
            return Err(e);
        }
    };

    if cpdir.exists() {
        fs::remove_dir_all(&cpdir)?;
    }
    fs::rename(&tmp, &cpdir)?;
    sync_dir(wal.dir())?;

    info!(
        checkpoint = %cpdir.display(),
        series = stats.total_series - stats.dropped_series,
        samples = stats.total_samples - stats.dropped_samples,
        tombstones = stats.total_tombstones - stats.dropped_tombstones,
        "checkpoint complete"
    );
    Ok(stats)
}

fn tmp_dir(cpdir: &Path) -> PathBuf {
    let mut name = cpdir.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_checkpoint<F>(
    wal: &Wal,
    ranges: &[SegmentRange],
    tmp: &Path,
    mut keep: F,
    mint: i64,
) -> WalResult<CheckpointStats>
where
    F: FnMut(u64) -> bool,
{
    let mut reader = Reader::open(ranges)?;
    let cp = Wal::open(
        tmp,
        WalOptions::new()
            .compress(wal.compression_enabled())
            .lock_dir(false),
    )?;

    let enc = RecordEncoder::new();
    let dec = RecordDecoder::new();
    let mut stats = CheckpointStats::default();

    let mut series = Vec::new();
    let mut samples = Vec::new();
    let mut tombstones = Vec::new();
    // Records are batched into one buffer and logged together.
    let mut buf = Vec::new();
    let mut recs: Vec<Range<usize>> = Vec::new();

    while reader.next()? {
        let start = buf.len();
        let rec = reader.record();

        match dec.record_type(rec) {
            RecordType::Series => {
                series.clear();
                dec.series(rec, &mut series)?;
                let total = series.len();
                series.retain(|s| keep(s.series_ref));
                if !series.is_empty() {
                    enc.series(&series, &mut buf);
                }
                stats.total_series += total;
                stats.dropped_series += total - series.len();
            }
            RecordType::Samples => {
                samples.clear();
                dec.samples(rec, &mut samples)?;
                let total = samples.len();
                samples.retain(|s| s.t >= mint);
                if !samples.is_empty() {
                    enc.samples(&samples, &mut buf);
                }
                stats.total_samples += total;
                stats.dropped_samples += total - samples.len();
            }
            RecordType::Tombstones => {
                tombstones.clear();
                dec.tombstones(rec, &mut tombstones)?;
                let total = tombstones.len();
                tombstones.retain(|t| t.intervals.iter().any(|iv| iv.maxt >= mint));
                if !tombstones.is_empty() {
                    enc.tombstones(&tombstones, &mut buf);
                }
                stats.total_tombstones += total;
                stats.dropped_tombstones += total - tombstones.len();
            }
            RecordType::Invalid => {
                return Err(WalError::invalid_checkpoint(format!(
                    "invalid record type in segment {:?}",
                    reader.segment()
                )));
            }
        }

        if buf.len() == start {
            // All contents discarded.
            continue;
        }
        recs.push(start..buf.len());

        if buf.len() > CHECKPOINT_FLUSH_THRESHOLD {
            log_ranges(&cp, &buf, &recs)?;
            buf.clear();
            recs.clear();
        }
    }

    log_ranges(&cp, &buf, &recs)?;
    cp.close()?;
    sync_dir(tmp)?;
    Ok(stats)
}

fn log_ranges(cp: &Wal, buf: &[u8], recs: &[Range<usize>]) -> WalResult<()> {
    let batch: Vec<&[u8]> = recs.iter().map(|r| &buf[r.clone()]).collect();
    cp.log(&batch)
}
