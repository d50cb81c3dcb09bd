//! CLI command implementations.

pub mod checkpoint;
pub mod dump;
pub mod inspect;
pub mod repair;
pub mod tail;
pub mod truncate;
pub mod verify;

use std::path::Path;
use tidewal_core::{last_checkpoint, SegmentRange, WalResult};

/// Ranges covering the last checkpoint and the segments after it.
pub(crate) fn replay_ranges(dir: &Path) -> WalResult<Vec<SegmentRange>> {
    Ok(match last_checkpoint(dir)? {
        Some((cpdir, index)) => vec![
            SegmentRange::all(cpdir),
            SegmentRange::new(dir, Some(index + 1), None),
        ],
        None => vec![SegmentRange::all(dir)],
    })
}

/// Formats a byte count for humans.
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
