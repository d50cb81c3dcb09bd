//! Checkpoint command implementation.

use crate::error::CliError;
use std::path::Path;
use tidewal_core::checkpoint::delete_checkpoints;
use tidewal_core::{checkpoint, CheckpointStats, Wal, WalOptions};

/// Runs the checkpoint command.
///
/// Every segment except the newly opened one is checkpointed. Segments
/// and checkpoints made redundant are deleted afterwards.
pub fn run(path: &Path, mint: i64, drop_series: &[u64], compress: bool) -> Result<(), CliError> {
    let wal = Wal::open(path, WalOptions::new().compress(compress))?;
    match compact(&wal, mint, drop_series)? {
        Some((to, stats)) => {
            println!("Checkpointed segments through {to:08}");
            println!(
                "  series:     {} read, {} dropped",
                stats.total_series, stats.dropped_series
            );
            println!(
                "  samples:    {} read, {} dropped",
                stats.total_samples, stats.dropped_samples
            );
            println!(
                "  tombstones: {} read, {} dropped",
                stats.total_tombstones, stats.dropped_tombstones
            );
        }
        None => println!("Nothing to checkpoint"),
    }
    wal.close()?;
    Ok(())
}

fn compact(
    wal: &Wal,
    mint: i64,
    drop_series: &[u64],
) -> Result<Option<(u64, CheckpointStats)>, CliError> {
    let Some((first, last)) = wal.segments()? else {
        return Ok(None);
    };
    if last == first {
        return Ok(None);
    }
    let to = last - 1;

    let stats = checkpoint(wal, first, to, |r| !drop_series.contains(&r), mint)?;
    wal.truncate(to + 1)?;
    delete_checkpoints(wal.dir(), to)?;
    Ok(Some((to, stats)))
}
