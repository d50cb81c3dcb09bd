//! Repair command implementation.

use super::verify::verify;
use crate::error::CliError;
use std::path::Path;
use tidewal_core::{Wal, WalOptions};
use tracing::info;

/// Runs the repair command.
pub fn run(path: &Path, compress: bool) -> Result<(), CliError> {
    let result = verify(path)?;
    let Some(err) = result.error else {
        println!("No corruption found ({} records)", result.records);
        return Ok(());
    };
    println!("Found: {err}");
    info!(path = %path.display(), records = result.records, "repairing WAL");

    let wal = Wal::open(path, WalOptions::new().compress(compress))?;
    wal.repair(&err)?;
    wal.close()?;

    println!("✓ Repaired, {} records before the corruption", result.records);
    Ok(())
}
