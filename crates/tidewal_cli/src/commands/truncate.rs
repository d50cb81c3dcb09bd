//! Truncate command implementation.

use crate::error::CliError;
use std::path::Path;
use tidewal_core::{Wal, WalOptions};
use tracing::info;

/// Runs the truncate command.
pub fn run(path: &Path, before: u64) -> Result<(), CliError> {
    let wal = Wal::open(path, WalOptions::new())?;
    let old = wal.segments()?;
    info!(path = %path.display(), before, "truncating WAL");
    wal.truncate(before)?;
    let new = wal.segments()?;
    wal.close()?;

    match (old, new) {
        (Some((old_first, _)), Some((new_first, last))) if new_first > old_first => println!(
            "Deleted segments {old_first:08} - {:08}, kept {new_first:08} - {last:08}",
            new_first - 1
        ),
        _ => println!("No segments below {before:08}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewal_core::dir::list_segments;
    use tempfile::tempdir;

    #[test]
    fn deletes_lower_segments() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new().segment_pages(2)).unwrap();
        for _ in 0..3 {
            wal.log(&[b"\x02x".as_slice()]).unwrap();
            wal.next_segment().unwrap();
        }
        wal.close().unwrap();

        run(dir.path(), 2).unwrap();
        let indexes: Vec<u64> = list_segments(dir.path())
            .unwrap()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(indexes, vec![2, 3, 4]);
    }
}
