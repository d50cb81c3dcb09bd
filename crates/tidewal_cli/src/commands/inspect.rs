//! Inspect command implementation.

use super::format_size;
use crate::error::CliError;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tidewal_core::dir::{dir_size, list_segments};
use tidewal_core::{last_checkpoint, WalError};

/// Layout of a WAL directory.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// WAL directory.
    pub path: String,
    /// Lowest segment index.
    pub first_segment: Option<u64>,
    /// Highest segment index.
    pub last_segment: Option<u64>,
    /// Number of segments.
    pub segment_count: usize,
    /// Total size of the segments in bytes.
    pub segments_size: u64,
    /// Latest checkpoint, if any.
    pub checkpoint: Option<CheckpointInfo>,
    /// Size of the whole directory in bytes.
    pub total_size: u64,
    /// Per-segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentInfo>>,
}

/// A checkpoint directory.
#[derive(Debug, Serialize)]
pub struct CheckpointInfo {
    /// Last segment covered.
    pub index: u64,
    /// Directory name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// A single segment file.
#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    /// Segment index.
    pub index: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, format: &str) -> Result<(), CliError> {
    if !path.is_dir() {
        return Err(CliError::Usage(format!(
            "no WAL directory at {}",
            path.display()
        )));
    }

    let result = inspect(path, show_segments)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn inspect(path: &Path, show_segments: bool) -> Result<InspectResult, WalError> {
    let refs = list_segments(path)?;
    let mut segments = Vec::with_capacity(refs.len());
    for seg in &refs {
        let size = fs::metadata(path.join(&seg.name))?.len();
        segments.push(SegmentInfo {
            index: seg.index,
            size,
        });
    }

    let checkpoint = match last_checkpoint(path)? {
        Some((cpdir, index)) => Some(CheckpointInfo {
            index,
            name: cpdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: dir_size(&cpdir)?,
        }),
        None => None,
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        first_segment: refs.first().map(|s| s.index),
        last_segment: refs.last().map(|s| s.index),
        segment_count: refs.len(),
        segments_size: segments.iter().map(|s| s.size).sum(),
        checkpoint,
        total_size: dir_size(path)?,
        segments: show_segments.then_some(segments),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("tidewal WAL Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Segments:");
    match (result.first_segment, result.last_segment) {
        (Some(first), Some(last)) => {
            println!("  Range:  {first:08} - {last:08} ({} files)", result.segment_count);
        }
        _ => println!("  Range:  none"),
    }
    println!("  Size:   {}", format_size(result.segments_size));
    println!();
    match &result.checkpoint {
        Some(cp) => println!(
            "Checkpoint: {} (through segment {:08}, {})",
            cp.name,
            cp.index,
            format_size(cp.size)
        ),
        None => println!("Checkpoint: none"),
    }
    println!();
    println!("Total size: {}", format_size(result.total_size));

    if let Some(segments) = &result.segments {
        println!();
        println!("Segment files:");
        for seg in segments {
            println!("  {:08}  {}", seg.index, format_size(seg.size));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tidewal_core::{checkpoint, Wal, WalOptions};
    use tidewal_record::{RecordEncoder, RefSeries};

    #[test]
    fn reports_segments_and_checkpoint() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new().segment_pages(2)).unwrap();
        let mut rec = Vec::new();
        RecordEncoder::new().series(&[RefSeries::new(1, [("job", "api")])], &mut rec);
        wal.log(&[&rec]).unwrap();
        wal.next_segment().unwrap();
        wal.log(&[&rec]).unwrap();
        wal.next_segment().unwrap();
        checkpoint(&wal, 0, 0, |_| true, 0).unwrap();
        wal.close().unwrap();

        let result = inspect(dir.path(), true).unwrap();
        assert_eq!(result.first_segment, Some(0));
        assert_eq!(result.last_segment, Some(2));
        assert_eq!(result.segment_count, 3);
        let cp = result.checkpoint.unwrap();
        assert_eq!(cp.index, 0);
        assert_eq!(cp.name, "checkpoint.00000000");
        assert_eq!(result.segments.unwrap().len(), 3);
        assert!(result.total_size >= result.segments_size + cp.size);
    }

    #[test]
    fn empty_directory() {
        let dir = tempdir().unwrap();
        let result = inspect(dir.path(), false).unwrap();
        assert_eq!(result.segment_count, 0);
        assert!(result.first_segment.is_none());
        assert!(result.segments.is_none());
    }
}
