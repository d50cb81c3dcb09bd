//! WAL directory layout.
//!
//! ```text
//! <wal_dir>/
//! ├─ LOCK                  # Advisory lock for single-writer
//! ├─ 00000000              # Segment files, numbered without gaps
//! ├─ 00000001
//! └─ checkpoint.00000000/  # Compacted prefix of the log
//!    └─ 00000000
//! ```

use crate::error::{WalError, WalResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Returns the path of segment `index` in `dir`.
#[must_use]
pub fn segment_name(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{index:08}"))
}

/// A segment file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    /// File name.
    pub name: String,
    /// Segment index parsed from the name.
    pub index: u64,
}

/// Parses an all-digit file name into a segment index.
fn parse_index(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Lists segment files in `dir` in ascending order.
///
/// Names that are not purely numeric are ignored. Fails if the numbering
/// has a gap.
pub fn list_segments(dir: &Path) -> WalResult<Vec<SegmentRef>> {
    let mut refs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(index) = parse_index(&name) {
            refs.push(SegmentRef { name, index });
        }
    }
    refs.sort_by_key(|r| r.index);

    for pair in refs.windows(2) {
        if pair[1].index != pair[0].index + 1 {
            return Err(WalError::NonSequentialSegments {
                previous: pair[0].index,
                next: pair[1].index,
            });
        }
    }
    Ok(refs)
}

/// Returns the first and last segment index, or `None` if there are none.
pub fn segment_range(dir: &Path) -> WalResult<Option<(u64, u64)>> {
    let refs = list_segments(dir)?;
    Ok(match (refs.first(), refs.last()) {
        (Some(first), Some(last)) => Some((first.index, last.index)),
        _ => None,
    })
}

/// Exclusive advisory lock on a WAL directory.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
}

impl DirLock {
    /// Takes the lock, failing with [`WalError::Locked`] if another
    /// process holds it.
    pub fn acquire(dir: &Path) -> WalResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if file.try_lock_exclusive().is_err() {
            return Err(WalError::Locked);
        }
        Ok(Self { _file: file })
    }
}

/// Fsyncs a directory so entry creation, rename and removal are durable.
#[cfg(unix)]
pub fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

/// NTFS journals metadata, directory fsync is not supported.
#[cfg(not(unix))]
pub fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Returns the total size of all files below `path`.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn segment_names_are_zero_padded() {
        let p = segment_name(Path::new("/wal"), 12);
        assert_eq!(p, PathBuf::from("/wal/00000012"));
    }

    #[test]
    fn list_ignores_non_numeric() {
        let dir = tempdir().unwrap();
        for name in ["00000001", "00000000", "LOCK", "checkpoint.00000000", "00000002.repair"] {
            touch(dir.path(), name);
        }

        let refs = list_segments(dir.path()).unwrap();
        let indices: Vec<u64> = refs.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(segment_range(dir.path()).unwrap(), Some((0, 1)));
    }

    #[test]
    fn list_rejects_gaps() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "00000003");
        touch(dir.path(), "00000005");

        let err = list_segments(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            WalError::NonSequentialSegments { previous: 3, next: 5 }
        ));
    }

    #[test]
    fn empty_range() {
        let dir = tempdir().unwrap();
        assert_eq!(segment_range(dir.path()).unwrap(), None);
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let _lock = DirLock::acquire(dir.path()).unwrap();

        // fs2 locks are per file handle, so a second handle conflicts.
        let err = DirLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, WalError::Locked));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(DirLock::acquire(dir.path()).unwrap());
        assert!(DirLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn size_includes_subdirectories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("00000000"), [0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("checkpoint.00000000")).unwrap();
        fs::write(dir.path().join("checkpoint.00000000/00000000"), [0u8; 50]).unwrap();

        assert_eq!(dir_size(dir.path()).unwrap(), 150);
    }
}
