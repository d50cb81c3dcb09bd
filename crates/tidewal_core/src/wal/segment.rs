//! Segment files.

use crate::dir::segment_name;
use crate::error::WalResult;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tidewal_storage::{FileBackend, StorageBackend};

/// One append-only file of the log.
pub struct Segment {
    dir: PathBuf,
    index: u64,
    backend: Box<dyn StorageBackend>,
}

impl Segment {
    /// Creates segment `index` in `dir` for writing.
    pub fn create(dir: &Path, index: u64) -> WalResult<Self> {
        let backend = FileBackend::open(&segment_name(dir, index))?;
        Ok(Self::with_backend(dir, index, Box::new(backend)))
    }

    /// Wraps an existing backend as segment `index`.
    pub fn with_backend(dir: &Path, index: u64, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            index,
            backend,
        }
    }

    /// Opens segment `index` in `dir` for reading.
    pub fn open_read(dir: &Path, index: u64) -> WalResult<File> {
        Ok(File::open(segment_name(dir, index))?)
    }

    /// Returns the segment index.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the directory holding the segment.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the segment file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        segment_name(&self.dir, self.index)
    }

    /// Returns the current size in bytes.
    pub fn size(&self) -> WalResult<u64> {
        Ok(self.backend.size()?)
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> WalResult<()> {
        self.backend.append(data)?;
        Ok(())
    }

    /// Fsyncs the segment.
    pub fn sync(&mut self) -> WalResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Flushes and closes the segment.
    pub fn close(mut self) -> WalResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn read_all(&self) -> WalResult<Vec<u8>> {
        let size = self.backend.size()?;
        Ok(self.backend.read_at(0, size as usize)?)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("dir", &self.dir)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tidewal_storage::InMemoryBackend;

    #[test]
    fn create_names_file() {
        let dir = tempdir().unwrap();
        let seg = Segment::create(dir.path(), 3).unwrap();

        assert_eq!(seg.index(), 3);
        assert_eq!(seg.path(), dir.path().join("00000003"));
        assert!(seg.path().exists());
        assert_eq!(seg.size().unwrap(), 0);
    }

    #[test]
    fn writes_append() {
        let dir = tempdir().unwrap();
        let mut seg = Segment::create(dir.path(), 0).unwrap();
        seg.write(b"abc").unwrap();
        seg.write(b"de").unwrap();
        seg.sync().unwrap();

        assert_eq!(seg.size().unwrap(), 5);
        seg.close().unwrap();
        assert_eq!(std::fs::read(dir.path().join("00000000")).unwrap(), b"abcde");
    }

    #[test]
    fn memory_backed() {
        let mut seg = Segment::with_backend(Path::new("mem"), 1, Box::new(InMemoryBackend::new()));
        seg.write(b"xyz").unwrap();
        assert_eq!(seg.read_all().unwrap(), b"xyz");
    }
}
