//! In-memory staging buffer for one page.

use super::{PAGE_SIZE, RECORD_HEADER_SIZE};

/// A page being filled by the writer.
///
/// `flushed <= alloc <= PAGE_SIZE` holds at all times.
pub(crate) struct Page {
    pub(crate) buf: Box<[u8]>,
    /// Bytes written into the buffer.
    pub(crate) alloc: usize,
    /// Bytes already written to the segment.
    pub(crate) flushed: usize,
}

impl Page {
    pub(crate) fn new() -> Self {
        Self {
            buf: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            alloc: 0,
            flushed: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        PAGE_SIZE - self.alloc
    }

    /// True when not even an empty fragment fits.
    pub(crate) fn full(&self) -> bool {
        self.remaining() < RECORD_HEADER_SIZE
    }

    /// Copies `data` after the allocated bytes.
    pub(crate) fn put(&mut self, data: &[u8]) {
        self.buf[self.alloc..self.alloc + data.len()].copy_from_slice(data);
        self.alloc += data.len();
    }

    /// Bytes allocated but not yet written out.
    pub(crate) fn pending(&self) -> &[u8] {
        &self.buf[self.flushed..self.alloc]
    }

    pub(crate) fn reset(&mut self) {
        self.buf.fill(0);
        self.alloc = 0;
        self.flushed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_page_is_empty() {
        let page = Page::new();
        assert_eq!(page.remaining(), PAGE_SIZE);
        assert!(!page.full());
        assert!(page.pending().is_empty());
    }

    #[test]
    fn full_below_header_size() {
        let mut page = Page::new();
        page.put(&vec![1u8; PAGE_SIZE - RECORD_HEADER_SIZE]);
        assert!(!page.full());

        page.put(&[1]);
        assert!(page.full());
    }

    #[test]
    fn pending_tracks_flushed() {
        let mut page = Page::new();
        page.put(b"abc");
        page.flushed = 1;
        assert_eq!(page.pending(), b"bc");
    }

    #[test]
    fn reset_zeroes() {
        let mut page = Page::new();
        page.put(b"abc");
        page.flushed = 3;
        page.reset();

        assert_eq!(page.alloc, 0);
        assert_eq!(page.flushed, 0);
        assert!(page.buf.iter().all(|&b| b == 0));
    }
}
