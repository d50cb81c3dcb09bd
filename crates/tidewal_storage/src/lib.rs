//! # tidewal storage
//!
//! Storage backend trait and implementations for tidewal segment files.
//!
//! A backend is an **opaque byte store**: it appends, reads, syncs and
//! truncates bytes. It knows nothing about pages, record headers or
//! checkpoints; the WAL engine in `tidewal_core` owns all format
//! interpretation.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - A single OS file, used for every segment on disk
//! - [`InMemoryBackend`] - A growable buffer for tests and page inspection
//!
//! ## Example
//!
//! ```rust
//! use tidewal_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
