//! # tidewal Testkit
//!
//! Test utilities for tidewal.
//!
//! This crate provides:
//! - Temporary WAL fixtures and a recording watcher sink
//! - Property-based test generators using proptest
//! - Corruption and torn-write helpers for crash testing
//! - Byte-exact framing vectors
//! - Concurrent writer stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidewal_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let mut wal = TempWal::with_pages(4);
//!     wal.log(&[b"record".as_slice()]).unwrap();
//!     assert_eq!(wal.reopen_and_read(), vec![b"record".to_vec()]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;
