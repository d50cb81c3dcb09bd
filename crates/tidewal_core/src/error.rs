//! Error types for the tidewal engine.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur in WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tidewal_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tidewal_record::CodecError),

    /// A reader found damaged data.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),

    /// Options were rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Segment numbering in the directory has a gap.
    #[error("segments are not sequential: {previous:08} is followed by {next:08}")]
    NonSequentialSegments {
        /// Index before the gap.
        previous: u64,
        /// Index after the gap.
        next: u64,
    },

    /// Repair was asked to handle an error it cannot fix.
    #[error("cannot repair: {message}")]
    Unrepairable {
        /// Description of the problem.
        message: String,
    },

    /// A checkpoint directory is malformed.
    #[error("invalid checkpoint: {message}")]
    InvalidCheckpoint {
        /// Description of the problem.
        message: String,
    },

    /// A checkpoint would skip segments after the previous one.
    #[error("unexpected gap to last checkpoint: expected {expected:08}, requested {requested:08}")]
    CheckpointGap {
        /// First segment not yet covered by a checkpoint.
        expected: u64,
        /// First segment that was requested.
        requested: u64,
    },

    /// The WAL has been closed.
    #[error("wal is closed")]
    Closed,

    /// Another process holds the directory lock.
    #[error("wal directory locked: another process has exclusive access")]
    Locked,
}

impl WalError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an unrepairable error.
    pub fn unrepairable(message: impl Into<String>) -> Self {
        Self::Unrepairable {
            message: message.into(),
        }
    }

    /// Creates an invalid checkpoint error.
    pub fn invalid_checkpoint(message: impl Into<String>) -> Self {
        Self::InvalidCheckpoint {
            message: message.into(),
        }
    }

    /// Returns the corruption details if this is a corruption error.
    #[must_use]
    pub fn as_corruption(&self) -> Option<&CorruptionError> {
        match self {
            Self::Corruption(c) => Some(c),
            _ => None,
        }
    }

    /// Returns true if the log ends in the middle of a multi-fragment record.
    #[must_use]
    pub fn is_torn_record(&self) -> bool {
        matches!(
            self,
            Self::Corruption(CorruptionError {
                cause: ReadError::TornRecord,
                ..
            })
        )
    }

    /// Classifies the error for process exit codes.
    #[must_use]
    pub fn exit_kind(&self) -> ExitKind {
        match self {
            Self::Corruption(_) | Self::Codec(_) | Self::InvalidCheckpoint { .. } => {
                ExitKind::Corruption
            }
            Self::Io(_) | Self::Storage(_) | Self::Locked => ExitKind::Io,
            Self::InvalidConfig { .. }
            | Self::NonSequentialSegments { .. }
            | Self::Unrepairable { .. }
            | Self::CheckpointGap { .. } => ExitKind::Config,
            Self::Closed => ExitKind::Other,
        }
    }
}

/// Coarse error class used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Data on disk is damaged.
    Corruption,
    /// The operating system refused an operation.
    Io,
    /// Options or directory layout are invalid.
    Config,
    /// Anything else.
    Other,
}

impl ExitKind {
    /// Returns the process exit code for this class.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Corruption => 2,
            Self::Io => 3,
            Self::Config => 4,
            Self::Other => 1,
        }
    }
}

/// Low-level failure found while decoding framed records.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Stored checksum does not match the fragment.
    #[error("unexpected checksum {actual:08x}, expected {expected:08x}")]
    ChecksumMismatch {
        /// Checksum from the header.
        expected: u32,
        /// Checksum of the bytes read.
        actual: u32,
    },

    /// Header carries an unknown fragment type.
    #[error("invalid record type {0}")]
    InvalidRecordType(u8),

    /// Fragment type is not allowed at this position of a record.
    #[error("unexpected fragment type {kind} at position {position}")]
    UnexpectedFragment {
        /// Fragment type byte.
        kind: u8,
        /// Number of fragments already read for this record.
        position: usize,
    },

    /// Page padding contains data.
    #[error("unexpected non-zero byte in padded page")]
    NonZeroPadding,

    /// Fragment length exceeds a page.
    #[error("invalid record size {0}")]
    InvalidLength(usize),

    /// Fragment would cross a page boundary.
    #[error("record would overflow current page: {length} bytes at page offset {page_offset}")]
    PageOverflow {
        /// Fragment length including the header.
        length: usize,
        /// Offset of the header within the page.
        page_offset: usize,
    },

    /// The log ends after a first or middle fragment.
    #[error("last record is torn")]
    TornRecord,

    /// The log ends inside a header or payload.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Compressed payload could not be decoded.
    #[error("snappy decode failed: {0}")]
    Decompress(#[from] snap::Error),

    /// Underlying read failed.
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// A read error annotated with where in the log it happened.
#[derive(Debug)]
pub struct CorruptionError {
    /// WAL or checkpoint directory, when known.
    pub dir: Option<PathBuf>,
    /// Segment index, when reading through segment files.
    pub segment: Option<u64>,
    /// In-segment offset, or total bytes read when the segment is unknown.
    pub offset: u64,
    /// What went wrong.
    pub cause: ReadError,
}

impl fmt::Display for CorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.dir, self.segment) {
            (Some(dir), Some(segment)) => write!(
                f,
                "corruption in segment {}/{segment:08} at {}: {}",
                dir.display(),
                self.offset,
                self.cause
            ),
            (None, Some(segment)) => write!(
                f,
                "corruption in segment {segment:08} at {}: {}",
                self.offset, self.cause
            ),
            (_, None) => write!(f, "corruption after {} bytes: {}", self.offset, self.cause),
        }
    }
}

impl std::error::Error for CorruptionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corruption(segment: Option<u64>, cause: ReadError) -> WalError {
        CorruptionError {
            dir: Some(PathBuf::from("/data/wal")),
            segment,
            offset: 42,
            cause,
        }
        .into()
    }

    #[test]
    fn corruption_display_names_segment() {
        let err = corruption(Some(3), ReadError::NonZeroPadding);
        let msg = err.to_string();
        assert!(msg.contains("00000003"));
        assert!(msg.contains("at 42"));
        assert!(msg.contains("non-zero"));
    }

    #[test]
    fn corruption_without_segment_reports_total() {
        let err = corruption(None, ReadError::InvalidLength(40000));
        assert_eq!(
            err.to_string(),
            "corruption after 42 bytes: invalid record size 40000"
        );
    }

    #[test]
    fn torn_record_is_detectable() {
        assert!(corruption(Some(0), ReadError::TornRecord).is_torn_record());
        assert!(!corruption(Some(0), ReadError::UnexpectedEof).is_torn_record());
        assert!(!WalError::Closed.is_torn_record());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(corruption(Some(1), ReadError::TornRecord).exit_kind().code(), 2);
        assert_eq!(
            WalError::from(io::Error::new(io::ErrorKind::Other, "disk")).exit_kind(),
            ExitKind::Io
        );
        assert_eq!(WalError::invalid_config("bad").exit_kind().code(), 4);
        assert_eq!(WalError::Closed.exit_kind().code(), 1);

        assert_eq!(
            WalError::from(tidewal_record::CodecError::UnexpectedEof).exit_kind(),
            ExitKind::Corruption
        );
        assert_eq!(WalError::invalid_checkpoint("no segments").exit_kind(), ExitKind::Corruption);
        assert_eq!(WalError::unrepairable("no segment").exit_kind(), ExitKind::Config);
        assert_eq!(
            WalError::CheckpointGap {
                expected: 3,
                requested: 5
            }
            .exit_kind(),
            ExitKind::Config
        );
    }
}
