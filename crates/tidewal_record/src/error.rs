//! Error types for the record codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The record ended in the middle of a field.
    #[error("unexpected end of record")]
    UnexpectedEof,

    /// The record does not start with the expected type byte.
    #[error("invalid record type: expected {expected}, got {actual}")]
    InvalidRecordType {
        /// The type the decoder was asked for.
        expected: u8,
        /// The type byte found in the record.
        actual: u8,
    },

    /// Bytes remained after the last complete entry.
    #[error("unexpected {count} bytes left in entry")]
    TrailingBytes {
        /// Number of leftover bytes.
        count: usize,
    },

    /// A varint was longer than ten bytes.
    #[error("varint overflows a 64-bit integer")]
    VarintOverflow,

    /// A label name or value was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Decoding failed after some entries were read.
    #[error("decode error after {decoded} samples: {source}")]
    Partial {
        /// Number of entries decoded before the failure.
        decoded: usize,
        /// The underlying failure.
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Wraps an error with the number of entries already decoded.
    pub fn after(decoded: usize, source: CodecError) -> Self {
        Self::Partial {
            decoded,
            source: Box::new(source),
        }
    }
}
