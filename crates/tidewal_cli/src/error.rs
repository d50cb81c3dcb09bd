//! CLI error type and exit codes.

use thiserror::Error;
use tidewal_core::{ExitKind, WalError};
use tidewal_record::CodecError;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// WAL engine error.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// A record could not be decoded.
    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    /// JSON output failed.
    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad command-line usage.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Returns the process exit code.
    pub fn exit_code(&self) -> u8 {
        let kind = match self {
            Self::Wal(e) => e.exit_kind(),
            Self::Codec(_) => ExitKind::Corruption,
            Self::Usage(_) => ExitKind::Config,
            Self::Json(_) => ExitKind::Other,
        };
        u8::try_from(kind.code()).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewal_core::{CorruptionError, ReadError};

    #[test]
    fn exit_codes_follow_error_class() {
        let corruption = CliError::Wal(WalError::Corruption(CorruptionError {
            dir: None,
            segment: Some(1),
            offset: 7,
            cause: ReadError::NonZeroPadding,
        }));
        assert_eq!(corruption.exit_code(), 2);

        let io = CliError::Wal(WalError::Io(std::io::Error::other("disk")));
        assert_eq!(io.exit_code(), 3);

        assert_eq!(CliError::Usage("missing".into()).exit_code(), 4);
        assert_eq!(CliError::Wal(WalError::Closed).exit_code(), 1);

        let unrepairable = CliError::Wal(WalError::unrepairable("no segment"));
        assert_eq!(unrepairable.exit_code(), 4);
        let gap = CliError::Wal(WalError::CheckpointGap {
            expected: 2,
            requested: 4,
        });
        assert_eq!(gap.exit_code(), 4);

        let codec = CliError::Wal(WalError::Codec(CodecError::UnexpectedEof));
        assert_eq!(codec.exit_code(), 2);
        assert_eq!(CliError::Codec(CodecError::UnexpectedEof).exit_code(), 2);
        let checkpoint = CliError::Wal(WalError::invalid_checkpoint("empty"));
        assert_eq!(checkpoint.exit_code(), 2);
    }
}
