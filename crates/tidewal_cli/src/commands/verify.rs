//! Verify command implementation.

use super::replay_ranges;
use crate::error::CliError;
use std::path::Path;
use tidewal_core::{Reader, WalError};
use tidewal_record::{RecordDecoder, RecordType};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records read.
    pub records: usize,
    /// Bytes of record payload read.
    pub bytes: u64,
    /// Series records.
    pub series: usize,
    /// Sample records.
    pub samples: usize,
    /// Tombstone records.
    pub tombstones: usize,
    /// Records of unknown type.
    pub unknown: usize,
    /// First error found, if any.
    pub error: Option<WalError>,
}

impl VerifyResult {
    fn count(&mut self, rec: &[u8]) {
        self.records += 1;
        self.bytes += rec.len() as u64;
        match RecordDecoder::new().record_type(rec) {
            RecordType::Series => self.series += 1,
            RecordType::Samples => self.samples += 1,
            RecordType::Tombstones => self.tombstones += 1,
            RecordType::Invalid => self.unknown += 1,
        }
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), CliError> {
    println!("Verifying WAL at {}", path.display());
    println!();

    let result = verify(path)?;
    print_result(&result);

    println!();
    match result.error {
        None => {
            println!("✓ WAL verification passed");
            Ok(())
        }
        Some(e) => {
            println!("✗ WAL verification failed");
            Err(e.into())
        }
    }
}

/// Reads the last checkpoint and every later segment.
///
/// Read errors end the scan and are reported in the result.
pub(crate) fn verify(path: &Path) -> Result<VerifyResult, WalError> {
    let mut result = VerifyResult::default();
    let mut reader = Reader::open(&replay_ranges(path)?)?;
    loop {
        match reader.next() {
            Ok(true) => result.count(reader.record()),
            Ok(false) => break,
            Err(e) => {
                result.error = Some(e);
                break;
            }
        }
    }
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("Records:      {}", result.records);
    println!("  series:     {}", result.series);
    println!("  samples:    {}", result.samples);
    println!("  tombstones: {}", result.tombstones);
    if result.unknown > 0 {
        println!("  unknown:    {}", result.unknown);
    }
    println!("Payload:      {} bytes", result.bytes);
    if let Some(e) = &result.error {
        println!("Error:        {e}");
    }
}
