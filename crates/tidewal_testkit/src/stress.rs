//! Stress tests for tidewal.
//!
//! These helpers drive one WAL from several threads and check that every
//! record comes back intact.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tidewal_core::Wal;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Records written.
    pub records: usize,
    /// Payload bytes written.
    pub bytes: usize,
    /// Total duration.
    pub duration: Duration,
    /// Records per second.
    pub records_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(records: usize, bytes: usize, duration: Duration) -> Self {
        let records_per_second = if duration.as_secs_f64() > 0.0 {
            records as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            records,
            bytes,
            duration,
            records_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Records: {}", self.records);
        println!("Bytes: {}", self.bytes);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} records/sec", self.records_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Records written by each thread.
    pub records_per_thread: usize,
    /// Number of writer threads.
    pub threads: usize,
    /// Records per `log` call.
    pub batch_size: usize,
    /// Largest payload in bytes.
    pub max_record_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            records_per_thread: 2_000,
            threads: 4,
            batch_size: 8,
            max_record_size: 4096,
        }
    }
}

/// Builds a self-describing payload: thread id, sequence number and a
/// size derived from both.
pub fn stress_payload(thread: usize, seq: usize, max_size: usize) -> Vec<u8> {
    let size = 16 + (thread * 7919 + seq * 104_729) % max_size.max(1);
    let mut data = Vec::with_capacity(size);
    data.extend_from_slice(&(thread as u64).to_be_bytes());
    data.extend_from_slice(&(seq as u64).to_be_bytes());
    data.resize(size, (seq % 251) as u8);
    data
}

/// Decodes the thread id and sequence number of a stress payload.
pub fn parse_stress_payload(data: &[u8]) -> Option<(usize, usize)> {
    let thread = u64::from_be_bytes(data.get(..8)?.try_into().ok()?);
    let seq = u64::from_be_bytes(data.get(8..16)?.try_into().ok()?);
    Some((thread as usize, seq as usize))
}

/// Logs from `config.threads` threads concurrently.
pub fn run_concurrent_writers(wal: Arc<Wal>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let wal = Arc::clone(&wal);
            let config = config.clone();
            thread::spawn(move || {
                let mut bytes = 0;
                let mut seq = 0;
                while seq < config.records_per_thread {
                    let end = (seq + config.batch_size).min(config.records_per_thread);
                    let batch: Vec<Vec<u8>> = (seq..end)
                        .map(|s| stress_payload(t, s, config.max_record_size))
                        .collect();
                    bytes += batch.iter().map(Vec::len).sum::<usize>();
                    wal.log(&batch).expect("Failed to log batch");
                    seq = end;
                }
                bytes
            })
        })
        .collect();

    let bytes = handles
        .into_iter()
        .map(|h| h.join().expect("Writer thread panicked"))
        .sum();
    StressTestResult::new(
        config.threads * config.records_per_thread,
        bytes,
        start.elapsed(),
    )
}

/// Checks that `records` holds every stress payload exactly once, in
/// per-thread order, and returns an error message otherwise.
pub fn verify_stress_records(records: &[Vec<u8>], config: &StressConfig) -> Result<(), String> {
    let mut next: HashMap<usize, usize> = HashMap::new();
    for rec in records {
        let (thread, seq) =
            parse_stress_payload(rec).ok_or_else(|| format!("short record: {} bytes", rec.len()))?;
        let expected = next.entry(thread).or_insert(0);
        if seq != *expected {
            return Err(format!("thread {thread}: expected seq {expected}, got {seq}"));
        }
        if *rec != stress_payload(thread, seq, config.max_record_size) {
            return Err(format!("thread {thread}: payload {seq} damaged"));
        }
        *expected += 1;
    }
    for t in 0..config.threads {
        let count = next.get(&t).copied().unwrap_or(0);
        if count != config.records_per_thread {
            return Err(format!(
                "thread {t}: {count} of {} records",
                config.records_per_thread
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::read_records;
    use tempfile::tempdir;
    use tidewal_core::WalOptions;

    #[test]
    fn test_payload_roundtrip() {
        let p = stress_payload(3, 17, 100);
        assert_eq!(parse_stress_payload(&p), Some((3, 17)));
        assert!(p.len() >= 16);
        assert_eq!(parse_stress_payload(&p[..10]), None);
    }

    #[test]
    fn test_concurrent_writers_keep_every_record() {
        let config = StressConfig {
            records_per_thread: 300,
            threads: 4,
            batch_size: 5,
            max_record_size: 20_000,
        };
        let dir = tempdir().unwrap();
        let wal = Arc::new(
            Wal::open(dir.path(), WalOptions::new().segment_pages(16)).unwrap(),
        );

        let result = run_concurrent_writers(Arc::clone(&wal), &config);
        assert_eq!(result.records, 1200);
        assert!(wal.segments().unwrap().is_some_and(|(_, last)| last > 0));
        wal.close().unwrap();

        let records = read_records(dir.path());
        assert_eq!(records.len(), 1200);
        verify_stress_records(&records, &config).unwrap();
    }

    #[test]
    fn test_verify_detects_missing_records() {
        let config = StressConfig {
            records_per_thread: 2,
            threads: 1,
            batch_size: 1,
            max_record_size: 10,
        };
        let records = vec![stress_payload(0, 0, 10)];
        assert!(verify_stress_records(&records, &config).is_err());
    }
}
