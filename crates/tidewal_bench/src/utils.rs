//! Benchmark utilities.

#![allow(dead_code)]

use rand::Rng;
use tidewal_record::{RecordEncoder, RefSample, RefSeries};

/// Generate random record data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random records.
pub fn random_records(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(size)).collect()
}

/// Generate series with a few labels each, as a scrape would produce.
pub fn generate_series(count: usize) -> Vec<RefSeries> {
    (0..count as u64)
        .map(|r| {
            RefSeries::new(
                r,
                [
                    ("__name__", "http_requests_total".to_string()),
                    ("instance", format!("10.0.{}.{}:9100", r / 256, r % 256)),
                    ("job", "node".to_string()),
                ],
            )
        })
        .collect()
}

/// Generate samples with increasing timestamps and random values.
pub fn generate_samples(count: usize, t0: i64) -> Vec<RefSample> {
    let mut rng = rand::thread_rng();
    (0..count as u64)
        .map(|r| RefSample::new(r, t0 + r as i64 * 15_000, rng.gen_range(0.0..1e6)))
        .collect()
}

/// Encode a samples record.
pub fn samples_record(count: usize, t0: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    RecordEncoder::new().samples(&generate_samples(count, t0), &mut buf);
    buf
}

/// Encode a series record.
pub fn series_record(count: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    RecordEncoder::new().series(&generate_series(count), &mut buf);
    buf
}
