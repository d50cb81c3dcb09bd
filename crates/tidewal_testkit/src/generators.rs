//! Property-based test generators using proptest.
//!
//! Provides strategies for record payloads and for the series, sample and
//! tombstone values carried by typed records.

use proptest::prelude::*;
use tidewal_core::PAGE_SIZE;
use tidewal_record::{Interval, Label, RefSample, RefSeries, Tombstone};

/// Strategy for raw payloads, from empty up to three pages long.
///
/// Small payloads are weighted more heavily so batches usually share
/// pages, while large ones still exercise fragment splitting.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        1 => Just(Vec::new()),
        6 => prop::collection::vec(any::<u8>(), 1..512),
        2 => prop::collection::vec(any::<u8>(), 512..PAGE_SIZE),
        1 => prop::collection::vec(any::<u8>(), PAGE_SIZE..3 * PAGE_SIZE),
    ]
}

/// Strategy for payloads that compress well.
pub fn compressible_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    (any::<u8>(), 1..2 * PAGE_SIZE, 0usize..64).prop_map(|(fill, len, noise)| {
        let mut data = vec![fill; len];
        for (i, b) in data.iter_mut().step_by(97).take(noise).enumerate() {
            *b = b.wrapping_add(i as u8);
        }
        data
    })
}

/// Strategy for a sequence of batches passed to one `log` call each.
pub fn batches_strategy(max_batches: usize) -> impl Strategy<Value = Vec<Vec<Vec<u8>>>> {
    prop::collection::vec(prop::collection::vec(payload_strategy(), 1..4), 1..max_batches)
}

/// Strategy for non-empty payloads with no zero bytes.
///
/// A torn write of such a payload can never match its checksum by
/// accident of zero padding.
pub fn nonzero_payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(1u8..=255, 1..max_len)
}

/// Strategy for a label name.
pub fn label_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z_][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for a label set with unique names, sorted by name.
pub fn labels_strategy() -> impl Strategy<Value = Vec<Label>> {
    prop::collection::btree_map(label_name_strategy(), ".{0,24}", 0..6).prop_map(|m| {
        m.into_iter()
            .map(|(name, value)| Label::new(name, value))
            .collect()
    })
}

/// Strategy for series declarations.
pub fn series_strategy() -> impl Strategy<Value = Vec<RefSeries>> {
    prop::collection::vec(
        (any::<u64>(), labels_strategy()).prop_map(|(series_ref, labels)| RefSeries {
            series_ref,
            labels,
        }),
        0..20,
    )
}

/// Strategy for samples. Values are finite so they compare equal after
/// decoding.
pub fn samples_strategy() -> impl Strategy<Value = Vec<RefSample>> {
    prop::collection::vec(
        (any::<u64>(), any::<i64>(), -1e12f64..1e12f64)
            .prop_map(|(r, t, v)| RefSample::new(r, t, v)),
        0..50,
    )
}

/// Strategy for tombstones with one or more intervals each.
pub fn tombstones_strategy() -> impl Strategy<Value = Vec<Tombstone>> {
    prop::collection::vec(
        (
            any::<u64>(),
            prop::collection::vec(
                (any::<i64>(), any::<i64>()).prop_map(|(a, b)| Interval {
                    mint: a.min(b),
                    maxt: a.max(b),
                }),
                1..4,
            ),
        )
            .prop_map(|(series_ref, intervals)| Tombstone {
                series_ref,
                intervals,
            }),
        0..20,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewal_record::{RecordDecoder, RecordEncoder};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn payloads_stay_within_bounds(data in payload_strategy()) {
            prop_assert!(data.len() < 3 * PAGE_SIZE);
        }

        #[test]
        fn nonzero_payloads_have_no_zero_bytes(data in nonzero_payload_strategy(100)) {
            prop_assert!(!data.is_empty());
            prop_assert!(data.iter().all(|&b| b != 0));
        }

        #[test]
        fn labels_are_sorted_and_unique(labels in labels_strategy()) {
            prop_assert!(labels.windows(2).all(|w| w[0].name < w[1].name));
        }

        #[test]
        fn generated_series_survive_encoding(series in series_strategy()) {
            let mut buf = Vec::new();
            RecordEncoder::new().series(&series, &mut buf);
            let mut out = Vec::new();
            RecordDecoder::new().series(&buf, &mut out).unwrap();
            prop_assert_eq!(out, series);
        }

        #[test]
        fn tombstone_intervals_are_ordered(tombstones in tombstones_strategy()) {
            for t in &tombstones {
                prop_assert!(t.intervals.iter().all(|iv| iv.mint <= iv.maxt));
            }
        }
    }
}
