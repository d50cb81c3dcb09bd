//! Record kinds and the values they carry.

use serde::Serialize;

/// The kind of a record, stored in its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RecordType {
    /// Empty input or an unknown type byte.
    Invalid = 255,
    /// Series declarations (reference to label set).
    Series = 1,
    /// Samples for previously declared series.
    Samples = 2,
    /// Deletion intervals for series.
    Tombstones = 3,
}

impl RecordType {
    /// Converts a type byte to a record type.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::Series,
            2 => Self::Samples,
            3 => Self::Tombstones,
            _ => Self::Invalid,
        }
    }

    /// Converts the record type to its type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the lowercase name used in logs and metrics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Samples => "samples",
            Self::Tombstones => "tombstones",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single name/value pair of a series label set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

impl Label {
    /// Creates a label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A series reference together with its label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefSeries {
    /// Series reference.
    pub series_ref: u64,
    /// Labels, sorted by name once decoded.
    pub labels: Vec<Label>,
}

impl RefSeries {
    /// Creates a series from unsorted `(name, value)` pairs.
    pub fn new<N, V>(series_ref: u64, labels: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<Label> = labels
            .into_iter()
            .map(|(name, value)| Label::new(name, value))
            .collect();
        labels.sort();
        Self { series_ref, labels }
    }
}

/// A timestamped value for a series reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefSample {
    /// Series reference.
    pub series_ref: u64,
    /// Timestamp in milliseconds.
    pub t: i64,
    /// Sample value.
    pub v: f64,
}

impl RefSample {
    /// Creates a sample.
    #[must_use]
    pub const fn new(series_ref: u64, t: i64, v: f64) -> Self {
        Self { series_ref, t, v }
    }
}

/// A closed time range `[mint, maxt]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    /// Inclusive lower bound.
    pub mint: i64,
    /// Inclusive upper bound.
    pub maxt: i64,
}

/// Deleted time ranges for one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tombstone {
    /// Series reference.
    pub series_ref: u64,
    /// Deleted intervals.
    pub intervals: Vec<Interval>,
}

impl Tombstone {
    /// Creates a tombstone covering a single interval.
    #[must_use]
    pub fn new(series_ref: u64, mint: i64, maxt: i64) -> Self {
        Self {
            series_ref,
            intervals: vec![Interval { mint, maxt }],
        }
    }
}
