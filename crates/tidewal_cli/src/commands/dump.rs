//! Dump command implementation.

use super::replay_ranges;
use crate::error::CliError;
use serde::Serialize;
use std::path::Path;
use tidewal_core::Reader;
use tidewal_record::{RecordDecoder, RecordType, RefSample, RefSeries, Tombstone};

/// A decoded record with its position.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Segment the record ended in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<u64>,
    /// Bytes read up to the end of the record.
    pub offset: u64,
    /// Decoded contents.
    #[serde(flatten)]
    pub payload: Payload,
}

/// Contents of a record.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    /// Series declarations.
    Series {
        /// Decoded series.
        series: Vec<RefSeries>,
    },
    /// Samples.
    Samples {
        /// Decoded samples.
        samples: Vec<RefSample>,
    },
    /// Deleted ranges.
    Tombstones {
        /// Decoded tombstones.
        tombstones: Vec<Tombstone>,
    },
    /// A record of unknown type.
    Unknown {
        /// Record size in bytes.
        size: usize,
    },
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), CliError> {
    let records = read_records(path, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(&records),
    }
    Ok(())
}

fn read_records(path: &Path, limit: Option<usize>) -> Result<Vec<DumpedRecord>, CliError> {
    let dec = RecordDecoder::new();
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    let mut reader = Reader::open(&replay_ranges(path)?)?;

    while records.len() < max_records && reader.next()? {
        let rec = reader.record();
        let payload = match dec.record_type(rec) {
            RecordType::Series => {
                let mut series = Vec::new();
                dec.series(rec, &mut series)?;
                Payload::Series { series }
            }
            RecordType::Samples => {
                let mut samples = Vec::new();
                dec.samples(rec, &mut samples)?;
                Payload::Samples { samples }
            }
            RecordType::Tombstones => {
                let mut tombstones = Vec::new();
                dec.tombstones(rec, &mut tombstones)?;
                Payload::Tombstones { tombstones }
            }
            RecordType::Invalid => Payload::Unknown { size: rec.len() },
        };
        records.push(DumpedRecord {
            segment: reader.segment(),
            offset: reader.offset(),
            payload,
        });
    }
    Ok(records)
}

fn print_text_output(records: &[DumpedRecord]) {
    for rec in records {
        let position = match rec.segment {
            Some(seg) => format!("{seg:08}@{}", rec.offset),
            None => format!("@{}", rec.offset),
        };
        match &rec.payload {
            Payload::Series { series } => {
                for s in series {
                    let labels: Vec<String> = s
                        .labels
                        .iter()
                        .map(|l| format!("{}={:?}", l.name, l.value))
                        .collect();
                    println!("{position} series ref={} {{{}}}", s.series_ref, labels.join(", "));
                }
            }
            Payload::Samples { samples } => {
                for s in samples {
                    println!("{position} sample ref={} t={} v={}", s.series_ref, s.t, s.v);
                }
            }
            Payload::Tombstones { tombstones } => {
                for t in tombstones {
                    for iv in &t.intervals {
                        println!(
                            "{position} tombstone ref={} [{}, {}]",
                            t.series_ref, iv.mint, iv.maxt
                        );
                    }
                }
            }
            Payload::Unknown { size } => println!("{position} unknown {size} bytes"),
        }
    }
    println!();
    println!("{} records", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tidewal_core::{Wal, WalOptions};
    use tidewal_record::RecordEncoder;

    #[test]
    fn decodes_each_type() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new().compress(true)).unwrap();
        let enc = RecordEncoder::new();
        let (mut series, mut samples, mut tombstones) = (Vec::new(), Vec::new(), Vec::new());
        enc.series(&[RefSeries::new(5, [("job", "db")])], &mut series);
        enc.samples(&[RefSample::new(5, 1000, 3.5)], &mut samples);
        enc.tombstones(&[Tombstone::new(5, 0, 500)], &mut tombstones);
        wal.log(&[series, samples, tombstones, vec![0x07, 1]]).unwrap();
        wal.close().unwrap();

        let records = read_records(dir.path(), None).unwrap();
        assert_eq!(records.len(), 4);
        assert!(matches!(&records[0].payload, Payload::Series { series } if series[0].series_ref == 5));
        assert!(matches!(&records[1].payload, Payload::Samples { samples } if samples[0].t == 1000));
        assert!(matches!(&records[2].payload, Payload::Tombstones { .. }));
        assert!(matches!(records[3].payload, Payload::Unknown { size: 2 }));
        assert_eq!(records[0].segment, Some(0));

        let json = serde_json::to_value(&records[1]).unwrap();
        assert_eq!(json["type"], "samples");
        assert_eq!(json["samples"][0]["v"], 3.5);
    }

    #[test]
    fn respects_limit() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalOptions::new()).unwrap();
        for _ in 0..5 {
            wal.log(&[b"\x03".as_slice()]).unwrap();
        }
        wal.close().unwrap();

        assert_eq!(read_records(dir.path(), Some(2)).unwrap().len(), 2);
    }
}
