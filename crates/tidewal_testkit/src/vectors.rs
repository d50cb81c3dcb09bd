//! Byte-exact framing vectors.
//!
//! These vectors pin the on-disk layout so that logs stay readable by
//! other implementations of the same format.

use serde::{Deserialize, Serialize};

/// Bytes expected at an offset of the first segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedBytes {
    /// Offset in the segment file.
    pub offset: u64,
    /// Expected bytes (hex-encoded).
    pub hex: String,
}

/// Records to log in one batch and the bytes they must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Records (hex-encoded).
    pub records_hex: Vec<String>,
    /// Expected segment contents.
    pub expected: Vec<ExpectedBytes>,
}

fn expect(offset: u64, hex: &str) -> ExpectedBytes {
    ExpectedBytes {
        offset,
        hex: hex.into(),
    }
}

/// Framing vectors for uncompressed records.
pub fn framing_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector {
            id: "three_small_records".into(),
            description: "Records a, bb, ccc share the first page".into(),
            records_hex: vec!["61".into(), "6262".into(), "636363".into()],
            expected: vec![expect(
                0,
                "010001c1d0433061\
                 010002d64581af6262\
                 0100036a86f5cd636363",
            )],
        },
        FrameVector {
            id: "empty_record".into(),
            description: "An empty record is a bare header with a zero checksum".into(),
            records_hex: vec![String::new()],
            expected: vec![expect(0, "01000000000000")],
        },
        FrameVector {
            id: "record_then_empty".into(),
            description: "An empty record directly follows a non-empty one".into(),
            records_hex: vec!["0168656c6c6f".into(), String::new()],
            expected: vec![expect(0, "0100066719daea0168656c6c6f01000000000000")],
        },
        FrameVector {
            id: "page_sized_record".into(),
            description: "A record one page long is split into first and last fragments"
                .into(),
            records_hex: vec!["ab".repeat(32768)],
            expected: vec![
                expect(0, "027ff927712f00abab"),
                expect(32768, "0400070fbdef12ababababababab00"),
            ],
        },
    ]
}

/// Decodes a hex string.
pub fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}

/// Encodes bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::segment_path;
    use crate::fixtures::{read_records, TempWal};
    use std::fs;
    use tidewal_core::PAGE_SIZE;

    #[test]
    fn test_hex_roundtrip() {
        assert_eq!(hex_decode("00ff10"), vec![0x00, 0xff, 0x10]);
        assert_eq!(hex_encode(&[0xab, 0x01]), "ab01");
    }

    #[test]
    fn test_framing_vectors() {
        for vector in framing_vectors() {
            let records: Vec<Vec<u8>> = vector.records_hex.iter().map(|h| hex_decode(h)).collect();

            let mut wal = TempWal::with_pages(4);
            wal.log(&records).unwrap();
            wal.close();

            let bytes = fs::read(segment_path(wal.path(), 0)).unwrap();
            assert_eq!(bytes.len() % PAGE_SIZE, 0, "{}: not page aligned", vector.id);

            for exp in &vector.expected {
                let want = hex_decode(&exp.hex);
                let start = exp.offset as usize;
                assert_eq!(
                    hex_encode(&bytes[start..start + want.len()]),
                    exp.hex,
                    "{}: mismatch at offset {}",
                    vector.id,
                    exp.offset
                );
            }
            assert_eq!(read_records(wal.path()), records, "{}", vector.id);
        }
    }

    #[test]
    fn test_vectors_serialize() {
        let json = serde_json::to_string(&framing_vectors()[0]).unwrap();
        let back: FrameVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, framing_vectors()[0]);
    }
}
