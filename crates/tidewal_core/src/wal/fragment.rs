//! Fragment header encoding.

use super::RECORD_HEADER_SIZE;

/// Flag bit set on fragments holding snappy-compressed data.
pub(crate) const SNAPPY_MASK: u8 = 1 << 3;

const TYPE_MASK: u8 = 0b111;

/// Kind of a fragment, stored in the low three bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FragmentType {
    /// Rest of the page is zero padding.
    PageTerm = 0,
    /// A whole record.
    Full = 1,
    /// First fragment of a record.
    First = 2,
    /// Neither first nor last fragment of a record.
    Middle = 3,
    /// Final fragment of a record.
    Last = 4,
}

impl FragmentType {
    /// Decodes the kind from a header byte. Unknown kinds yield the raw bits.
    pub fn from_header(b: u8) -> Result<Self, u8> {
        match b & TYPE_MASK {
            0 => Ok(Self::PageTerm),
            1 => Ok(Self::Full),
            2 => Ok(Self::First),
            3 => Ok(Self::Middle),
            4 => Ok(Self::Last),
            other => Err(other),
        }
    }

    /// Returns the type byte without flags.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// True for fragments that end a record.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Full | Self::Last)
    }

    /// True for fragments after which more of the record must follow.
    #[must_use]
    pub const fn is_partial(self) -> bool {
        matches!(self, Self::First | Self::Middle)
    }
}

/// CRC-32C (Castagnoli) of a fragment.
#[inline]
pub(crate) fn checksum(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Builds the header for a fragment.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_header(
    typ: FragmentType,
    compressed: bool,
    data: &[u8],
) -> [u8; RECORD_HEADER_SIZE] {
    let mut hdr = [0u8; RECORD_HEADER_SIZE];
    hdr[0] = typ.as_byte() | if compressed { SNAPPY_MASK } else { 0 };
    hdr[1..3].copy_from_slice(&(data.len() as u16).to_be_bytes());
    hdr[3..7].copy_from_slice(&checksum(data).to_be_bytes());
    hdr
}

/// Splits the length and checksum out of the last six header bytes.
pub(crate) fn decode_header_tail(tail: &[u8]) -> (usize, u32) {
    let len = u16::from_be_bytes([tail[0], tail[1]]);
    let crc = u32::from_be_bytes([tail[2], tail[3], tail[4], tail[5]]);
    (usize::from(len), crc)
}

/// Checks that a fragment kind may appear at `position` within a record.
pub(crate) fn validate_sequence(typ: FragmentType, position: usize) -> bool {
    match typ {
        FragmentType::Full | FragmentType::First => position == 0,
        FragmentType::Middle | FragmentType::Last => position > 0,
        FragmentType::PageTerm => false,
    }
}
