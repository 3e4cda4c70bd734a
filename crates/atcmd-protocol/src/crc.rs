//! CCITT-16 line checksums.
//!
//! Lines protected by a checksum carry a suffix of the separator character
//! followed by four uppercase hex digits, e.g. `AT*3983`. The algorithm is
//! CRC-16/CCITT-FALSE: polynomial `0x1021`, initial value `0xFFFF`, no
//! reflection, no final XOR.

use crc::{Crc, CRC_16_IBM_3740};

const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Number of hex digits in a checksum suffix.
pub const CHECKSUM_DIGITS: usize = 4;

/// Compute the CCITT-16 checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}

/// Parse the four uppercase hex digits of a checksum suffix.
pub fn parse_checksum(digits: &[u8]) -> Option<u16> {
    let upper_hex = |b: &u8| b.is_ascii_digit() || (b'A'..=b'F').contains(b);
    if digits.len() != CHECKSUM_DIGITS || !digits.iter().all(upper_hex) {
        return None;
    }
    let s = std::str::from_utf8(digits).ok()?;
    u16::from_str_radix(s, 16).ok()
}

/// Appends and validates checksum suffixes using a fixed separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16Codec {
    separator: u8,
}

impl Crc16Codec {
    pub fn new(separator: u8) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// Checksum of `data`; identical to [`crc16`].
    pub fn compute(&self, data: &[u8]) -> u16 {
        crc16(data)
    }

    /// Render the suffix for `data` (separator plus four hex digits).
    pub fn suffix(&self, data: &[u8]) -> Vec<u8> {
        let mut out = vec![self.separator];
        out.extend_from_slice(format!("{:04X}", crc16(data)).as_bytes());
        out
    }

    /// Return `line` with its checksum suffix appended.
    pub fn append(&self, line: &[u8]) -> Vec<u8> {
        let mut out = line.to_vec();
        out.extend_from_slice(&self.suffix(line));
        out
    }

    /// Split off and verify the checksum suffix.
    ///
    /// Returns the payload before the separator and whether the checksum
    /// matched. A line without a well-formed suffix is returned whole with
    /// `false`.
    pub fn validate<'a>(&self, line: &'a [u8]) -> (&'a [u8], bool) {
        let Some(pos) = line.iter().rposition(|&b| b == self.separator) else {
            return (line, false);
        };
        let (payload, suffix) = line.split_at(pos);
        match parse_checksum(&suffix[1..]) {
            Some(expected) => (payload, crc16(payload) == expected),
            None => (line, false),
        }
    }
}

impl Default for Crc16Codec {
    fn default() -> Self {
        Self::new(b'*')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTORS: &[(&[u8], &[u8])] = &[
        (b"AT", b"AT*3983"),
        (b"at", b"at*1B07"),
        (b"AT%CRC=0", b"AT%CRC=0*BBEB"),
        (b"at%crc=0", b"at%crc=0*1749"),
        (b"\r\nOK\r\n", b"\r\nOK\r\n*86C5"),
        (b"\r\nERROR\r\n", b"\r\nERROR\r\n*84D9"),
        (b"0\r", b"0\r*C937"),
        (b"4\r", b"4\r*05F3"),
    ];

    #[test]
    fn standard_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn append_matches_known_lines() {
        let codec = Crc16Codec::default();
        for (line, expected) in VECTORS {
            assert_eq!(codec.append(line), expected.to_vec());
        }
    }

    #[test]
    fn validate_known_lines() {
        let codec = Crc16Codec::default();
        for (line, protected) in VECTORS {
            assert_eq!(codec.validate(protected), (*line, true));
        }
    }

    #[test]
    fn any_flipped_bit_in_suffix_fails() {
        let codec = Crc16Codec::default();
        let protected = codec.append(b"AT+CSQ");
        let suffix_start = protected.len() - CHECKSUM_DIGITS;
        for idx in suffix_start..protected.len() {
            for bit in 0..8 {
                let mut corrupted = protected.clone();
                corrupted[idx] ^= 1 << bit;
                let (payload, ok) = codec.validate(&corrupted);
                assert!(!ok, "flip of bit {bit} at {idx} went undetected");
                assert!(payload.starts_with(b"AT+CSQ"));
            }
        }
    }

    #[test]
    fn validate_without_suffix() {
        let codec = Crc16Codec::default();
        assert_eq!(codec.validate(b"AT"), (&b"AT"[..], false));
        assert_eq!(codec.validate(b"AT*39"), (&b"AT*39"[..], false));
        assert_eq!(codec.validate(b"AT*39G3"), (&b"AT*39G3"[..], false));
    }

    #[test]
    fn lowercase_digits_rejected() {
        // Case folding would let a flipped bit 5 pass unnoticed.
        let codec = Crc16Codec::default();
        assert_eq!(codec.validate(b"at*1b07"), (&b"at*1b07"[..], false));
    }

    #[test]
    fn custom_separator() {
        let codec = Crc16Codec::new(b'#');
        assert_eq!(codec.append(b"AT"), b"AT#3983".to_vec());
        assert_eq!(codec.validate(b"AT#3983"), (&b"AT"[..], true));
    }
}
