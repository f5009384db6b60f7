// Variable-length integers
//
// Two encodings live here:
// - container varints `[no_bytes][big-endian bytes]`, used for part metadata and the footer
// - prefix varints (leading one-bits give the width), used for the collection metadata

use crate::error::{AgcError, Result};
use std::io::{self, Read, Write};

/// Write a container varint, returning the number of bytes written
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> io::Result<usize> {
    let no_bytes = (u64::BITS - value.leading_zeros()).div_ceil(8) as usize;

    let mut buf = [0u8; 9];
    buf[0] = no_bytes as u8;
    buf[1..=no_bytes].copy_from_slice(&value.to_be_bytes()[8 - no_bytes..]);
    writer.write_all(&buf[..=no_bytes])?;

    Ok(no_bytes + 1)
}

/// Read a container varint
pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut no_bytes = [0u8; 1];
    reader.read_exact(&mut no_bytes)?;
    let no_bytes = no_bytes[0] as usize;

    if no_bytes > 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("varint width {no_bytes} exceeds 8 bytes"),
        ));
    }

    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes[8 - no_bytes..])?;
    Ok(u64::from_be_bytes(bytes))
}

/// Append a container varint to a byte vector
pub fn encode_varint(out: &mut Vec<u8>, value: u64) {
    // Writing into a Vec cannot fail
    let _ = write_varint(out, value);
}

/// Read a container varint from the front of a slice and advance it
pub fn decode_varint(ptr: &mut &[u8]) -> Result<u64> {
    read_varint(ptr).map_err(|_| AgcError::corrupted("truncated varint"))
}

// Prefix varints: widths 1..=4 carry 7, 14, 21, 28 value bits after a
// unary prefix, each offset by the range of the shorter widths; width 5 is
// a 0xF0 marker followed by 4 raw bytes.
const PREFIX_THRESHOLDS: [u32; 4] = [
    1 << 7,
    (1 << 7) + (1 << 14),
    (1 << 7) + (1 << 14) + (1 << 21),
    (1 << 7) + (1 << 14) + (1 << 21) + (1 << 28),
];

/// Append a prefix varint
pub fn encode_prefix_u32(out: &mut Vec<u8>, num: u32) {
    let mut base = 0u32;
    for (width, &thr) in PREFIX_THRESHOLDS.iter().enumerate() {
        if num < thr {
            let rel = num - base;
            let prefix = !(0xFFu8 >> width);
            let bytes = rel.to_be_bytes();
            let first = 3 - width;
            out.push(prefix | bytes[first]);
            out.extend_from_slice(&bytes[first + 1..]);
            return;
        }
        base = thr;
    }

    out.push(0xF0);
    out.extend_from_slice(&(num - base).to_be_bytes());
}

/// Read a prefix varint from the front of a slice and advance it
pub fn decode_prefix_u32(ptr: &mut &[u8]) -> Result<u32> {
    let first = *ptr
        .first()
        .ok_or_else(|| AgcError::corrupted("unexpected end of collection data"))?;
    let width = (first.leading_ones() as usize).min(4);
    let len = width + 1;

    if ptr.len() < len {
        return Err(AgcError::corrupted(format!(
            "truncated {len}-byte collection varint"
        )));
    }

    let (value, base) = if width == 4 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&ptr[1..5]);
        (u32::from_be_bytes(bytes), PREFIX_THRESHOLDS[3])
    } else {
        let mask = 0x7Fu8 >> width;
        let mut value = (first & mask) as u32;
        for &b in &ptr[1..len] {
            value = (value << 8) | b as u32;
        }
        let base = if width == 0 {
            0
        } else {
            PREFIX_THRESHOLDS[width - 1]
        };
        (value, base)
    };

    *ptr = &ptr[len..];
    value
        .checked_add(base)
        .ok_or_else(|| AgcError::corrupted("collection varint overflow"))
}

/// Append a zero-terminated string
pub fn encode_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Read a zero-terminated string from the front of a slice and advance it
pub fn decode_string(ptr: &mut &[u8]) -> Result<String> {
    let end = ptr
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| AgcError::corrupted("string terminator not found"))?;

    let s = std::str::from_utf8(&ptr[..end])
        .map_err(|_| AgcError::corrupted("invalid UTF-8 in name"))?
        .to_string();

    *ptr = &ptr[end + 1..];
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding_lengths() {
        let len = |v| {
            let mut buf = Vec::new();
            encode_varint(&mut buf, v);
            buf.len()
        };
        assert_eq!(len(0), 1);
        assert_eq!(len(1), 2);
        assert_eq!(len(255), 2);
        assert_eq!(len(256), 3);
        assert_eq!(len(65536), 4);
        assert_eq!(len(u64::MAX), 9);
    }

    #[test]
    fn test_varint_layout_is_big_endian() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 0x0102);
        assert_eq!(buf, vec![2, 0x01, 0x02]);

        let mut ptr = &buf[..];
        assert_eq!(decode_varint(&mut ptr).unwrap(), 0x0102);
        assert!(ptr.is_empty());
    }

    #[test]
    fn test_varint_rejects_truncation() {
        let mut ptr: &[u8] = &[3, 0x01];
        assert!(decode_varint(&mut ptr).is_err());

        let mut ptr: &[u8] = &[9, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_varint(&mut ptr).is_err());
    }

    #[test]
    fn test_prefix_widths_at_thresholds() {
        let cases = [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            (16511, 2),
            (16512, 3),
            (2113663, 3),
            (2113664, 4),
            (270549119, 4),
            (270549120, 5),
            (u32::MAX, 5),
        ];

        for (num, width) in cases {
            let mut buf = Vec::new();
            encode_prefix_u32(&mut buf, num);
            assert_eq!(buf.len(), width, "width for {num}");

            let mut ptr = &buf[..];
            assert_eq!(decode_prefix_u32(&mut ptr).unwrap(), num);
            assert!(ptr.is_empty());
        }
    }

    #[test]
    fn test_prefix_sequence_and_strings() {
        let mut buf = Vec::new();
        encode_prefix_u32(&mut buf, 3);
        encode_string(&mut buf, "sampleA");
        encode_prefix_u32(&mut buf, 40000);
        encode_string(&mut buf, "");

        let mut ptr = &buf[..];
        assert_eq!(decode_prefix_u32(&mut ptr).unwrap(), 3);
        assert_eq!(decode_string(&mut ptr).unwrap(), "sampleA");
        assert_eq!(decode_prefix_u32(&mut ptr).unwrap(), 40000);
        assert_eq!(decode_string(&mut ptr).unwrap(), "");
        assert!(ptr.is_empty());
        assert!(decode_prefix_u32(&mut ptr).is_err());
    }

    #[test]
    fn test_unterminated_string() {
        let mut ptr: &[u8] = b"abc";
        assert!(decode_string(&mut ptr).is_err());
    }
}
