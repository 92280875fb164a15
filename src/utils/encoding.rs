use std::io::{self, Read, Write};

/// Encode a u64 as a variable-length integer
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return None; // Overflow
        }

        let bits = (byte & 0x7F) as u64;
        if shift == 63 && bits > 1 {
            return None;
        }
        result |= bits << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for value in [0, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            assert_eq!(decode_varint(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(decode_varint(&[0x80, 0x80]), None);
        assert_eq!(decode_varint(&[]), None);
    }

    #[test]
    fn test_decode_overflow() {
        let buf = [0xFF; 11];
        assert_eq!(decode_varint(&buf), None);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        // Trailing bytes after the terminator are left alone
        assert_eq!(decode_varint(&[0x05, 0xAA, 0xBB]), Some((5, 1)));
    }

    #[test]
    fn test_le_helpers() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 0xDEADBEEF).unwrap();
        write_u64_le(&mut buf, 42).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0xDEADBEEF);
        assert_eq!(read_u64_le(&mut cursor).unwrap(), 42);
    }
}
