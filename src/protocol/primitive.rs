use crate::error::{Error, Result};
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};
use zerocopy::FromBytes;

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    if data.is_empty() {
        return Err(Error::MalformedPacket);
    }
    Ok((data[0], &data[1..]))
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::MalformedPacket);
    }
    let value = U16LE::ref_from_bytes(&data[..2])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[2..]))
}

/// Read 3-byte little-endian integer
pub fn read_int_3(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 3 {
        return Err(Error::MalformedPacket);
    }
    let value = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    Ok((value, &data[3..]))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::MalformedPacket);
    }
    let value = U32LE::ref_from_bytes(&data[..4])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[4..]))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::MalformedPacket);
    }
    let value = U64LE::ref_from_bytes(&data[..8])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[8..]))
}

/// Read length-encoded integer.
///
/// `0xFB` (NULL in row context) and `0xFF` (reserved, error marker at the
/// packet level) are not valid here.
pub fn read_int_lenenc(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.is_empty() {
        return Err(Error::MalformedPacket);
    }

    match data[0] {
        0xFB | 0xFF => Err(Error::MalformedPacket),
        0xFC => {
            let (val, rest) = read_int_2(&data[1..])?;
            Ok((val as u64, rest))
        }
        0xFD => {
            let (val, rest) = read_int_3(&data[1..])?;
            Ok((val as u64, rest))
        }
        0xFE => {
            let (val, rest) = read_int_8(&data[1..])?;
            Ok((val, rest))
        }
        val => Ok((val as u64, &data[1..])),
    }
}

/// Read fixed-length bytes
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::MalformedPacket);
    }
    Ok((&data[..len], &data[len..]))
}

/// Read null-terminated string
pub fn read_string_null(data: &[u8]) -> Result<(&[u8], &[u8])> {
    for (i, &byte) in data.iter().enumerate() {
        if byte == 0 {
            return Ok((&data[..i], &data[i + 1..]));
        }
    }
    Err(Error::MalformedPacket)
}

/// Read length-encoded string
pub fn read_string_lenenc(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_lenenc(data)?;
    read_string_fix(rest, len as usize)
}

/// Read length-encoded string in a context where the NULL marker 0xFB is
/// legal (row fields). Returns `None` for NULL.
pub fn read_string_lenenc_nullable(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    if data.first() == Some(&0xFB) {
        return Ok((None, &data[1..]));
    }
    let (bytes, rest) = read_string_lenenc(data)?;
    Ok((Some(bytes), rest))
}

/// Skip a length-encoded string, returning the remainder.
pub fn skip_string_lenenc(data: &[u8]) -> Result<&[u8]> {
    let (_, rest) = read_string_lenenc(data)?;
    Ok(rest)
}

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian integer
pub fn write_int_3(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 4-byte little-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write length-encoded integer
pub fn write_int_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xFC);
        write_int_2(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xFD);
        write_int_3(out, value as u32);
    } else {
        out.push(0xFE);
        write_int_8(out, value);
    }
}

/// Write null-terminated string
pub fn write_string_null(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write length-encoded bytes
pub fn write_bytes_lenenc(out: &mut Vec<u8>, data: &[u8]) {
    write_int_lenenc(out, data.len() as u64);
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_lenenc_roundtrip_bands() {
        // One representative per band plus every boundary.
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (1, 1),
            (250, 1),
            (251, 3),
            (0xFFFF, 3),
            (0x1_0000, 4),
            (0xFF_FFFF, 4),
            (0x100_0000, 9),
            (u64::MAX, 9),
        ];
        for &(value, encoded_len) in cases {
            let mut out = Vec::new();
            write_int_lenenc(&mut out, value);
            assert_eq!(out.len(), encoded_len, "encoded length of {value}");
            let (decoded, rest) = read_int_lenenc(&out).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn int_lenenc_rejects_markers() {
        assert!(read_int_lenenc(&[0xFB]).is_err());
        assert!(read_int_lenenc(&[0xFF]).is_err());
    }

    #[test]
    fn string_lenenc_roundtrip() {
        let mut out = Vec::new();
        write_bytes_lenenc(&mut out, b"hello");
        let (s, rest) = read_string_lenenc(&out).unwrap();
        assert_eq!(s, b"hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn string_lenenc_nullable() {
        let (s, rest) = read_string_lenenc_nullable(&[0xFB, 0x01]).unwrap();
        assert!(s.is_none());
        assert_eq!(rest, &[0x01]);

        let (s, _) = read_string_lenenc_nullable(&[0x02, b'o', b'k']).unwrap();
        assert_eq!(s, Some(&b"ok"[..]));
    }

    #[test]
    fn string_null_stops_at_terminator() {
        let (s, rest) = read_string_null(b"abc\0def").unwrap();
        assert_eq!(s, b"abc");
        assert_eq!(rest, b"def");
        assert!(read_string_null(b"never terminated").is_err());
    }

    #[test]
    fn fixed_width_reads() {
        assert_eq!(read_int_2(&[0x34, 0x12]).unwrap().0, 0x1234);
        assert_eq!(read_int_3(&[0x56, 0x34, 0x12]).unwrap().0, 0x123456);
        assert_eq!(read_int_4(&[0x78, 0x56, 0x34, 0x12]).unwrap().0, 0x12345678);
        assert_eq!(
            read_int_8(&[1, 0, 0, 0, 0, 0, 0, 0x80]).unwrap().0,
            0x8000_0000_0000_0001
        );
    }
}
