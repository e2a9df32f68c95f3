use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::{StatusFlags, PACKET_EOF, PACKET_ERR, PACKET_OK};
use crate::error::{Error, Result, ServerError};
use crate::protocol::primitive::*;

/// Physical packet header: 3-byte little-endian payload length plus the
/// sequence number.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(payload_length: usize, sequence_id: u8) -> Self {
        let bytes = (payload_length as u32).to_le_bytes();
        Self {
            length: [bytes[0], bytes[1], bytes[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Parsed OK packet (marker 0x00, or 0xFE when the server deprecates EOF).
#[derive(Debug, Clone)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: StatusFlags,
    pub warnings: u16,
}

/// Parse an OK packet payload.
pub fn parse_ok_packet(payload: &[u8]) -> Result<OkPayload> {
    let (marker, data) = read_int_1(payload)?;
    if marker != PACKET_OK && marker != PACKET_EOF {
        return Err(Error::MalformedPacket);
    }
    let (affected_rows, data) = read_int_lenenc(data)?;
    let (last_insert_id, data) = read_int_lenenc(data)?;
    let (status, data) = read_int_2(data)?;
    let warnings = match read_int_2(data) {
        Ok((w, _)) => w,
        Err(_) => 0,
    };

    Ok(OkPayload {
        affected_rows,
        last_insert_id,
        status: StatusFlags::new(status),
        warnings,
    })
}

/// Parse an ERR packet payload into a typed server error. The 5-byte SQL
/// state is optional and preceded by `#` when present.
pub fn parse_err_packet(payload: &[u8]) -> Result<ServerError> {
    let (marker, data) = read_int_1(payload)?;
    if marker != PACKET_ERR {
        return Err(Error::MalformedPacket);
    }
    let (number, data) = read_int_2(data)?;

    let (sql_state, message) = if data.first() == Some(&b'#') {
        let (state, rest) = read_string_fix(&data[1..], 5)?;
        (String::from_utf8_lossy(state).into_owned(), rest)
    } else {
        (String::new(), data)
    };

    Ok(ServerError {
        number,
        sql_state,
        message: String::from_utf8_lossy(message).into_owned(),
    })
}

/// Trailer of an EOF packet: warnings then status flags.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct EofTrailer {
    warnings: zerocopy::byteorder::little_endian::U16,
    status: zerocopy::byteorder::little_endian::U16,
}

impl EofTrailer {
    pub fn warnings(&self) -> u16 {
        self.warnings.get()
    }

    pub fn status(&self) -> StatusFlags {
        StatusFlags::new(self.status.get())
    }
}

/// A protocol-41 EOF packet is marker 0xFE with exactly 4 trailing bytes.
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&PACKET_EOF) && payload.len() == 5
}

/// Parse the status flags out of an EOF packet.
pub fn parse_eof_packet(payload: &[u8]) -> Result<StatusFlags> {
    if !is_eof_packet(payload) {
        return Err(Error::MalformedPacket);
    }
    let trailer =
        EofTrailer::ref_from_bytes(&payload[1..5]).map_err(|_| Error::MalformedPacket)?;
    Ok(trailer.status())
}

/// Status flags live in the last two bytes of an EOF packet and after the
/// length-encoded counters of an OK packet.
pub fn read_status(data: &[u8]) -> StatusFlags {
    if data.len() < 2 {
        return StatusFlags::new(0);
    }
    StatusFlags::new(u16::from_le_bytes([data[0], data[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader::encode(0xFF_FFFF, 3);
        assert_eq!(header.as_bytes(), &[0xFF, 0xFF, 0xFF, 3]);
        let parsed = PacketHeader::ref_from_bytes(&[0x01, 0x00, 0x01, 7]).unwrap();
        assert_eq!(parsed.length(), 0x010001);
        assert_eq!(parsed.sequence_id, 7);
    }

    #[test]
    fn ok_packet() {
        // affected=2, insert_id=5, status=MORE_RESULTS, warnings=1
        let payload = [0x00, 0x02, 0x05, 0x08, 0x00, 0x01, 0x00];
        let ok = parse_ok_packet(&payload).unwrap();
        assert_eq!(ok.affected_rows, 2);
        assert_eq!(ok.last_insert_id, 5);
        assert!(ok.status.more_results());
        assert_eq!(ok.warnings, 1);
    }

    #[test]
    fn err_packet_with_sql_state() {
        let mut payload = vec![0xFF, 0x28, 0x04]; // 1064
        payload.push(b'#');
        payload.extend_from_slice(b"42000");
        payload.extend_from_slice(b"syntax error");
        let err = parse_err_packet(&payload).unwrap();
        assert_eq!(err.number, 1064);
        assert_eq!(err.sql_state, "42000");
        assert_eq!(err.message, "syntax error");
    }

    #[test]
    fn err_packet_without_sql_state() {
        let mut payload = vec![0xFF, 0x15, 0x04]; // 1045
        payload.extend_from_slice(b"denied");
        let err = parse_err_packet(&payload).unwrap();
        assert_eq!(err.number, 1045);
        assert_eq!(err.sql_state, "");
        assert_eq!(err.message, "denied");
    }

    #[test]
    fn eof_detection() {
        let payload = [0xFE, 0x00, 0x00, 0x08, 0x00];
        assert!(is_eof_packet(&payload));
        assert!(parse_eof_packet(&payload).unwrap().more_results());

        // Too long for an EOF packet: could be a row starting with 0xFE.
        assert!(!is_eof_packet(&[0xFE, 0, 0, 0, 0, 0, 0, 0, 1]));
        assert!(!is_eof_packet(&[0x00, 0, 0, 0, 0]));
    }
}
