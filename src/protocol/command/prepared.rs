use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{Command, PACKET_OK};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// COM_STMT_PREPARE OK response after the status byte.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Parse the prepare-OK payload (marker byte already known to be 0x00).
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    let (marker, data) = read_int_1(payload)?;
    if marker != PACKET_OK {
        return Err(Error::MalformedPacket);
    }
    if data.len() < 11 {
        return Err(Error::MalformedPacket);
    }
    PrepareOk::ref_from_bytes(&data[..11]).map_err(|_| Error::MalformedPacket)
}

/// Write COM_STMT_PREPARE
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, Command::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Write the COM_STMT_EXECUTE header: command, statement id, cursor flags
/// (always "no cursor"), iteration count (always 1).
pub fn write_execute_header(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, Command::StmtExecute as u8);
    write_int_4(out, statement_id);
    write_int_1(out, 0x00);
    write_int_4(out, 1);
}

/// Write the COM_STMT_SEND_LONG_DATA prefix; the chunk bytes follow.
pub fn write_long_data_header(out: &mut Vec<u8>, statement_id: u32, param_id: u16) {
    write_int_1(out, Command::StmtSendLongData as u8);
    write_int_4(out, statement_id);
    write_int_2(out, param_id);
}

/// Write COM_STMT_CLOSE (fire and forget; the server does not reply)
pub fn write_stmt_close(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, Command::StmtClose as u8);
    write_int_4(out, statement_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_ok_roundtrip() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&7u32.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes()); // columns
        payload.extend_from_slice(&3u16.to_le_bytes()); // params
        payload.push(0);
        payload.extend_from_slice(&1u16.to_le_bytes()); // warnings

        let ok = read_prepare_ok(&payload).unwrap();
        assert_eq!(ok.statement_id(), 7);
        assert_eq!(ok.num_columns(), 2);
        assert_eq!(ok.num_params(), 3);
        assert_eq!(ok.warning_count(), 1);
    }

    #[test]
    fn prepare_ok_rejects_short_payload() {
        assert!(read_prepare_ok(&[0x00, 1, 2, 3]).is_err());
        assert!(read_prepare_ok(&[0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn execute_header_layout() {
        let mut out = Vec::new();
        write_execute_header(&mut out, 0x0102_0304);
        assert_eq!(
            out,
            [0x17, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn long_data_header_layout() {
        let mut out = Vec::new();
        write_long_data_header(&mut out, 9, 2);
        assert_eq!(out, [0x18, 9, 0, 0, 0, 2, 0]);
    }

    #[test]
    fn stmt_close_layout() {
        let mut out = Vec::new();
        write_stmt_close(&mut out, 5);
        assert_eq!(out, [0x19, 5, 0, 0, 0]);
    }
}
