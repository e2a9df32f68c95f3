use crate::constant::Command;
use crate::protocol::primitive::*;

/// Write COM_QUIT (no reply; the socket is closed afterwards)
pub fn write_quit(out: &mut Vec<u8>) {
    write_int_1(out, Command::Quit as u8);
}

/// Write COM_PING
pub fn write_ping(out: &mut Vec<u8>) {
    write_int_1(out, Command::Ping as u8);
}

/// Write COM_INIT_DB
pub fn write_init_db(out: &mut Vec<u8>, database: &str) {
    write_int_1(out, Command::InitDb as u8);
    out.extend_from_slice(database.as_bytes());
}
