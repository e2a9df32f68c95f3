//! In-process mock MySQL server: a listener thread that plays a scripted
//! packet dialogue against the real client.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use mysql_wire::constant::CapabilityFlags;
use mysql_wire::Opts;

pub const SCRAMBLE: [u8; 20] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20,
];

/// Capabilities a stock plaintext server advertises in these tests.
pub fn server_caps() -> u32 {
    CapabilityFlags::CLIENT_PROTOCOL_41
        | CapabilityFlags::CLIENT_SECURE_CONNECTION
        | CapabilityFlags::CLIENT_PLUGIN_AUTH
        | CapabilityFlags::CLIENT_MULTI_RESULTS
        | CapabilityFlags::CLIENT_MULTI_STATEMENTS
        | CapabilityFlags::CLIENT_TRANSACTIONS
        | CapabilityFlags::CLIENT_LONG_PASSWORD
        | CapabilityFlags::CLIENT_LONG_FLAG
        | CapabilityFlags::CLIENT_LOCAL_FILES
        | CapabilityFlags::CLIENT_CONNECT_ATTRS
        | CapabilityFlags::CLIENT_CONNECT_WITH_DB
}

/// Bind an ephemeral port and run `script` against the first accepted
/// connection. Panics inside the thread fail the test via `join`.
pub fn spawn_server<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(&mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("local addr").port();
    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept");
        socket.set_nodelay(true).ok();
        script(&mut socket);
    });
    (port, handle)
}

pub fn opts(port: u16) -> Opts {
    let mut opts = Opts::default();
    opts.host = "127.0.0.1".to_string();
    opts.port = port;
    opts.user = "root".to_string();
    opts.password = Some("secret".to_string());
    opts.read_timeout = Some(Duration::from_secs(5));
    opts.write_timeout = Some(Duration::from_secs(5));
    opts
}

/// Write one physical packet.
pub fn write_packet(socket: &mut TcpStream, seq: u8, payload: &[u8]) {
    let len = (payload.len() as u32).to_le_bytes();
    socket.write_all(&[len[0], len[1], len[2], seq]).expect("write header");
    socket.write_all(payload).expect("write payload");
}

/// Read one physical packet, returning (sequence, payload).
pub fn read_packet(socket: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).expect("read header");
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    socket.read_exact(&mut payload).expect("read payload");
    (header[3], payload)
}

/// Read one physical packet header only; the caller consumes the payload.
pub fn read_header(socket: &mut TcpStream) -> (u8, usize) {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).expect("read header");
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    (header[3], len)
}

pub fn discard(socket: &mut TcpStream, mut n: usize) {
    let mut buf = [0u8; 64 * 1024];
    while n > 0 {
        let take = n.min(buf.len());
        socket.read_exact(&mut buf[..take]).expect("discard payload");
        n -= take;
    }
}

/// HandshakeV10 greeting payload.
pub fn greeting_payload(caps: u32, auth_plugin: &str) -> Vec<u8> {
    let mut p = vec![0x0A];
    p.extend_from_slice(b"8.0.99-mock\0");
    p.extend_from_slice(&99u32.to_le_bytes()); // connection id
    p.extend_from_slice(&SCRAMBLE[..8]);
    p.push(0x00); // filler
    p.extend_from_slice(&(caps as u16).to_le_bytes());
    p.push(45); // collation
    p.extend_from_slice(&2u16.to_le_bytes()); // status: autocommit
    p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    p.push(21); // auth data length
    p.extend_from_slice(&[0u8; 10]);
    p.extend_from_slice(&SCRAMBLE[8..20]);
    p.push(0x00);
    p.extend_from_slice(auth_plugin.as_bytes());
    p.push(0x00);
    p
}

pub fn ok_payload(affected: u64, last_insert_id: u64, status: u16) -> Vec<u8> {
    let mut p = vec![0x00];
    lenenc(&mut p, affected);
    lenenc(&mut p, last_insert_id);
    p.extend_from_slice(&status.to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes()); // warnings
    p
}

pub fn eof_payload(status: u16) -> Vec<u8> {
    let mut p = vec![0xFE, 0x00, 0x00];
    p.extend_from_slice(&status.to_le_bytes());
    p
}

pub fn err_payload(number: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xFF];
    p.extend_from_slice(&number.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(sql_state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

/// ColumnDefinition41 payload.
pub fn column_payload(table: &str, name: &str, column_type: u8, flags: u16) -> Vec<u8> {
    let mut p = Vec::new();
    lenenc_str(&mut p, b"def");
    lenenc_str(&mut p, b"testdb");
    lenenc_str(&mut p, table.as_bytes());
    lenenc_str(&mut p, table.as_bytes());
    lenenc_str(&mut p, name.as_bytes());
    lenenc_str(&mut p, name.as_bytes());
    p.push(0x0C);
    p.extend_from_slice(&45u16.to_le_bytes()); // charset
    p.extend_from_slice(&255u32.to_le_bytes()); // length
    p.push(column_type);
    p.extend_from_slice(&flags.to_le_bytes());
    p.push(0); // decimals
    p.extend_from_slice(&[0, 0]);
    p
}

/// Text-protocol row from already-encoded fields (None = NULL).
pub fn text_row_payload(fields: &[Option<&[u8]>]) -> Vec<u8> {
    let mut p = Vec::new();
    for field in fields {
        match field {
            None => p.push(0xFB),
            Some(bytes) => lenenc_str(&mut p, bytes),
        }
    }
    p
}

pub fn lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xFC);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value < (1 << 24) {
        out.push(0xFD);
        out.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        out.push(0xFE);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn lenenc_str(out: &mut Vec<u8>, bytes: &[u8]) {
    lenenc(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Serve the standard greeting + OK handshake with mysql_native_password.
/// Returns the client's handshake-response payload.
pub fn serve_handshake(socket: &mut TcpStream) -> Vec<u8> {
    write_packet(socket, 0, &greeting_payload(server_caps(), "mysql_native_password"));
    let (seq, response) = read_packet(socket);
    assert_eq!(seq, 1, "handshake response sequence");
    write_packet(socket, 2, &ok_payload(0, 0, 2));
    response
}
