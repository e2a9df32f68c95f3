use crate::constant::{CapabilityFlags, StatusFlags, MIN_PROTOCOL_VERSION, PACKET_EOF};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Server greeting (Protocol::HandshakeV10).
#[derive(Debug, Clone)]
pub struct Greeting {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Concatenated scramble, truncated to 20 bytes.
    pub auth_data: Vec<u8>,
    pub capabilities: CapabilityFlags,
    pub collation: u8,
    pub status: StatusFlags,
    pub auth_plugin: String,
}

/// Parse the server greeting.
///
/// The advertised auth-plugin-data length is advisory only; the scramble's
/// second half is read as a fixed 12 bytes plus the terminating NUL, which
/// matches what servers actually send.
pub fn parse_greeting(payload: &[u8]) -> Result<Greeting> {
    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version < MIN_PROTOCOL_VERSION {
        return Err(Error::OldProtocol);
    }

    let (server_version, data) = read_string_null(data)?;
    let server_version = String::from_utf8_lossy(server_version).into_owned();

    let (connection_id, data) = read_int_4(data)?;

    // auth-plugin-data part 1
    let (auth_part_1, data) = read_string_fix(data, 8)?;
    let (_filler, data) = read_int_1(data)?;
    let (cap_lower, data) = read_int_2(data)?;

    if data.is_empty() {
        // Pre-4.1 short greeting: 8-byte scramble, no plugin name.
        return Ok(Greeting {
            protocol_version,
            server_version,
            connection_id,
            auth_data: auth_part_1.to_vec(),
            capabilities: CapabilityFlags::new(cap_lower as u32),
            collation: 0,
            status: StatusFlags::new(0),
            auth_plugin: String::new(),
        });
    }

    let (collation, data) = read_int_1(data)?;
    let (status, data) = read_int_2(data)?;
    let (cap_upper, data) = read_int_2(data)?;
    let (_auth_data_len, data) = read_int_1(data)?;
    let (_reserved, data) = read_string_fix(data, 10)?;
    let (auth_part_2, data) = read_string_fix(data, 12)?;
    let (_nul, data) = read_int_1(data)?;

    let mut auth_data = Vec::with_capacity(20);
    auth_data.extend_from_slice(auth_part_1);
    auth_data.extend_from_slice(auth_part_2);
    auth_data.truncate(20);

    let auth_plugin = match read_string_null(data) {
        Ok((name, _)) => String::from_utf8_lossy(name).into_owned(),
        // Some server versions end the packet without the NUL.
        Err(_) => String::from_utf8_lossy(data).into_owned(),
    };

    Ok(Greeting {
        protocol_version,
        server_version,
        connection_id,
        auth_data,
        capabilities: CapabilityFlags::new(((cap_upper as u32) << 16) | (cap_lower as u32)),
        collation,
        status: StatusFlags::new(status),
        auth_plugin,
    })
}

/// Handshake response (Protocol::HandshakeResponse41), written after the
/// greeting and, with TLS, after the upgraded stream is in place.
pub struct HandshakeResponse<'a> {
    pub client_flags: u32,
    pub collation: u8,
    pub user: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin: &'a str,
}

pub fn write_handshake_response(out: &mut Vec<u8>, resp: &HandshakeResponse<'_>) {
    write_int_4(out, resp.client_flags);
    // max packet size: the server's limit governs, announce none
    write_int_4(out, 0);
    write_int_1(out, resp.collation);
    out.extend_from_slice(&[0u8; 23]);

    write_string_null(out, resp.user);
    write_bytes_lenenc(out, resp.auth_response);
    if let Some(db) = resp.database {
        write_string_null(out, db);
    }
    write_string_null(out, resp.auth_plugin);
    // empty connection-attributes block
    write_int_1(out, 0);
}

/// Auth-switch request: marker 0xFE, plugin name, fresh scramble.
pub fn parse_auth_switch(payload: &[u8]) -> Result<(String, Vec<u8>)> {
    let (marker, data) = read_int_1(payload)?;
    if marker != PACKET_EOF {
        return Err(Error::MalformedPacket);
    }
    let (plugin, data) = read_string_null(data)?;
    let mut auth_data = data.to_vec();
    if auth_data.last() == Some(&0) {
        auth_data.pop();
    }
    Ok((String::from_utf8_lossy(plugin).into_owned(), auth_data))
}
