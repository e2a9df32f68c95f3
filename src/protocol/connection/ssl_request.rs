use zerocopy::byteorder::little_endian::U32 as U32LE;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Short SSL-request packet: the leading 32 bytes of the handshake
/// response (capabilities, max packet size, collation, filler), sent alone
/// before the TLS handshake. The sequence counter keeps running across the
/// upgrade.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SslRequest {
    client_flags: U32LE,
    max_packet_size: U32LE,
    collation: u8,
    filler: [u8; 23],
}

impl SslRequest {
    pub fn new(client_flags: u32, collation: u8) -> Self {
        Self {
            client_flags: U32LE::new(client_flags),
            max_packet_size: U32LE::new(0),
            collation,
            filler: [0; 23],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let req = SslRequest::new(0x0800, 45);
        let bytes = req.as_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..4], &[0x00, 0x08, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &[0; 4]);
        assert_eq!(bytes[8], 45);
        assert_eq!(&bytes[9..], &[0; 23]);
    }
}
