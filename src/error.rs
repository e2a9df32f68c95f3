use thiserror::Error;

use crate::cancel::CancelCause;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The connection is broken and must be discarded by the caller's pool.
    /// Any I/O failure, framing desync or malformed packet collapses to this
    /// after the connection has been closed.
    #[error("invalid connection")]
    InvalidConn,
    #[error("malformed packet")]
    MalformedPacket,
    #[error("commands out of sync. You can't run this command now")]
    PktSync,
    #[error("commands out of sync. Did you run multiple statements at once?")]
    PktSyncMul,
    #[error("packet for query is too large. Try adjusting the 'max_allowed_packet' variable on the server")]
    PktTooLarge,
    #[error("busy buffer")]
    BusyBuffer,
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("column count mismatch: announced {expected}, parsed {parsed} definitions")]
    ColumnCountMismatch { expected: usize, parsed: usize },
    #[error("TLS requested but server does not support TLS")]
    NoTls,
    #[error("MySQL server does not support required protocol 41+")]
    OldProtocol,
    #[error("this authentication plugin is not supported: {0}")]
    UnsupportedAuthPlugin(String),
    #[error("LOCAL INFILE requests are not handled by the connection core")]
    LocalInfile,
    #[error("operation {0}")]
    Canceled(CancelCause),
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("bad usage: {0}")]
    BadUsage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A server-reported error packet: number, 5-byte SQL state, message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Error {number} ({sql_state}): {message}")]
pub struct ServerError {
    pub number: u16,
    pub sql_state: String,
    pub message: String,
}

impl Error {
    /// Whether the error left the connection unusable.
    ///
    /// Server-reported errors, oversized payloads, busy-buffer contract
    /// violations and per-row conversion failures leave the connection
    /// usable; everything else broke it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Server(_)
                | Error::PktTooLarge
                | Error::BusyBuffer
                | Error::Conversion(_)
                | Error::BadUsage(_)
        )
    }
}
