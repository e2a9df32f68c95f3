use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// The byte stream under one connection: plain TCP, or TCP wrapped in TLS
/// after the SSL-request packet. `Detached` replaces the transport once the
/// connection has been torn down.
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
    Detached,
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }

    /// The raw socket, kept reachable through the TLS wrapper for deadline
    /// control and shutdown.
    fn raw(&self) -> Option<&TcpStream> {
        match self {
            Self::Tcp(s) => Some(s),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Some(s.get_ref()),
            Self::Detached => None,
        }
    }

    pub fn shutdown(&self) {
        if let Some(s) = self.raw() {
            let _ = s.shutdown(Shutdown::Both);
        }
    }

    pub fn is_tls(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            matches!(self, Self::Tls(_))
        }
        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    /// Perform the client side of a TLS handshake over the TCP transport.
    /// The caller has already sent the SSL-request packet.
    #[cfg(feature = "tls")]
    pub fn upgrade_to_tls(self, host: &str) -> io::Result<Self> {
        let tcp = match self {
            Self::Tcp(s) => s,
            Self::Tls(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "already using TLS",
                ));
            }
            Self::Detached => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "connection is closed",
                ));
            }
        };

        let connector = native_tls::TlsConnector::new().map_err(io::Error::other)?;
        let tls = connector.connect(host, tcp).map_err(io::Error::other)?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => s.read(buf),
            Self::Detached => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => s.write(buf),
            Self::Detached => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(feature = "tls")]
            Self::Tls(s) => s.flush(),
            Self::Detached => Ok(()),
        }
    }
}
