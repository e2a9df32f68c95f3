use std::time::Duration;

use crate::constant::{DEFAULT_COLLATION_ID, DEFAULT_MAX_ALLOWED_PACKET};

/// Connection configuration.
///
/// DSN/URL parsing is the caller's business; this is the already-resolved
/// form the connection consumes.
///
/// ```rust
/// use mysql_wire::Opts;
///
/// let mut opts = Opts::default();
/// opts.host = "db.internal".to_string();
/// opts.user = "app".to_string();
/// opts.password = Some("secret".to_string());
/// opts.db = Some("inventory".to_string());
/// ```
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address
    pub host: String,

    /// Port number for the MySQL server
    pub port: u16,

    /// Username for authentication (can be empty for anonymous connections)
    pub user: String,

    pub password: Option<String>,

    /// Database name selected during the handshake
    pub db: Option<String>,

    /// Enable TCP_NODELAY to disable Nagle's algorithm
    pub tcp_nodelay: bool,

    pub connect_timeout: Option<Duration>,

    /// Read deadline applied to the socket for every packet read
    pub read_timeout: Option<Duration>,

    /// Write deadline applied to the socket for every packet write
    pub write_timeout: Option<Duration>,

    /// Request a TLS upgrade after the server greeting
    pub tls: bool,

    /// When TLS is requested but the server does not offer it, continue in
    /// plaintext instead of failing
    pub allow_fallback_to_plaintext: bool,

    /// Decode DATE/DATETIME/TIMESTAMP columns into [`DateTime`](crate::DateTime)
    /// values instead of returning the raw bytes
    pub parse_time: bool,

    /// Report column names as `table.column` using the table alias
    pub columns_with_alias: bool,

    /// Treat server errors 1290/1792 (read-only server) as a broken
    /// connection so a pool replaces it
    pub reject_read_only: bool,

    /// Negotiate CLIENT_FOUND_ROWS: affected-row counts include matched
    /// but unchanged rows
    pub found_rows: bool,

    /// Negotiate CLIENT_MULTI_STATEMENTS
    pub multi_statements: bool,

    /// Largest payload the client will send in one command
    pub max_allowed_packet: usize,

    /// Collation id sent in the handshake response
    pub collation: u8,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: None,
            db: None,
            tcp_nodelay: true,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            tls: false,
            allow_fallback_to_plaintext: false,
            parse_time: false,
            columns_with_alias: false,
            reject_read_only: false,
            found_rows: false,
            multi_statements: false,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            collation: DEFAULT_COLLATION_ID,
        }
    }
}
