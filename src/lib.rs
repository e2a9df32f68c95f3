//! Core of a MySQL/MariaDB client driver over a single connection:
//! packet framing with sequence tracking, the handshake and authentication
//! dialogue (including the mid-stream TLS upgrade), text and binary
//! commands, result-set decoding, and host-side cancellation.
//!
//! The crate deliberately stops at the single-connection boundary: DSN
//! parsing, pooling and the caller-facing database abstraction live above
//! it.
//!
//! ```no_run
//! use mysql_wire::{Conn, Opts, Param};
//!
//! # fn main() -> mysql_wire::Result<()> {
//! let mut opts = Opts::default();
//! opts.user = "app".to_string();
//! opts.password = Some("secret".to_string());
//! opts.db = Some("inventory".to_string());
//!
//! let mut conn = Conn::connect(opts)?;
//! let stmt = conn.prepare("SELECT id, name FROM users WHERE id > ?")?;
//! let mut rows = conn.query_statement(&stmt, &[Param::Int(100)])?;
//! while let Some(row) = rows.next_row()? {
//!     println!("{row:?}");
//! }
//! rows.close()?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod cancel;
mod conn;
pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
mod rows;
mod stmt;
mod stream;
pub mod value;

pub use cancel::{CancelCause, CancelToken};
pub use conn::Conn;
pub use error::{Error, Result, ServerError};
pub use opts::Opts;
pub use protocol::command::Column;
pub use rows::Rows;
pub use stmt::{ExecInfo, Statement};
pub use value::{DateTime, Param, TimeValue, Value};

#[cfg(test)]
mod buffer_test;
#[cfg(test)]
mod constant_test;
