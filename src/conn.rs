use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use crossbeam_utils::atomic::AtomicCell;

use crate::buffer::Bufio;
use crate::cancel::{
    spawn_watcher, CancelCause, CancelToken, FinishGuard, WatchRequest,
};
use crate::constant::{
    CapabilityFlags, StatusFlags, ER_CANT_EXECUTE_IN_READ_ONLY_TRANSACTION,
    ER_OPTION_PREVENTS_STATEMENT, MAX_PACKET_SIZE, PACKET_AUTH_MORE_DATA, PACKET_EOF,
    PACKET_ERR, PACKET_LOCAL_INFILE, PACKET_OK,
};
use crate::error::{Error, Result, ServerError};
use crate::opts::Opts;
use crate::protocol::command::prepared::{
    read_prepare_ok, write_execute_header, write_long_data_header, write_prepare,
    write_stmt_close,
};
use crate::protocol::command::{parse_column, text, utility, Column};
use crate::protocol::connection::{
    auth, parse_auth_switch, parse_greeting, write_handshake_response, Greeting,
    HandshakeResponse,
};
#[cfg(feature = "tls")]
use crate::protocol::connection::SslRequest;
use crate::protocol::packet::{
    parse_err_packet, parse_ok_packet, read_status, OkPayload, PacketHeader,
};
use crate::protocol::primitive::read_int_lenenc;
use crate::rows::Rows;
use crate::stmt::{ExecInfo, Statement};
use crate::stream::Stream;
use crate::value::Param;

use zerocopy::IntoBytes;

/// One client connection to a MySQL/MariaDB server.
///
/// The connection is strictly half-duplex: at most one command and its
/// reply are in flight at any time, which the borrow on [`Rows`] enforces
/// statically. The only background actor is the cancellation watcher
/// thread, which tears the socket down when a [`CancelToken`] fires.
#[derive(Debug)]
pub struct Conn {
    stream: Stream,
    buf: Bufio,
    /// Reassembly buffer for the current logical packet.
    payload: Vec<u8>,
    pub(crate) opts: Opts,
    sequence: u8,
    server_capabilities: CapabilityFlags,
    capabilities: CapabilityFlags,
    pub(crate) status: StatusFlags,
    max_allowed_packet: usize,
    /// Per-result-set counters of the current command.
    affected_rows: Vec<u64>,
    insert_ids: Vec<u64>,
    pub(crate) broken: bool,
    closed: Arc<AtomicBool>,
    canceled: Arc<AtomicCell<Option<CancelCause>>>,
    watcher: Option<Sender<WatchRequest>>,
    /// Dropping this tells the watcher thread to exit.
    close_guard: Option<Sender<()>>,
    server_version: String,
    connection_id: u32,
}

impl Conn {
    /// Dial, greet, authenticate. The returned connection is idle and ready
    /// for commands.
    pub fn connect(opts: Opts) -> Result<Conn> {
        Self::connect_inner(None, opts)
    }

    /// Like [`connect`](Conn::connect), abandoning the dial and handshake
    /// when the token fires.
    pub fn connect_ctx(ctx: &CancelToken, opts: Opts) -> Result<Conn> {
        Self::connect_inner(Some(ctx), opts)
    }

    fn connect_inner(ctx: Option<&CancelToken>, opts: Opts) -> Result<Conn> {
        #[cfg(not(feature = "tls"))]
        if opts.tls {
            return Err(Error::BadUsage(
                "TLS requested but the tls feature is disabled".to_string(),
            ));
        }

        let socket = match opts.connect_timeout {
            Some(timeout) => {
                let addr = (opts.host.as_str(), opts.port)
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| {
                        Error::BadUsage(format!("host {:?} did not resolve", opts.host))
                    })?;
                TcpStream::connect_timeout(&addr, timeout)?
            }
            None => TcpStream::connect((opts.host.as_str(), opts.port))?,
        };
        socket.set_nodelay(opts.tcp_nodelay)?;
        socket.set_read_timeout(opts.read_timeout)?;
        socket.set_write_timeout(opts.write_timeout)?;

        let raw = socket.try_clone()?;
        let canceled = Arc::new(AtomicCell::new(None));
        let (close_tx, close_rx) = crossbeam_channel::bounded(0);
        let watcher = spawn_watcher(raw, canceled.clone(), close_rx);

        let max_allowed_packet = opts.max_allowed_packet;
        let mut conn = Conn {
            stream: Stream::tcp(socket),
            buf: Bufio::new(),
            payload: Vec::new(),
            opts,
            sequence: 0,
            server_capabilities: CapabilityFlags::default(),
            capabilities: CapabilityFlags::default(),
            status: StatusFlags::default(),
            max_allowed_packet,
            affected_rows: Vec::new(),
            insert_ids: Vec::new(),
            broken: false,
            closed: Arc::new(AtomicBool::new(false)),
            canceled,
            watcher: Some(watcher),
            close_guard: Some(close_tx),
            server_version: String::new(),
            connection_id: 0,
        };

        let guard = match ctx {
            Some(ctx) => Some(conn.watch_cancel(ctx)?),
            None => None,
        };
        let handshake = conn.handshake();
        drop(guard);
        if let Err(err) = handshake {
            conn.cleanup();
            return Err(err);
        }
        if let Some(ctx) = ctx {
            if let Some(cause) = ctx.cause() {
                conn.cleanup();
                return Err(Error::Canceled(cause));
            }
        }
        Ok(conn)
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Thread id assigned by the server.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Client capabilities sent in the handshake response.
    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    /// Status flags of the last OK/EOF packet.
    pub fn status_flags(&self) -> StatusFlags {
        self.status
    }

    /// Whether the connection must be discarded.
    pub fn is_broken(&self) -> bool {
        self.broken || self.closed.load(Ordering::SeqCst)
    }

    /// Affected-row counts of the last command, one entry per result set.
    pub fn affected_rows(&self) -> &[u64] {
        &self.affected_rows
    }

    /// Insert ids of the last command, one entry per result set.
    pub fn last_insert_ids(&self) -> &[u64] {
        &self.insert_ids
    }

    // ------------------------------------------------------------------
    // Packet codec
    // ------------------------------------------------------------------

    /// Read one logical packet: verify the sequence number of every
    /// physical fragment and reassemble 16 MiB splits, including the
    /// trailing empty packet that terminates an exact multiple.
    ///
    /// A non-split packet is served as a view straight into the framing
    /// buffer; the delayed flip keeps it intact across the next fill.
    /// Split packets are reassembled in the payload buffer.
    pub(crate) fn read_packet(&mut self) -> Result<&[u8]> {
        self.payload.clear();
        let mut split = false;
        loop {
            let (pkt_len, seq) = {
                let header = match self.buf.read_next(&mut self.stream, 4) {
                    Ok(h) => h,
                    Err(e) => return Err(self.fail_read(e)),
                };
                (
                    u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize,
                    header[3],
                )
            };

            if seq != self.sequence {
                self.cleanup();
                if seq > self.sequence {
                    return Err(Error::PktSyncMul);
                }
                return Err(Error::PktSync);
            }
            self.sequence = self.sequence.wrapping_add(1);

            // A zero-length packet terminates a split whose payload is an
            // exact multiple of the maximum packet size.
            if pkt_len == 0 {
                if !split {
                    tracing::warn!("malformed packet: empty packet with no predecessor");
                    self.cleanup();
                    return Err(Error::InvalidConn);
                }
                return Ok(&self.payload);
            }

            if let Err(e) = self.buf.ensure(&mut self.stream, pkt_len) {
                return Err(self.fail_read(e));
            }

            if !split && pkt_len < MAX_PACKET_SIZE {
                self.buf.flip();
                return Ok(self.buf.consume(pkt_len));
            }

            split = true;
            let data = self.buf.consume(pkt_len);
            self.payload.extend_from_slice(data);
            if pkt_len < MAX_PACKET_SIZE {
                return Ok(&self.payload);
            }
        }
    }

    fn fail_read(&mut self, err: io::Error) -> Error {
        if let Some(cause) = self.canceled.load() {
            self.cleanup();
            return Error::Canceled(cause);
        }
        tracing::warn!(error = %err, "closing connection after read failure");
        self.cleanup();
        Error::InvalidConn
    }

    /// Write one logical packet. `data` starts with a 4-byte header
    /// reserve; headers are stamped in place per physical fragment, and an
    /// empty trailing packet is emitted when the payload is an exact
    /// positive multiple of the maximum packet size.
    pub(crate) fn write_packet(&mut self, data: &mut [u8]) -> Result<()> {
        let mut pkt_len = data.len() - 4;
        if pkt_len > self.max_allowed_packet {
            return Err(Error::PktTooLarge);
        }

        let mut offset = 0;
        loop {
            let size = pkt_len.min(MAX_PACKET_SIZE);
            let header = PacketHeader::encode(size, self.sequence);
            data[offset..offset + 4].copy_from_slice(header.as_bytes());

            let write_result = write_all_counted(&mut self.stream, &data[offset..offset + 4 + size])
                .and_then(|()| self.stream.flush().map_err(|e| (4 + size, e)));
            match write_result {
                Ok(()) => {
                    self.sequence = self.sequence.wrapping_add(1);
                    if size != MAX_PACKET_SIZE {
                        return Ok(());
                    }
                    pkt_len -= size;
                    offset += size;
                }
                Err((written, err)) => {
                    if let Some(cause) = self.canceled.load() {
                        self.cleanup();
                        return Err(Error::Canceled(cause));
                    }
                    if written == 0 && offset == 0 {
                        // Nothing reached the wire; the command can be
                        // retried on a fresh connection.
                        self.broken = true;
                        return Err(Error::InvalidConn);
                    }
                    tracing::warn!(error = %err, "closing connection after write failure");
                    self.cleanup();
                    return Err(Error::InvalidConn);
                }
            }
        }
    }

    /// Reset the sequence counter and send a command packet assembled by
    /// `build` into the shared scratch buffer.
    fn write_command(&mut self, build: impl FnOnce(&mut Vec<u8>)) -> Result<()> {
        self.sequence = 0;
        let mut data = self.buf.take_complete_buffer()?;
        build(&mut data);
        let res = self.write_packet(&mut data);
        self.buf.store(data);
        res
    }

    /// Send a packet carrying raw auth data; the sequence keeps running
    /// through the whole auth dialogue.
    fn write_auth_packet(&mut self, auth_data: &[u8]) -> Result<()> {
        let mut data = self.buf.take_buffer(4 + auth_data.len())?;
        data[4..].copy_from_slice(auth_data);
        let res = self.write_packet(&mut data);
        self.buf.store(data);
        res
    }

    // ------------------------------------------------------------------
    // Handshake and authentication
    // ------------------------------------------------------------------

    fn handshake(&mut self) -> Result<()> {
        enum First {
            Greeting(Greeting),
            Err(ServerError),
        }
        let first = {
            let data = self.read_packet()?;
            if data.first() == Some(&PACKET_ERR) {
                First::Err(parse_err_packet(data)?)
            } else {
                First::Greeting(parse_greeting(data)?)
            }
        };
        let greeting = match first {
            First::Greeting(g) => g,
            First::Err(e) => return Err(Error::Server(e)),
        };

        self.server_capabilities = greeting.capabilities;
        self.status = greeting.status;
        self.server_version = greeting.server_version;
        self.connection_id = greeting.connection_id;

        if !greeting
            .capabilities
            .has(CapabilityFlags::CLIENT_PROTOCOL_41)
        {
            return Err(Error::OldProtocol);
        }

        let mut use_tls = self.opts.tls;
        if use_tls && !greeting.capabilities.has(CapabilityFlags::CLIENT_SSL) {
            if self.opts.allow_fallback_to_plaintext {
                use_tls = false;
            } else {
                return Err(Error::NoTls);
            }
        }

        let password = self.opts.password.clone().unwrap_or_default();
        let database = self.opts.db.clone();
        let mut plugin = if greeting.auth_plugin.is_empty() {
            auth::MYSQL_NATIVE_PASSWORD.to_string()
        } else {
            greeting.auth_plugin
        };
        let auth_resp = auth_response(&plugin, &password, &greeting.auth_data)?;

        let mut client_flags = CapabilityFlags::ALWAYS_ENABLED
            | (self.server_capabilities.0 & CapabilityFlags::CLIENT_LONG_FLAG);
        if self.opts.found_rows {
            client_flags |= CapabilityFlags::CLIENT_FOUND_ROWS;
        }
        if self.opts.multi_statements {
            client_flags |= CapabilityFlags::CLIENT_MULTI_STATEMENTS;
        }
        if use_tls {
            client_flags |= CapabilityFlags::CLIENT_SSL;
        }
        if auth_resp.len() >= 251 {
            client_flags |= CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;
        }
        if database.is_some() {
            client_flags |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        self.capabilities = CapabilityFlags::new(client_flags);

        // TLS upgrade: the short SSL-request packet goes out in plaintext,
        // the rest of the response continues over the wrapped stream with
        // the sequence counter intact.
        #[cfg(feature = "tls")]
        if use_tls {
            let request = SslRequest::new(client_flags, self.opts.collation);
            let mut data = self.buf.take_small_buffer(4 + 32)?;
            data[4..].copy_from_slice(request.as_bytes());
            let res = self.write_packet(&mut data);
            self.buf.store(data);
            res?;

            let host = self.opts.host.clone();
            let stream = std::mem::replace(&mut self.stream, Stream::Detached);
            self.stream = stream.upgrade_to_tls(&host)?;
        }

        let mut data = self.buf.take_complete_buffer()?;
        write_handshake_response(
            &mut data,
            &HandshakeResponse {
                client_flags,
                collation: self.opts.collation,
                user: &self.opts.user,
                auth_response: &auth_resp,
                database: database.as_deref(),
                auth_plugin: &plugin,
            },
        );
        let res = self.write_packet(&mut data);
        self.buf.store(data);
        res?;

        // Auth dialogue: loop on switch/more-data packets until OK or ERR.
        let mut switched = false;
        loop {
            enum Reply {
                Ok(OkPayload),
                Err(ServerError),
                Switch { plugin: String, data: Vec<u8> },
                OldSwitch,
                MoreData(Vec<u8>),
            }
            let reply = {
                let data = self.read_packet()?;
                match data.first().copied() {
                    Some(PACKET_OK) => Reply::Ok(parse_ok_packet(data)?),
                    Some(PACKET_ERR) => Reply::Err(parse_err_packet(data)?),
                    Some(PACKET_AUTH_MORE_DATA) => Reply::MoreData(data[1..].to_vec()),
                    Some(PACKET_EOF) if data.len() == 1 => Reply::OldSwitch,
                    Some(PACKET_EOF) => {
                        let (plugin, data) = parse_auth_switch(data)?;
                        Reply::Switch { plugin, data }
                    }
                    _ => return Err(Error::MalformedPacket),
                }
            };

            match reply {
                Reply::Ok(ok) => {
                    self.apply_ok(&ok);
                    return Ok(());
                }
                Reply::Err(err) => return Err(Error::Server(err)),
                Reply::OldSwitch => {
                    return Err(Error::UnsupportedAuthPlugin(
                        auth::MYSQL_OLD_PASSWORD.to_string(),
                    ));
                }
                Reply::Switch {
                    plugin: new_plugin,
                    data: new_data,
                } => {
                    if switched {
                        return Err(Error::MalformedPacket);
                    }
                    switched = true;
                    let resp = auth_response(&new_plugin, &password, &new_data)?;
                    plugin = new_plugin;
                    self.write_auth_packet(&resp)?;
                }
                Reply::MoreData(more) => match plugin.as_str() {
                    auth::CACHING_SHA2_PASSWORD => match more.first().copied() {
                        Some(auth::CACHING_SHA2_FAST_AUTH_OK) => {
                            // Fast auth accepted; the OK packet follows.
                        }
                        Some(auth::CACHING_SHA2_FULL_AUTH) => {
                            if self.stream.is_tls() {
                                let mut cleartext = password.as_bytes().to_vec();
                                cleartext.push(0);
                                self.write_auth_packet(&cleartext)?;
                            } else {
                                return Err(Error::UnsupportedAuthPlugin(
                                    "caching_sha2_password full authentication requires TLS"
                                        .to_string(),
                                ));
                            }
                        }
                        _ => return Err(Error::MalformedPacket),
                    },
                    _ => return Err(Error::MalformedPacket),
                },
            }
        }
    }

    // ------------------------------------------------------------------
    // Response handling
    // ------------------------------------------------------------------

    fn apply_ok(&mut self, ok: &OkPayload) {
        if let Some(last) = self.affected_rows.last_mut() {
            *last = ok.affected_rows;
        }
        if let Some(last) = self.insert_ids.last_mut() {
            *last = ok.last_insert_id;
        }
        self.status = ok.status;
    }

    /// Apply the configured read-only rejection: errors 1792 and 1290 break
    /// the connection so a pool stops handing it out.
    pub(crate) fn process_server_error(&mut self, err: ServerError) -> Error {
        if self.opts.reject_read_only
            && (err.number == ER_CANT_EXECUTE_IN_READ_ONLY_TRANSACTION
                || err.number == ER_OPTION_PREVENTS_STATEMENT)
        {
            tracing::warn!(number = err.number, "read-only server rejected, discarding connection");
            self.cleanup();
            return Error::InvalidConn;
        }
        Error::Server(err)
    }

    fn clear_result(&mut self) {
        self.affected_rows.clear();
        self.insert_ids.clear();
    }

    fn exec_info(&self) -> ExecInfo {
        ExecInfo {
            affected_rows: self.affected_rows.last().copied().unwrap_or(0),
            last_insert_id: self.insert_ids.last().copied().unwrap_or(0),
        }
    }

    /// Expect OK or ERR.
    fn read_result_ok(&mut self) -> Result<()> {
        let outcome = {
            let data = self.read_packet()?;
            if data.first() == Some(&PACKET_OK) {
                Ok(parse_ok_packet(data)?)
            } else {
                Err(parse_err_packet(data)?)
            }
        };
        match outcome {
            Ok(ok) => {
                self.apply_ok(&ok);
                Ok(())
            }
            Err(err) => Err(self.process_server_error(err)),
        }
    }

    /// Read the reply that starts a command's result: OK (no result set),
    /// ERR, a LOCAL INFILE request, or the column count of a result set.
    pub(crate) fn read_result_set_header(&mut self) -> Result<usize> {
        self.affected_rows.push(0);
        self.insert_ids.push(0);

        enum Header {
            Ok(OkPayload),
            Err(ServerError),
            LocalInfile,
            Columns(usize),
        }
        let header = {
            let data = self.read_packet()?;
            match data.first().copied() {
                Some(PACKET_OK) => Header::Ok(parse_ok_packet(data)?),
                Some(PACKET_ERR) => Header::Err(parse_err_packet(data)?),
                Some(PACKET_LOCAL_INFILE) => Header::LocalInfile,
                _ => {
                    let (count, _) = read_int_lenenc(data)?;
                    Header::Columns(count as usize)
                }
            }
        };
        match header {
            Header::Ok(ok) => {
                self.apply_ok(&ok);
                Ok(0)
            }
            Header::Err(err) => Err(self.process_server_error(err)),
            Header::LocalInfile => Err(Error::LocalInfile),
            Header::Columns(count) => Ok(count),
        }
    }

    /// Read `count` column definitions plus the terminating EOF.
    pub(crate) fn read_columns(&mut self, count: usize) -> Result<Vec<Column>> {
        let with_alias = self.opts.columns_with_alias;
        let mut columns = Vec::with_capacity(count);
        loop {
            enum Item {
                Eof(Option<StatusFlags>),
                Column(Column),
            }
            let item = {
                let data = self.read_packet()?;
                if data.first() == Some(&PACKET_EOF) && (data.len() == 5 || data.len() == 1) {
                    Item::Eof(if data.len() == 5 {
                        Some(read_status(&data[3..5]))
                    } else {
                        None
                    })
                } else {
                    Item::Column(parse_column(data, with_alias)?)
                }
            };
            match item {
                Item::Eof(status) => {
                    if let Some(status) = status {
                        self.status = status;
                    }
                    if columns.len() == count {
                        return Ok(columns);
                    }
                    return Err(Error::ColumnCountMismatch {
                        expected: count,
                        parsed: columns.len(),
                    });
                }
                Item::Column(column) => columns.push(column),
            }
        }
    }

    /// Discard packets until EOF or ERR, keeping the status flags current.
    pub(crate) fn read_until_eof(&mut self) -> Result<()> {
        loop {
            enum Item {
                Eof(Option<StatusFlags>),
                Err(ServerError),
                Other,
            }
            let item = {
                let data = self.read_packet()?;
                match data.first().copied() {
                    Some(PACKET_ERR) => Item::Err(parse_err_packet(data)?),
                    Some(PACKET_EOF) if data.len() <= 5 => Item::Eof(if data.len() == 5 {
                        Some(read_status(&data[3..5]))
                    } else {
                        None
                    }),
                    _ => Item::Other,
                }
            };
            match item {
                Item::Err(err) => return Err(self.process_server_error(err)),
                Item::Eof(status) => {
                    if let Some(status) = status {
                        self.status = status;
                    }
                    return Ok(());
                }
                Item::Other => {}
            }
        }
    }

    /// Drain any further result sets while the server advertises
    /// MORE_RESULTS_EXISTS, updating the per-result counters.
    pub(crate) fn discard_results(&mut self) -> Result<()> {
        while self.status.more_results() {
            tracing::debug!("draining additional result set");
            let columns = self.read_result_set_header()?;
            if columns > 0 {
                self.read_until_eof()?;
                self.read_until_eof()?;
            }
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.is_broken() {
            tracing::debug!("command on broken connection");
            return Err(Error::InvalidConn);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command engine
    // ------------------------------------------------------------------

    /// COM_PING
    pub fn ping(&mut self) -> Result<()> {
        self.check_usable()?;
        self.write_command(utility::write_ping)?;
        self.read_result_ok()
    }

    /// COM_INIT_DB: switch the default database.
    pub fn select_db(&mut self, database: &str) -> Result<()> {
        self.check_usable()?;
        self.write_command(|out| utility::write_init_db(out, database))?;
        self.read_result_ok()
    }

    /// COM_FIELD_LIST: column definitions of a table, optionally filtered
    /// by a wildcard.
    pub fn list_fields(&mut self, table: &str, wildcard: Option<&str>) -> Result<Vec<Column>> {
        self.check_usable()?;
        self.write_command(|out| text::write_field_list(out, table, wildcard))?;

        let with_alias = self.opts.columns_with_alias;
        let mut columns = Vec::new();
        loop {
            enum Item {
                Eof(Option<StatusFlags>),
                Err(ServerError),
                Column(Column),
            }
            let item = {
                let data = self.read_packet()?;
                match data.first().copied() {
                    Some(PACKET_ERR) => Item::Err(parse_err_packet(data)?),
                    Some(PACKET_EOF) if data.len() <= 5 => Item::Eof(if data.len() == 5 {
                        Some(read_status(&data[3..5]))
                    } else {
                        None
                    }),
                    _ => Item::Column(parse_column(data, with_alias)?),
                }
            };
            match item {
                Item::Err(err) => return Err(self.process_server_error(err)),
                Item::Eof(status) => {
                    if let Some(status) = status {
                        self.status = status;
                    }
                    return Ok(columns);
                }
                Item::Column(column) => columns.push(column),
            }
        }
    }

    /// Text-protocol query that discards any rows: DDL, INSERT, UPDATE.
    pub fn exec(&mut self, sql: &str) -> Result<ExecInfo> {
        self.check_usable()?;
        self.exec_body(sql)
    }

    /// Text-protocol query returning a result-set reader. A reply without
    /// a result set yields an already-finished reader.
    pub fn query(&mut self, sql: &str) -> Result<Rows<'_>> {
        self.check_usable()?;
        let (columns, done) = self.start_query(sql)?;
        Ok(Rows::new(self, columns, false, done, None))
    }

    fn start_query(&mut self, sql: &str) -> Result<(Vec<Column>, bool)> {
        self.clear_result();
        self.write_command(|out| text::write_query(out, sql))?;
        let count = self.read_result_set_header()?;
        if count == 0 {
            return Ok((Vec::new(), true));
        }
        let columns = self.read_columns(count)?;
        Ok((columns, false))
    }

    /// COM_STMT_PREPARE. Parameter and column definition metadata is read
    /// and discarded; only the counts are kept.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.check_usable()?;
        self.prepare_body(sql)
    }

    /// COM_STMT_EXECUTE that discards any rows.
    pub fn exec_statement(&mut self, stmt: &Statement, params: &[Param<'_>]) -> Result<ExecInfo> {
        self.check_usable()?;
        self.exec_statement_body(stmt, params)
    }

    /// COM_STMT_EXECUTE returning a binary-protocol result-set reader.
    pub fn query_statement<'a>(
        &'a mut self,
        stmt: &Statement,
        params: &[Param<'_>],
    ) -> Result<Rows<'a>> {
        self.check_usable()?;
        let (columns, done) = self.start_execute(stmt, params)?;
        Ok(Rows::new(self, columns, true, done, None))
    }

    fn start_execute(
        &mut self,
        stmt: &Statement,
        params: &[Param<'_>],
    ) -> Result<(Vec<Column>, bool)> {
        self.clear_result();
        self.write_execute_packet(stmt, params)?;
        let count = self.read_result_set_header()?;
        if count == 0 {
            return Ok((Vec::new(), true));
        }
        let columns = self.read_columns(count)?;
        Ok((columns, false))
    }

    /// Assemble and send COM_STMT_EXECUTE: header, NULL bitmap,
    /// new-params-bound flag (always 1, bindings are never reused), two
    /// type bytes per parameter, then the value block. Oversized byte and
    /// string arguments travel ahead of the execute packet as
    /// COM_STMT_SEND_LONG_DATA.
    fn write_execute_packet(&mut self, stmt: &Statement, params: &[Param<'_>]) -> Result<()> {
        if params.len() != stmt.param_count() {
            return Err(Error::BadUsage(format!(
                "parameter count mismatch (got {}, statement has {})",
                params.len(),
                stmt.param_count()
            )));
        }

        // Threshold above which an argument is sent as long data; sized so
        // all inline values fit the server's packet limit.
        let long_data_size = (self.max_allowed_packet / (params.len() + 1)).max(64);

        self.sequence = 0;
        let mut data = self.buf.take_complete_buffer()?;
        write_execute_header(&mut data, stmt.id());

        let mut result = Ok(());
        if !params.is_empty() {
            let mask_start = data.len();
            data.resize(mask_start + params.len().div_ceil(8), 0);
            data.push(0x01);
            for param in params {
                data.extend_from_slice(&param.type_bytes());
            }
            for (i, param) in params.iter().enumerate() {
                if param.is_null() {
                    data[mask_start + (i >> 3)] |= 1 << (i & 7);
                }
            }
            for (i, param) in params.iter().enumerate() {
                if param.payload_len() >= long_data_size {
                    let bytes = match param {
                        Param::Bytes(b) => *b,
                        Param::Str(s) => s.as_bytes(),
                        _ => unreachable!("only byte and string arguments have payloads"),
                    };
                    result = self.write_long_data(stmt.id(), i as u16, bytes);
                    if result.is_err() {
                        break;
                    }
                } else {
                    param.encode_value(&mut data);
                }
            }
        }

        let res = result.and_then(|()| self.write_packet(&mut data));
        self.buf.store(data);
        res
    }

    /// COM_STMT_SEND_LONG_DATA: each chunk is its own command with a fresh
    /// sequence. Uses a private buffer; the shared scratch is occupied by
    /// the execute packet under construction.
    fn write_long_data(&mut self, statement_id: u32, param_id: u16, arg: &[u8]) -> Result<()> {
        const DATA_OFFSET: usize = 1 + 4 + 2;
        let max_chunk = (self.max_allowed_packet - 1)
            .saturating_sub(DATA_OFFSET)
            .max(1);

        let mut remaining = arg;
        while !remaining.is_empty() {
            let take = remaining.len().min(max_chunk);
            let mut data = Vec::with_capacity(4 + DATA_OFFSET + take);
            data.extend_from_slice(&[0u8; 4]);
            write_long_data_header(&mut data, statement_id, param_id);
            data.extend_from_slice(&remaining[..take]);

            self.sequence = 0;
            self.write_packet(&mut data)?;
            remaining = &remaining[take..];
        }
        self.sequence = 0;
        Ok(())
    }

    /// COM_STMT_CLOSE. Fire and forget: the server sends no reply.
    pub fn close_statement(&mut self, stmt: &Statement) -> Result<()> {
        self.check_usable()?;
        let id = stmt.id();
        self.write_command(|out| write_stmt_close(out, id))
    }

    /// Send COM_QUIT when the connection is still healthy, then tear down
    /// socket and watcher.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_broken() {
            if let Err(err) = self.write_command(utility::write_quit) {
                tracing::debug!(error = %err, "quit packet not delivered");
            }
        }
        self.cleanup();
        Ok(())
    }

    pub(crate) fn cleanup(&mut self) {
        self.broken = true;
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_guard = None;
            self.watcher = None;
            self.stream.shutdown();
            self.stream = Stream::Detached;
        }
    }

    // ------------------------------------------------------------------
    // Cancellation-aware command variants
    // ------------------------------------------------------------------

    /// Register the token with the watcher for the duration of one
    /// operation.
    fn watch_cancel(&mut self, ctx: &CancelToken) -> Result<FinishGuard> {
        if let Some(cause) = ctx.cause() {
            return Err(Error::Canceled(cause));
        }
        let watcher = match &self.watcher {
            Some(w) => w,
            None => return Err(Error::InvalidConn),
        };
        let (tx, rx) = crossbeam_channel::bounded(0);
        let request = WatchRequest {
            token: ctx.clone(),
            finished: rx,
        };
        if watcher.try_send(request).is_err() {
            tracing::debug!("cancellation watcher not accepting requests");
            return Err(Error::InvalidConn);
        }
        Ok(FinishGuard::new(tx))
    }

    fn check_ctx(&self, ctx: &CancelToken) -> Result<()> {
        match ctx.cause() {
            Some(cause) => Err(Error::Canceled(cause)),
            None => Ok(()),
        }
    }

    /// COM_PING, abandoned when the token fires.
    pub fn ping_ctx(&mut self, ctx: &CancelToken) -> Result<()> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        let res = self
            .write_command(utility::write_ping)
            .and_then(|()| self.read_result_ok());
        drop(guard);
        self.check_ctx(ctx)?;
        res
    }

    /// [`exec`](Conn::exec), abandoned when the token fires.
    pub fn exec_ctx(&mut self, ctx: &CancelToken, sql: &str) -> Result<ExecInfo> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        let res = self.exec_body(sql);
        drop(guard);
        self.check_ctx(ctx)?;
        res
    }

    fn exec_body(&mut self, sql: &str) -> Result<ExecInfo> {
        self.clear_result();
        self.write_command(|out| text::write_query(out, sql))?;
        let columns = self.read_result_set_header()?;
        if columns > 0 {
            self.read_until_eof()?;
            self.read_until_eof()?;
        }
        self.discard_results()?;
        Ok(self.exec_info())
    }

    /// [`query`](Conn::query), abandoned when the token fires. The watch
    /// stays active until the returned reader is closed.
    pub fn query_ctx<'a>(&'a mut self, ctx: &CancelToken, sql: &str) -> Result<Rows<'a>> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        match self.start_query(sql) {
            Ok((columns, done)) => {
                if let Some(cause) = ctx.cause() {
                    drop(guard);
                    return Err(Error::Canceled(cause));
                }
                Ok(Rows::new(self, columns, false, done, Some(guard)))
            }
            Err(err) => {
                drop(guard);
                self.check_ctx(ctx)?;
                Err(err)
            }
        }
    }

    /// [`prepare`](Conn::prepare), abandoned when the token fires.
    pub fn prepare_ctx(&mut self, ctx: &CancelToken, sql: &str) -> Result<Statement> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        let res = self.prepare_body(sql);
        drop(guard);
        self.check_ctx(ctx)?;
        res
    }

    fn prepare_body(&mut self, sql: &str) -> Result<Statement> {
        self.write_command(|out| write_prepare(out, sql))?;

        enum Reply {
            Ok { id: u32, columns: u16, params: u16 },
            Err(ServerError),
        }
        let reply = {
            let data = self.read_packet()?;
            if data.first() == Some(&PACKET_ERR) {
                Reply::Err(parse_err_packet(data)?)
            } else {
                let ok = read_prepare_ok(data)?;
                Reply::Ok {
                    id: ok.statement_id(),
                    columns: ok.num_columns(),
                    params: ok.num_params(),
                }
            }
        };
        let (id, num_columns, num_params) = match reply {
            Reply::Ok {
                id,
                columns,
                params,
            } => (id, columns, params),
            Reply::Err(err) => return Err(self.process_server_error(err)),
        };
        if num_params > 0 {
            self.read_until_eof()?;
        }
        if num_columns > 0 {
            self.read_until_eof()?;
        }
        Ok(Statement {
            id,
            num_params,
            num_columns,
        })
    }

    /// [`exec_statement`](Conn::exec_statement), abandoned when the token
    /// fires.
    pub fn exec_statement_ctx(
        &mut self,
        ctx: &CancelToken,
        stmt: &Statement,
        params: &[Param<'_>],
    ) -> Result<ExecInfo> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        let res = self.exec_statement_body(stmt, params);
        drop(guard);
        self.check_ctx(ctx)?;
        res
    }

    fn exec_statement_body(&mut self, stmt: &Statement, params: &[Param<'_>]) -> Result<ExecInfo> {
        self.clear_result();
        self.write_execute_packet(stmt, params)?;
        let columns = self.read_result_set_header()?;
        if columns > 0 {
            self.read_until_eof()?;
            self.read_until_eof()?;
        }
        self.discard_results()?;
        Ok(self.exec_info())
    }

    /// [`query_statement`](Conn::query_statement), abandoned when the token
    /// fires. The watch stays active until the returned reader is closed.
    pub fn query_statement_ctx<'a>(
        &'a mut self,
        ctx: &CancelToken,
        stmt: &Statement,
        params: &[Param<'_>],
    ) -> Result<Rows<'a>> {
        self.check_usable()?;
        let guard = self.watch_cancel(ctx)?;
        match self.start_execute(stmt, params) {
            Ok((columns, done)) => {
                if let Some(cause) = ctx.cause() {
                    drop(guard);
                    return Err(Error::Canceled(cause));
                }
                Ok(Rows::new(self, columns, true, done, Some(guard)))
            }
            Err(err) => {
                drop(guard);
                self.check_ctx(ctx)?;
                Err(err)
            }
        }
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn auth_response(plugin: &str, password: &str, auth_data: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        auth::MYSQL_NATIVE_PASSWORD => Ok(auth::scramble_password(auth_data, password)),
        auth::CACHING_SHA2_PASSWORD => Ok(auth::scramble_sha256_password(auth_data, password)),
        other => Err(Error::UnsupportedAuthPlugin(other.to_string())),
    }
}

/// `write_all` that reports how many bytes made it out before a failure,
/// so the caller can tell a clean abort from a desynced stream.
fn write_all_counted<W: Write>(
    writer: &mut W,
    buf: &[u8],
) -> std::result::Result<(), (usize, io::Error)> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err((
                    written,
                    io::Error::new(io::ErrorKind::WriteZero, "failed to write whole packet"),
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}
