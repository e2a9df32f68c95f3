use crate::cancel::FinishGuard;
use crate::constant::{ColumnType, StatusFlags, PACKET_EOF, PACKET_ERR, PACKET_OK};
use crate::conn::Conn;
use crate::error::{Error, Result, ServerError};
use crate::protocol::command::Column;
use crate::protocol::packet::{parse_err_packet, read_status};
use crate::protocol::primitive::{
    read_int_lenenc, read_string_fix, read_string_lenenc_nullable,
};
use crate::value::{DateTime, NullBitmap, TimeValue, Value};

/// Reader over the result set(s) of one command.
///
/// Borrows the connection mutably for its whole lifetime, so no other
/// command can be issued until the reader is closed. Closing (or dropping)
/// drains unread rows and any further result sets so the connection
/// returns to idle.
#[derive(Debug)]
pub struct Rows<'a> {
    conn: &'a mut Conn,
    columns: Vec<Column>,
    names: Option<Vec<String>>,
    binary: bool,
    /// EOF of the current result set has been seen.
    done: bool,
    /// The reader is finished with the connection entirely.
    detached: bool,
    _guard: Option<FinishGuard>,
}

enum RowEvent {
    Row(Vec<Value>),
    Eof(StatusFlags),
    Err(ServerError),
}

impl<'a> Rows<'a> {
    pub(crate) fn new(
        conn: &'a mut Conn,
        columns: Vec<Column>,
        binary: bool,
        done: bool,
        guard: Option<FinishGuard>,
    ) -> Self {
        Self {
            conn,
            columns,
            names: None,
            binary,
            done,
            detached: false,
            _guard: guard,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names as reported to the caller; `table.column` in
    /// columns-with-alias mode.
    pub fn column_names(&mut self) -> &[String] {
        if self.names.is_none() {
            self.names = Some(self.columns.iter().map(Column::display_name).collect());
        }
        self.names.as_deref().unwrap_or_default()
    }

    /// Fetch the next row of the current result set; `None` at its end.
    pub fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done || self.detached {
            return Ok(None);
        }

        let parse_time = self.conn.opts.parse_time;
        let binary = self.binary;
        let event = {
            let data = match self.conn.read_packet() {
                Ok(data) => data,
                Err(err) => {
                    self.detached = true;
                    return Err(err);
                }
            };
            if binary {
                match data.first().copied() {
                    Some(PACKET_OK) => {
                        RowEvent::Row(decode_binary_row(&self.columns, data, parse_time)?)
                    }
                    Some(PACKET_EOF) if data.len() == 5 => {
                        RowEvent::Eof(read_status(&data[3..5]))
                    }
                    Some(PACKET_ERR) => RowEvent::Err(parse_err_packet(data)?),
                    _ => return Err(Error::MalformedPacket),
                }
            } else {
                match data.first().copied() {
                    Some(PACKET_EOF) if data.len() == 5 => {
                        RowEvent::Eof(read_status(&data[3..5]))
                    }
                    Some(PACKET_ERR) => RowEvent::Err(parse_err_packet(data)?),
                    _ => RowEvent::Row(decode_text_row(&self.columns, data, parse_time)?),
                }
            }
        };

        match event {
            RowEvent::Row(values) => Ok(Some(values)),
            RowEvent::Eof(status) => {
                self.conn.status = status;
                self.done = true;
                if !self.conn.status.more_results() {
                    self.detached = true;
                }
                Ok(None)
            }
            RowEvent::Err(err) => {
                self.detached = true;
                Err(self.conn.process_server_error(err))
            }
        }
    }

    /// Whether the server announced another result set after the current
    /// one.
    pub fn has_next_result_set(&self) -> bool {
        !self.detached && self.conn.status.more_results()
    }

    /// Drain the current result set and position the reader on the next
    /// non-empty one. Returns `false` when no further result set exists.
    pub fn next_result_set(&mut self) -> Result<bool> {
        if self.detached {
            return Ok(false);
        }
        if self.conn.is_broken() {
            return Err(Error::InvalidConn);
        }
        if !self.done {
            self.conn.read_until_eof()?;
            self.done = true;
        }

        loop {
            if !self.conn.status.more_results() {
                self.detached = true;
                return Ok(false);
            }
            let count = self.conn.read_result_set_header()?;
            if count > 0 {
                self.columns = self.conn.read_columns(count)?;
                self.names = None;
                self.done = false;
                return Ok(true);
            }
            // Row-less statement between result sets; keep scanning.
        }
    }

    /// Drain whatever is unread and hand the connection back.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.detached {
            self._guard = None;
            return Ok(());
        }
        // One drain attempt only; a failure already broke the connection.
        self.detached = true;
        let res = self.drain();
        self._guard = None;
        res
    }

    fn drain(&mut self) -> Result<()> {
        if self.conn.is_broken() {
            return Err(Error::InvalidConn);
        }
        if !self.done {
            self.conn.read_until_eof()?;
            self.done = true;
        }
        self.conn.discard_results()
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        if !self.detached {
            if let Err(err) = self.finish() {
                tracing::debug!(error = %err, "error draining result set on drop");
            }
        }
    }
}

/// Decode one text-protocol row: every field is a length-encoded string or
/// the NULL marker, converted according to the column type.
fn decode_text_row(columns: &[Column], payload: &[u8], parse_time: bool) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(columns.len());
    let mut data = payload;
    for column in columns {
        let (field, rest) = read_string_lenenc_nullable(data)?;
        data = rest;
        let value = match field {
            None => Value::Null,
            Some(bytes) => convert_text_value(column, bytes, parse_time)?,
        };
        values.push(value);
    }
    Ok(values)
}

fn convert_text_value(column: &Column, bytes: &[u8], parse_time: bool) -> Result<Value> {
    use ColumnType::*;

    fn text(bytes: &[u8]) -> Result<&str> {
        simdutf8::basic::from_utf8(bytes)
            .map_err(|_| Error::Conversion("non-UTF-8 numeric field".to_string()))
    }

    match column.field_type {
        MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => {
            if parse_time {
                Ok(Value::DateTime(DateTime::parse_text(bytes)?))
            } else {
                Ok(Value::Bytes(bytes.to_vec()))
            }
        }
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_YEAR | MYSQL_TYPE_LONGLONG => {
            if column.flags.is_unsigned() {
                let parsed = text(bytes)?.parse::<u64>().map_err(|e| {
                    Error::Conversion(format!("unsigned integer field: {e}"))
                })?;
                Ok(Value::Uint(parsed))
            } else {
                let parsed = text(bytes)?
                    .parse::<i64>()
                    .map_err(|e| Error::Conversion(format!("integer field: {e}")))?;
                Ok(Value::Int(parsed))
            }
        }
        MYSQL_TYPE_FLOAT => {
            let parsed = text(bytes)?
                .parse::<f32>()
                .map_err(|e| Error::Conversion(format!("float field: {e}")))?;
            Ok(Value::Float(parsed))
        }
        MYSQL_TYPE_DOUBLE => {
            let parsed = text(bytes)?
                .parse::<f64>()
                .map_err(|e| Error::Conversion(format!("double field: {e}")))?;
            Ok(Value::Double(parsed))
        }
        _ => Ok(Value::Bytes(bytes.to_vec())),
    }
}

/// Decode one binary-protocol row: marker byte 0x00, NULL bitmap with the
/// two-bit offset, then a type-driven value block.
fn decode_binary_row(columns: &[Column], payload: &[u8], parse_time: bool) -> Result<Vec<Value>> {
    use ColumnType::*;

    let (marker, data) = read_string_fix(payload, 1)?;
    if marker[0] != PACKET_OK {
        return Err(Error::MalformedPacket);
    }
    let mask_len = (columns.len() + 7 + 2) >> 3;
    let (mask, mut data) = read_string_fix(data, mask_len)?;
    let mask = NullBitmap::for_result_set(mask);

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if mask.is_null(i) {
            values.push(Value::Null);
            continue;
        }
        let unsigned = column.flags.is_unsigned();
        let value = match column.field_type {
            MYSQL_TYPE_NULL => Value::Null,
            MYSQL_TYPE_TINY => {
                let (raw, rest) = read_string_fix(data, 1)?;
                data = rest;
                if unsigned {
                    Value::Uint(raw[0] as u64)
                } else {
                    Value::Int(raw[0] as i8 as i64)
                }
            }
            MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
                let (raw, rest) = read_string_fix(data, 2)?;
                data = rest;
                let v = u16::from_le_bytes([raw[0], raw[1]]);
                if unsigned {
                    Value::Uint(v as u64)
                } else {
                    Value::Int(v as i16 as i64)
                }
            }
            MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG => {
                let (raw, rest) = read_string_fix(data, 4)?;
                data = rest;
                let v = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if unsigned {
                    Value::Uint(v as u64)
                } else {
                    Value::Int(v as i32 as i64)
                }
            }
            MYSQL_TYPE_LONGLONG => {
                let (raw, rest) = read_string_fix(data, 8)?;
                data = rest;
                let v = u64::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ]);
                if unsigned {
                    Value::Uint(v)
                } else {
                    Value::Int(v as i64)
                }
            }
            MYSQL_TYPE_FLOAT => {
                let (raw, rest) = read_string_fix(data, 4)?;
                data = rest;
                Value::Float(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            MYSQL_TYPE_DOUBLE => {
                let (raw, rest) = read_string_fix(data, 8)?;
                data = rest;
                Value::Double(f64::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ]))
            }
            MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_VARCHAR
            | MYSQL_TYPE_BIT | MYSQL_TYPE_ENUM | MYSQL_TYPE_SET | MYSQL_TYPE_TINY_BLOB
            | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
            | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_GEOMETRY
            | MYSQL_TYPE_JSON => {
                let (field, rest) = read_string_lenenc_nullable(data)?;
                data = rest;
                match field {
                    None => Value::Null,
                    Some(bytes) => Value::Bytes(bytes.to_vec()),
                }
            }
            MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE | MYSQL_TYPE_TIME | MYSQL_TYPE_TIMESTAMP
            | MYSQL_TYPE_DATETIME => {
                let (len, rest) = read_int_lenenc(data)?;
                let (raw, rest) = read_string_fix(rest, len as usize)?;
                data = rest;
                if column.field_type == MYSQL_TYPE_TIME {
                    // No host-side duration type; rendered like the text
                    // protocol would.
                    let time = TimeValue::from_binary(raw)?;
                    Value::Bytes(time.format_column(column.decimals)?)
                } else if parse_time {
                    Value::DateTime(DateTime::from_binary(raw)?)
                } else {
                    let datetime = DateTime::from_binary(raw)?;
                    let is_date = matches!(
                        column.field_type,
                        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE
                    );
                    Value::Bytes(datetime.format_column(is_date, column.decimals)?)
                }
            }
        };
        values.push(value);
    }
    Ok(values)
}
