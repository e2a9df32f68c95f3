use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Fixed-size tail of a ColumnDefinition41 packet, after the six
/// length-encoded strings and the 0x0C length marker.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

/// One column descriptor, immutable once parsed.
#[derive(Debug, Clone)]
pub struct Column {
    /// Table alias, captured only in columns-with-alias mode.
    pub table: String,
    pub name: String,
    pub field_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
    pub charset: u16,
    pub length: u32,
}

impl Column {
    /// The name reported to the caller: `table.column` in alias mode when a
    /// table alias is present.
    pub fn display_name(&self) -> String {
        if self.table.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.table, self.name)
        }
    }
}

/// Parse a column-definition packet. The leading catalog, schema and
/// original-table/name strings are skipped; the table alias is captured
/// only when `with_alias` is set.
pub fn parse_column(payload: &[u8], with_alias: bool) -> Result<Column> {
    // catalog (usually "def"), schema
    let data = skip_string_lenenc(payload)?;
    let data = skip_string_lenenc(data)?;

    // table alias
    let (table, data) = if with_alias {
        let (table, rest) = read_string_lenenc(data)?;
        (String::from_utf8_lossy(table).into_owned(), rest)
    } else {
        (String::new(), skip_string_lenenc(data)?)
    };

    // original table
    let data = skip_string_lenenc(data)?;

    // column alias
    let (name, data) = read_string_lenenc(data)?;
    let name = String::from_utf8_lossy(name).into_owned();

    // original column name
    let data = skip_string_lenenc(data)?;

    // fixed-length block: 0x0C marker then 12 bytes
    let (_fixed_len, data) = read_int_lenenc(data)?;
    let (tail_bytes, _default_values) = read_string_fix(data, 12)?;
    let tail =
        ColumnDefinitionTail::ref_from_bytes(tail_bytes).map_err(|_| Error::MalformedPacket)?;

    let field_type =
        ColumnType::from_u8(tail.column_type).ok_or(Error::MalformedPacket)?;

    Ok(Column {
        table,
        name,
        field_type,
        flags: ColumnFlags::new(tail.flags.get()),
        decimals: tail.decimals,
        charset: tail.charset.get(),
        length: tail.column_length.get(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn column_payload(table: &str, name: &str, ty: ColumnType, flags: u16) -> Vec<u8> {
        let mut p = Vec::new();
        write_bytes_lenenc(&mut p, b"def");
        write_bytes_lenenc(&mut p, b"testdb");
        write_bytes_lenenc(&mut p, table.as_bytes());
        write_bytes_lenenc(&mut p, table.as_bytes());
        write_bytes_lenenc(&mut p, name.as_bytes());
        write_bytes_lenenc(&mut p, name.as_bytes());
        p.push(0x0C);
        p.extend_from_slice(&45u16.to_le_bytes()); // charset
        p.extend_from_slice(&255u32.to_le_bytes()); // length
        p.push(ty as u8);
        p.extend_from_slice(&flags.to_le_bytes());
        p.push(0); // decimals
        p.extend_from_slice(&[0, 0]); // reserved
        p
    }

    #[test]
    fn parses_without_alias() {
        let payload = column_payload("users", "id", ColumnType::MYSQL_TYPE_LONG, 0x0020);
        let col = parse_column(&payload, false).unwrap();
        assert_eq!(col.name, "id");
        assert!(col.table.is_empty());
        assert_eq!(col.field_type, ColumnType::MYSQL_TYPE_LONG);
        assert!(col.flags.is_unsigned());
        assert_eq!(col.charset, 45);
        assert_eq!(col.length, 255);
        assert_eq!(col.display_name(), "id");
    }

    #[test]
    fn parses_with_alias() {
        let payload = column_payload("u", "id", ColumnType::MYSQL_TYPE_LONG, 0);
        let col = parse_column(&payload, true).unwrap();
        assert_eq!(col.table, "u");
        assert_eq!(col.display_name(), "u.id");
    }

    #[test]
    fn rejects_unknown_type() {
        let mut payload = column_payload("t", "c", ColumnType::MYSQL_TYPE_LONG, 0);
        let type_pos = payload.len() - 6;
        payload[type_pos] = 0x50; // in the unassigned gap
        assert!(parse_column(&payload, false).is_err());
    }

    #[test]
    fn rejects_truncated_packet() {
        let payload = column_payload("t", "c", ColumnType::MYSQL_TYPE_LONG, 0);
        assert!(parse_column(&payload[..payload.len() - 4], false).is_err());
    }
}
