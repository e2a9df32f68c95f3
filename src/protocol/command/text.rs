use crate::constant::Command;
use crate::protocol::primitive::*;

/// Write COM_QUERY
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, Command::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Write COM_FIELD_LIST: NUL-terminated table name plus an optional column
/// wildcard. The reply is column definitions until EOF.
pub fn write_field_list(out: &mut Vec<u8>, table: &str, wildcard: Option<&str>) {
    write_int_1(out, Command::FieldList as u8);
    write_string_null(out, table);
    if let Some(w) = wildcard {
        out.extend_from_slice(w.as_bytes());
    }
}
