use std::fmt;

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::primitive::{write_bytes_lenenc, write_int_1, write_int_8};

/// A decoded column value.
///
/// Integral columns decode as `Int`/`Uint` per the column's UNSIGNED flag.
/// DATE/DATETIME/TIMESTAMP columns decode as `DateTime` when `parse_time`
/// is configured, otherwise as their formatted bytes. Everything else is
/// raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Uint(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    DateTime(DateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

/// A statement argument.
///
/// One tagged union with a single encode operation covers every supported
/// argument kind; the wire type bytes carry the sign bit in the high bit of
/// the second byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param<'a> {
    Null,
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Bytes(&'a [u8]),
    Str(&'a str),
    DateTime(DateTime),
}

impl Param<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    /// The two type bytes sent in the COM_STMT_EXECUTE type block.
    pub(crate) fn type_bytes(&self) -> [u8; 2] {
        match self {
            Param::Null => [ColumnType::MYSQL_TYPE_NULL as u8, 0x00],
            Param::Int(_) => [ColumnType::MYSQL_TYPE_LONGLONG as u8, 0x00],
            Param::Uint(_) => [ColumnType::MYSQL_TYPE_LONGLONG as u8, 0x80],
            Param::Float(_) => [ColumnType::MYSQL_TYPE_DOUBLE as u8, 0x00],
            Param::Bool(_) => [ColumnType::MYSQL_TYPE_TINY as u8, 0x00],
            Param::Bytes(_) | Param::Str(_) | Param::DateTime(_) => {
                [ColumnType::MYSQL_TYPE_STRING as u8, 0x00]
            }
        }
    }

    /// Append the binary-protocol value bytes. NULL contributes nothing;
    /// it is carried by the NULL bitmap.
    pub(crate) fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            Param::Null => {}
            Param::Int(v) => write_int_8(out, *v as u64),
            Param::Uint(v) => write_int_8(out, *v),
            Param::Float(v) => write_int_8(out, v.to_bits()),
            Param::Bool(v) => write_int_1(out, *v as u8),
            Param::Bytes(v) => write_bytes_lenenc(out, v),
            Param::Str(v) => write_bytes_lenenc(out, v.as_bytes()),
            Param::DateTime(v) => {
                let mut text = Vec::with_capacity(26);
                v.write_text(&mut text, 6);
                write_bytes_lenenc(out, &text);
            }
        }
    }

    /// Payload bytes that would go into the execute packet, for the
    /// long-data threshold check.
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            Param::Bytes(v) => v.len(),
            Param::Str(v) => v.len(),
            _ => 0,
        }
    }
}

impl From<i8> for Param<'_> {
    fn from(v: i8) -> Self {
        Param::Int(v as i64)
    }
}

impl From<i16> for Param<'_> {
    fn from(v: i16) -> Self {
        Param::Int(v as i64)
    }
}

impl From<i32> for Param<'_> {
    fn from(v: i32) -> Self {
        Param::Int(v as i64)
    }
}

impl From<i64> for Param<'_> {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u8> for Param<'_> {
    fn from(v: u8) -> Self {
        Param::Uint(v as u64)
    }
}

impl From<u16> for Param<'_> {
    fn from(v: u16) -> Self {
        Param::Uint(v as u64)
    }
}

impl From<u32> for Param<'_> {
    fn from(v: u32) -> Self {
        Param::Uint(v as u64)
    }
}

impl From<u64> for Param<'_> {
    fn from(v: u64) -> Self {
        Param::Uint(v)
    }
}

impl From<f32> for Param<'_> {
    fn from(v: f32) -> Self {
        Param::Float(v as f64)
    }
}

impl From<f64> for Param<'_> {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<bool> for Param<'_> {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl<'a> From<&'a str> for Param<'a> {
    fn from(v: &'a str) -> Self {
        Param::Str(v)
    }
}

impl<'a> From<&'a [u8]> for Param<'a> {
    fn from(v: &'a [u8]) -> Self {
        Param::Bytes(v)
    }
}

impl From<DateTime> for Param<'_> {
    fn from(v: DateTime) -> Self {
        Param::DateTime(v)
    }
}

impl<'a, T: Into<Param<'a>>> From<Option<T>> for Param<'a> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Param::Null,
        }
    }
}

// ============================================================================
// Temporal types
// ============================================================================

/// Naive calendar date-time, microsecond precision. The all-zero value is
/// MySQL's zero date and renders as `0000-00-00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro: u32,
}

/// DATE/DATETIME/TIMESTAMP - 4-byte binary layout (date only)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub(crate) struct BinaryDate4 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
}

/// DATE/DATETIME/TIMESTAMP - 7-byte binary layout (no microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub(crate) struct BinaryDatetime7 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// DATE/DATETIME/TIMESTAMP - 11-byte binary layout (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub(crate) struct BinaryDatetime11 {
    pub year: U16LE,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro: U32LE,
}

impl DateTime {
    pub fn is_zero(&self) -> bool {
        *self == DateTime::default()
    }

    /// Decode the binary-protocol layout: 0, 4, 7 or 11 bytes.
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        match data.len() {
            0 => Ok(DateTime::default()),
            4 => {
                let d =
                    BinaryDate4::ref_from_bytes(data).map_err(|_| Error::MalformedPacket)?;
                Ok(DateTime {
                    year: d.year.get(),
                    month: d.month,
                    day: d.day,
                    ..DateTime::default()
                })
            }
            7 => {
                let d = BinaryDatetime7::ref_from_bytes(data)
                    .map_err(|_| Error::MalformedPacket)?;
                Ok(DateTime {
                    year: d.year.get(),
                    month: d.month,
                    day: d.day,
                    hour: d.hour,
                    minute: d.minute,
                    second: d.second,
                    micro: 0,
                })
            }
            11 => {
                let d = BinaryDatetime11::ref_from_bytes(data)
                    .map_err(|_| Error::MalformedPacket)?;
                Ok(DateTime {
                    year: d.year.get(),
                    month: d.month,
                    day: d.day,
                    hour: d.hour,
                    minute: d.minute,
                    second: d.second,
                    micro: d.micro.get(),
                })
            }
            n => Err(Error::Conversion(format!(
                "invalid binary DATETIME length {n}"
            ))),
        }
    }

    /// Parse the text-protocol rendering: `YYYY-MM-DD` optionally followed
    /// by ` HH:MM:SS` and `.ffffff`.
    pub fn parse_text(data: &[u8]) -> Result<Self> {
        fn bad(data: &[u8]) -> Error {
            Error::Conversion(format!(
                "invalid DATETIME text {:?}",
                String::from_utf8_lossy(data)
            ))
        }
        fn digits(data: &[u8], n: usize) -> Option<u32> {
            if data.len() < n {
                return None;
            }
            let mut value = 0u32;
            for &b in &data[..n] {
                if !b.is_ascii_digit() {
                    return None;
                }
                value = value * 10 + (b - b'0') as u32;
            }
            Some(value)
        }

        if data.len() < 10 || data[4] != b'-' || data[7] != b'-' {
            return Err(bad(data));
        }
        let year = digits(data, 4).ok_or_else(|| bad(data))? as u16;
        let month = digits(&data[5..], 2).ok_or_else(|| bad(data))? as u8;
        let day = digits(&data[8..], 2).ok_or_else(|| bad(data))? as u8;

        let mut out = DateTime {
            year,
            month,
            day,
            ..DateTime::default()
        };
        if data.len() == 10 {
            return Ok(out);
        }
        if data.len() < 19 || data[10] != b' ' || data[13] != b':' || data[16] != b':' {
            return Err(bad(data));
        }
        out.hour = digits(&data[11..], 2).ok_or_else(|| bad(data))? as u8;
        out.minute = digits(&data[14..], 2).ok_or_else(|| bad(data))? as u8;
        out.second = digits(&data[17..], 2).ok_or_else(|| bad(data))? as u8;
        if data.len() == 19 {
            return Ok(out);
        }
        let frac = &data[19..];
        if frac[0] != b'.' || frac.len() < 2 || frac.len() > 7 {
            return Err(bad(data));
        }
        let n = frac.len() - 1;
        let raw = digits(&frac[1..], n).ok_or_else(|| bad(data))?;
        out.micro = raw * 10u32.pow(6 - n as u32);
        Ok(out)
    }

    /// Append the text rendering used for statement arguments and for
    /// formatting binary rows: date part, time part when non-zero width is
    /// requested, fractional digits per `decimals` (0 to 6).
    pub fn write_text(&self, out: &mut Vec<u8>, decimals: u8) {
        if self.is_zero() {
            out.extend_from_slice(b"0000-00-00");
            return;
        }
        push_padded(out, self.year as u32, 4);
        out.push(b'-');
        push_padded(out, self.month as u32, 2);
        out.push(b'-');
        push_padded(out, self.day as u32, 2);

        if self.hour == 0 && self.minute == 0 && self.second == 0 && self.micro == 0 {
            return;
        }
        out.push(b' ');
        push_padded(out, self.hour as u32, 2);
        out.push(b':');
        push_padded(out, self.minute as u32, 2);
        out.push(b':');
        push_padded(out, self.second as u32, 2);
        write_fraction(out, self.micro, decimals);
    }

    /// Render like the server's text protocol would: full width driven by
    /// the column's decimals, even when components are zero.
    pub(crate) fn format_column(&self, is_date: bool, decimals: u8) -> Result<Vec<u8>> {
        let frac = fraction_digits(decimals)?;
        let mut out = Vec::with_capacity(27);
        push_padded(&mut out, self.year as u32, 4);
        out.push(b'-');
        push_padded(&mut out, self.month as u32, 2);
        out.push(b'-');
        push_padded(&mut out, self.day as u32, 2);
        if is_date {
            return Ok(out);
        }
        out.push(b' ');
        push_padded(&mut out, self.hour as u32, 2);
        out.push(b':');
        push_padded(&mut out, self.minute as u32, 2);
        out.push(b':');
        push_padded(&mut out, self.second as u32, 2);
        if frac > 0 {
            out.push(b'.');
            let mut digits = Vec::with_capacity(6);
            push_padded(&mut digits, self.micro, 6);
            out.extend_from_slice(&digits[..frac as usize]);
        }
        Ok(out)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::with_capacity(26);
        self.write_text(&mut out, 6);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

/// Duration-style TIME value: sign, day count, wall-clock components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeValue {
    pub negative: bool,
    pub days: u32,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro: u32,
}

/// TIME - 8-byte binary layout (no microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub(crate) struct BinaryTime8 {
    pub negative: u8,
    pub days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// TIME - 12-byte binary layout (with microseconds)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub(crate) struct BinaryTime12 {
    pub negative: u8,
    pub days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro: U32LE,
}

impl TimeValue {
    /// Decode the binary-protocol layout: 0, 8 or 12 bytes.
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        match data.len() {
            0 => Ok(TimeValue::default()),
            8 => {
                let t =
                    BinaryTime8::ref_from_bytes(data).map_err(|_| Error::MalformedPacket)?;
                Ok(TimeValue {
                    negative: t.negative != 0,
                    days: t.days.get(),
                    hour: t.hour,
                    minute: t.minute,
                    second: t.second,
                    micro: 0,
                })
            }
            12 => {
                let t =
                    BinaryTime12::ref_from_bytes(data).map_err(|_| Error::MalformedPacket)?;
                Ok(TimeValue {
                    negative: t.negative != 0,
                    days: t.days.get(),
                    hour: t.hour,
                    minute: t.minute,
                    second: t.second,
                    micro: t.micro.get(),
                })
            }
            n => Err(Error::Conversion(format!("invalid binary TIME length {n}"))),
        }
    }

    /// Render as `[-][H]HH:MM:SS[.ffffff]` with the fractional width taken
    /// from the column's decimals.
    pub(crate) fn format_column(&self, decimals: u8) -> Result<Vec<u8>> {
        let frac = fraction_digits(decimals)?;
        let mut out = Vec::with_capacity(17);
        if self.negative {
            out.push(b'-');
        }
        let hours = self.days * 24 + self.hour as u32;
        push_padded(&mut out, hours, 2);
        out.push(b':');
        push_padded(&mut out, self.minute as u32, 2);
        out.push(b':');
        push_padded(&mut out, self.second as u32, 2);
        if frac > 0 {
            out.push(b'.');
            let mut digits = Vec::with_capacity(6);
            push_padded(&mut digits, self.micro, 6);
            out.extend_from_slice(&digits[..frac as usize]);
        }
        Ok(out)
    }
}

/// Decimal digits to render for a column: 0x00 and 0x1F mean none, 1-6 are
/// literal, anything else is a protocol violation.
fn fraction_digits(decimals: u8) -> Result<u8> {
    match decimals {
        0x00 | 0x1F => Ok(0),
        1..=6 => Ok(decimals),
        n => Err(Error::Conversion(format!("illegal decimals value {n}"))),
    }
}

/// Append `value` as decimal with at least `width` digits, zero padded.
fn push_padded(out: &mut Vec<u8>, value: u32, width: usize) {
    let text = value.to_string();
    for _ in text.len()..width {
        out.push(b'0');
    }
    out.extend_from_slice(text.as_bytes());
}

/// Trailing fraction for statement arguments: trimmed to `decimals` digits,
/// omitted entirely when the microseconds are zero.
fn write_fraction(out: &mut Vec<u8>, micro: u32, decimals: u8) {
    if micro == 0 || decimals == 0 {
        return;
    }
    out.push(b'.');
    let mut digits = Vec::with_capacity(6);
    push_padded(&mut digits, micro, 6);
    out.extend_from_slice(&digits[..decimals.min(6) as usize]);
}

// ============================================================================
// NULL bitmap
// ============================================================================

/// NULL bitmap of a binary-protocol row. Result sets carry a
/// protocol-mandated offset of two bits; parameter bitmaps start at bit 0.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
    offset: usize,
}

impl<'a> NullBitmap<'a> {
    pub fn for_result_set(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 2 }
    }

    pub fn for_parameters(bitmap: &'a [u8]) -> Self {
        Self { bitmap, offset: 0 }
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let bit = idx + self.offset;
        let byte = bit >> 3;
        if byte >= self.bitmap.len() {
            return false;
        }
        (self.bitmap[byte] & (1 << (bit & 7))) != 0
    }
}
