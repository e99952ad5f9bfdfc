//! Cell values and their display coercion
//!
//! Drivers normalize whatever they decode into one of the [`CellValue`]
//! shapes; [`to_display_string`] then turns any shape into text. The mapping
//! is total: there is no input that fails or yields an ambiguous result.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};

/// Literal shown for SQL NULL. Never the empty string, so an empty text
/// value stays distinguishable from a missing one.
pub const NULL_DISPLAY: &str = "NULL";

/// A scanned cell, normalized to a closed set of semantic shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    /// Raw bytes; drivers hand these out for text-like columns they do not
    /// decode themselves.
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<FixedOffset>),
    /// Last-resort rendering for values no other shape covers.
    Other(String),
}

/// Renders a cell for display.
pub fn to_display_string(value: &CellValue) -> String {
    match value {
        CellValue::Null => NULL_DISPLAY.to_string(),
        CellValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        CellValue::Text(text) => text.clone(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => format_float(*f),
        CellValue::Timestamp(ts) => format_timestamp(ts),
        CellValue::Other(repr) if repr.is_empty() => "<unknown>".to_string(),
        CellValue::Other(repr) => repr.clone(),
    }
}

impl CellValue {
    /// Consumes the cell, avoiding a copy for the text shapes.
    pub fn into_display_string(self) -> String {
        match self {
            CellValue::Text(text) => text,
            CellValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            },
            other => to_display_string(&other),
        }
    }
}

/// Shortest decimal that parses back to the same `f64`. Rust's `Display`
/// for floats never switches to exponent notation, which is what a result
/// grid wants.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f.is_sign_positive() { "+Inf" } else { "-Inf" }.to_string()
    } else {
        f.to_string()
    }
}

/// RFC 3339 with nanosecond precision; trailing fractional zeros are
/// trimmed and a zero offset is written as `Z`.
fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    // chrono encodes a leap second as nanos >= 1e9
    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    let offset = ts.offset().local_minus_utc();
    if offset == 0 {
        out.push('Z');
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        let _ = write!(out, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60);
    }
    out
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(v: Vec<u8>) -> Self {
        CellValue::Bytes(v)
    }
}

impl From<&[u8]> for CellValue {
    fn from(v: &[u8]) -> Self {
        CellValue::Bytes(v.to_vec())
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<i16> for CellValue {
    fn from(v: i16) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<i8> for CellValue {
    fn from(v: i8) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<u8> for CellValue {
    fn from(v: u8) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<u16> for CellValue {
    fn from(v: u16) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<u64> for CellValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => CellValue::Int(i),
            Err(_) => CellValue::Text(v.to_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<f32> for CellValue {
    fn from(v: f32) -> Self {
        // Widening 0.1f32 directly gives 0.10000000149011612; go through the
        // f32's own shortest text so the displayed digits match what was stored.
        CellValue::Float(v.to_string().parse::<f64>().unwrap_or(v as f64))
    }
}

impl From<DateTime<FixedOffset>> for CellValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        CellValue::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(v: DateTime<Utc>) -> Self {
        CellValue::Timestamp(v.fixed_offset())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        CellValue::Timestamp(v.and_utc().fixed_offset())
    }
}

/// Nullable wrappers and optional references both collapse onto `Option`.
impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn show(v: impl Into<CellValue>) -> String {
        to_display_string(&v.into())
    }

    #[test]
    fn null_is_literal_and_distinct_from_empty_text() {
        assert_eq!(to_display_string(&CellValue::Null), "NULL");
        assert_eq!(show(""), "");
        assert_ne!(show(Option::<String>::None), show(Some(String::new())));
    }

    #[test]
    fn bytes_are_decoded_as_text() {
        assert_eq!(show(Vec::<u8>::new()), "");
        assert_eq!(show(b"hello".as_slice()), "hello");
        assert_eq!(show(vec![0x68u8, 0xff, 0x69]), "h\u{fffd}i");
    }

    #[test]
    fn booleans_and_integers() {
        assert_eq!(show(true), "true");
        assert_eq!(show(false), "false");
        assert_eq!(show(0i64), "0");
        assert_eq!(show(-42i64), "-42");
        assert_eq!(show(i64::MIN), "-9223372036854775808");
        assert_eq!(show(1_000_000i32), "1000000");
        assert_eq!(show(u64::MAX), "18446744073709551615");
    }

    #[test]
    fn floats_use_shortest_round_trip_form() {
        assert_eq!(show(1.0f64), "1");
        assert_eq!(show(0.1f64), "0.1");
        assert_eq!(show(-2.5f64), "-2.5");
        assert_eq!(show(0.1f64 + 0.2f64), "0.30000000000000004");
        assert_eq!(show(1e21f64), "1000000000000000000000");
        assert_eq!(show(1.5e-7f64), "0.00000015");
        assert_eq!(show(0.1f32), "0.1");
        assert_eq!(show(f64::NAN), "NaN");
        assert_eq!(show(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn timestamps_render_rfc3339_nano() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(show(whole), "2024-01-02T03:04:05Z");

        let nanos = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(show(nanos), "2024-01-02T03:04:05.123456789+02:00");

        let half = NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 500)
            .unwrap();
        assert_eq!(show(half), "2024-06-30T23:59:59.5Z");

        let west = FixedOffset::west_opt(5 * 3600 + 30 * 60)
            .unwrap()
            .with_ymd_and_hms(1999, 12, 31, 0, 0, 0)
            .unwrap();
        assert_eq!(show(west), "1999-12-31T00:00:00-05:30");
    }

    #[test]
    fn nullable_wrappers_unwrap_or_render_null() {
        assert_eq!(show(Some(7i64)), "7");
        assert_eq!(show(Option::<i64>::None), "NULL");
        assert_eq!(show(Some(2.25f64)), "2.25");
        assert_eq!(show(Option::<f64>::None), "NULL");
        assert_eq!(show(Some(true)), "true");
        assert_eq!(show(Option::<bool>::None), "NULL");
        assert_eq!(show(Some("x")), "x");
        assert_eq!(show(Option::<&str>::None), "NULL");
        let ts = Utc.with_ymd_and_hms(2020, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(show(Some(ts)), "2020-02-29T12:00:00Z");
        assert_eq!(show(Option::<DateTime<Utc>>::None), "NULL");
    }

    #[test]
    fn fallback_never_renders_empty() {
        assert_eq!(show(CellValue::Other("<INTERVAL>".into())), "<INTERVAL>");
        assert_eq!(show(CellValue::Other(String::new())), "<unknown>");
    }

    #[test]
    fn into_display_string_matches_borrowed_rendering() {
        let cells = vec![
            CellValue::Null,
            CellValue::Bytes(vec![0x61u8, 0xff]),
            CellValue::Text("abc".into()),
            CellValue::Int(3),
            CellValue::Float(0.5),
        ];
        for cell in cells {
            assert_eq!(to_display_string(&cell), cell.clone().into_display_string());
        }
    }
}
