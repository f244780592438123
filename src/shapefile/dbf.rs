//! dBASE III attribute table (`.dbf`)

use chrono::{Datelike, NaiveDate};
use tracing::warn;

use crate::{GeoKitError, Result};

const VERSION: u8 = 0x03;
const HEADER_TERMINATOR: u8 = 0x0D;
const END_OF_FILE: u8 = 0x1A;
const FIELD_NAME_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text of at most `len` bytes
    Character(u8),
    /// Right-aligned decimal number of `len` characters with `decimals` digits
    Numeric(u8, u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    #[must_use]
    pub fn character(name: &str, len: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Character(len),
        }
    }

    #[must_use]
    pub fn numeric(name: &str, len: u8, decimals: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Numeric(len, decimals),
        }
    }

    fn len(&self) -> usize {
        match self.kind {
            FieldKind::Character(len) | FieldKind::Numeric(len, _) => usize::from(len),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a character
fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Fixed notation when it fits `width`, otherwise the most precise exponent form that does
fn fit_number(number: f64, width: usize, decimals: usize) -> Option<String> {
    let fixed = format!("{number:.decimals$}");
    if fixed.len() <= width {
        return Some(fixed);
    }
    (0..width)
        .rev()
        .map(|precision| format!("{number:.precision$e}"))
        .find(|text| text.len() <= width)
}

fn encode_value(field: &FieldDef, value: &FieldValue, out: &mut Vec<u8>) -> Result<()> {
    let width = field.len();
    match (field.kind, value) {
        (FieldKind::Character(_), FieldValue::Text(text)) => {
            let text = truncate_utf8(text, width);
            out.extend_from_slice(text.as_bytes());
            out.resize(out.len() + width - text.len(), b' ');
        }
        (FieldKind::Numeric(_, decimals), FieldValue::Number(number)) => {
            if !number.is_finite() {
                out.resize(out.len() + width, b' ');
                return Ok(());
            }
            match fit_number(*number, width, usize::from(decimals)) {
                Some(text) => out.extend_from_slice(format!("{text:>width$}").as_bytes()),
                None => {
                    warn!("Value {} does not fit field {} of width {}, left empty", number, field.name, width);
                    out.resize(out.len() + width, b' ');
                }
            }
        }
        (FieldKind::Numeric(..), FieldValue::Text(_)) | (FieldKind::Character(_), FieldValue::Number(_)) => {
            return Err(GeoKitError::validation(format!(
                "value type does not match field {}",
                field.name
            )));
        }
    }
    Ok(())
}

/// Encode a table; `date` is stamped as the last update
pub fn encode(fields: &[FieldDef], records: &[Vec<FieldValue>], date: NaiveDate) -> Result<Vec<u8>> {
    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(FieldDef::len).sum::<usize>();

    let header_len = u16::try_from(header_len).map_err(|_| GeoKitError::validation("too many DBF fields"))?;
    let record_len_u16 = u16::try_from(record_len).map_err(|_| GeoKitError::validation("DBF record too long"))?;
    let count = u32::try_from(records.len()).map_err(|_| GeoKitError::validation("too many DBF records"))?;

    let mut out = Vec::with_capacity(usize::from(header_len) + record_len * records.len() + 1);

    out.push(VERSION);
    // years since 1900; a u8 covers 1900..=2155
    out.push(u8::try_from(date.year() - 1900).unwrap_or(u8::MAX));
    out.push(u8::try_from(date.month()).unwrap_or(1));
    out.push(u8::try_from(date.day()).unwrap_or(1));
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&record_len_u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 20]);

    for field in fields {
        let name = field.name.as_bytes();
        if name.is_empty() || name.len() >= FIELD_NAME_LEN || !field.name.is_ascii() {
            return Err(GeoKitError::validation(format!(
                "invalid DBF field name '{}'",
                field.name
            )));
        }
        let mut descriptor = [0u8; 32];
        descriptor[..name.len()].copy_from_slice(name);
        let (kind, len, decimals) = match field.kind {
            FieldKind::Character(len) => (b'C', len, 0),
            FieldKind::Numeric(len, decimals) => (b'N', len, decimals),
        };
        descriptor[11] = kind;
        descriptor[16] = len;
        descriptor[17] = decimals;
        out.extend_from_slice(&descriptor);
    }
    out.push(HEADER_TERMINATOR);

    for (row, record) in records.iter().enumerate() {
        if record.len() != fields.len() {
            return Err(GeoKitError::validation(format!(
                "record {} has {} values for {} fields",
                row + 1,
                record.len(),
                fields.len()
            )));
        }
        out.push(b' ');
        for (field, value) in fields.iter().zip(record) {
            encode_value(field, value, &mut out)?;
        }
    }
    out.push(END_OF_FILE);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_header_and_records() {
        let fields = vec![FieldDef::character("NAME", 5), FieldDef::numeric("ELEV", 8, 2)];
        let records = vec![
            vec![FieldValue::Text("Ab".to_string()), FieldValue::Number(12.5)],
            vec![FieldValue::Text("Longer name".to_string()), FieldValue::Number(-1.0)],
        ];

        let bytes = encode(&fields, &records, date()).unwrap();

        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[1..4], &[124, 3, 9]);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(bytes[8..10].try_into().unwrap()), 97);
        assert_eq!(u16::from_le_bytes(bytes[10..12].try_into().unwrap()), 14);
        assert_eq!(&bytes[32..36], b"NAME");
        assert_eq!(bytes[32 + 11], b'C');
        assert_eq!(bytes[32 + 16], 5);
        assert_eq!(bytes[64 + 11], b'N');
        assert_eq!(bytes[64 + 17], 2);
        assert_eq!(bytes[96], 0x0D);

        assert_eq!(&bytes[97..111], b" Ab      12.50");
        assert_eq!(&bytes[111..125], b" Longe   -1.00");
        assert_eq!(bytes.len(), 126);
        assert_eq!(bytes[125], 0x1A);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
        assert_eq!(truncate_utf8("ok", 10), "ok");

        let fields = vec![FieldDef::character("NAME", 2)];
        let bytes = encode(&fields, &[vec![FieldValue::Text("né".to_string())]], date()).unwrap();
        assert_eq!(&bytes[65..68], b" n ");
    }

    #[test]
    fn test_invalid_inputs() {
        let fields = vec![FieldDef::numeric("V", 3, 0)];
        assert!(encode(&fields, &[vec![]], date()).is_err());
        assert!(encode(&fields, &[vec![FieldValue::Text("x".to_string())]], date()).is_err());
        assert!(encode(&[FieldDef::character("WAY_TOO_LONG", 4)], &[], date()).is_err());
    }

    #[test]
    fn test_wide_numbers_fall_back_to_exponent() {
        assert_eq!(fit_number(12.5, 8, 2).as_deref(), Some("12.50"));
        assert_eq!(fit_number(12345.0, 3, 0).as_deref(), Some("1e4"));

        let elevation = fit_number(-1.0e9, 12, 3).unwrap();
        assert_eq!(elevation.len(), 12);
        assert_eq!(elevation.parse::<f64>().unwrap(), -1.0e9);

        assert_eq!(fit_number(-1.0e100, 2, 0), None);
    }

    #[test]
    fn test_oversized_number_does_not_abort_export() {
        let fields = vec![FieldDef::numeric("V", 3, 0)];
        let records = vec![
            vec![FieldValue::Number(12345.0)],
            vec![FieldValue::Number(-1.0e100)],
        ];
        let bytes = encode(&fields, &records, date()).unwrap();
        assert_eq!(&bytes[65..69], b" 1e4");
        assert_eq!(&bytes[69..73], b"    ");
    }
}
