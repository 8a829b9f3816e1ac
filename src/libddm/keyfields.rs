//! Key field description and host-native key encoding
//!
//! A keyed get carries the search key as the concatenation of each key
//! field's host-native encoding, in key-field declaration order. Character
//! fields always occupy their full declared width (blank padded) so that
//! the byte offsets of subsequent fields stay stable; a variable-length
//! character field additionally carries a 2-byte actual-length prefix.
//! Numeric fields use their native fixed-width encodings with no prefix
//! regardless of variable-length flags.

use crate::ebcdic;
use crate::error::{DdmError, DdmResult};

/// Host data type of one key field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFieldType {
    /// Character field of a declared byte width; `variable_length` adds a
    /// 2-byte actual-length prefix but never drops the padding
    Char { width: usize, variable_length: bool },
    /// 2-byte big-endian signed binary
    Binary2,
    /// 4-byte big-endian signed binary
    Binary4,
    /// 8-byte big-endian signed binary
    Binary8,
    /// Zoned decimal with a declared digit count (one byte per digit,
    /// sign in the last digit's zone nibble)
    Zoned { digits: u8 },
    /// Packed decimal with a declared digit count (two digits per byte,
    /// sign in the trailing nibble)
    Packed { digits: u8 },
}

/// One key field declaration: name plus host type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub name: String,
    pub field_type: KeyFieldType,
}

/// A key field value supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Text(String),
    Number(i64),
}

impl KeyField {
    pub fn new<S: Into<String>>(name: S, field_type: KeyFieldType) -> Self {
        Self { name: name.into(), field_type }
    }

    /// Encoded byte width of this field, including any varlen prefix
    pub fn encoded_width(&self) -> usize {
        match self.field_type {
            KeyFieldType::Char { width, variable_length } => {
                width + if variable_length { 2 } else { 0 }
            }
            KeyFieldType::Binary2 => 2,
            KeyFieldType::Binary4 => 4,
            KeyFieldType::Binary8 => 8,
            KeyFieldType::Zoned { digits } => digits as usize,
            KeyFieldType::Packed { digits } => (digits as usize) / 2 + 1,
        }
    }
}

/// Encode `values` against `fields` in declaration order
///
/// Values must be supplied for every field being searched on: the wire
/// format has no representation for an unset key field, so a `None` is a
/// local validation error. Returns the concatenated key bytes.
pub fn encode_key(fields: &[KeyField], values: &[Option<KeyValue>]) -> DdmResult<Vec<u8>> {
    if fields.is_empty() || values.is_empty() {
        return Err(DdmError::EmptyKeyList);
    }
    if values.len() > fields.len() {
        return Err(DdmError::InvalidParameter {
            parameter: "values".to_string(),
            reason: format!("{} values supplied for {} key fields", values.len(), fields.len()),
        });
    }

    let mut out = Vec::new();
    for (index, value) in values.iter().enumerate() {
        let field = &fields[index];
        let value = value.as_ref().ok_or(DdmError::NullKeyValue { field: index })?;
        encode_field(field, value, index, &mut out)?;
    }
    Ok(out)
}

fn encode_field(
    field: &KeyField,
    value: &KeyValue,
    index: usize,
    out: &mut Vec<u8>,
) -> DdmResult<()> {
    match (field.field_type, value) {
        (KeyFieldType::Char { width, variable_length }, KeyValue::Text(s)) => {
            let bytes = ebcdic::encode_fixed(s, width, index)?;
            if variable_length {
                // Actual significant length precedes the field; the full
                // declared width is still transmitted so later field
                // offsets do not move.
                let actual = ebcdic::string_to_ebcdic(s)?.len();
                out.extend_from_slice(&(actual as u16).to_be_bytes());
            }
            out.extend_from_slice(&bytes);
            Ok(())
        }
        (KeyFieldType::Binary2, KeyValue::Number(n)) => {
            let v = i16::try_from(*n).map_err(|_| DdmError::DigitOverflow { value: *n, digits: 5 })?;
            out.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }
        (KeyFieldType::Binary4, KeyValue::Number(n)) => {
            let v = i32::try_from(*n).map_err(|_| DdmError::DigitOverflow { value: *n, digits: 10 })?;
            out.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }
        (KeyFieldType::Binary8, KeyValue::Number(n)) => {
            out.extend_from_slice(&n.to_be_bytes());
            Ok(())
        }
        (KeyFieldType::Zoned { digits }, KeyValue::Number(n)) => {
            out.extend_from_slice(&encode_zoned(*n, digits)?);
            Ok(())
        }
        (KeyFieldType::Packed { digits }, KeyValue::Number(n)) => {
            out.extend_from_slice(&encode_packed(*n, digits)?);
            Ok(())
        }
        _ => Err(DdmError::InvalidParameter {
            parameter: field.name.clone(),
            reason: "value type does not match the declared field type".to_string(),
        }),
    }
}

/// Zoned decimal: one byte per digit, zone nibble 0xF, sign carried in the
/// last digit's zone (0xD for negative)
fn encode_zoned(value: i64, digits: u8) -> DdmResult<Vec<u8>> {
    let digit_bytes = digit_string(value, digits)?;
    let mut out: Vec<u8> = digit_bytes.iter().map(|d| 0xF0 | d).collect();
    if value < 0 {
        if let Some(last) = out.last_mut() {
            *last = 0xD0 | (*last & 0x0F);
        }
    }
    Ok(out)
}

/// Packed decimal: two digits per byte, trailing sign nibble (0xF positive,
/// 0xD negative). A field of `digits` digits always packs into
/// `digits / 2 + 1` bytes, with a leading zero nibble when `digits` is even.
fn encode_packed(value: i64, digits: u8) -> DdmResult<Vec<u8>> {
    let mut nibbles = Vec::with_capacity(digits as usize + 2);
    if digits % 2 == 0 {
        nibbles.push(0);
    }
    nibbles.extend_from_slice(&digit_string(value, digits)?);
    nibbles.push(if value < 0 { 0x0D } else { 0x0F });

    let mut out = Vec::with_capacity(nibbles.len() / 2);
    for pair in nibbles.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    Ok(out)
}

/// The absolute value as exactly `digits` decimal digits, zero padded
fn digit_string(value: i64, digits: u8) -> DdmResult<Vec<u8>> {
    let s = value.unsigned_abs().to_string();
    if s.len() > digits as usize {
        return Err(DdmError::DigitOverflow { value, digits });
    }
    let mut out = vec![0u8; digits as usize - s.len()];
    out.extend(s.bytes().map(|b| b - b'0'));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_field(width: usize, varlen: bool) -> KeyField {
        KeyField::new("CHARKEY", KeyFieldType::Char { width, variable_length: varlen })
    }

    #[test]
    fn test_char_key_fixed_width() {
        let key = encode_key(
            &[char_field(6, false)],
            &[Some(KeyValue::Text("AB".to_string()))],
        )
        .unwrap();
        assert_eq!(key.len(), 6);
        assert_eq!(&key[..2], &[0xC1, 0xC2]);
        assert_eq!(&key[2..], &[0x40; 4]);
    }

    #[test]
    fn test_char_key_varlen_keeps_padding() {
        // The varlen prefix reports the significant length, but the full
        // declared width is still occupied.
        let key = encode_key(
            &[char_field(6, true)],
            &[Some(KeyValue::Text("ABC".to_string()))],
        )
        .unwrap();
        assert_eq!(key.len(), 2 + 6);
        assert_eq!(&key[..2], &[0x00, 0x03]);
        assert_eq!(&key[2..5], &[0xC1, 0xC2, 0xC3]);
        assert_eq!(&key[5..], &[0x40; 3]);
    }

    #[test]
    fn test_null_key_rejected() {
        let err = encode_key(&[char_field(4, false)], &[None]);
        assert_eq!(err, Err(DdmError::NullKeyValue { field: 0 }));
    }

    #[test]
    fn test_empty_key_list_rejected() {
        assert_eq!(encode_key(&[], &[]), Err(DdmError::EmptyKeyList));
    }

    #[test]
    fn test_partial_key_allowed() {
        // Searching on a leading subset of the key fields is valid.
        let fields = [
            char_field(2, false),
            KeyField::new("SEQ", KeyFieldType::Binary4),
        ];
        let key = encode_key(&fields, &[Some(KeyValue::Text("XY".to_string()))]).unwrap();
        assert_eq!(key.len(), 2);
    }

    #[test]
    fn test_binary_fields() {
        let fields = [
            KeyField::new("B2", KeyFieldType::Binary2),
            KeyField::new("B4", KeyFieldType::Binary4),
            KeyField::new("B8", KeyFieldType::Binary8),
        ];
        let key = encode_key(
            &fields,
            &[
                Some(KeyValue::Number(-2)),
                Some(KeyValue::Number(0x01020304)),
                Some(KeyValue::Number(1)),
            ],
        )
        .unwrap();
        assert_eq!(key.len(), 2 + 4 + 8);
        assert_eq!(&key[..2], &[0xFF, 0xFE]);
        assert_eq!(&key[2..6], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&key[6..], &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_binary2_overflow() {
        let err = encode_key(
            &[KeyField::new("B2", KeyFieldType::Binary2)],
            &[Some(KeyValue::Number(70000))],
        );
        assert!(matches!(err, Err(DdmError::DigitOverflow { .. })));
    }

    #[test]
    fn test_zoned_encoding() {
        assert_eq!(encode_zoned(123, 5).unwrap(), vec![0xF0, 0xF0, 0xF1, 0xF2, 0xF3]);
        assert_eq!(encode_zoned(-45, 3).unwrap(), vec![0xF0, 0xF4, 0xD5]);
        assert!(matches!(encode_zoned(1234, 3), Err(DdmError::DigitOverflow { .. })));
    }

    #[test]
    fn test_packed_encoding() {
        // 5 digits -> 3 bytes, trailing sign nibble
        assert_eq!(encode_packed(123, 5).unwrap(), vec![0x00, 0x12, 0x3F]);
        assert_eq!(encode_packed(-123, 5).unwrap(), vec![0x00, 0x12, 0x3D]);
        // even digit count gets a leading zero nibble: 4 digits -> 3 bytes
        assert_eq!(encode_packed(1234, 4).unwrap(), vec![0x01, 0x23, 0x4F]);
    }

    #[test]
    fn test_encoded_width_matches_output() {
        let fields = [
            char_field(7, true),
            KeyField::new("Z", KeyFieldType::Zoned { digits: 5 }),
            KeyField::new("P", KeyFieldType::Packed { digits: 5 }),
        ];
        let key = encode_key(
            &fields,
            &[
                Some(KeyValue::Text("K".to_string())),
                Some(KeyValue::Number(9)),
                Some(KeyValue::Number(9)),
            ],
        )
        .unwrap();
        let expected: usize = fields.iter().map(KeyField::encoded_width).sum();
        assert_eq!(key.len(), expected);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let err = encode_key(
            &[KeyField::new("B4", KeyFieldType::Binary4)],
            &[Some(KeyValue::Text("NOPE".to_string()))],
        );
        assert!(matches!(err, Err(DdmError::InvalidParameter { .. })));
    }
}
