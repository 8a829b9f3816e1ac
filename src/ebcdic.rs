//! EBCDIC CP037 conversion for host field encoding
//!
//! DDM request payloads carry character data in the host's EBCDIC encoding.
//! This module provides CP037 (EBCDIC US/Canada) conversion in both
//! directions plus the fixed-width field encoding used by the key-field
//! encoder. The reverse mapping is derived from the forward table at first
//! use instead of being hand-maintained, so the two can never drift apart.

use once_cell::sync::Lazy;

use crate::error::{DdmError, DdmResult};

/// EBCDIC space, used for field padding
pub const EBCDIC_SPACE: u8 = 0x40;

/// EBCDIC to Unicode translation table (CP037)
///
/// Maps all 256 EBCDIC code points to their Unicode equivalents. Code page
/// 037 is the standard EBCDIC encoding for US/Canada English and the common
/// default CCSID on AS/400 systems.
const EBCDIC_CP037_TO_CHAR: [char; 256] = [
    // 0x00-0x0F: Control characters
    '\x00', '\x01', '\x02', '\x03', '\u{009C}', '\t', '\u{0086}', '\x7F',
    '\u{0097}', '\u{008D}', '\u{008E}', '\x0B', '\x0C', '\r', '\x0E', '\x0F',
    // 0x10-0x1F: Control characters
    '\x10', '\x11', '\x12', '\x13', '\u{009D}', '\u{0085}', '\x08', '\u{0087}',
    '\x18', '\x19', '\u{0092}', '\u{008F}', '\x1C', '\x1D', '\x1E', '\x1F',
    // 0x20-0x2F: Control characters and special
    '\u{0080}', '\u{0081}', '\u{0082}', '\u{0083}', '\u{0084}', '\n', '\x17', '\x1B',
    '\u{0088}', '\u{0089}', '\u{008A}', '\u{008B}', '\u{008C}', '\x05', '\x06', '\x07',
    // 0x30-0x3F: Control characters
    '\u{0090}', '\u{0091}', '\x16', '\u{0093}', '\u{0094}', '\u{0095}', '\u{0096}', '\x04',
    '\u{0098}', '\u{0099}', '\u{009A}', '\u{009B}', '\x14', '\x15', '\u{009E}', '\x1A',
    // 0x40-0x4F: Space and special characters
    ' ', '\u{00A0}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E1}', '\u{00E3}', '\u{00E5}',
    '\u{00E7}', '\u{00F1}', '\u{00A2}', '.', '<', '(', '+', '|',
    // 0x50-0x5F: Ampersand and special characters
    '&', '\u{00E9}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00ED}', '\u{00EE}', '\u{00EF}',
    '\u{00EC}', '\u{00DF}', '!', '$', '*', ')', ';', '\u{00AC}',
    // 0x60-0x6F: Dash and special characters
    '-', '/', '\u{00C2}', '\u{00C4}', '\u{00C0}', '\u{00C1}', '\u{00C3}', '\u{00C5}',
    '\u{00C7}', '\u{00D1}', '\u{00A6}', ',', '%', '_', '>', '?',
    // 0x70-0x7F: Special characters and quotes
    '\u{00F8}', '\u{00C9}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}',
    '\u{00CC}', '`', ':', '#', '@', '\'', '=', '"',
    // 0x80-0x8F: Special character and lowercase a-i
    '\u{00D8}', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', '\u{00AB}', '\u{00BB}', '\u{00F0}', '\u{00FD}', '\u{00FE}', '\u{00B1}',
    // 0x90-0x9F: Degree symbol and lowercase j-r
    '\u{00B0}', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
    'q', 'r', '\u{00AA}', '\u{00BA}', '\u{00E6}', '\u{00B8}', '\u{00C6}', '\u{00A4}',
    // 0xA0-0xAF: Micro sign and lowercase s-z
    '\u{00B5}', '~', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '\u{00A1}', '\u{00BF}', '\u{00D0}', '\u{00DD}', '\u{00DE}', '\u{00AE}',
    // 0xB0-0xBF: Caret and special characters
    '^', '\u{00A3}', '\u{00A5}', '\u{00B7}', '\u{00A9}', '\u{00A7}', '\u{00B6}', '\u{00BC}',
    '\u{00BD}', '\u{00BE}', '[', ']', '\u{00AF}', '\u{00A8}', '\u{00B4}', '\u{00D7}',
    // 0xC0-0xCF: Left brace and uppercase A-I
    '{', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', '\u{00AD}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00F3}', '\u{00F5}',
    // 0xD0-0xDF: Right brace and uppercase J-R
    '}', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
    'Q', 'R', '\u{00B9}', '\u{00FB}', '\u{00FC}', '\u{00F9}', '\u{00FA}', '\u{00FF}',
    // 0xE0-0xEF: Backslash and uppercase S-Z
    '\\', '\u{00F7}', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '\u{00B2}', '\u{00D4}', '\u{00D6}', '\u{00D2}', '\u{00D3}', '\u{00D5}',
    // 0xF0-0xFF: Digits 0-9 and special characters
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', '\u{00B3}', '\u{00DB}', '\u{00DC}', '\u{00D9}', '\u{00DA}', '\u{009F}',
];

/// Reverse table derived from the forward table at first use
///
/// Indexed by Unicode scalar value for the Latin-1 range; everything CP037
/// can represent lies below U+0100.
static CHAR_TO_EBCDIC_CP037: Lazy<[Option<u8>; 256]> = Lazy::new(|| {
    let mut table = [None; 256];
    for (ebcdic, &ch) in EBCDIC_CP037_TO_CHAR.iter().enumerate() {
        let cp = ch as usize;
        if cp < 256 && table[cp].is_none() {
            table[cp] = Some(ebcdic as u8);
        }
    }
    table
});

/// Convert an EBCDIC byte to its Unicode character
pub fn ebcdic_to_char(byte: u8) -> char {
    EBCDIC_CP037_TO_CHAR[byte as usize]
}

/// Convert a Unicode character to its EBCDIC byte, if representable
pub fn char_to_ebcdic(ch: char) -> Option<u8> {
    let cp = ch as usize;
    if cp < 256 {
        CHAR_TO_EBCDIC_CP037[cp]
    } else {
        None
    }
}

/// Convert an EBCDIC byte slice to a String
pub fn ebcdic_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| ebcdic_to_char(b)).collect()
}

/// Convert a string to EBCDIC bytes, rejecting unrepresentable characters
///
/// Field encoding must not silently substitute characters: a key built from
/// a lossy value would select the wrong record on the host.
pub fn string_to_ebcdic(s: &str) -> DdmResult<Vec<u8>> {
    s.chars()
        .map(|ch| char_to_ebcdic(ch).ok_or(DdmError::CharsetConversion { ch }))
        .collect()
}

/// Encode a string into exactly `width` EBCDIC bytes, blank padded
///
/// Returns `FieldTooLong` when the converted value exceeds the width. The
/// `field` index is only used for error reporting.
pub fn encode_fixed(s: &str, width: usize, field: usize) -> DdmResult<Vec<u8>> {
    let mut bytes = string_to_ebcdic(s)?;
    if bytes.len() > width {
        return Err(DdmError::FieldTooLong { field, length: bytes.len(), width });
    }
    bytes.resize(width, EBCDIC_SPACE);
    Ok(bytes)
}

/// Encode a declared-name token: exactly 8 EBCDIC bytes, blank padded
///
/// DCLNAM tokens identify a declared file on the host and are always
/// transmitted as a full 8-byte field.
pub fn encode_name8(name: &str) -> DdmResult<[u8; 8]> {
    let bytes = string_to_ebcdic(name)
        .map_err(|_| DdmError::InvalidDeclaredName { name: name.to_string() })?;
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(DdmError::InvalidDeclaredName { name: name.to_string() });
    }
    let mut out = [EBCDIC_SPACE; 8];
    out[..bytes.len()].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(ebcdic_to_char(0xC1), 'A');
        assert_eq!(ebcdic_to_char(0x81), 'a');
        assert_eq!(ebcdic_to_char(0xF0), '0');
        assert_eq!(char_to_ebcdic('A'), Some(0xC1));
        assert_eq!(char_to_ebcdic('z'), Some(0xA9));
        assert_eq!(char_to_ebcdic('9'), Some(0xF9));
    }

    #[test]
    fn test_round_trip_all_code_points() {
        // Every EBCDIC byte must survive a round trip through the derived
        // reverse table.
        for b in 0..=255u8 {
            let ch = ebcdic_to_char(b);
            let back = char_to_ebcdic(ch).unwrap();
            assert_eq!(ebcdic_to_char(back), ch, "round trip failed for 0x{b:02X}");
        }
    }

    #[test]
    fn test_unrepresentable_rejected() {
        assert_eq!(char_to_ebcdic('\u{4E2D}'), None);
        assert!(matches!(
            string_to_ebcdic("中"),
            Err(DdmError::CharsetConversion { .. })
        ));
    }

    #[test]
    fn test_encode_fixed_pads_with_blanks() {
        let bytes = encode_fixed("AB", 5, 0).unwrap();
        assert_eq!(bytes, vec![0xC1, 0xC2, 0x40, 0x40, 0x40]);
    }

    #[test]
    fn test_encode_fixed_rejects_overflow() {
        assert_eq!(
            encode_fixed("TOOLONG", 3, 2),
            Err(DdmError::FieldTooLong { field: 2, length: 7, width: 3 })
        );
    }

    #[test]
    fn test_encode_name8() {
        let tok = encode_name8("QTEMP").unwrap();
        assert_eq!(&tok[..5], &[0xD8, 0xE3, 0xC5, 0xD4, 0xD7]);
        assert_eq!(&tok[5..], &[0x40, 0x40, 0x40]);
        assert!(encode_name8("").is_err());
        assert!(encode_name8("LONGERTHAN8").is_err());
    }

    #[test]
    fn test_string_conversion() {
        let ebcdic = string_to_ebcdic("HELLO").unwrap();
        assert_eq!(ebcdic, vec![0xC8, 0xC5, 0xD3, 0xD3, 0xD6]);
        assert_eq!(ebcdic_to_string(&ebcdic), "HELLO");
    }
}
