//! DDM frame construction: header plus recursive length-prefixed terms
//!
//! A DDM request frame is a fixed 6-byte header followed by nested
//! type-length-value "terms": `[u16 length][u16 code point][value bytes]`,
//! where the length counts from the length field's own first byte through
//! the last value byte, including any nested sub-terms. All integers are
//! big-endian.
//!
//! Request builders describe an operation as a declarative term schema and
//! one generic writer lays out the bytes and computes every length field.
//! No builder recomputes offsets by hand.

use crate::error::{DdmError, DdmResult};

use super::codes::{FMT_RQSDSS, GDS_ID, HEADER_SIZE};

/// Size of the length + code point prefix of a term
const TERM_PREFIX: usize = 4;

/// One value in a term schema: raw bytes or a list of nested terms
#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    /// Raw payload bytes
    Bytes(Vec<u8>),
    /// Nested sub-terms; their lengths are computed recursively
    Terms(Vec<Term>),
}

/// A single schema term: a code point plus its value
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub code_point: u16,
    pub value: TermValue,
}

impl Term {
    /// A leaf term carrying raw bytes
    pub fn bytes(code_point: u16, value: Vec<u8>) -> Self {
        Self { code_point, value: TermValue::Bytes(value) }
    }

    /// A term containing nested sub-terms
    pub fn nested(code_point: u16, terms: Vec<Term>) -> Self {
        Self { code_point, value: TermValue::Terms(terms) }
    }

    /// A leaf term carrying a single option byte
    pub fn byte(code_point: u16, value: u8) -> Self {
        Self::bytes(code_point, vec![value])
    }

    /// A leaf term carrying a big-endian u16
    pub fn u16(code_point: u16, value: u16) -> Self {
        Self::bytes(code_point, value.to_be_bytes().to_vec())
    }

    /// A leaf term carrying a big-endian u32
    pub fn u32(code_point: u16, value: u32) -> Self {
        Self::bytes(code_point, value.to_be_bytes().to_vec())
    }

    /// Total encoded size: prefix plus value, recursively
    fn encoded_len(&self) -> usize {
        TERM_PREFIX + self.value_len()
    }

    fn value_len(&self) -> usize {
        match &self.value {
            TermValue::Bytes(b) => b.len(),
            TermValue::Terms(ts) => ts.iter().map(Term::encoded_len).sum(),
        }
    }

    fn write_into(&self, buf: &mut Vec<u8>) -> DdmResult<()> {
        let len = self.encoded_len();
        if len > u16::MAX as usize {
            return Err(DdmError::FrameTooLarge { length: len });
        }
        buf.extend_from_slice(&(len as u16).to_be_bytes());
        buf.extend_from_slice(&self.code_point.to_be_bytes());
        match &self.value {
            TermValue::Bytes(b) => buf.extend_from_slice(b),
            TermValue::Terms(ts) => {
                for t in ts {
                    t.write_into(buf)?;
                }
            }
        }
        Ok(())
    }
}

/// Build a complete request frame for one operation
///
/// Layout: 6-byte header, then at offset 6 the operation term: a u16
/// length covering offsets 6..end, the u16 operation code point at offset
/// 8, and the parameter terms. The header length field at offset 0 covers
/// the whole frame.
pub fn build_request(
    operation: u16,
    correlation_id: u16,
    parameters: Vec<Term>,
) -> DdmResult<Vec<u8>> {
    build_request_fmt(operation, correlation_id, parameters, FMT_RQSDSS)
}

/// Like [`build_request`] but with an explicit format flag byte
///
/// Used for the fire-and-forget variant where no reply DSS is expected.
pub fn build_request_fmt(
    operation: u16,
    correlation_id: u16,
    parameters: Vec<Term>,
    format: u8,
) -> DdmResult<Vec<u8>> {
    let op_term = Term::nested(operation, parameters);
    let op_len = op_term.encoded_len();
    let total = HEADER_SIZE + op_len;
    if total > u16::MAX as usize {
        return Err(DdmError::FrameTooLarge { length: total });
    }

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as u16).to_be_bytes());
    buf.push(GDS_ID);
    buf.push(format);
    buf.extend_from_slice(&correlation_id.to_be_bytes());
    op_term.write_into(&mut buf)?;

    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

/// Walk every length field in an encoded frame and verify the TLV invariant
///
/// Checks that each 2-byte length equals the byte distance from the length
/// field's own first byte to the end of its value, at every nesting level.
/// The operation term's body is always a run of parameter terms, so it is
/// verified as such unconditionally; only deeper values are ambiguous
/// (record data versus nested terms) and go through the heuristic. Used by
/// tests and the dump tool; the builders uphold the invariant by
/// construction.
pub fn verify_lengths(frame: &[u8]) -> Result<(), String> {
    if frame.len() < HEADER_SIZE + TERM_PREFIX {
        return Err(format!("frame shorter than header plus operation term: {} bytes", frame.len()));
    }
    let total = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if total != frame.len() {
        return Err(format!("header length {total} != frame length {}", frame.len()));
    }
    if frame[2] != GDS_ID {
        return Err(format!("bad GDS id 0x{:02X}", frame[2]));
    }
    let op_term = &frame[HEADER_SIZE..];
    let op_len = u16::from_be_bytes([op_term[0], op_term[1]]) as usize;
    if op_len != op_term.len() {
        return Err(format!(
            "operation term length {op_len} != {} remaining bytes",
            op_term.len()
        ));
    }
    verify_term_run(&op_term[TERM_PREFIX..])
}

fn verify_term_run(mut rest: &[u8]) -> Result<(), String> {
    while !rest.is_empty() {
        if rest.len() < TERM_PREFIX {
            return Err(format!("truncated term prefix: {} bytes left", rest.len()));
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        if len < TERM_PREFIX || len > rest.len() {
            return Err(format!("term length {len} out of range ({} left)", rest.len()));
        }
        let body = &rest[TERM_PREFIX..len];
        // A body that itself parses as a well-formed term run is treated as
        // nested; leaf values (record data, key bytes) rarely do, and when
        // one happens to, its lengths are consistent anyway.
        if looks_like_term_run(body) {
            verify_term_run(body)?;
        }
        rest = &rest[len..];
    }
    Ok(())
}

fn looks_like_term_run(body: &[u8]) -> bool {
    let mut rest = body;
    if rest.is_empty() {
        return false;
    }
    while !rest.is_empty() {
        if rest.len() < TERM_PREFIX {
            return false;
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        if len < TERM_PREFIX || len > rest.len() {
            return false;
        }
        rest = &rest[len..];
    }
    true
}
