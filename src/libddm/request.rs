//! DDM request builders for record-level file access
//!
//! One builder per host operation. Builders are pure: they validate their
//! parameters, lay out the term schema, and return the encoded frame bytes.
//! They never perform I/O and never retry; sending the frame and
//! interpreting the reply belong to the caller.

use crate::ebcdic;
use crate::error::DdmResult;

use super::codes::*;
use super::frame::{build_request, build_request_fmt, Term};
use super::keyfields::{encode_key, KeyField, KeyValue};

/// Share/type/data option bytes for a get or open operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionList {
    /// Retrieval type (`options::TYPE_*`)
    pub record_type: u8,
    /// Share option (`options::SHARE_*`)
    pub share: u8,
    /// Data option (`options::DATA_*`)
    pub data: u8,
}

impl OptionList {
    pub fn new(record_type: u8, share: u8, data: u8) -> Self {
        Self { record_type, share, data }
    }

    fn term(&self) -> Term {
        Term::bytes(CP_S38OPTL, vec![self.record_type, self.share, self.data])
    }
}

impl Default for OptionList {
    fn default() -> Self {
        Self {
            record_type: options::TYPE_NEXT,
            share: options::SHARE_READ,
            data: options::DATA_DATA,
        }
    }
}

/// A declared-file handle: the 8-byte DCLNAM token identifying an open
/// file declaration on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredName([u8; 8]);

impl DeclaredName {
    /// Build a declared name from up to 8 characters, blank padded
    pub fn new(name: &str) -> DdmResult<Self> {
        Ok(Self(ebcdic::encode_name8(name)?))
    }

    fn term(&self) -> Term {
        Term::bytes(CP_DCLNAM, self.0.to_vec())
    }
}

/// Open a declared file
///
/// Carries the file name (EBCDIC), the declared-name token the host will
/// associate with the open file, and the option bytes.
pub fn open(
    dclnam: &DeclaredName,
    file_name: &str,
    opts: OptionList,
    correlation_id: u16,
) -> DdmResult<Vec<u8>> {
    let file = ebcdic::string_to_ebcdic(file_name)?;
    build_request(
        CP_S38OPEN,
        correlation_id,
        vec![dclnam.term(), Term::bytes(CP_FILNAM, file), opts.term()],
    )
}

/// Close a declared file
pub fn close(dclnam: &DeclaredName, correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38CLOSE, correlation_id, vec![dclnam.term()])
}

/// Get a record according to the option bytes (next/previous/first/last)
pub fn get(dclnam: &DeclaredName, opts: OptionList, correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38GET, correlation_id, vec![dclnam.term(), opts.term()])
}

/// Get the record at a relative record number
pub fn get_at_position(
    dclnam: &DeclaredName,
    rrn: u32,
    opts: OptionList,
    correlation_id: u16,
) -> DdmResult<Vec<u8>> {
    build_request(
        CP_S38GETD,
        correlation_id,
        vec![dclnam.term(), Term::u32(CP_S38RRN, rrn), opts.term()],
    )
}

/// Get a record by key
///
/// `values` may cover a leading subset of the declared key fields; the
/// number of fields searched on travels in its own term. Key bytes are the
/// concatenated host-native field encodings.
pub fn get_by_key(
    dclnam: &DeclaredName,
    fields: &[KeyField],
    values: &[Option<KeyValue>],
    opts: OptionList,
    correlation_id: u16,
) -> DdmResult<Vec<u8>> {
    let key = encode_key(fields, values)?;
    build_request(
        CP_S38GETK,
        correlation_id,
        vec![
            dclnam.term(),
            Term::u16(CP_S38KEYCNT, values.len() as u16),
            Term::bytes(CP_S38KEYVAL, key),
            opts.term(),
        ],
    )
}

/// Put (append) a record
pub fn put(dclnam: &DeclaredName, record: &[u8], correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(
        CP_S38PUTM,
        correlation_id,
        vec![dclnam.term(), Term::bytes(CP_S38RECDTA, record.to_vec())],
    )
}

/// Update the record at the current cursor position
pub fn update(
    dclnam: &DeclaredName,
    record: &[u8],
    opts: OptionList,
    correlation_id: u16,
) -> DdmResult<Vec<u8>> {
    build_request(
        CP_S38UPDAT,
        correlation_id,
        vec![dclnam.term(), opts.term(), Term::bytes(CP_S38RECDTA, record.to_vec())],
    )
}

/// Delete the record at the current cursor position
pub fn delete(dclnam: &DeclaredName, opts: OptionList, correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38DEL, correlation_id, vec![dclnam.term(), opts.term()])
}

/// Force buffered changes to disk
pub fn force_end_of_data(dclnam: &DeclaredName, correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38FEOD, correlation_id, vec![dclnam.term()])
}

/// Commit the current transaction
pub fn commit(correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38CMT, correlation_id, vec![])
}

/// Roll back the current transaction
pub fn rollback(correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request(CP_S38RLLBCK, correlation_id, vec![])
}

/// Close with no reply expected, used on teardown paths where the caller
/// will not wait for the host
pub fn close_no_reply(dclnam: &DeclaredName, correlation_id: u16) -> DdmResult<Vec<u8>> {
    build_request_fmt(CP_S38CLOSE, correlation_id, vec![dclnam.term()], FMT_RQSDSS_NOREPLY)
}
