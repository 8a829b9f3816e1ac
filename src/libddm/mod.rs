//! LIBDDM: DDM request stream encoding for record-level file access
//!
//! Pure, stateless construction of binary DDM request frames: a fixed
//! 6-byte header followed by nested length-prefixed terms, matching the
//! externally fixed byte-for-byte layout per operation. Sending frames and
//! interpreting replies is the transport layer's job.

pub mod codes;
pub mod frame;
pub mod keyfields;
pub mod request;

pub use codes::code_point_name;
pub use frame::{build_request, verify_lengths, Term, TermValue};
pub use keyfields::{encode_key, KeyField, KeyFieldType, KeyValue};
pub use request::{DeclaredName, OptionList};
