/// LIBDDM: DDM request stream encoding
/// Builds the byte-for-byte binary request frames for record-level file
/// access against AS/400-class hosts
pub mod libddm;

/// PROXY: Proxy RPC client connection
/// Remote object construction, method calls, events, and background
/// release over a two-channel socket protocol
pub mod proxy;

/// EBCDIC CP037 character conversion and fixed-width field encoding
pub mod ebcdic;

pub mod config;
pub mod error;
pub mod network;

// Re-export the pieces most callers need
pub use error::{Ddm400Error, Ddm400Result, ProxyError, ProxyErrorKind, RethrowTier};
pub use proxy::{CallOptions, CallOutcome, ProxyConnection};
