//! Error handling for ddm400r
//!
//! This module provides structured error types for the DDM request encoder,
//! the proxy RPC connection, networking, and configuration. Remote proxy
//! failures are modeled as a single tagged kind rather than a ladder of
//! exception classes; callers match on the kinds they care about and every
//! unrecognized remote failure degrades to `Internal`.

use std::fmt;
use std::io;
use std::error::Error as StdError;

/// Top-level error type for ddm400r operations
#[derive(Debug)]
pub enum Ddm400Error {
    /// DDM request encoding errors (local validation, pre-I/O)
    Ddm(DdmError),
    /// Proxy RPC errors (remote rejection or transport failure)
    Proxy(ProxyError),
    /// Network connection errors
    Network(NetworkError),
    /// Configuration errors
    Config(ConfigError),
}

/// DDM request encoder errors
///
/// All of these are detected before any network I/O happens. They indicate
/// a programming or usage error and are never retryable.
#[derive(Debug, Clone, PartialEq)]
pub enum DdmError {
    /// Key or record field value exceeds its declared width
    FieldTooLong { field: usize, length: usize, width: usize },
    /// Numeric value does not fit the declared digit count
    DigitOverflow { value: i64, digits: u8 },
    /// A key field value was not supplied; the protocol has no
    /// representation for an unset key field
    NullKeyValue { field: usize },
    /// get-by-key was asked to search with zero key fields
    EmptyKeyList,
    /// Character cannot be represented in the target EBCDIC code page
    CharsetConversion { ch: char },
    /// Declared-name token must be exactly 8 bytes after conversion
    InvalidDeclaredName { name: String },
    /// Frame or term payload exceeds the 16-bit length field
    FrameTooLarge { length: usize },
    /// Generic invalid builder parameter
    InvalidParameter { parameter: String, reason: String },
}

/// Classified proxy RPC failure kinds
///
/// Rejected replies from the proxy server carry one of these tags. The
/// `Internal` kind is the fallback for a tag the client does not recognize:
/// it indicates a protocol mismatch or a server-side type the client has no
/// knowledge of, and is always a defect, never an expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyErrorKind {
    /// Underlying I/O failure
    Io,
    /// Host security / authorization failure
    Security,
    /// The blocked call was interrupted
    Interrupted,
    /// The host reported an error completing the request
    ErrorCompletingRequest,
    /// Target object does not exist on the host
    ObjectDoesNotExist,
    /// Target object already exists on the host
    ObjectAlreadyExists,
    /// The host does not support the requested operation
    RequestNotSupported,
    /// Unrecognized remote failure or client/server protocol mismatch
    Internal,
}

/// A proxy RPC error: a classified kind plus the remote (or local) message
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyError {
    pub kind: ProxyErrorKind,
    pub message: String,
}

/// Widening tiers for proxy call sites
///
/// Each calling convention accepts a cumulative set of error kinds; a
/// rejected reply whose kind falls outside the tier's set is degraded to
/// `Internal` before it reaches the caller. Tiers are strictly cumulative,
/// mirroring the widened-but-compatible checked sets of the original
/// calling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RethrowTier {
    /// I/O only
    Io,
    /// + security
    Security,
    /// + interrupted
    Interrupted,
    /// + error completing request
    ErrorCompletingRequest,
    /// + object does not exist
    ObjectDoesNotExist,
    /// + object already exists
    ObjectAlreadyExists,
    /// + request not supported (widest tier)
    RequestNotSupported,
}

/// Network connection related errors
#[derive(Debug)]
pub enum NetworkError {
    /// Connection refused by remote host
    ConnectionRefused { host: String, port: u16 },
    /// Connection attempt or read/write timed out
    Timeout { host: String, port: u16, timeout_seconds: u64 },
    /// DNS resolution failure
    DnsResolution { host: String },
    /// Connection lost during operation
    ConnectionLost { reason: String },
    /// Invalid network address
    InvalidAddress { address: String },
    /// TLS handshake or certificate error
    TlsError { message: String },
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Missing required configuration
    MissingRequired { parameter: String },
    /// Configuration file error
    FileError { path: String, error: String },
}

impl ProxyError {
    pub fn new<S: Into<String>>(kind: ProxyErrorKind, message: S) -> Self {
        Self { kind, message: message.into() }
    }

    /// Shorthand for the internal-error fallback
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ProxyErrorKind::Internal, message)
    }

    /// Decode a wire tag byte into a kind; unknown tags map to `Internal`
    pub fn kind_from_tag(tag: u8) -> ProxyErrorKind {
        match tag {
            0x01 => ProxyErrorKind::Io,
            0x02 => ProxyErrorKind::Security,
            0x03 => ProxyErrorKind::Interrupted,
            0x04 => ProxyErrorKind::ErrorCompletingRequest,
            0x05 => ProxyErrorKind::ObjectDoesNotExist,
            0x06 => ProxyErrorKind::ObjectAlreadyExists,
            0x07 => ProxyErrorKind::RequestNotSupported,
            _ => ProxyErrorKind::Internal,
        }
    }

    /// Encode a kind into its wire tag byte
    pub fn tag_for_kind(kind: ProxyErrorKind) -> u8 {
        match kind {
            ProxyErrorKind::Io => 0x01,
            ProxyErrorKind::Security => 0x02,
            ProxyErrorKind::Interrupted => 0x03,
            ProxyErrorKind::ErrorCompletingRequest => 0x04,
            ProxyErrorKind::ObjectDoesNotExist => 0x05,
            ProxyErrorKind::ObjectAlreadyExists => 0x06,
            ProxyErrorKind::RequestNotSupported => 0x07,
            ProxyErrorKind::Internal => 0xFF,
        }
    }
}

impl RethrowTier {
    /// Whether a call site at this tier accepts the given error kind
    ///
    /// `Io` and `Internal` are accepted at every tier: I/O failure can hit
    /// any call, and `Internal` is the terminal fallback.
    pub fn accepts(&self, kind: ProxyErrorKind) -> bool {
        let rank = match kind {
            ProxyErrorKind::Io | ProxyErrorKind::Internal => return true,
            ProxyErrorKind::Security => RethrowTier::Security,
            ProxyErrorKind::Interrupted => RethrowTier::Interrupted,
            ProxyErrorKind::ErrorCompletingRequest => RethrowTier::ErrorCompletingRequest,
            ProxyErrorKind::ObjectDoesNotExist => RethrowTier::ObjectDoesNotExist,
            ProxyErrorKind::ObjectAlreadyExists => RethrowTier::ObjectAlreadyExists,
            ProxyErrorKind::RequestNotSupported => RethrowTier::RequestNotSupported,
        };
        *self >= rank
    }

    /// Widen an error into this tier's accepted set
    ///
    /// Kinds outside the set degrade to `Internal`, preserving the original
    /// kind name in the message so protocol mismatches remain diagnosable.
    pub fn widen(&self, err: ProxyError) -> ProxyError {
        if self.accepts(err.kind) {
            err
        } else {
            ProxyError::internal(format!(
                "unexpected remote error kind {:?} at tier {:?}: {}",
                err.kind, self, err.message
            ))
        }
    }
}

impl fmt::Display for Ddm400Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ddm400Error::Ddm(err) => write!(f, "DDM encoding error: {err}"),
            Ddm400Error::Proxy(err) => write!(f, "Proxy error: {err}"),
            Ddm400Error::Network(err) => write!(f, "Network error: {err}"),
            Ddm400Error::Config(err) => write!(f, "Configuration error: {err}"),
        }
    }
}

impl fmt::Display for DdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdmError::FieldTooLong { field, length, width } =>
                write!(f, "Field {field} value length {length} exceeds declared width {width}"),
            DdmError::DigitOverflow { value, digits } =>
                write!(f, "Value {value} does not fit in {digits} digits"),
            DdmError::NullKeyValue { field } =>
                write!(f, "Key field {field} has no value; the protocol cannot represent an unset key field"),
            DdmError::EmptyKeyList =>
                write!(f, "At least one key field is required"),
            DdmError::CharsetConversion { ch } =>
                write!(f, "Character '{ch}' cannot be converted to EBCDIC CP037"),
            DdmError::InvalidDeclaredName { name } =>
                write!(f, "Declared name '{name}' must convert to exactly 8 EBCDIC bytes"),
            DdmError::FrameTooLarge { length } =>
                write!(f, "Frame length {length} exceeds the 16-bit DDM length field"),
            DdmError::InvalidParameter { parameter, reason } =>
                write!(f, "Invalid parameter '{parameter}': {reason}"),
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::ConnectionRefused { host, port } =>
                write!(f, "Connection refused to {host}:{port}"),
            NetworkError::Timeout { host, port, timeout_seconds } =>
                write!(f, "Connection timeout to {host}:{port} after {timeout_seconds}s"),
            NetworkError::DnsResolution { host } =>
                write!(f, "DNS resolution failed for {host}"),
            NetworkError::ConnectionLost { reason } =>
                write!(f, "Connection lost: {reason}"),
            NetworkError::InvalidAddress { address } =>
                write!(f, "Invalid network address: {address}"),
            NetworkError::TlsError { message } =>
                write!(f, "TLS error: {message}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } =>
                write!(f, "Invalid configuration parameter '{parameter}' = '{value}': {reason}"),
            ConfigError::MissingRequired { parameter } =>
                write!(f, "Missing required configuration parameter: {parameter}"),
            ConfigError::FileError { path, error } =>
                write!(f, "Configuration file error '{path}': {error}"),
        }
    }
}

impl StdError for Ddm400Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Ddm400Error::Ddm(err) => Some(err),
            Ddm400Error::Proxy(err) => Some(err),
            Ddm400Error::Network(err) => Some(err),
            Ddm400Error::Config(err) => Some(err),
        }
    }
}

impl StdError for DdmError {}
impl StdError for ProxyError {}
impl StdError for NetworkError {}
impl StdError for ConfigError {}

impl From<DdmError> for Ddm400Error {
    fn from(err: DdmError) -> Self {
        Ddm400Error::Ddm(err)
    }
}

impl From<ProxyError> for Ddm400Error {
    fn from(err: ProxyError) -> Self {
        Ddm400Error::Proxy(err)
    }
}

impl From<NetworkError> for Ddm400Error {
    fn from(err: NetworkError) -> Self {
        Ddm400Error::Network(err)
    }
}

impl From<ConfigError> for Ddm400Error {
    fn from(err: ConfigError) -> Self {
        Ddm400Error::Config(err)
    }
}

impl From<io::Error> for ProxyError {
    fn from(err: io::Error) -> Self {
        ProxyError::new(ProxyErrorKind::Io, err.to_string())
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused {
                host: "unknown".to_string(),
                port: 0,
            },
            io::ErrorKind::TimedOut => NetworkError::Timeout {
                host: "unknown".to_string(),
                port: 0,
                timeout_seconds: 30,
            },
            io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset => {
                NetworkError::ConnectionLost { reason: err.to_string() }
            }
            _ => NetworkError::ConnectionLost {
                reason: format!("IO Error: {err}"),
            },
        }
    }
}

/// Result type alias for ddm400r operations
pub type Ddm400Result<T> = Result<T, Ddm400Error>;

/// Specialized result types for different components
pub type DdmResult<T> = Result<T, DdmError>;
pub type ProxyResult<T> = Result<T, ProxyError>;
pub type NetworkResult<T> = Result<T, NetworkError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
