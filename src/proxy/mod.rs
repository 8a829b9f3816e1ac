//! Proxy RPC client: remote object construction, method calls, events,
//! and background release
//!
//! The proxy protocol lets a client hold references to objects living in a
//! server process and invoke methods on them over a socket. This module
//! provides the datagram wire format, the connection state machine, the
//! event listener table, and the finalizer worker that releases remote
//! objects without blocking callers.

pub mod connection;
pub mod datastream;
pub mod events;
pub mod reaper;

pub use connection::{
    CallOptions, CallOutcome, ConnectionState, ProxyConnection, PROXY_PROTOCOL_VERSION,
};
pub use datastream::{Datagram, DatagramFactory, PxValue, FLAG_ASYNC, FLAG_WANTS_RETURN_ARGS};
pub use events::{ListenerTable, ProxyEvent, ProxyEventListener};
pub use reaper::Reaper;
