//! Proxy RPC datagram framing and parameter encoding
//!
//! A private wire format: every datagram is a fixed 8-byte frame header
//! `[u16 magic][u8 kind][u8 flags][u32 payload length]` followed by a
//! kind-specific payload. Parameter values are tagged unions covering the
//! primitive kinds, strings, serialized object bytes, class names, and
//! null.
//!
//! Datagram kinds are looked up through a per-connection
//! [`DatagramFactory`]; nothing in this module is process-global, so two
//! connections in one process can never cross-contaminate their
//! registered kinds. The connection re-registers the full kind table on
//! every (re)open because the factory is rebuilt per socket.

use std::collections::HashMap;

use crate::error::{ProxyError, ProxyErrorKind, ProxyResult};
use crate::network::ProxyTransport;

/// Frame magic, "Px" in ASCII
pub const FRAME_MAGIC: u16 = 0x5078;

/// Frame header size: magic, kind, flags, payload length
pub const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound on a datagram payload; no legitimate datagram approaches
/// this, so a larger declared length is a corrupt or hostile header and is
/// rejected before any allocation
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Call flag: fire-and-continue at the application level; the transport
/// still performs a full request/reply round trip for bookkeeping
pub const FLAG_ASYNC: u8 = 0x01;
/// Call flag: modified copies of selected arguments are returned
pub const FLAG_WANTS_RETURN_ARGS: u8 = 0x02;

/// Datagram kind bytes
pub mod kinds {
    pub const CONNECT: u8 = 0x10;
    pub const CONSTRUCT: u8 = 0x11;
    pub const METHOD_CALL: u8 = 0x12;
    pub const FACTORY_CALL: u8 = 0x13;
    pub const LISTENER_ADD: u8 = 0x14;
    pub const LISTENER_REMOVE: u8 = 0x15;
    pub const FINALIZE: u8 = 0x16;

    pub const CONNECT_REPLY: u8 = 0x20;
    pub const CONSTRUCT_REPLY: u8 = 0x21;
    pub const ACCEPT: u8 = 0x22;
    pub const RETURN_VALUE: u8 = 0x23;
    pub const REJECT: u8 = 0x24;
    pub const EVENT: u8 = 0x25;
}

/// A parameter or return value crossing the proxy boundary
#[derive(Debug, Clone, PartialEq)]
pub enum PxValue {
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    /// Opaque serialized object bytes
    Serialized(Vec<u8>),
    /// A class name reference
    Class(String),
}

/// Value tag bytes on the wire
mod value_tags {
    pub const NULL: u8 = 0x00;
    pub const BYTE: u8 = 0x01;
    pub const SHORT: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const LONG: u8 = 0x04;
    pub const FLOAT: u8 = 0x05;
    pub const DOUBLE: u8 = 0x06;
    pub const BOOL: u8 = 0x07;
    pub const CHAR: u8 = 0x08;
    pub const STR: u8 = 0x09;
    pub const SERIALIZED: u8 = 0x0A;
    pub const CLASS: u8 = 0x0B;
}

/// One decoded datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Connection handshake
    Connect {
        version: u16,
        attempt: u32,
        locale: String,
        client_id: String,
        client_name: String,
        tunnel: bool,
    },
    ConnectReply {
        version: u16,
    },
    /// Construct a remote object by class name
    Construct {
        class_name: String,
    },
    /// Reply to construct or factory call; `None` means the remote side
    /// legitimately produced no object
    ConstructReply {
        px_id: Option<u64>,
    },
    /// Invoke a method on a remote object
    MethodCall {
        px_id: u64,
        method: String,
        arg_types: Vec<String>,
        args: Vec<PxValue>,
        flags: u8,
        /// Indexes of arguments whose modified copies should be returned
        return_args: Vec<u16>,
    },
    /// Like `MethodCall`, but the reply may carry a new proxy id
    FactoryCall {
        px_id: u64,
        method: String,
        arg_types: Vec<String>,
        args: Vec<PxValue>,
        flags: u8,
    },
    ListenerAdd {
        px_id: u64,
        event_name: String,
    },
    ListenerRemove {
        px_id: u64,
        event_name: String,
    },
    /// Release a remote object; fire-and-forget, no reply
    Finalize {
        px_id: u64,
    },
    /// Accepted, no return value
    Accept,
    /// Accepted with a return value and any requested modified arguments
    ReturnValue {
        value: PxValue,
        return_args: Vec<(u16, PxValue)>,
    },
    /// Rejected with a classified remote exception
    Reject {
        kind_tag: u8,
        message: String,
    },
    /// Asynchronous event notification
    Event {
        px_id: u64,
        event_name: String,
        payload: PxValue,
    },
}

/// Per-connection registry of datagram kinds
///
/// Only registered kinds decode; an unregistered kind on the wire is a
/// protocol defect surfaced as an internal error.
#[derive(Debug, Default)]
pub struct DatagramFactory {
    registered: HashMap<u8, &'static str>,
}

impl DatagramFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every standard datagram kind
    ///
    /// Called on each (re)open: the factory is rebuilt per socket, so the
    /// table must be re-registered each time the transport comes up.
    pub fn register_defaults(&mut self) {
        self.register(kinds::CONNECT, "connect");
        self.register(kinds::CONNECT_REPLY, "connect-reply");
        self.register(kinds::CONSTRUCT, "construct");
        self.register(kinds::CONSTRUCT_REPLY, "construct-reply");
        self.register(kinds::METHOD_CALL, "method-call");
        self.register(kinds::FACTORY_CALL, "factory-call");
        self.register(kinds::LISTENER_ADD, "listener-add");
        self.register(kinds::LISTENER_REMOVE, "listener-remove");
        self.register(kinds::FINALIZE, "finalize");
        self.register(kinds::ACCEPT, "accept");
        self.register(kinds::RETURN_VALUE, "return-value");
        self.register(kinds::REJECT, "reject");
        self.register(kinds::EVENT, "event");
    }

    pub fn register(&mut self, kind: u8, name: &'static str) {
        self.registered.insert(kind, name);
    }

    pub fn clear(&mut self) {
        self.registered.clear();
    }

    pub fn is_registered(&self, kind: u8) -> bool {
        self.registered.contains_key(&kind)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

impl Datagram {
    fn kind(&self) -> u8 {
        match self {
            Datagram::Connect { .. } => kinds::CONNECT,
            Datagram::ConnectReply { .. } => kinds::CONNECT_REPLY,
            Datagram::Construct { .. } => kinds::CONSTRUCT,
            Datagram::ConstructReply { .. } => kinds::CONSTRUCT_REPLY,
            Datagram::MethodCall { .. } => kinds::METHOD_CALL,
            Datagram::FactoryCall { .. } => kinds::FACTORY_CALL,
            Datagram::ListenerAdd { .. } => kinds::LISTENER_ADD,
            Datagram::ListenerRemove { .. } => kinds::LISTENER_REMOVE,
            Datagram::Finalize { .. } => kinds::FINALIZE,
            Datagram::Accept => kinds::ACCEPT,
            Datagram::ReturnValue { .. } => kinds::RETURN_VALUE,
            Datagram::Reject { .. } => kinds::REJECT,
            Datagram::Event { .. } => kinds::EVENT,
        }
    }

    /// Encode into a complete frame (header plus payload)
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut flags = 0u8;
        match self {
            Datagram::Connect { version, attempt, locale, client_id, client_name, tunnel } => {
                put_u16(&mut payload, *version);
                put_u32(&mut payload, *attempt);
                put_string(&mut payload, locale);
                put_string(&mut payload, client_id);
                put_string(&mut payload, client_name);
                payload.push(u8::from(*tunnel));
            }
            Datagram::ConnectReply { version } => {
                put_u16(&mut payload, *version);
            }
            Datagram::Construct { class_name } => {
                put_string(&mut payload, class_name);
            }
            Datagram::ConstructReply { px_id } => {
                match px_id {
                    Some(id) => {
                        payload.push(1);
                        put_u64(&mut payload, *id);
                    }
                    None => payload.push(0),
                }
            }
            Datagram::MethodCall { px_id, method, arg_types, args, flags: f, return_args } => {
                flags = *f;
                put_u64(&mut payload, *px_id);
                put_string(&mut payload, method);
                put_u16(&mut payload, arg_types.len() as u16);
                for t in arg_types {
                    put_string(&mut payload, t);
                }
                for a in args {
                    put_value(&mut payload, a);
                }
                put_u16(&mut payload, return_args.len() as u16);
                for r in return_args {
                    put_u16(&mut payload, *r);
                }
            }
            Datagram::FactoryCall { px_id, method, arg_types, args, flags: f } => {
                flags = *f;
                put_u64(&mut payload, *px_id);
                put_string(&mut payload, method);
                put_u16(&mut payload, arg_types.len() as u16);
                for t in arg_types {
                    put_string(&mut payload, t);
                }
                for a in args {
                    put_value(&mut payload, a);
                }
            }
            Datagram::ListenerAdd { px_id, event_name }
            | Datagram::ListenerRemove { px_id, event_name } => {
                put_u64(&mut payload, *px_id);
                put_string(&mut payload, event_name);
            }
            Datagram::Finalize { px_id } => {
                put_u64(&mut payload, *px_id);
            }
            Datagram::Accept => {}
            Datagram::ReturnValue { value, return_args } => {
                put_value(&mut payload, value);
                put_u16(&mut payload, return_args.len() as u16);
                for (idx, v) in return_args {
                    put_u16(&mut payload, *idx);
                    put_value(&mut payload, v);
                }
            }
            Datagram::Reject { kind_tag, message } => {
                payload.push(*kind_tag);
                put_string(&mut payload, message);
            }
            Datagram::Event { px_id, event_name, payload: p } => {
                put_u64(&mut payload, *px_id);
                put_string(&mut payload, event_name);
                put_value(&mut payload, p);
            }
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        frame.push(self.kind());
        frame.push(flags);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decode one datagram from kind, flags, and payload bytes
    pub fn decode(factory: &DatagramFactory, kind: u8, flags: u8, payload: &[u8]) -> ProxyResult<Self> {
        if !factory.is_registered(kind) {
            return Err(ProxyError::internal(format!(
                "unregistered datagram kind 0x{kind:02X}"
            )));
        }
        let mut r = Reader::new(payload);
        let dg = match kind {
            kinds::CONNECT => Datagram::Connect {
                version: r.u16()?,
                attempt: r.u32()?,
                locale: r.string()?,
                client_id: r.string()?,
                client_name: r.string()?,
                tunnel: r.u8()? != 0,
            },
            kinds::CONNECT_REPLY => Datagram::ConnectReply { version: r.u16()? },
            kinds::CONSTRUCT => Datagram::Construct { class_name: r.string()? },
            kinds::CONSTRUCT_REPLY => {
                let present = r.u8()? != 0;
                Datagram::ConstructReply {
                    px_id: if present { Some(r.u64()?) } else { None },
                }
            }
            kinds::METHOD_CALL => {
                let px_id = r.u64()?;
                let method = r.string()?;
                let n = r.u16()? as usize;
                let mut arg_types = Vec::with_capacity(n);
                for _ in 0..n {
                    arg_types.push(r.string()?);
                }
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    args.push(r.value()?);
                }
                let m = r.u16()? as usize;
                let mut return_args = Vec::with_capacity(m);
                for _ in 0..m {
                    return_args.push(r.u16()?);
                }
                Datagram::MethodCall { px_id, method, arg_types, args, flags, return_args }
            }
            kinds::FACTORY_CALL => {
                let px_id = r.u64()?;
                let method = r.string()?;
                let n = r.u16()? as usize;
                let mut arg_types = Vec::with_capacity(n);
                for _ in 0..n {
                    arg_types.push(r.string()?);
                }
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    args.push(r.value()?);
                }
                Datagram::FactoryCall { px_id, method, arg_types, args, flags }
            }
            kinds::LISTENER_ADD => Datagram::ListenerAdd {
                px_id: r.u64()?,
                event_name: r.string()?,
            },
            kinds::LISTENER_REMOVE => Datagram::ListenerRemove {
                px_id: r.u64()?,
                event_name: r.string()?,
            },
            kinds::FINALIZE => Datagram::Finalize { px_id: r.u64()? },
            kinds::ACCEPT => Datagram::Accept,
            kinds::RETURN_VALUE => {
                let value = r.value()?;
                let m = r.u16()? as usize;
                let mut return_args = Vec::with_capacity(m);
                for _ in 0..m {
                    let idx = r.u16()?;
                    let v = r.value()?;
                    return_args.push((idx, v));
                }
                Datagram::ReturnValue { value, return_args }
            }
            kinds::REJECT => Datagram::Reject {
                kind_tag: r.u8()?,
                message: r.string()?,
            },
            kinds::EVENT => Datagram::Event {
                px_id: r.u64()?,
                event_name: r.string()?,
                payload: r.value()?,
            },
            _ => {
                return Err(ProxyError::internal(format!(
                    "registered but unhandled datagram kind 0x{kind:02X}"
                )))
            }
        };
        Ok(dg)
    }
}

/// Write one datagram frame to a transport
pub fn write_datagram(
    transport: &mut dyn ProxyTransport,
    datagram: &Datagram,
) -> ProxyResult<()> {
    let frame = datagram.encode();
    transport
        .write_all(&frame)
        .map_err(|e| ProxyError::new(ProxyErrorKind::Io, format!("send failed: {e}")))
}

/// Read one datagram frame from a transport
pub fn read_datagram(
    transport: &mut dyn ProxyTransport,
    factory: &DatagramFactory,
) -> ProxyResult<Datagram> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    transport
        .read_exact(&mut header)
        .map_err(|e| ProxyError::new(ProxyErrorKind::Io, format!("receive failed: {e}")))?;
    let magic = u16::from_be_bytes([header[0], header[1]]);
    if magic != FRAME_MAGIC {
        return Err(ProxyError::internal(format!("bad frame magic 0x{magic:04X}")));
    }
    let kind = header[2];
    let flags = header[3];
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProxyError::internal(format!(
            "datagram payload length {len} exceeds maximum {MAX_PAYLOAD_SIZE}"
        )));
    }
    let mut payload = vec![0u8; len];
    transport
        .read_exact(&mut payload)
        .map_err(|e| ProxyError::new(ProxyErrorKind::Io, format!("receive failed: {e}")))?;
    Datagram::decode(factory, kind, flags, &payload)
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_value(buf: &mut Vec<u8>, v: &PxValue) {
    match v {
        PxValue::Null => buf.push(value_tags::NULL),
        PxValue::Byte(b) => {
            buf.push(value_tags::BYTE);
            buf.push(*b as u8);
        }
        PxValue::Short(s) => {
            buf.push(value_tags::SHORT);
            put_u16(buf, *s as u16);
        }
        PxValue::Int(i) => {
            buf.push(value_tags::INT);
            put_u32(buf, *i as u32);
        }
        PxValue::Long(l) => {
            buf.push(value_tags::LONG);
            put_u64(buf, *l as u64);
        }
        PxValue::Float(f) => {
            buf.push(value_tags::FLOAT);
            put_u32(buf, f.to_bits());
        }
        PxValue::Double(d) => {
            buf.push(value_tags::DOUBLE);
            put_u64(buf, d.to_bits());
        }
        PxValue::Bool(b) => {
            buf.push(value_tags::BOOL);
            buf.push(u8::from(*b));
        }
        PxValue::Char(c) => {
            buf.push(value_tags::CHAR);
            put_u32(buf, *c as u32);
        }
        PxValue::Str(s) => {
            buf.push(value_tags::STR);
            put_string(buf, s);
        }
        PxValue::Serialized(bytes) => {
            buf.push(value_tags::SERIALIZED);
            put_u32(buf, bytes.len() as u32);
            buf.extend_from_slice(bytes);
        }
        PxValue::Class(name) => {
            buf.push(value_tags::CLASS);
            put_string(buf, name);
        }
    }
}

/// Cursor over a payload slice with bounds-checked reads
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProxyResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(ProxyError::internal(format!(
                "truncated datagram payload: wanted {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> ProxyResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ProxyResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> ProxyResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> ProxyResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn string(&mut self) -> ProxyResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProxyError::internal(format!("invalid utf-8 in datagram string: {e}")))
    }

    fn value(&mut self) -> ProxyResult<PxValue> {
        let tag = self.u8()?;
        let v = match tag {
            value_tags::NULL => PxValue::Null,
            value_tags::BYTE => PxValue::Byte(self.u8()? as i8),
            value_tags::SHORT => PxValue::Short(self.u16()? as i16),
            value_tags::INT => PxValue::Int(self.u32()? as i32),
            value_tags::LONG => PxValue::Long(self.u64()? as i64),
            value_tags::FLOAT => PxValue::Float(f32::from_bits(self.u32()?)),
            value_tags::DOUBLE => PxValue::Double(f64::from_bits(self.u64()?)),
            value_tags::BOOL => PxValue::Bool(self.u8()? != 0),
            value_tags::CHAR => {
                let cp = self.u32()?;
                let c = char::from_u32(cp).ok_or_else(|| {
                    ProxyError::internal(format!("invalid char code point 0x{cp:08X}"))
                })?;
                PxValue::Char(c)
            }
            value_tags::STR => PxValue::Str(self.string()?),
            value_tags::SERIALIZED => {
                let len = self.u32()? as usize;
                PxValue::Serialized(self.take(len)?.to_vec())
            }
            value_tags::CLASS => PxValue::Class(self.string()?),
            _ => {
                return Err(ProxyError::internal(format!(
                    "unknown parameter value tag 0x{tag:02X}"
                )))
            }
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> DatagramFactory {
        let mut f = DatagramFactory::new();
        f.register_defaults();
        f
    }

    fn round_trip(dg: Datagram) -> Datagram {
        let frame = dg.encode();
        assert_eq!(u16::from_be_bytes([frame[0], frame[1]]), FRAME_MAGIC);
        let kind = frame[2];
        let flags = frame[3];
        let len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + len);
        Datagram::decode(&factory(), kind, flags, &frame[FRAME_HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn test_connect_round_trip() {
        let dg = Datagram::Connect {
            version: 2,
            attempt: 3,
            locale: "en_US".to_string(),
            client_id: "c0ffee".to_string(),
            client_name: "devbox".to_string(),
            tunnel: true,
        };
        assert_eq!(round_trip(dg.clone()), dg);
    }

    #[test]
    fn test_method_call_round_trip_preserves_flags() {
        let dg = Datagram::MethodCall {
            px_id: 7,
            method: "setPath".to_string(),
            arg_types: vec!["string".to_string(), "int".to_string()],
            args: vec![PxValue::Str("/QSYS.LIB".to_string()), PxValue::Int(-5)],
            flags: FLAG_ASYNC | FLAG_WANTS_RETURN_ARGS,
            return_args: vec![0],
        };
        let frame = dg.encode();
        assert_eq!(frame[3], FLAG_ASYNC | FLAG_WANTS_RETURN_ARGS);
        assert_eq!(round_trip(dg.clone()), dg);
    }

    #[test]
    fn test_all_value_kinds_round_trip() {
        let values = vec![
            PxValue::Null,
            PxValue::Byte(-1),
            PxValue::Short(-300),
            PxValue::Int(1 << 30),
            PxValue::Long(i64::MIN),
            PxValue::Float(1.5),
            PxValue::Double(-2.25),
            PxValue::Bool(true),
            PxValue::Char('λ'),
            PxValue::Str("text".to_string()),
            PxValue::Serialized(vec![0xDE, 0xAD]),
            PxValue::Class("com.host.Record".to_string()),
        ];
        let dg = Datagram::MethodCall {
            px_id: 1,
            method: "m".to_string(),
            arg_types: vec!["object".to_string(); values.len()],
            args: values,
            flags: 0,
            return_args: vec![],
        };
        assert_eq!(round_trip(dg.clone()), dg);
    }

    #[test]
    fn test_unregistered_kind_is_internal_error() {
        let f = DatagramFactory::new(); // nothing registered
        let err = Datagram::decode(&f, kinds::ACCEPT, 0, &[]).unwrap_err();
        assert_eq!(err.kind, crate::error::ProxyErrorKind::Internal);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let err = Datagram::decode(&factory(), kinds::FINALIZE, 0, &[0x00, 0x01]).unwrap_err();
        assert_eq!(err.kind, crate::error::ProxyErrorKind::Internal);
    }

    #[test]
    fn test_construct_reply_none_round_trip() {
        let dg = Datagram::ConstructReply { px_id: None };
        assert_eq!(round_trip(dg.clone()), dg);
        let dg = Datagram::ConstructReply { px_id: Some(u64::MAX) };
        assert_eq!(round_trip(dg.clone()), dg);
    }

    #[test]
    fn test_oversize_payload_length_rejected_before_allocation() {
        use crate::error::NetworkResult;
        use crate::network::ShutdownHandle;
        use std::collections::VecDeque;

        struct ByteTransport {
            data: VecDeque<u8>,
        }

        impl ProxyTransport for ByteTransport {
            fn write_all(&mut self, _buf: &[u8]) -> NetworkResult<()> {
                Ok(())
            }
            fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
                for b in buf.iter_mut() {
                    *b = self.data.pop_front().ok_or_else(|| {
                        crate::error::NetworkError::ConnectionLost {
                            reason: "out of bytes".to_string(),
                        }
                    })?;
                }
                Ok(())
            }
            fn shutdown(&mut self) -> NetworkResult<()> {
                Ok(())
            }
            fn shutdown_handle(&self) -> Option<ShutdownHandle> {
                None
            }
        }

        let mut header = Vec::new();
        header.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        header.push(kinds::ACCEPT);
        header.push(0);
        header.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut transport = ByteTransport { data: header.into() };

        let err = read_datagram(&mut transport, &factory()).unwrap_err();
        assert_eq!(err.kind, crate::error::ProxyErrorKind::Internal);
        assert!(err.message.contains("exceeds maximum"));
    }

    #[test]
    fn test_factory_reregistration_is_idempotent() {
        let mut f = DatagramFactory::new();
        f.register_defaults();
        let n = f.registered_count();
        f.clear();
        assert_eq!(f.registered_count(), 0);
        f.register_defaults();
        assert_eq!(f.registered_count(), n);
    }
}
