//! Proxy RPC client connection
//!
//! One connection owns two channels to the proxy server: the call channel,
//! carrying strict half-duplex request/reply traffic, and the event
//! channel, read by a dedicated thread and carrying asynchronous event
//! notifications. Remote objects are addressed by 64-bit proxy ids handed
//! out by the server; the connection tracks which ids are live so that
//! releasing an object twice is a no-op.
//!
//! Release is handled by a background finalizer worker (see
//! [`super::reaper`]) so no caller ever blocks on a finalize send.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProxyError, ProxyErrorKind, ProxyResult, RethrowTier};
use crate::network::{Connector, ProxyTransport, ShutdownHandle};

use super::datastream::{read_datagram, write_datagram, Datagram, DatagramFactory, PxValue};
use super::events::{ListenerTable, ProxyEvent, ProxyEventListener};
use super::reaper::Reaper;

/// Protocol version sent in the connect handshake; the server must reply
/// with the same version
pub const PROXY_PROTOCOL_VERSION: u16 = 2;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Per-call options for [`ProxyConnection::call_method`]
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Wire flags; see `datastream::FLAG_ASYNC` and
    /// `datastream::FLAG_WANTS_RETURN_ARGS`
    pub flags: u8,
    /// Indexes of arguments whose modified copies should come back
    pub return_args: Vec<u16>,
    /// The calling convention's accepted error set; rejected replies whose
    /// kind falls outside it degrade to `Internal`
    pub tier: RethrowTier,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            flags: 0,
            return_args: Vec::new(),
            tier: RethrowTier::RequestNotSupported,
        }
    }
}

impl CallOptions {
    pub fn with_tier(tier: RethrowTier) -> Self {
        Self { tier, ..Self::default() }
    }
}

/// Result of a successful method call
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub return_value: PxValue,
    /// Modified copies of the arguments named in
    /// [`CallOptions::return_args`], keyed by argument index
    pub return_args: Vec<(u16, PxValue)>,
}

/// A client connection to a proxy server
pub struct ProxyConnection {
    connector: Box<dyn Connector>,
    /// Rebuilt and re-registered on every (re)open; never shared between
    /// connections
    factory: Mutex<DatagramFactory>,
    /// The call channel; `None` whenever the connection is down. Shared
    /// with the reaper worker, which writes finalize frames through the
    /// same mutex so they never interleave with a request/reply pair.
    io: Arc<Mutex<Option<Box<dyn ProxyTransport>>>>,
    state: Mutex<ConnectionState>,
    /// Proxy ids the server has handed out and we have not yet released
    live: Mutex<HashSet<u64>>,
    listeners: Arc<ListenerTable>,
    reaper: Mutex<Option<Reaper>>,
    event_thread: Mutex<Option<thread::JoinHandle<()>>>,
    event_shutdown: Mutex<Option<ShutdownHandle>>,
    call_shutdown: Mutex<Option<ShutdownHandle>>,
    closing: Arc<AtomicBool>,
    attempt: AtomicU32,
    client_id: String,
    client_name: String,
    locale: String,
    tunnel: bool,
}

impl ProxyConnection {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        let client_name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            connector,
            factory: Mutex::new(DatagramFactory::new()),
            io: Arc::new(Mutex::new(None)),
            state: Mutex::new(ConnectionState::Disconnected),
            live: Mutex::new(HashSet::new()),
            listeners: Arc::new(ListenerTable::new()),
            reaper: Mutex::new(None),
            event_thread: Mutex::new(None),
            event_shutdown: Mutex::new(None),
            call_shutdown: Mutex::new(None),
            closing: Arc::new(AtomicBool::new(false)),
            attempt: AtomicU32::new(0),
            client_id: Uuid::new_v4().to_string(),
            client_name,
            locale: default_locale(),
            tunnel: false,
        }
    }

    /// Route calls through an HTTP-style tunnel on the server side
    pub fn set_tunnel(&mut self, tunnel: bool) {
        self.tunnel = tunnel;
    }

    pub fn set_locale<S: Into<String>>(&mut self, locale: S) {
        self.locale = locale.into();
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of live proxy ids, for diagnostics and tests
    pub fn live_object_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Open both channels and perform the connect handshake
    ///
    /// Each attempt gets a fresh factory with the full kind table
    /// re-registered, and a monotonically increasing attempt number in the
    /// handshake so the server can distinguish reconnects.
    pub fn connect(&self) -> ProxyResult<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
                ConnectionState::Open => return Ok(()),
                other => {
                    return Err(ProxyError::internal(format!(
                        "connect while {other:?}"
                    )))
                }
            }
        }
        self.closing.store(false, Ordering::SeqCst);
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;

        match self.connect_inner(attempt) {
            Ok(()) => {
                *lock(&self.state) = ConnectionState::Open;
                info!("proxy connection open (attempt {attempt})");
                Ok(())
            }
            Err(e) => {
                self.teardown();
                *lock(&self.state) = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn connect_inner(&self, attempt: u32) -> ProxyResult<()> {
        {
            let mut factory = lock(&self.factory);
            factory.clear();
            factory.register_defaults();
        }

        let mut call = self
            .connector
            .dial_call_channel()
            .map_err(|e| ProxyError::new(ProxyErrorKind::Io, e.to_string()))?;
        *lock(&self.call_shutdown) = call.shutdown_handle();

        let request = Datagram::Connect {
            version: PROXY_PROTOCOL_VERSION,
            attempt,
            locale: self.locale.clone(),
            client_id: self.client_id.clone(),
            client_name: self.client_name.clone(),
            tunnel: self.tunnel,
        };
        write_datagram(call.as_mut(), &request)?;
        let reply = {
            let factory = lock(&self.factory);
            read_datagram(call.as_mut(), &factory)?
        };
        match reply {
            Datagram::ConnectReply { version } if version == PROXY_PROTOCOL_VERSION => {}
            Datagram::ConnectReply { version } => {
                return Err(ProxyError::internal(format!(
                    "server protocol version {version}, client speaks {PROXY_PROTOCOL_VERSION}"
                )))
            }
            Datagram::Reject { kind_tag, message } => {
                return Err(ProxyError::new(ProxyError::kind_from_tag(kind_tag), message))
            }
            other => {
                return Err(ProxyError::internal(format!(
                    "unexpected handshake reply: {other:?}"
                )))
            }
        }

        let event = self
            .connector
            .dial_event_channel()
            .map_err(|e| ProxyError::new(ProxyErrorKind::Io, e.to_string()))?;
        *lock(&self.event_shutdown) = event.shutdown_handle();
        self.spawn_event_reader(event);

        *lock(&self.io) = Some(call);
        *lock(&self.reaper) = Some(Reaper::spawn(Arc::clone(&self.io)));
        Ok(())
    }

    fn spawn_event_reader(&self, mut transport: Box<dyn ProxyTransport>) {
        let listeners = Arc::clone(&self.listeners);
        let closing = Arc::clone(&self.closing);
        // The reader gets its own freshly registered factory since the
        // connection's is rebuilt per socket anyway.
        let mut factory = DatagramFactory::new();
        factory.register_defaults();
        let handle = thread::Builder::new()
            .name("px-events".to_string())
            .spawn(move || loop {
                match read_datagram(transport.as_mut(), &factory) {
                    Ok(Datagram::Event { px_id, event_name, payload }) => {
                        listeners.dispatch(&ProxyEvent { px_id, event_name, payload });
                    }
                    Ok(other) => {
                        warn!("non-event datagram on event channel: {other:?}");
                    }
                    Err(e) => {
                        if !closing.load(Ordering::SeqCst) {
                            debug!("event channel closed: {e}");
                        }
                        return;
                    }
                }
            })
            .ok();
        *lock(&self.event_thread) = handle;
    }

    /// One request/reply round trip on the call channel
    ///
    /// The channel is half duplex, so the transport lock is held for the
    /// whole exchange. Events that arrive interleaved on the call channel
    /// are dispatched inline and reading continues.
    ///
    /// A failed exchange leaves the stream position unknown: the reply to
    /// this request may still arrive and would be misattributed to the
    /// next caller. The transport is therefore dropped on any exchange
    /// error; subsequent calls fail with `Io` until the connection is
    /// reopened.
    fn exchange(&self, request: &Datagram) -> ProxyResult<Datagram> {
        let mut guard = lock(&self.io);
        let transport = guard.as_mut().ok_or_else(|| {
            ProxyError::new(ProxyErrorKind::Io, "connection is not open")
        })?;
        match self.exchange_on(transport.as_mut(), request) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("call channel failed mid-exchange, dropping transport: {e}");
                if let Some(mut broken) = guard.take() {
                    let _ = broken.shutdown();
                }
                Err(e)
            }
        }
    }

    fn exchange_on(
        &self,
        transport: &mut dyn ProxyTransport,
        request: &Datagram,
    ) -> ProxyResult<Datagram> {
        write_datagram(transport, request)?;
        let factory = lock(&self.factory);
        loop {
            match read_datagram(transport, &factory)? {
                Datagram::Event { px_id, event_name, payload } => {
                    self.listeners.dispatch(&ProxyEvent { px_id, event_name, payload });
                }
                reply => return Ok(reply),
            }
        }
    }

    /// Construct a remote object by class name, returning its proxy id
    pub fn construct_remote(&self, class_name: &str) -> ProxyResult<u64> {
        let reply = self.exchange(&Datagram::Construct {
            class_name: class_name.to_string(),
        })?;
        match reply {
            Datagram::ConstructReply { px_id: Some(id) } => {
                lock(&self.live).insert(id);
                Ok(id)
            }
            Datagram::ConstructReply { px_id: None } => Err(ProxyError::internal(format!(
                "server constructed no object for class '{class_name}'"
            ))),
            Datagram::Reject { kind_tag, message } => {
                Err(ProxyError::new(ProxyError::kind_from_tag(kind_tag), message))
            }
            other => Err(unexpected_reply("construct", &other)),
        }
    }

    /// Invoke a method on a remote object
    ///
    /// An async call (flag set in `options.flags`) still performs the full
    /// round trip; the flag tells the server not to wait for the method's
    /// completion before replying.
    pub fn call_method(
        &self,
        px_id: u64,
        method: &str,
        arg_types: Vec<String>,
        args: Vec<PxValue>,
        options: CallOptions,
    ) -> ProxyResult<CallOutcome> {
        let reply = self.exchange(&Datagram::MethodCall {
            px_id,
            method: method.to_string(),
            arg_types,
            args,
            flags: options.flags,
            return_args: options.return_args,
        })?;
        match reply {
            Datagram::Accept => Ok(CallOutcome {
                return_value: PxValue::Null,
                return_args: Vec::new(),
            }),
            Datagram::ReturnValue { value, return_args } => Ok(CallOutcome {
                return_value: value,
                return_args,
            }),
            Datagram::Reject { kind_tag, message } => {
                let err = ProxyError::new(ProxyError::kind_from_tag(kind_tag), message);
                Err(options.tier.widen(err))
            }
            other => Err(unexpected_reply(method, &other)),
        }
    }

    /// Invoke a factory method whose reply may carry a new proxy id
    ///
    /// Returns `None` when the remote method legitimately produced no
    /// object.
    pub fn call_factory_method(
        &self,
        px_id: u64,
        method: &str,
        arg_types: Vec<String>,
        args: Vec<PxValue>,
    ) -> ProxyResult<Option<u64>> {
        let reply = self.exchange(&Datagram::FactoryCall {
            px_id,
            method: method.to_string(),
            arg_types,
            args,
            flags: 0,
        })?;
        match reply {
            Datagram::ConstructReply { px_id: Some(id) } => {
                lock(&self.live).insert(id);
                Ok(Some(id))
            }
            Datagram::ConstructReply { px_id: None } => Ok(None),
            Datagram::Reject { kind_tag, message } => {
                Err(ProxyError::new(ProxyError::kind_from_tag(kind_tag), message))
            }
            other => Err(unexpected_reply(method, &other)),
        }
    }

    /// Attach a listener to a remote event source
    ///
    /// The remote side is told to start reporting only when this is the
    /// first local listener for the (proxy id, event name) pair.
    pub fn add_listener(
        &self,
        px_id: u64,
        event_name: &str,
        listener: Arc<dyn ProxyEventListener>,
    ) -> ProxyResult<()> {
        let first = self.listeners.add(px_id, event_name, Arc::clone(&listener));
        if !first {
            return Ok(());
        }
        let result = self.expect_accept(&Datagram::ListenerAdd {
            px_id,
            event_name: event_name.to_string(),
        });
        if result.is_err() {
            // The remote never heard about this subscription; undo the
            // local entry so a retry sends the add again.
            self.listeners.remove(px_id, event_name, &listener);
        }
        result
    }

    /// Detach a listener from a remote event source
    ///
    /// The remote side is told to stop reporting only when this was the
    /// last local listener for the (proxy id, event name) pair.
    pub fn remove_listener(
        &self,
        px_id: u64,
        event_name: &str,
        listener: &Arc<dyn ProxyEventListener>,
    ) -> ProxyResult<()> {
        let last = self.listeners.remove(px_id, event_name, listener);
        if !last {
            return Ok(());
        }
        self.expect_accept(&Datagram::ListenerRemove {
            px_id,
            event_name: event_name.to_string(),
        })
    }

    fn expect_accept(&self, request: &Datagram) -> ProxyResult<()> {
        match self.exchange(request)? {
            Datagram::Accept => Ok(()),
            Datagram::Reject { kind_tag, message } => {
                Err(ProxyError::new(ProxyError::kind_from_tag(kind_tag), message))
            }
            other => Err(unexpected_reply("listener request", &other)),
        }
    }

    /// Release a remote object
    ///
    /// Idempotent and non-blocking: the first call for a live id queues a
    /// fire-and-forget finalize frame on the background worker and drops
    /// all of the id's event subscriptions; later calls, and calls for ids
    /// this connection never saw, do nothing. Never fails; delivery is
    /// best-effort.
    pub fn call_finalize(&self, px_id: u64) {
        if !lock(&self.live).remove(&px_id) {
            return;
        }
        let dropped = self.listeners.remove_all_for(px_id);
        if !dropped.is_empty() {
            debug!(
                "dropped {} event subscription(s) while finalizing px_id {px_id}",
                dropped.len()
            );
        }
        let frame = Datagram::Finalize { px_id }.encode();
        if let Some(reaper) = lock(&self.reaper).as_ref() {
            reaper.enqueue(frame);
        }
    }

    /// Close the connection
    ///
    /// Stops the finalizer worker without draining its queue, unblocks and
    /// joins the event reader, and shuts both channels down. Live proxy
    /// ids are forgotten; the server reclaims them when the socket drops.
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Open {
                return;
            }
            *state = ConnectionState::Closing;
        }
        self.closing.store(true, Ordering::SeqCst);
        self.teardown();
        lock(&self.live).clear();
        *lock(&self.state) = ConnectionState::Disconnected;
        info!("proxy connection closed");
    }

    fn teardown(&self) {
        // Unblock anything sitting in a read on either channel first, so
        // neither the reaper join nor the io lock below can wait on a
        // blocked exchange.
        if let Some(shutdown) = lock(&self.call_shutdown).take() {
            shutdown();
        }
        if let Some(shutdown) = lock(&self.event_shutdown).take() {
            shutdown();
        }
        if let Some(mut reaper) = lock(&self.reaper).take() {
            reaper.stop();
        }
        if let Some(mut transport) = lock(&self.io).take() {
            if let Err(e) = transport.shutdown() {
                debug!("call channel shutdown: {e}");
            }
        }
        if let Some(handle) = lock(&self.event_thread).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProxyConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected_reply(context: &str, reply: &Datagram) -> ProxyError {
    ProxyError::internal(format!("unexpected reply to {context}: {reply:?}"))
}

fn default_locale() -> String {
    std::env::var("LANG")
        .ok()
        .and_then(|v| v.split('.').next().map(str::to_string))
        .filter(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkResult;
    use crate::network::Connector;
    use std::collections::VecDeque;

    /// Serves scripted reply datagrams; records nothing, panics on underrun
    struct ScriptedTransport {
        pending: VecDeque<u8>,
        replies: VecDeque<Datagram>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Datagram>) -> Self {
            Self {
                pending: VecDeque::new(),
                replies: replies.into(),
            }
        }
    }

    impl ProxyTransport for ScriptedTransport {
        fn write_all(&mut self, _buf: &[u8]) -> NetworkResult<()> {
            Ok(())
        }
        fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
            for b in buf.iter_mut() {
                if self.pending.is_empty() {
                    let next = self.replies.pop_front().ok_or_else(|| {
                        crate::error::NetworkError::ConnectionLost {
                            reason: "script exhausted".to_string(),
                        }
                    })?;
                    self.pending.extend(next.encode());
                }
                *b = self.pending.pop_front().unwrap();
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

    struct ScriptedConnector {
        call_replies: Mutex<Option<Vec<Datagram>>>,
    }

    impl ScriptedConnector {
        fn new(call_replies: Vec<Datagram>) -> Self {
            Self {
                call_replies: Mutex::new(Some(call_replies)),
            }
        }
    }

    impl Connector for ScriptedConnector {
        fn dial_call_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
            let replies = self.call_replies.lock().unwrap().take().unwrap();
            Ok(Box::new(ScriptedTransport::new(replies)))
        }
        fn dial_event_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
            // Empty script: the reader thread sees an immediate error and
            // exits, which close() tolerates.
            Ok(Box::new(ScriptedTransport::new(vec![])))
        }
    }

    fn open_connection(mut call_replies: Vec<Datagram>) -> ProxyConnection {
        call_replies.insert(0, Datagram::ConnectReply { version: PROXY_PROTOCOL_VERSION });
        let conn = ProxyConnection::new(Box::new(ScriptedConnector::new(call_replies)));
        conn.connect().expect("handshake");
        conn
    }

    #[test]
    fn test_handshake_version_mismatch_fails() {
        let conn = ProxyConnection::new(Box::new(ScriptedConnector::new(vec![
            Datagram::ConnectReply { version: 99 },
        ])));
        let err = conn.connect().unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Internal);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_construct_tracks_live_id() {
        let conn = open_connection(vec![Datagram::ConstructReply { px_id: Some(42) }]);
        let id = conn.construct_remote("com.host.RecordFile").unwrap();
        assert_eq!(id, 42);
        assert_eq!(conn.live_object_count(), 1);
        conn.close();
    }

    #[test]
    fn test_construct_none_is_internal_error() {
        let conn = open_connection(vec![Datagram::ConstructReply { px_id: None }]);
        let err = conn.construct_remote("com.host.RecordFile").unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Internal);
        conn.close();
    }

    #[test]
    fn test_reject_widens_by_tier() {
        let reject = Datagram::Reject {
            kind_tag: ProxyError::tag_for_kind(ProxyErrorKind::ObjectDoesNotExist),
            message: "MBR not found".to_string(),
        };
        let conn = open_connection(vec![reject.clone(), reject]);

        // Widest tier passes the kind through.
        let err = conn
            .call_method(1, "open", vec![], vec![], CallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::ObjectDoesNotExist);

        // A narrow tier degrades it to Internal.
        let err = conn
            .call_method(1, "open", vec![], vec![], CallOptions::with_tier(RethrowTier::Io))
            .unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Internal);
        assert!(err.message.contains("ObjectDoesNotExist"));
        conn.close();
    }

    #[test]
    fn test_finalize_is_idempotent_and_nonblocking() {
        let conn = open_connection(vec![Datagram::ConstructReply { px_id: Some(7) }]);
        let id = conn.construct_remote("com.host.RecordFile").unwrap();
        conn.call_finalize(id);
        assert_eq!(conn.live_object_count(), 0);
        // Second finalize and an unknown id are both no-ops.
        conn.call_finalize(id);
        conn.call_finalize(9999);
        conn.close();
    }

    #[test]
    fn test_events_interleaved_on_call_channel_are_dispatched() {
        use std::sync::atomic::AtomicUsize;

        struct Counter(AtomicUsize);
        impl ProxyEventListener for Counter {
            fn event_raised(&self, _event: &ProxyEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let conn = open_connection(vec![
            Datagram::ConstructReply { px_id: Some(5) },
            Datagram::Accept, // listener add
            Datagram::Event {
                px_id: 5,
                event_name: "fileChanged".to_string(),
                payload: PxValue::Null,
            },
            Datagram::ReturnValue { value: PxValue::Int(1), return_args: vec![] },
        ]);
        let id = conn.construct_remote("com.host.RecordFile").unwrap();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        conn.add_listener(id, "fileChanged", counter.clone()).unwrap();

        let outcome = conn
            .call_method(id, "read", vec![], vec![], CallOptions::default())
            .unwrap();
        assert_eq!(outcome.return_value, PxValue::Int(1));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        conn.close();
    }

    /// Like [`ScriptedTransport`] but a `None` entry fails one read with a
    /// timeout while keeping the later replies queued, mimicking a reply
    /// that is still in flight when the socket read times out
    struct FlakyTransport {
        pending: VecDeque<u8>,
        replies: VecDeque<Option<Datagram>>,
    }

    impl ProxyTransport for FlakyTransport {
        fn write_all(&mut self, _buf: &[u8]) -> NetworkResult<()> {
            Ok(())
        }
        fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
            for b in buf.iter_mut() {
                if self.pending.is_empty() {
                    match self.replies.pop_front() {
                        Some(Some(next)) => self.pending.extend(next.encode()),
                        Some(None) => {
                            return Err(crate::error::NetworkError::Timeout {
                                host: "test".to_string(),
                                port: 0,
                                timeout_seconds: 0,
                            })
                        }
                        None => {
                            return Err(crate::error::NetworkError::ConnectionLost {
                                reason: "script exhausted".to_string(),
                            })
                        }
                    }
                }
                *b = self.pending.pop_front().unwrap();
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

    struct FlakyConnector {
        call_replies: Mutex<Option<Vec<Option<Datagram>>>>,
    }

    impl Connector for FlakyConnector {
        fn dial_call_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
            let replies = self.call_replies.lock().unwrap().take().unwrap();
            Ok(Box::new(FlakyTransport {
                pending: VecDeque::new(),
                replies: replies.into(),
            }))
        }
        fn dial_event_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
            Ok(Box::new(ScriptedTransport::new(vec![])))
        }
    }

    #[test]
    fn test_failed_exchange_poisons_call_channel() {
        // The reply to the timed-out construct stays queued behind the
        // failure; no later call may consume it as its own.
        let conn = ProxyConnection::new(Box::new(FlakyConnector {
            call_replies: Mutex::new(Some(vec![
                Some(Datagram::ConnectReply { version: PROXY_PROTOCOL_VERSION }),
                None,
                Some(Datagram::ConstructReply { px_id: Some(41) }),
            ])),
        }));
        conn.connect().expect("handshake");

        let err = conn.construct_remote("com.host.RecordFile").unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Io);

        // The stale reply must not be attributed to this second call.
        let err = conn.construct_remote("com.host.OtherFile").unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Io);
        assert_eq!(conn.live_object_count(), 0);
        conn.close();
    }

    #[test]
    fn test_call_while_disconnected_is_io_error() {
        let conn = ProxyConnection::new(Box::new(ScriptedConnector::new(vec![])));
        let err = conn
            .call_method(1, "m", vec![], vec![], CallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ProxyErrorKind::Io);
    }
}
