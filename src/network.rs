//! Network transports for the proxy connection
//!
//! Blocking TCP (optionally TLS) transports for the proxy RPC channels.
//! The proxy connection dials two channels through a [`Connector`]: the
//! call channel, which carries strict request/reply traffic, and the event
//! channel, which carries asynchronous event notifications from the host.
//!
//! Transports are byte streams; datagram framing lives in
//! `proxy::datastream`.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{NetworkError, NetworkResult};

/// A cloneable handle that forces a blocked transport to disconnect
///
/// Used to unblock the event reader thread during close, since that thread
/// owns its transport and sits in a blocking read.
pub type ShutdownHandle = Arc<dyn Fn() + Send + Sync>;

/// A blocking byte-stream transport for one proxy channel
pub trait ProxyTransport: Send {
    fn write_all(&mut self, buf: &[u8]) -> NetworkResult<()>;
    fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()>;
    fn shutdown(&mut self) -> NetworkResult<()>;
    /// A handle that can force this transport closed from another thread,
    /// if the underlying stream supports it
    fn shutdown_handle(&self) -> Option<ShutdownHandle>;
}

/// Dials the two proxy channels
///
/// Abstracted behind a trait so tests can substitute scripted in-memory
/// transports for both channels.
pub trait Connector: Send + Sync {
    fn dial_call_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>>;
    fn dial_event_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>>;
}

/// Plain TCP transport with read/write timeouts
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl ProxyTransport for TcpTransport {
    fn write_all(&mut self, buf: &[u8]) -> NetworkResult<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    fn shutdown(&mut self) -> NetworkResult<()> {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        match self.stream.try_clone() {
            Ok(clone) => Some(Arc::new(move || {
                let _ = clone.shutdown(std::net::Shutdown::Both);
            })),
            Err(e) => {
                warn!("could not clone stream for shutdown handle: {e}");
                None
            }
        }
    }
}

/// TLS transport over TCP using rustls with native roots
pub struct TlsTransport {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
}

impl ProxyTransport for TlsTransport {
    fn write_all(&mut self, buf: &[u8]) -> NetworkResult<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> NetworkResult<()> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    fn shutdown(&mut self) -> NetworkResult<()> {
        self.stream.conn.send_close_notify();
        let _ = self.stream.flush();
        let _ = self.stream.sock.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        match self.stream.sock.try_clone() {
            Ok(clone) => Some(Arc::new(move || {
                let _ = clone.shutdown(std::net::Shutdown::Both);
            })),
            Err(_) => None,
        }
    }
}

/// TCP/TLS connector for a proxy server
///
/// The call channel dials `port`; the event channel dials `event_port`.
/// Certificate validation is always enforced; a CA bundle cannot disable
/// it, only extend the trusted roots.
pub struct TcpConnector {
    host: String,
    port: u16,
    event_port: u16,
    use_tls: bool,
    ca_bundle_path: Option<PathBuf>,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(host: String, port: u16, event_port: u16) -> Self {
        Self {
            host,
            port,
            event_port,
            use_tls: false,
            ca_bundle_path: None,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Enable or disable TLS explicitly
    pub fn set_tls(&mut self, enabled: bool) {
        self.use_tls = enabled;
    }

    /// Trust an additional CA certificate (DER file); extends the trusted
    /// roots, never replaces validation
    pub fn set_ca_bundle_path(&mut self, path: Option<PathBuf>) {
        self.ca_bundle_path = path;
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    /// Read/write timeout for established channels; `None` means blocking
    /// without bound (a hung server then blocks the synchronous caller)
    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) {
        self.io_timeout = timeout;
    }

    fn dial(&self, port: u16) -> NetworkResult<Box<dyn ProxyTransport>> {
        let address = format!("{}:{}", self.host, port);
        let mut addrs = address
            .to_socket_addrs()
            .map_err(|_| NetworkError::DnsResolution { host: self.host.clone() })?;
        let addr: SocketAddr = addrs.next().ok_or_else(|| NetworkError::InvalidAddress {
            address: address.clone(),
        })?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused {
                    host: self.host.clone(),
                    port,
                },
                std::io::ErrorKind::TimedOut => NetworkError::Timeout {
                    host: self.host.clone(),
                    port,
                    timeout_seconds: self.connect_timeout.as_secs(),
                },
                _ => NetworkError::from(e),
            }
        })?;
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        debug!("connected to {address} (tls={})", self.use_tls);

        if self.use_tls {
            let config = build_tls_config(self.ca_bundle_path.as_deref())?;
            let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
                .map_err(|_| NetworkError::InvalidAddress { address: self.host.clone() })?;
            let conn = rustls::ClientConnection::new(Arc::new(config), server_name)
                .map_err(|e| NetworkError::TlsError { message: e.to_string() })?;
            Ok(Box::new(TlsTransport {
                stream: rustls::StreamOwned::new(conn, stream),
            }))
        } else {
            Ok(Box::new(TcpTransport::new(stream)))
        }
    }
}

impl Connector for TcpConnector {
    fn dial_call_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
        self.dial(self.port)
    }

    fn dial_event_channel(&self) -> NetworkResult<Box<dyn ProxyTransport>> {
        self.dial(self.event_port)
    }
}

/// Client TLS config trusting the platform's native roots, falling back to
/// the bundled webpki roots when none can be loaded. An optional CA bundle
/// (a DER-encoded certificate file) extends the store.
fn build_tls_config(ca_bundle: Option<&std::path::Path>) -> NetworkResult<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    let mut native_loaded = 0usize;
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            for cert in certs {
                if roots.add(cert).is_ok() {
                    native_loaded += 1;
                }
            }
        }
        Err(e) => warn!("could not load native root certificates: {e}"),
    }
    if native_loaded == 0 {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    if let Some(path) = ca_bundle {
        let der = std::fs::read(path).map_err(|e| NetworkError::TlsError {
            message: format!("could not read CA bundle {}: {e}", path.display()),
        })?;
        roots
            .add(rustls::pki_types::CertificateDer::from(der))
            .map_err(|e| NetworkError::TlsError {
                message: format!("invalid CA certificate in {}: {e}", path.display()),
            })?;
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}
