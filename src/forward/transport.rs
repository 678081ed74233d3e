//! Transport primitives for the forwarding adapter.
//!
//! Connections classify their own write failures into [`WriteFailure`] so the
//! delivery state machine never has to inspect raw I/O errors.

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};
use thiserror::Error;

use super::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};

/// How a failed write should be recovered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteFailure {
    /// Timeout or interruption; resending on the same connection may work.
    Transient,
    /// The peer reset the connection; only a new connection helps.
    Reset,
    /// Any other failure; the connection is considered broken.
    Fatal,
}

impl WriteFailure {
    /// Classify an I/O error raised by a socket write.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                Self::Transient
            }
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Self::Reset,
            _ => Self::Fatal,
        }
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Reset => "reset by peer",
            Self::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// A classified write failure.
#[derive(Debug, Error)]
#[error("{kind} write error: {source}")]
pub struct WriteError {
    kind: WriteFailure,
    written: usize,
    #[source]
    source: io::Error,
}

impl WriteError {
    /// Failure after `written` bytes of a payload already went out. The
    /// stream is mid-payload, so the failure is always fatal.
    pub fn partial(source: io::Error, written: usize) -> Self {
        Self {
            kind: WriteFailure::Fatal,
            written,
            source,
        }
    }

    /// Bytes of the payload written before the failure.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn kind(&self) -> WriteFailure {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind == WriteFailure::Transient
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }

    pub fn into_io_error(self) -> io::Error {
        self.source
    }
}

impl From<io::Error> for WriteError {
    fn from(source: io::Error) -> Self {
        Self {
            kind: WriteFailure::classify(&source),
            written: 0,
            source,
        }
    }
}

/// A live, exclusively owned link to the collector.
pub trait Connection: Send {
    /// Write one complete payload.
    fn send(&mut self, payload: &[u8]) -> Result<(), WriteError>;
}

/// Establishes new connections to a fixed collector endpoint.
pub trait Connector: Send {
    type Connection: Connection;

    /// Make a single connection attempt.
    fn connect(&self) -> io::Result<Self::Connection>;

    /// Human-readable endpoint used in diagnostics.
    fn endpoint(&self) -> String;
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// TCP collector endpoint with optional TLS.
#[derive(Clone, Debug)]
pub struct TcpEndpoint {
    /// `host:port` of the collector.
    pub address: String,
    pub tls: Option<TlsOptions>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl TcpEndpoint {
    /// Plain TCP endpoint using the default timeouts.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Build an endpoint from route options.
    ///
    /// Recognised keys are `connect_timeout_ms`, `write_timeout_ms`,
    /// `tls_domain`, and `tls_insecure`. TLS is enabled when `tls` is true.
    pub fn from_options(
        address: &str,
        options: &BTreeMap<String, String>,
        tls: bool,
    ) -> io::Result<Self> {
        let mut endpoint = Self::new(address);
        if let Some(ms) = positive_millis(options, "connect_timeout_ms")? {
            endpoint.connect_timeout = ms;
        }
        if let Some(ms) = positive_millis(options, "write_timeout_ms")? {
            endpoint.write_timeout = ms;
        }
        if tls {
            let domain = options
                .get("tls_domain")
                .cloned()
                .unwrap_or_else(|| host_part(address).to_owned());
            let insecure_skip_verify = options
                .get("tls_insecure")
                .is_some_and(|v| matches!(v.as_str(), "true" | "1"));
            endpoint.tls = Some(TlsOptions {
                domain,
                insecure_skip_verify,
            });
        }
        Ok(endpoint)
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.address
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

fn positive_millis(options: &BTreeMap<String, String>, key: &str) -> io::Result<Option<Duration>> {
    let Some(raw) = options.get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{key} must be a positive integer, got {raw:?}"),
        )),
    }
}

fn host_part(address: &str) -> &str {
    let host = address.rsplit_once(':').map_or(address, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

impl Connector for TcpEndpoint {
    type Connection = ActiveConnection;

    fn connect(&self) -> io::Result<ActiveConnection> {
        connect_endpoint(self)
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }
}

/// Socket underlying an [`ActiveConnection`], plain or TLS.
pub enum SocketStream {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SocketStream {
    /// Update the write timeout for the underlying socket.
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.tcp().set_write_timeout(Some(timeout))
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            SocketStream::PlainTcp(stream) => stream,
            SocketStream::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketStream::PlainTcp(stream) => stream.write(buf),
            SocketStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketStream::PlainTcp(stream) => stream.flush(),
            SocketStream::Tls(stream) => stream.flush(),
        }
    }
}

impl fmt::Debug for SocketStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketStream")
            .field("tls", &matches!(self, SocketStream::Tls(_)))
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

/// Writes whole payloads to a byte stream.
///
/// Payloads carry no framing, so a payload cut short leaves the stream
/// undecodable from that point on. Once a write fails after some bytes went
/// out the connection is torn: the failure is reported as
/// [`WriteFailure::Fatal`] and every later send is refused without writing,
/// so recovery always moves to a new connection.
#[derive(Debug)]
pub struct FramedConnection<W> {
    inner: W,
    torn: bool,
}

impl<W: Write> FramedConnection<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, torn: false }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Whether a partial write has left the stream mid-payload.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    fn fail(&mut self, source: io::Error, written: usize) -> WriteError {
        if written == 0 {
            return WriteError::from(source);
        }
        self.torn = true;
        WriteError::partial(source, written)
    }
}

impl<W: Write + Send> Connection for FramedConnection<W> {
    fn send(&mut self, payload: &[u8]) -> Result<(), WriteError> {
        if self.torn {
            return Err(WriteError::from(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection holds a partially written payload",
            )));
        }
        let mut written = 0;
        while written < payload.len() {
            match self.inner.write(&payload[written..]) {
                Ok(0) => return Err(self.fail(io::ErrorKind::WriteZero.into(), written)),
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(self.fail(err, written)),
            }
        }
        self.inner.flush().map_err(|err| self.fail(err, written))
    }
}

/// Live collector connection.
pub type ActiveConnection = FramedConnection<SocketStream>;

fn connect_tcp(endpoint: &TcpEndpoint) -> io::Result<TcpStream> {
    let addrs = endpoint.socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, endpoint.connect_timeout) {
            Ok(stream) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}", endpoint.address),
        )
    }))
}

/// Establish a connection to `endpoint`, completing the TLS handshake when
/// configured.
pub fn connect_endpoint(endpoint: &TcpEndpoint) -> io::Result<ActiveConnection> {
    let stream = connect_tcp(endpoint)?;
    let stream = if let Some(tls) = &endpoint.tls {
        let connector = tls.connector()?;
        stream.set_read_timeout(Some(endpoint.connect_timeout))?;
        stream.set_write_timeout(Some(endpoint.connect_timeout))?;
        let stream = connector
            .connect(&tls.domain, stream)
            .map_err(io::Error::other)?;
        stream.get_ref().set_read_timeout(None)?;
        SocketStream::Tls(Box::new(stream))
    } else {
        SocketStream::PlainTcp(stream)
    };
    stream.set_write_timeout(endpoint.write_timeout)?;
    Ok(FramedConnection::new(stream))
}
