//! Socket transport: plain TCP or TLS, non-blocking underneath, synchronous
//! with a deadline on top.
//!
//! All I/O goes through a readiness wait on a [`polling::Poller`] bounded by
//! the connection timeout, so every call returns within the deadline even
//! though the socket itself is non-blocking.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use polling::{Event, Events, Poller};

use crate::error::{S9Result, S9WebSocketError};
use super::options::ConnectOptions;

/// Largest number of bytes pulled off the socket per read call.
pub(crate) const READ_CHUNK: usize = 1024;

/// Poller key for the single registered socket.
const SOCKET_KEY: usize = 0;

// ============================================================================
// Transport capability set
// ============================================================================

/// The capability set a connection needs from its transport.
///
/// [`NetTransport`] is the production implementation; tests substitute a
/// scripted double.
pub trait Transport {
    /// Waits for readability up to the timeout, then reads at most
    /// `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    ///
    /// Returns [`S9WebSocketError::Timeout`] when the deadline expires and
    /// [`S9WebSocketError::Warn`] for a wakeup that delivered no bytes;
    /// both are retryable.
    fn read(&mut self, buf: &mut [u8]) -> S9Result<usize>;

    /// Waits for writability up to the timeout, then writes as much of
    /// `data` as the socket accepts. Short writes are reported, not retried.
    fn write(&mut self, data: &[u8]) -> S9Result<usize>;

    /// Shuts the stream down. Idempotent.
    fn close(&mut self);

    /// Applies a new timeout to the readiness waits and the socket options.
    fn set_timeout(&mut self, timeout: Duration) -> S9Result<()>;
}

// ============================================================================
// Stream wrapper
// ============================================================================

/// A connected stream, either plain TCP or TLS over TCP.
pub enum MaybeTlsStream {
    /// Plain TCP stream.
    Plain(TcpStream),
    /// TLS session bound to a TCP stream.
    Tls(native_tls::TlsStream<TcpStream>),
}

impl MaybeTlsStream {
    fn get_ref(&self) -> &TcpStream {
        match self {
            MaybeTlsStream::Plain(stream) => stream,
            MaybeTlsStream::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.read(buf),
            MaybeTlsStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.write(buf),
            MaybeTlsStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.flush(),
            MaybeTlsStream::Tls(stream) => stream.flush(),
        }
    }
}

// ============================================================================
// NetTransport - production TCP/TLS transport
// ============================================================================

/// The production transport: a connected socket, its poller registration and
/// the per-connection timeout.
pub struct NetTransport {
    stream: Option<MaybeTlsStream>,
    poller: Poller,
    events: Events,
    timeout: Duration,
}

impl NetTransport {
    /// Resolves `host`, connects to the first reachable address, establishes
    /// TLS when requested, then switches the socket to non-blocking mode and
    /// registers it for readiness polling.
    pub fn connect(host: &str, port: u16, tls: bool, options: &ConnectOptions) -> S9Result<NetTransport> {
        let stream = connect_to_host(host, port)?;

        // The TLS and upgrade handshakes run before the switch to
        // non-blocking, so the socket options bound them.
        stream.set_read_timeout(Some(options.timeout))?;
        stream.set_write_timeout(Some(options.timeout))?;
        if let Some(nodelay) = options.nodelay {
            stream.set_nodelay(nodelay)?;
        }
        if let Some(ttl) = options.ttl {
            stream.set_ttl(ttl)?;
        }

        let stream = if tls {
            MaybeTlsStream::Tls(tls_handshake(host, stream)?)
        } else {
            MaybeTlsStream::Plain(stream)
        };

        stream.get_ref().set_nonblocking(true)?;

        let poller = Poller::new()?;
        // SAFETY: the socket is owned by this transport and is deleted from
        // the poller in close() before it is dropped.
        unsafe {
            poller.add(stream.get_ref(), Event::none(SOCKET_KEY))?;
        }

        Ok(NetTransport {
            stream: Some(stream),
            poller,
            events: Events::new(),
            timeout: options.timeout,
        })
    }

    /// Waits until the socket signals the given interest or the timeout expires.
    fn wait_for(&mut self, interest: Event) -> S9Result<()> {
        let stream = match self.stream.as_ref() {
            Some(stream) => stream,
            None => return Err(S9WebSocketError::ConnectionClosed(None)),
        };

        self.poller.modify(stream.get_ref(), interest)?;
        self.events.clear();

        let n = self.poller.wait(&mut self.events, Some(self.timeout))?;
        if n == 0 {
            return Err(S9WebSocketError::Timeout);
        }
        Ok(())
    }
}

impl Transport for NetTransport {
    fn read(&mut self, buf: &mut [u8]) -> S9Result<usize> {
        self.wait_for(Event::readable(SOCKET_KEY))?;

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(S9WebSocketError::ConnectionClosed(None)),
        };

        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
                Err(S9WebSocketError::Warn(format!("socket readable but read yielded nothing: {}", e)))
            }
            Err(e) => Err(S9WebSocketError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> S9Result<usize> {
        self.wait_for(Event::writable(SOCKET_KEY))?;

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(S9WebSocketError::ConnectionClosed(None)),
        };

        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
                Err(S9WebSocketError::Warn(format!("socket writable but write accepted nothing: {}", e)))
            }
            Err(e) => Err(S9WebSocketError::Io(e)),
        }
    }

    fn close(&mut self) {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => return,
        };

        if let Err(e) = self.poller.delete(stream.get_ref()) {
            tracing::trace!("Failed to deregister socket from poller: {}", e);
        }

        if let MaybeTlsStream::Tls(tls) = &mut stream {
            // Orderly TLS shutdown, with one retry when the first attempt
            // reports the close-notify exchange as still in flight.
            match tls.shutdown() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(e) = tls.shutdown() {
                        tracing::trace!("TLS shutdown did not complete: {}", e);
                    }
                }
                Err(e) => {
                    tracing::trace!("TLS shutdown failed: {}", e);
                }
            }
        }

        // The TCP socket closes when `stream` drops here.
    }

    fn set_timeout(&mut self, timeout: Duration) -> S9Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream.get_ref().set_read_timeout(Some(timeout))?;
            stream.get_ref().set_write_timeout(Some(timeout))?;
        }
        self.timeout = timeout;
        Ok(())
    }
}

impl Drop for NetTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Connection helpers
// ============================================================================

/// Resolves the host and connects to each candidate address in order,
/// IPv4 and IPv6 alike, returning the first stream that connects.
fn connect_to_host(host: &str, port: u16) -> S9Result<TcpStream> {
    let addrs = (host, port).to_socket_addrs().map_err(|e| {
        tracing::error!("Failed to resolve host {}: {}", host, e);
        S9WebSocketError::Io(e)
    })?;

    let mut last_error: Option<io::Error> = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if tracing::enabled!(tracing::Level::TRACE) {
                    tracing::trace!("Failed to connect to {}: {}", addr, e);
                }
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => S9WebSocketError::Io(e),
        None => S9WebSocketError::Io(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("host {} resolved to no addresses", host),
        )),
    })
}

/// Runs the TLS client handshake on a blocking socket.
///
/// The socket timeouts bound every handshake read and write, so a handshake
/// interrupted twice in a row is treated as timed out rather than resumed
/// indefinitely.
fn tls_handshake(host: &str, stream: TcpStream) -> S9Result<native_tls::TlsStream<TcpStream>> {
    let connector = native_tls::TlsConnector::new()?;

    let mid = match connector.connect(host, stream) {
        Ok(stream) => return Ok(stream),
        Err(native_tls::HandshakeError::WouldBlock(mid)) => mid,
        Err(native_tls::HandshakeError::Failure(e)) => {
            tracing::error!("TLS handshake with {} failed: {}", host, e);
            return Err(S9WebSocketError::Tls(e.to_string()));
        }
    };

    match mid.handshake() {
        Ok(stream) => Ok(stream),
        Err(native_tls::HandshakeError::WouldBlock(_)) => {
            Err(S9WebSocketError::Tls(format!("TLS handshake with {} timed out", host)))
        }
        Err(native_tls::HandshakeError::Failure(e)) => {
            tracing::error!("TLS handshake with {} failed: {}", host, e);
            Err(S9WebSocketError::Tls(e.to_string()))
        }
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::time::Duration;

    use crate::error::{S9Result, S9WebSocketError};
    use super::Transport;

    /// Scripted transport: serves queued chunks to `read`, captures `write`.
    /// An exhausted read script behaves like a quiet socket and times out.
    pub(crate) struct MockTransport {
        pub(crate) incoming: VecDeque<Vec<u8>>,
        pub(crate) written: Vec<u8>,
        pub(crate) closed: bool,
    }

    impl MockTransport {
        pub(crate) fn new() -> MockTransport {
            MockTransport {
                incoming: VecDeque::new(),
                written: Vec::new(),
                closed: false,
            }
        }

        pub(crate) fn push_read(&mut self, chunk: impl Into<Vec<u8>>) {
            self.incoming.push_back(chunk.into());
        }
    }

    impl Transport for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> S9Result<usize> {
            let mut chunk = match self.incoming.pop_front() {
                Some(chunk) => chunk,
                None => return Err(S9WebSocketError::Timeout),
            };

            if chunk.len() > buf.len() {
                let rest = chunk.split_off(buf.len());
                self.incoming.push_front(rest);
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }

        fn write(&mut self, data: &[u8]) -> S9Result<usize> {
            self.written.extend_from_slice(data);
            Ok(data.len())
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn set_timeout(&mut self, _timeout: Duration) -> S9Result<()> {
            Ok(())
        }
    }
}
