//! Connection engine: owns the transport, the receive buffer and the frame
//! queue, and runs the control-frame state machine.
//!
//! The engine is single-threaded per connection. Receive calls block up to
//! the connection timeout; a [`S9WebSocketError::Timeout`] in steady state is
//! not fatal and the call may simply be repeated.

use std::collections::VecDeque;

use url::Url;

use crate::error::{S9Result, S9WebSocketError};
use super::frame;
use super::handshake;
use super::options::ConnectOptions;
use super::shared;
use super::transport::{NetTransport, Transport, READ_CHUNK};
use super::types::{CloseCode, ConnectionState, Frame, Message, Opcode};

/// Callback invoked when the connection is locally torn down.
type DisconnectHandler<T> = Box<dyn FnMut(&mut T)>;

// ============================================================================
// S9WebSocketConnection - protocol engine over a transport
// ============================================================================

/// A client WebSocket connection over a [`Transport`].
///
/// Created by [`connect`](S9WebSocketConnection::connect) for the production
/// [`NetTransport`], or by [`handshake_on`](S9WebSocketConnection::handshake_on)
/// to upgrade an already established transport.
///
/// # Examples
///
/// ```no_run
/// use s9_websocket_core::{ConnectOptions, S9WebSocketConnection};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut conn = S9WebSocketConnection::connect("ws://localhost:9001", ConnectOptions::new())?;
///
/// conn.send_text("ping me")?;
/// while let Some(message) = conn.recv_msg()? {
///     println!("got {} bytes", message.payload.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct S9WebSocketConnection<T: Transport = NetTransport> {
    transport: T,
    buffer: Vec<u8>,
    queue: VecDeque<Frame>,
    key: String,
    url: Url,
    state: ConnectionState,
    options: ConnectOptions,
    on_disconnect: Option<DisconnectHandler<T>>,
}

impl S9WebSocketConnection<NetTransport> {
    /// Connects to `uri` (`ws://` or `wss://`) and performs the upgrade
    /// handshake. On success the connection is in
    /// [`ConnectionState::Connected`].
    pub fn connect(uri: &str, options: ConnectOptions) -> S9Result<S9WebSocketConnection> {
        let url = parse_url(uri)?;
        let mut transport = transport_for(&url, &options)?;

        let key = handshake::generate_key()?;
        let mut buffer = Vec::new();
        handshake::perform(&mut transport, &mut buffer, &url, &key)?;

        Ok(S9WebSocketConnection {
            transport,
            buffer,
            queue: VecDeque::new(),
            key,
            url,
            state: ConnectionState::Connected,
            options,
            on_disconnect: None,
        })
    }

    /// Connects to `uri` but delegates the upgrade to `handshake_fn`, which
    /// receives the established transport. For endpoints that need a
    /// non-standard opening exchange.
    pub fn connect_with_handshake<F>(
        uri: &str,
        options: ConnectOptions,
        handshake_fn: F,
    ) -> S9Result<S9WebSocketConnection>
    where
        F: FnOnce(&mut NetTransport) -> S9Result<()>,
    {
        let url = parse_url(uri)?;
        let mut transport = transport_for(&url, &options)?;

        if let Err(e) = handshake_fn(&mut transport) {
            transport.close();
            return Err(e);
        }

        Ok(S9WebSocketConnection {
            transport,
            buffer: Vec::new(),
            queue: VecDeque::new(),
            key: String::new(),
            url,
            state: ConnectionState::Connected,
            options,
            on_disconnect: None,
        })
    }
}

impl<T: Transport> S9WebSocketConnection<T> {
    /// Performs the upgrade handshake over an already established transport
    /// and wraps it in a connection.
    pub fn handshake_on(mut transport: T, url: Url, options: ConnectOptions) -> S9Result<S9WebSocketConnection<T>> {
        let key = handshake::generate_key()?;
        let mut buffer = Vec::new();
        handshake::perform(&mut transport, &mut buffer, &url, &key)?;

        Ok(S9WebSocketConnection {
            transport,
            buffer,
            queue: VecDeque::new(),
            key,
            url,
            state: ConnectionState::Connected,
            options,
            on_disconnect: None,
        })
    }

    /// Registers a callback invoked once when [`disconnect`](Self::disconnect)
    /// tears the connection down.
    pub fn set_disconnect_handler(&mut self, handler: impl FnMut(&mut T) + 'static) {
        self.on_disconnect = Some(Box::new(handler));
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while frames may flow in both directions.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The URL this connection was opened against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The base64-encoded nonce sent as `Sec-WebSocket-Key` during the
    /// opening handshake. Empty when a handshake override was used.
    pub fn handshake_key(&self) -> &str {
        &self.key
    }

    /// Applies a new timeout to the transport's readiness waits and socket
    /// options.
    pub fn set_timeout(&mut self, timeout: std::time::Duration) -> S9Result<()> {
        self.transport.set_timeout(timeout)
    }

    // ------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------

    /// Returns the next received data frame, reading from the transport as
    /// needed.
    ///
    /// Returns `Ok(None)` once the connection is closed or closing and the
    /// queue is drained. A [`S9WebSocketError::Timeout`] means no frame
    /// arrived within the deadline; the call may be retried.
    pub fn recv_frame(&mut self) -> S9Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.queue.pop_front() {
                return Ok(Some(frame));
            }
            if self.state != ConnectionState::Connected {
                return Ok(None);
            }
            match self.fill_from_transport() {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.ingress()?;
                }
                Err(S9WebSocketError::Warn(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns the next complete message, reading from the transport as
    /// needed and assembling fragments.
    ///
    /// Returns `Ok(None)` once the connection is closed or closing and no
    /// complete message remains. A [`S9WebSocketError::Timeout`] means no
    /// message completed within the deadline; the call may be retried.
    pub fn recv_msg(&mut self) -> S9Result<Option<Message>> {
        loop {
            if let Some(message) = self.pop_message()? {
                return Ok(Some(message));
            }
            if self.state != ConnectionState::Connected {
                return Ok(None);
            }
            match self.fill_from_transport() {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.ingress()?;
                }
                Err(S9WebSocketError::Warn(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Parses as many frames as the receive buffer holds and dispatches each
    /// one. Returns the number of bytes consumed.
    ///
    /// Data frames are queued for [`recv_frame`](Self::recv_frame) /
    /// [`recv_msg`](Self::recv_msg); control frames are answered or dropped
    /// here.
    pub fn ingress(&mut self) -> S9Result<usize> {
        let mut total_consumed = 0;

        while !self.buffer.is_empty() {
            match frame::deserialize(&self.buffer, self.options.max_frame_payload) {
                Ok(Some((frame, consumed))) => {
                    shared::trace_on_frame_received(&frame);
                    self.buffer.drain(..consumed);
                    total_consumed += consumed;
                    self.dispatch(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to parse inbound frame: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(total_consumed)
    }

    /// Per-opcode frame handling. Control-frame replies are best-effort and
    /// never fail the caller's receive.
    fn dispatch(&mut self, frame: Frame) {
        match frame.opcode {
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                self.queue.push_back(frame);
            }
            Opcode::Close => {
                shared::trace_on_close_frame(&frame);
                self.state = ConnectionState::Closing;
                self.send_control_frame(Frame::close(CloseCode::Normal));
            }
            Opcode::Ping => {
                shared::trace_on_ping(&frame.payload);
                self.send_control_frame(Frame::pong(frame.payload));
            }
            Opcode::Pong => {
                shared::trace_on_pong(&frame.payload);
            }
            Opcode::Reserved(_) => {
                shared::trace_on_discarded_frame(frame.opcode);
            }
        }
    }

    /// Reads one chunk from the transport into the receive buffer.
    /// `Ok(0)` means the peer closed the stream; the connection is marked
    /// closed.
    fn fill_from_transport(&mut self) -> S9Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.transport.read(&mut chunk) {
            Ok(0) => {
                if tracing::enabled!(tracing::Level::TRACE) {
                    tracing::trace!("Transport reached end of stream");
                }
                self.state = ConnectionState::Closed;
                Ok(0)
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }

    /// Pops one complete message off the frame queue, if one is present.
    ///
    /// A message is complete when the queue holds a frame with `fin = true`;
    /// the contiguous prefix up to and including that frame is consumed. The
    /// first frame must open a message, so a leading CONTINUATION is a
    /// protocol error.
    fn pop_message(&mut self) -> S9Result<Option<Message>> {
        if !self.queue.iter().any(|f| f.fin) {
            return Ok(None);
        }

        let first = match self.queue.pop_front() {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let opcode = match first.opcode {
            Opcode::Text | Opcode::Binary => first.opcode,
            other => {
                return Err(S9WebSocketError::Protocol(format!(
                    "message cannot start with a {:?} frame",
                    other
                )));
            }
        };

        let mut payload = first.payload;
        let mut fin = first.fin;
        while !fin {
            match self.queue.pop_front() {
                Some(next) => {
                    payload.extend_from_slice(&next.payload);
                    fin = next.fin;
                }
                // Unreachable: the fin scan above guarantees a terminator.
                None => break,
            }
        }

        Ok(Some(Message { opcode, payload }))
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Serializes `frame` and writes it out completely, looping over short
    /// writes.
    pub fn send_frame(&mut self, frame: Frame) -> S9Result<()> {
        let data = frame::serialize(&frame)?;
        shared::trace_on_frame_sent(&frame, data.len());
        self.write_all(&data)
    }

    /// Sends a single-frame text message.
    #[inline]
    pub fn send_text(&mut self, text: &str) -> S9Result<()> {
        self.ensure_connected()?;
        self.send_frame(Frame::text(text))
    }

    /// Sends a single-frame binary message.
    #[inline]
    pub fn send_binary(&mut self, data: Vec<u8>) -> S9Result<()> {
        self.ensure_connected()?;
        self.send_frame(Frame::binary(data))
    }

    /// Sends a PING frame with optional application data.
    #[inline]
    pub fn send_ping(&mut self, data: Vec<u8>) -> S9Result<()> {
        self.ensure_connected()?;
        self.send_frame(Frame::ping(data))
    }

    /// Sends a PONG frame with optional application data.
    #[inline]
    pub fn send_pong(&mut self, data: Vec<u8>) -> S9Result<()> {
        self.ensure_connected()?;
        self.send_frame(Frame::pong(data))
    }

    /// Tears the connection down: notifies the disconnect handler, sends a
    /// best-effort normal-closure CLOSE frame and closes the transport.
    /// Idempotent.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if let Some(mut handler) = self.on_disconnect.take() {
            handler(&mut self.transport);
        }

        self.state = ConnectionState::Closed;
        self.send_control_frame(Frame::close(CloseCode::Normal));
        self.transport.close();
    }

    fn ensure_connected(&self) -> S9Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(S9WebSocketError::ConnectionClosed(None))
        }
    }

    fn write_all(&mut self, data: &[u8]) -> S9Result<()> {
        let mut total = 0;
        while total < data.len() {
            match self.transport.write(&data[total..]) {
                Ok(0) => {
                    return Err(S9WebSocketError::ConnectionClosed(Some(
                        "connection closed during send".to_string(),
                    )));
                }
                Ok(n) => total += n,
                Err(S9WebSocketError::Warn(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Writes a control frame, logging and swallowing any failure.
    fn send_control_frame(&mut self, frame: Frame) {
        let opcode = frame.opcode;
        if let Err(e) = self.send_frame(frame) {
            tracing::error!("Failed to send {:?} control frame: {}", opcode, e);
        }
    }
}

impl<T: Transport> Drop for S9WebSocketConnection<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// URL helpers
// ============================================================================

fn parse_url(uri: &str) -> S9Result<Url> {
    let url = Url::parse(uri).map_err(|e| {
        tracing::error!("Error connecting to invalid URI: {}", uri);
        S9WebSocketError::InvalidUri(e.to_string())
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(S9WebSocketError::InvalidUri(format!(
            "unsupported scheme: {}",
            other
        ))),
    }
}

fn transport_for(url: &Url, options: &ConnectOptions) -> S9Result<NetTransport> {
    let host = url
        .host_str()
        .ok_or_else(|| S9WebSocketError::InvalidUri("missing host".to_string()))?;

    let tls = url.scheme() == "wss";
    let port = url
        .port_or_known_default()
        .unwrap_or(if tls { 443 } else { 80 });

    NetTransport::connect(host, port, tls, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::transport::mock::MockTransport;

    fn connection_over(transport: MockTransport) -> S9WebSocketConnection<MockTransport> {
        S9WebSocketConnection {
            transport,
            buffer: Vec::new(),
            queue: VecDeque::new(),
            key: String::new(),
            url: Url::parse("ws://localhost/").unwrap(),
            state: ConnectionState::Connected,
            options: ConnectOptions::new(),
            on_disconnect: None,
        }
    }

    fn server_frame(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
        frame::serialize(&Frame {
            fin,
            opcode,
            mask: false,
            payload: payload.to_vec(),
        })
        .unwrap()
    }

    /// Parses every client frame captured by the mock transport.
    fn written_frames(conn: &S9WebSocketConnection<MockTransport>) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut data = conn.transport.written.as_slice();
        while !data.is_empty() {
            let (frame, consumed) = frame::deserialize(data, usize::MAX)
                .unwrap()
                .expect("mock captured a partial frame");
            frames.push(frame);
            data = &data[consumed..];
        }
        frames
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Ping, true, b"hello"));
        let mut conn = connection_over(transport);

        // The ping is consumed by the engine; nothing reaches the caller
        // before the mock times out.
        assert!(matches!(conn.recv_frame(), Err(S9WebSocketError::Timeout)));

        let frames = written_frames(&conn);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Pong);
        assert!(frames[0].fin);
        assert!(frames[0].mask);
        assert_eq!(frames[0].payload, b"hello");
    }

    #[test]
    fn pong_is_discarded_without_reply() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Pong, true, b"late"));
        let mut conn = connection_over(transport);

        assert!(matches!(conn.recv_frame(), Err(S9WebSocketError::Timeout)));
        assert!(conn.transport.written.is_empty());
    }

    #[test]
    fn reserved_opcode_is_discarded() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Reserved(0x3), true, b"???"));
        let mut conn = connection_over(transport);

        assert!(matches!(conn.recv_frame(), Err(S9WebSocketError::Timeout)));
        assert!(conn.transport.written.is_empty());
        assert!(conn.queue.is_empty());
    }

    #[test]
    fn fragmented_text_is_assembled() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Text, false, b"Hel"));
        transport.push_read(server_frame(Opcode::Continuation, false, b"lo, W"));
        transport.push_read(server_frame(Opcode::Continuation, true, b"orld"));
        let mut conn = connection_over(transport);

        let message = conn.recv_msg().unwrap().unwrap();
        assert_eq!(message.opcode, Opcode::Text);
        assert_eq!(message.payload, b"Hello, World");
    }

    #[test]
    fn close_is_reflected_and_receives_drain_to_none() {
        let mut close_payload = Vec::new();
        close_payload.extend_from_slice(&1000u16.to_be_bytes());

        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Close, true, &close_payload));
        let mut conn = connection_over(transport);

        assert!(conn.recv_frame().unwrap().is_none());
        assert_eq!(conn.state(), ConnectionState::Closing);

        let frames = written_frames(&conn);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Close);
        assert_eq!(frames[0].payload, vec![0x03, 0xE8]);

        // Subsequent receives observe the closing state without touching
        // the transport.
        assert!(conn.recv_frame().unwrap().is_none());
        assert!(conn.recv_msg().unwrap().is_none());
    }

    #[test]
    fn data_before_close_is_still_delivered() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Text, true, b"bye"));
        transport.push_read(server_frame(Opcode::Close, true, &1000u16.to_be_bytes()));
        let mut conn = connection_over(transport);

        let message = conn.recv_msg().unwrap().unwrap();
        assert_eq!(message.payload, b"bye");

        // recv_frame drains the close on its next read.
        assert!(conn.recv_frame().unwrap().is_none());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn incremental_bytes_dispatch_exactly_once() {
        let wire = server_frame(Opcode::Binary, true, &vec![0xAB; 200]);

        let mut transport = MockTransport::new();
        for byte in &wire {
            transport.push_read(vec![*byte]);
        }
        let mut conn = connection_over(transport);

        let frame = conn.recv_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(frame.payload.len(), 200);
        assert!(conn.buffer.is_empty());
        assert!(conn.queue.is_empty());
        assert!(conn.transport.incoming.is_empty());
    }

    #[test]
    fn concatenated_frames_dispatch_in_order() {
        let mut wire = Vec::new();
        for i in 0..5u8 {
            wire.extend_from_slice(&server_frame(Opcode::Text, true, &[b'0' + i]));
        }

        let mut transport = MockTransport::new();
        transport.push_read(wire.clone());
        let mut conn = connection_over(transport);

        for i in 0..5u8 {
            let frame = conn.recv_frame().unwrap().unwrap();
            assert_eq!(frame.payload, vec![b'0' + i]);
        }
        assert!(conn.buffer.is_empty());
    }

    #[test]
    fn continuation_without_opening_frame_is_a_protocol_error() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Continuation, true, b"orphan"));
        let mut conn = connection_over(transport);

        match conn.recv_msg() {
            Err(S9WebSocketError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn oversized_frame_fails_ingress() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Binary, true, &vec![0u8; 4096]));
        let mut conn = connection_over(transport);
        conn.options = ConnectOptions::new().max_frame_payload(1024).unwrap();

        match conn.recv_frame() {
            Err(S9WebSocketError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn eof_closes_the_connection() {
        let mut transport = MockTransport::new();
        transport.push_read(Vec::new());
        let mut conn = connection_over(transport);

        assert!(conn.recv_frame().unwrap().is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn send_text_emits_one_masked_frame() {
        let mut conn = connection_over(MockTransport::new());
        conn.send_text("hi there").unwrap();

        let frames = written_frames(&conn);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].mask);
        assert_eq!(frames[0].opcode, Opcode::Text);
        assert_eq!(frames[0].payload, b"hi there");
    }

    #[test]
    fn send_after_disconnect_is_rejected() {
        let mut conn = connection_over(MockTransport::new());
        conn.disconnect();

        assert!(matches!(
            conn.send_text("too late"),
            Err(S9WebSocketError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn disconnect_sends_close_and_closes_transport_once() {
        let mut conn = connection_over(MockTransport::new());
        conn.disconnect();
        conn.disconnect();

        let frames = written_frames(&conn);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Close);
        assert_eq!(frames[0].payload, vec![0x03, 0xE8]);
        assert!(conn.transport.closed);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn disconnect_handler_fires_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let fired = Rc::new(Cell::new(0u32));
        let seen = fired.clone();

        let mut conn = connection_over(MockTransport::new());
        conn.set_disconnect_handler(move |_transport| {
            seen.set(seen.get() + 1);
        });

        conn.disconnect();
        conn.disconnect();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn recv_timeout_is_retryable() {
        let mut transport = MockTransport::new();
        transport.push_read(server_frame(Opcode::Text, true, b"eventually"));
        let mut conn = connection_over(transport);

        let frame = conn.recv_frame().unwrap().unwrap();
        assert_eq!(frame.payload, b"eventually");

        // The scripted reads are exhausted now; the engine times out but the
        // connection stays usable.
        assert!(matches!(conn.recv_frame(), Err(S9WebSocketError::Timeout)));
        assert!(conn.is_connected());
    }
}
