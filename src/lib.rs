//! # s9_websocket_core
//!
//! The RFC 6455 protocol engine behind the S9 WebSocket clients.
//!
//! Where `s9_websocket` wraps a ready-made protocol stack, this crate *is*
//! the stack: a non-blocking TCP/TLS transport with poll-based readiness,
//! the HTTP/1.1 upgrade handshake with accept-key verification, the binary
//! frame codec with client-side masking, and a connection engine that
//! assembles data frames into messages while answering control frames.
//!
//! ## Features
//!
//! - Blocking-with-timeout API over a non-blocking socket
//! - `ws://` and `wss://` endpoints (`native-tls` for the latter)
//! - Frame-level and message-level receive paths
//! - Automatic PONG replies and CLOSE reflection
//!
//! ## Example
//!
//! ```no_run
//! use s9_websocket_core::{ConnectOptions, S9WebSocketConnection};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = S9WebSocketConnection::connect(
//!         "wss://echo.websocket.org",
//!         ConnectOptions::new(),
//!     )?;
//!
//!     conn.send_text("Hello from s9_websocket_core!")?;
//!     if let Some(message) = conn.recv_msg()? {
//!         println!("Received: {}", String::from_utf8_lossy(&message.payload));
//!     }
//!
//!     conn.disconnect();
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod websocket;

pub use error::{S9Result, S9WebSocketError};
pub use websocket::{
    CloseCode, ConnectOptions, ConnectionState, Frame, Message, NetTransport, Opcode,
    S9WebSocketConnection, Transport,
};
