//! Error types for S9 WebSocket operations.
//!
//! This module provides a unified error type [`S9WebSocketError`] that encompasses all possible
//! errors that can occur while connecting, handshaking, framing and exchanging messages.
//!
//! # Examples
//!
//! ```no_run
//! use s9_websocket_core::{ConnectOptions, S9WebSocketConnection, S9WebSocketError};
//!
//! # fn main() {
//! match S9WebSocketConnection::connect("wss://invalid-uri", ConnectOptions::new()) {
//!     Ok(conn) => { /* use connection */ },
//!     Err(S9WebSocketError::InvalidUri(msg)) => {
//!         eprintln!("Invalid URI: {}", msg);
//!     },
//!     Err(S9WebSocketError::Io(io_err)) => {
//!         eprintln!("Network error: {}", io_err);
//!     },
//!     Err(e) => {
//!         eprintln!("Connection failed: {}", e);
//!     }
//! }
//! # }
//! ```

use std::fmt;

/// Error type for all S9 WebSocket operations.
///
/// This enum represents all possible errors that can occur when using the protocol engine.
/// It wraps underlying errors from I/O operations, URI parsing, TLS and the upgrade handshake.
///
/// # Error Categories
///
/// - **Connection errors**: [`InvalidUri`](Self::InvalidUri), [`ConnectionClosed`](Self::ConnectionClosed)
/// - **Configuration errors**: [`InvalidConfiguration`](Self::InvalidConfiguration)
/// - **Transport errors**: [`Timeout`](Self::Timeout), [`Warn`](Self::Warn), [`Io`](Self::Io), [`Tls`](Self::Tls)
/// - **Protocol errors**: [`Handshake`](Self::Handshake), [`Protocol`](Self::Protocol), [`Crypto`](Self::Crypto)
#[derive(Debug)]
pub enum S9WebSocketError {
    /// Invalid WebSocket URI was provided.
    ///
    /// This error occurs when the URI cannot be parsed or doesn't follow the WebSocket URI scheme
    /// (`ws://` or `wss://`).
    InvalidUri(String),

    /// Invalid configuration was provided.
    ///
    /// This error occurs when configuration options contain invalid values, such as:
    /// - Zero-duration timeouts
    /// - A zero maximum frame payload
    ///
    /// # Example
    /// ```
    /// use s9_websocket_core::ConnectOptions;
    /// use std::time::Duration;
    ///
    /// // This fails because the connection timeout cannot be zero
    /// let result = ConnectOptions::new().timeout(Duration::from_secs(0));
    /// assert!(result.is_err());
    /// ```
    InvalidConfiguration(String),

    /// WebSocket connection was closed by the server or due to an error.
    ///
    /// The optional `String` contains the close reason if one is known.
    ConnectionClosed(Option<String>),

    /// A readiness deadline expired before the socket became readable or writable.
    ///
    /// Timeouts on steady-state reads are not fatal; the caller may retry the
    /// receive call. A timeout during the upgrade handshake is fatal and closes
    /// the transport.
    Timeout,

    /// A recoverable transport condition, such as a socket that polled readable
    /// but then had no bytes to deliver. The caller may retry.
    Warn(String),

    /// An I/O operation failed.
    ///
    /// This wraps standard [`std::io::Error`] and can occur during:
    /// - Host resolution and TCP connect
    /// - Socket reads, writes and configuration
    Io(std::io::Error),

    /// TLS initialization, handshake, shutdown or I/O failed.
    Tls(String),

    /// The HTTP upgrade failed: the response was malformed, the
    /// `Sec-WebSocket-Accept` header was missing, or the accept key did not
    /// match the expected value.
    Handshake(String),

    /// A malformed frame or an illegal frame sequence was received, or a frame
    /// declared a payload larger than the configured maximum.
    Protocol(String),

    /// The cryptographically secure random source failed while generating a
    /// handshake nonce or a masking key.
    Crypto(String),
}

impl fmt::Display for S9WebSocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S9WebSocketError::InvalidUri(uri) => write!(f, "Invalid URI: {}", uri),
            S9WebSocketError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            S9WebSocketError::ConnectionClosed(reason) => {
                match reason {
                    Some(r) => write!(f, "Connection closed: {}", r),
                    None => write!(f, "Connection closed without reason"),
                }
            }
            S9WebSocketError::Timeout => write!(f, "Operation timed out"),
            S9WebSocketError::Warn(msg) => write!(f, "Recoverable transport condition: {}", msg),
            S9WebSocketError::Io(err) => write!(f, "IO error: {}", err),
            S9WebSocketError::Tls(msg) => write!(f, "TLS error: {}", msg),
            S9WebSocketError::Handshake(msg) => write!(f, "Handshake error: {}", msg),
            S9WebSocketError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            S9WebSocketError::Crypto(msg) => write!(f, "Crypto error: {}", msg),
        }
    }
}

impl std::error::Error for S9WebSocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            S9WebSocketError::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Convert from std::io::Error to S9WebSocketError
impl From<std::io::Error> for S9WebSocketError {
    fn from(err: std::io::Error) -> Self {
        S9WebSocketError::Io(err)
    }
}

// Convert from URL parse errors to S9WebSocketError
impl From<url::ParseError> for S9WebSocketError {
    fn from(err: url::ParseError) -> Self {
        S9WebSocketError::InvalidUri(err.to_string())
    }
}

// Convert from TLS errors to S9WebSocketError
impl From<native_tls::Error> for S9WebSocketError {
    fn from(err: native_tls::Error) -> Self {
        S9WebSocketError::Tls(err.to_string())
    }
}

// Convert from HTTP response parse errors to S9WebSocketError
impl From<httparse::Error> for S9WebSocketError {
    fn from(err: httparse::Error) -> Self {
        S9WebSocketError::Handshake(format!("invalid upgrade response: {}", err))
    }
}

/// Convenience type alias for `Result<T, S9WebSocketError>`.
///
/// This type is used throughout the S9 WebSocket API for operations that can fail.
///
/// # Examples
///
/// ```no_run
/// use s9_websocket_core::{ConnectOptions, S9Result, S9WebSocketConnection};
///
/// fn connect_to_server() -> S9Result<S9WebSocketConnection> {
///     S9WebSocketConnection::connect("wss://echo.websocket.org", ConnectOptions::new())
/// }
/// ```
pub type S9Result<T> = Result<T, S9WebSocketError>;
