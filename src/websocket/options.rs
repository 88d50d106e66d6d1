use std::time::Duration;
use crate::error::{S9Result, S9WebSocketError};

// ============================================================================
// Configuration options
// ============================================================================

/// Default connection timeout applied to readiness waits and socket options.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on a single frame's declared payload length.
pub(crate) const DEFAULT_MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024;

/// Configuration options for a WebSocket connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub(crate) timeout: Duration,
    pub(crate) nodelay: Option<bool>,
    pub(crate) ttl: Option<u32>,
    pub(crate) max_frame_payload: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            timeout: DEFAULT_TIMEOUT,
            nodelay: None,
            ttl: None,
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
        }
    }
}

impl ConnectOptions {
    /// Creates a new `ConnectOptions` builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection timeout applied to every readiness wait and to the
    /// socket send/receive options. Defaults to 10 seconds.
    /// Must be greater than zero.
    pub fn timeout(mut self, timeout: Duration) -> S9Result<Self> {
        if timeout.is_zero() {
            return Err(S9WebSocketError::InvalidConfiguration(
                "Connection timeout cannot be zero".to_string(),
            ));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Enables or disables the `TCP_NODELAY` option for messages to be sent.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = Some(nodelay);
        self
    }

    /// Sets the TTL (Time To Live, # of hops) for the socket.
    /// None for the system default
    pub fn ttl(mut self, ttl: Option<u32>) -> S9Result<Self> {
        self.ttl = ttl;
        Ok(self)
    }

    /// Sets the largest payload length accepted from a single inbound frame.
    /// Frames declaring more than this are rejected as a protocol error.
    /// Must be greater than zero. Defaults to 64 MiB.
    pub fn max_frame_payload(mut self, max: usize) -> S9Result<Self> {
        if max == 0 {
            return Err(S9WebSocketError::InvalidConfiguration(
                "Maximum frame payload cannot be zero".to_string(),
            ));
        }
        self.max_frame_payload = max;
        Ok(self)
    }
}
