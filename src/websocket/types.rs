//! Core types of the WebSocket wire protocol.
//!
//! This module provides the data model shared by the frame codec and the
//! connection engine:
//! - [`Opcode`] - The 4-bit frame type identifier
//! - [`Frame`] - A single wire frame: header fields plus owned payload
//! - [`Message`] - An application datum assembled from one or more data frames
//! - [`CloseCode`] - Status codes carried by CLOSE frames
//! - [`ConnectionState`] - The connection lifecycle flags

// ============================================================================
// Opcodes
// ============================================================================

/// The frame type identifier carried in the low nibble of the first header byte.
///
/// Values outside the RFC 6455 set are preserved as [`Reserved`](Self::Reserved)
/// so the codec can hand them through; the connection engine discards them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation of a fragmented message (0x0).
    Continuation,
    /// UTF-8 text data frame (0x1).
    Text,
    /// Binary data frame (0x2).
    Binary,
    /// Connection close control frame (0x8).
    Close,
    /// Ping control frame (0x9).
    Ping,
    /// Pong control frame (0xA).
    Pong,
    /// Any other opcode value observed on the wire.
    Reserved(u8),
}

impl Opcode {
    /// Maps the low nibble of the first header byte to an opcode.
    pub fn from_wire(bits: u8) -> Opcode {
        match bits & 0x0F {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }

    /// Returns the wire representation of this opcode.
    pub fn to_wire(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(bits) => bits & 0x0F,
        }
    }

    /// True for TEXT, BINARY and CONTINUATION frames.
    pub fn is_data(self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }

    /// True for CLOSE, PING and PONG frames.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

// ============================================================================
// Frames and messages
// ============================================================================

/// A single WebSocket wire frame.
///
/// Frames built through the constructors carry `fin = true` and `mask = true`,
/// the shape every client-originated frame must have. Frames produced by the
/// codec reflect whatever was observed on the wire, with the payload already
/// unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// True iff this frame completes a message.
    pub fin: bool,
    /// The frame type.
    pub opcode: Opcode,
    /// Whether the payload is XOR-masked on the wire.
    pub mask: bool,
    /// The owned, unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a final, masked frame with the given opcode and payload.
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Frame {
        Frame {
            fin: true,
            opcode,
            mask: true,
            payload,
        }
    }

    /// Creates a single-frame text message.
    pub fn text(data: &str) -> Frame {
        Frame::new(Opcode::Text, data.as_bytes().to_vec())
    }

    /// Creates a single-frame binary message.
    pub fn binary(data: Vec<u8>) -> Frame {
        Frame::new(Opcode::Binary, data)
    }

    /// Creates a PING frame with optional application data.
    pub fn ping(data: Vec<u8>) -> Frame {
        Frame::new(Opcode::Ping, data)
    }

    /// Creates a PONG frame, typically echoing a received PING payload.
    pub fn pong(data: Vec<u8>) -> Frame {
        Frame::new(Opcode::Pong, data)
    }

    /// Creates a CLOSE frame carrying the given status code and no reason.
    pub fn close(code: CloseCode) -> Frame {
        Frame::new(Opcode::Close, code.code().to_be_bytes().to_vec())
    }
}

/// An application-level datum assembled from one or more data frames.
///
/// The opcode is inherited from the first frame of the sequence and is always
/// [`Opcode::Text`] or [`Opcode::Binary`]; the payload is the concatenation of
/// the fragment payloads in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// [`Opcode::Text`] or [`Opcode::Binary`].
    pub opcode: Opcode,
    /// The assembled payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// True if this is a text message.
    pub fn is_text(&self) -> bool {
        self.opcode == Opcode::Text
    }

    /// True if this is a binary message.
    pub fn is_binary(&self) -> bool {
        self.opcode == Opcode::Binary
    }

    /// For text messages, returns the payload as `&str` if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            std::str::from_utf8(&self.payload).ok()
        } else {
            None
        }
    }
}

// ============================================================================
// Close status codes
// ============================================================================

/// Status codes carried in the first two payload bytes of a CLOSE frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure; the purpose of the connection has been fulfilled.
    Normal,
    /// The endpoint is going away (server shutdown, page navigation).
    GoingAway,
    /// The connection is being terminated due to a protocol error.
    ProtocolError,
    /// A data type was received that the endpoint cannot accept.
    Unsupported,
    /// Reserved for future use.
    Reserved,
    /// Reserved; the connection closed with no status code present.
    NoStatus,
    /// Reserved; the connection closed abnormally without a CLOSE frame.
    Abnormal,
    /// A message contained data inconsistent with its type.
    InvalidPayload,
    /// A message violated the endpoint's policy.
    PolicyViolation,
    /// A data frame was too large to accept.
    TooBig,
    /// The client expected the server to negotiate an extension.
    MissingExtension,
    /// The server encountered an unexpected internal condition.
    InternalError,
    /// The server is restarting.
    ServiceRestart,
    /// The server is overloaded; try again later.
    TryAgainLater,
    /// A gateway or proxy received an invalid upstream response.
    BadGateway,
    /// Reserved; the TLS handshake failed.
    TlsHandshake,
}

impl CloseCode {
    /// Returns the numeric status code sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Reserved => 1004,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::MissingExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::BadGateway => 1014,
            CloseCode::TlsHandshake => 1015,
        }
    }
}

// ============================================================================
// Connection lifecycle
// ============================================================================

/// The lifecycle state of a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport. The initial state and the terminal state.
    Closed,
    /// The upgrade handshake completed; frames may flow in both directions.
    Connected,
    /// An inbound CLOSE frame was observed; our CLOSE reply has been sent.
    Closing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_wire_round_trip() {
        for bits in [0x0u8, 0x1, 0x2, 0x8, 0x9, 0xA] {
            assert_eq!(Opcode::from_wire(bits).to_wire(), bits);
        }
    }

    #[test]
    fn unknown_opcode_is_preserved() {
        assert_eq!(Opcode::from_wire(0x3), Opcode::Reserved(0x3));
        assert_eq!(Opcode::from_wire(0xF).to_wire(), 0xF);
    }

    #[test]
    fn constructed_frames_are_final_and_masked() {
        let frame = Frame::text("hi");
        assert!(frame.fin);
        assert!(frame.mask);
        assert_eq!(frame.opcode, Opcode::Text);
    }

    #[test]
    fn close_frame_carries_status_in_network_order() {
        let frame = Frame::close(CloseCode::Normal);
        assert_eq!(frame.payload, vec![0x03, 0xE8]);
    }

    #[test]
    fn message_text_accessor() {
        let message = Message {
            opcode: Opcode::Text,
            payload: b"hello".to_vec(),
        };
        assert_eq!(message.as_text(), Some("hello"));

        let message = Message {
            opcode: Opcode::Binary,
            payload: b"hello".to_vec(),
        };
        assert_eq!(message.as_text(), None);
    }
}
