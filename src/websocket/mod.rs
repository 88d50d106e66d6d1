// Public API modules
pub mod types;
pub mod options;
pub mod frame;

// Internal modules
mod shared;
mod handshake;

// Protocol engine
mod transport;
mod connection;

// Re-export public types
pub use types::{CloseCode, ConnectionState, Frame, Message, Opcode};
pub use options::ConnectOptions;

// Re-export engine types
pub use connection::S9WebSocketConnection;
pub use transport::{MaybeTlsStream, NetTransport, Transport};
