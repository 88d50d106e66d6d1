//! Simple echo client example driving the protocol engine directly.
//!
//! This example connects to a WebSocket echo server, sends a message,
//! and prints the echoed response.

use s9_websocket_core::{ConnectOptions, S9WebSocketConnection, S9WebSocketError};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let options = ConnectOptions::new().timeout(Duration::from_secs(5))?;

    // Connect to the WebSocket echo server
    println!("Connecting to echo.websocket.org...");
    let mut conn = S9WebSocketConnection::connect("wss://echo.websocket.org", options)?;

    conn.send_text("Hello from s9_websocket_core!")?;
    println!("Sent: Hello from s9_websocket_core!");

    loop {
        match conn.recv_msg() {
            Ok(Some(message)) => {
                println!("Received: {}", String::from_utf8_lossy(&message.payload));
                break;
            }
            Ok(None) => {
                println!("Connection closed by the server");
                break;
            }
            Err(S9WebSocketError::Timeout) => {
                // Nothing arrived within the deadline; keep waiting.
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Closing connection...");
    conn.disconnect();

    Ok(())
}
