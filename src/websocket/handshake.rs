//! Client-side HTTP/1.1 upgrade handshake.
//!
//! One-shot: writes the upgrade request, drives the transport until the
//! response headers are complete, and verifies the `Sec-WebSocket-Accept`
//! key. Any failure clears the receive buffer and closes the transport so no
//! half-upgraded connection escapes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use url::Url;

use crate::error::{S9Result, S9WebSocketError};
use super::shared;
use super::transport::{Transport, READ_CHUNK};

/// GUID appended to the client key before hashing, fixed by RFC 6455.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const MAX_RESPONSE_HEADERS: usize = 32;

/// Generates the client nonce: 16 CSPRNG bytes, base64-encoded.
pub(crate) fn generate_key() -> S9Result<String> {
    let mut nonce = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| S9WebSocketError::Crypto(format!("handshake nonce generation failed: {}", e)))?;
    Ok(BASE64.encode(nonce))
}

/// Computes the accept key the server must return for `key`:
/// `base64(SHA1(key || GUID))`.
pub(crate) fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Renders the upgrade request for `url` with the given client key.
pub(crate) fn build_request(url: &Url, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Cache-Control: no-cache\r\n\
         Origin: {origin}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path = url.path(),
        host = url.host_str().unwrap_or(""),
        origin = url.as_str(),
        key = key,
    )
}

/// Runs the full upgrade handshake over `transport`.
///
/// `buffer` is the connection's receive buffer: response bytes accumulate
/// there, the consumed header bytes are drained on completion, and anything
/// the server sent after the handshake is left for the frame layer.
pub(crate) fn perform<T: Transport>(
    transport: &mut T,
    buffer: &mut Vec<u8>,
    url: &Url,
    key: &str,
) -> S9Result<()> {
    match drive(transport, buffer, url, key) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Leave no partial state behind: whatever arrived is suspect.
            buffer.clear();
            transport.close();
            Err(e)
        }
    }
}

fn drive<T: Transport>(
    transport: &mut T,
    buffer: &mut Vec<u8>,
    url: &Url,
    key: &str,
) -> S9Result<()> {
    let request = build_request(url, key);
    let bytes = request.as_bytes();

    // Send the request fully, respecting short writes. A timeout here is
    // fatal, unlike in steady state.
    let mut total = 0;
    while total < bytes.len() {
        match transport.write(&bytes[total..]) {
            Ok(0) => {
                return Err(S9WebSocketError::Handshake(
                    "connection closed while sending upgrade request".to_string(),
                ));
            }
            Ok(n) => total += n,
            Err(S9WebSocketError::Warn(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    // Read until the response headers are complete.
    loop {
        if !buffer.is_empty() {
            let parsed = {
                let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
                let mut response = httparse::Response::new(&mut headers);
                match response.parse(buffer)? {
                    httparse::Status::Complete(consumed) => {
                        let accept = header_value(&response, "Sec-WebSocket-Accept")
                            .map(<[u8]>::to_vec);
                        Some((consumed, response.code, accept))
                    }
                    httparse::Status::Partial => None,
                }
            };

            if let Some((consumed, code, accept)) = parsed {
                buffer.drain(..consumed);

                let accept = accept.ok_or_else(|| {
                    S9WebSocketError::Handshake("no accept key returned".to_string())
                })?;

                let expected = accept_key(key);
                if accept != expected.as_bytes() {
                    return Err(S9WebSocketError::Handshake(
                        "accept key verification failed".to_string(),
                    ));
                }

                shared::trace_on_handshake_complete(code);
                return Ok(());
            }
        }

        let mut chunk = [0u8; READ_CHUNK];
        match transport.read(&mut chunk) {
            Ok(0) => {
                return Err(S9WebSocketError::Handshake(
                    "connection closed during upgrade".to_string(),
                ));
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(S9WebSocketError::Warn(_)) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Case-insensitive header lookup over a parsed response.
fn header_value<'a>(response: &httparse::Response<'_, 'a>, name: &str) -> Option<&'a [u8]> {
    response
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}
