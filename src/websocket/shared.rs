use super::types::{Frame, Opcode};

// ============================================================================
// Shared Internal Helpers
// ============================================================================

/// Traces handshake completion
pub(crate) fn trace_on_handshake_complete(code: Option<u16>) {
    if tracing::enabled!(tracing::Level::TRACE) {
        match code {
            Some(code) => tracing::trace!("Handshake complete, response HTTP code: {}", code),
            None => tracing::trace!("Handshake complete"),
        }
    }
}

/// Traces a frame parsed off the wire
#[inline]
pub(crate) fn trace_on_frame_received(frame: &Frame) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(
            "Received frame: fin={} opcode={:?} mask={} payload={} bytes",
            frame.fin,
            frame.opcode,
            frame.mask,
            frame.payload.len()
        );
    }
}

/// Traces a frame handed to the transport
#[inline]
pub(crate) fn trace_on_frame_sent(frame: &Frame, wire_len: usize) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(
            "Sent frame: fin={} opcode={:?} payload={} bytes ({} on the wire)",
            frame.fin,
            frame.opcode,
            frame.payload.len(),
            wire_len
        );
    }
}

/// Traces ping frame receipt
#[inline]
pub(crate) fn trace_on_ping(data: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!("Received ping frame: {}", String::from_utf8_lossy(data));
    }
}

/// Traces pong frame receipt
#[inline]
pub(crate) fn trace_on_pong(data: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!("Received pong frame: {}", String::from_utf8_lossy(data));
    }
}

/// Traces close frame receipt
pub(crate) fn trace_on_close_frame(frame: &Frame) {
    if tracing::enabled!(tracing::Level::TRACE) {
        if frame.payload.len() >= 2 {
            let status = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
            tracing::trace!("Received close frame with status: {}", status);
        } else {
            tracing::trace!("Received close frame without status");
        }
    }
}

/// Traces a discarded frame
#[inline]
pub(crate) fn trace_on_discarded_frame(opcode: Opcode) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!("Discarding frame with opcode {:?}", opcode);
    }
}
