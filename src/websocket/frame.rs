//! Binary frame codec.
//!
//! Pure byte-level functions with no I/O: [`serialize`] turns a [`Frame`] into
//! one contiguous wire frame, [`deserialize`] parses the front of a byte view
//! into a [`Frame`] and reports how many bytes it consumed. Incomplete input
//! is signalled with `Ok(None)` and never allocates a payload.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{S9Result, S9WebSocketError};
use super::types::{Frame, Opcode};

/// XOR-applies a 4-byte masking key over a payload in place.
///
/// Masking is an involution: applying the same key twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Serializes a frame into one contiguous byte sequence.
///
/// Masked frames draw a fresh 4-byte key from the operating system CSPRNG and
/// XOR-encode the payload with it. Fails with
/// [`S9WebSocketError::Crypto`] if the random source fails.
pub fn serialize(frame: &Frame) -> S9Result<Vec<u8>> {
    let payload_len = frame.payload.len();

    // Worst-case header: 2 bytes + 8 extended length + 4 masking key
    let mut data = Vec::with_capacity(14 + payload_len);

    data.push((u8::from(frame.fin) << 7) | frame.opcode.to_wire());

    let mask_bit: u8 = if frame.mask { 0x80 } else { 0x00 };
    if payload_len <= 125 {
        data.push(mask_bit | payload_len as u8);
    } else if payload_len <= 65535 {
        data.push(mask_bit | 126);
        data.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        data.push(mask_bit | 127);
        data.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    if frame.mask {
        let mut key = [0u8; 4];
        OsRng.try_fill_bytes(&mut key).map_err(|e| {
            S9WebSocketError::Crypto(format!("masking key generation failed: {}", e))
        })?;
        data.extend_from_slice(&key);

        let payload_start = data.len();
        data.extend_from_slice(&frame.payload);
        apply_mask(&mut data[payload_start..], key);
    } else {
        data.extend_from_slice(&frame.payload);
    }

    Ok(data)
}

/// Parses the front of `data` as a wire frame.
///
/// Returns `Ok(Some((frame, consumed)))` for a complete frame, `Ok(None)` when
/// more bytes are needed, and [`S9WebSocketError::Protocol`] when the declared
/// payload length exceeds `max_payload`. Unknown opcodes are passed through as
/// [`Opcode::Reserved`]; rejecting them is the connection engine's call.
pub fn deserialize(data: &[u8], max_payload: usize) -> S9Result<Option<(Frame, usize)>> {
    if data.len() < 2 {
        return Ok(None);
    }

    let fin = data[0] & 0x80 != 0;
    let opcode = Opcode::from_wire(data[0]);
    let mask = data[1] & 0x80 != 0;
    let indicator = (data[1] & 0x7F) as u64;

    let size_bytes: usize = match indicator {
        126 => 2,
        127 => 8,
        _ => 0,
    };

    let mut required = 2 + size_bytes;
    if data.len() < required {
        return Ok(None);
    }

    let payload_len = match size_bytes {
        2 => u64::from(u16::from_be_bytes([data[2], data[3]])),
        8 => u64::from_be_bytes([
            data[2], data[3], data[4], data[5], data[6], data[7], data[8], data[9],
        ]),
        _ => indicator,
    };

    if payload_len > max_payload as u64 {
        return Err(S9WebSocketError::Protocol(format!(
            "frame declares a {} byte payload, limit is {} bytes",
            payload_len, max_payload
        )));
    }
    let payload_len = payload_len as usize;

    if mask {
        required += 4;
    }
    required += payload_len;
    if data.len() < required {
        return Ok(None);
    }

    let payload_offset = 2 + size_bytes + if mask { 4 } else { 0 };
    let mut payload = data[payload_offset..payload_offset + payload_len].to_vec();

    if mask {
        let key_offset = 2 + size_bytes;
        let key = [
            data[key_offset],
            data[key_offset + 1],
            data[key_offset + 2],
            data[key_offset + 3],
        ];
        apply_mask(&mut payload, key);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            mask,
            payload,
        },
        required,
    )))
}
