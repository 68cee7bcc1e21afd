//! Wire codec for the server-list status protocol.
//!
//! Pure byte-level helpers: variable-length integers, length-prefixed
//! strings, and the three packets the status query needs. Socket handling
//! lives in `uptime-runtime`; everything here works on byte slices so it can
//! be tested without a network.

use crate::error::{MonitorError, Result};

/// A varint never occupies more than five bytes (32 bits / 7 bits per group).
pub const MAX_VARINT_LEN: usize = 5;

/// Packet id shared by the handshake and the status request.
pub const PACKET_ID_STATUS: i32 = 0x00;

/// "Next state" value requesting the status flow after the handshake.
pub const NEXT_STATE_STATUS: i32 = 1;

/// Two-byte legacy server-list ping used only for latency measurement.
pub const LEGACY_PING: [u8; 2] = [0xFE, 0x01];

// ── VarInt ────────────────────────────────────────────────────────────────────

/// Append `value` as a varint: 7 payload bits per byte, least significant
/// group first, `0x80` as the continuation bit.
///
/// Negative inputs are reinterpreted as their unsigned 32-bit pattern, so
/// `-1` encodes as five bytes.
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Encode `value` into a fresh buffer.
pub fn encode_varint(value: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    write_varint(&mut buf, value);
    buf
}

/// Incremental varint decoder, fed one byte at a time.
///
/// Used both for slice decoding and for reading a length prefix straight off
/// a socket.
#[derive(Debug, Default, Clone)]
pub struct VarIntAccumulator {
    value: u32,
    count: usize,
}

impl VarIntAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte. Returns `Ok(Some(value))` once the terminating
    /// byte (no continuation bit) has been seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<i32>> {
        if self.count >= MAX_VARINT_LEN {
            return Err(MonitorError::Protocol("varint is longer than 5 bytes".into()));
        }
        self.value |= u32::from(byte & 0x7F) << (7 * self.count);
        self.count += 1;
        if byte & 0x80 == 0 {
            Ok(Some(self.value as i32))
        } else {
            Ok(None)
        }
    }

    /// Number of bytes consumed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(i32, usize)> {
    let mut acc = VarIntAccumulator::new();
    for &byte in buf {
        if let Some(value) = acc.push(byte)? {
            return Ok((value, acc.len()));
        }
    }
    Err(MonitorError::Protocol("truncated varint".into()))
}

/// Decode a varint that is used as a length and must not be negative.
fn decode_length(buf: &[u8], what: &str) -> Result<(usize, usize)> {
    let (value, used) = decode_varint(buf)?;
    let len = usize::try_from(value)
        .map_err(|_| MonitorError::Protocol(format!("negative {what} length: {value}")))?;
    Ok((len, used))
}

/// Append a UTF-8 string prefixed with its byte length as a varint.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

// ── Packets ───────────────────────────────────────────────────────────────────

/// Prefix `body` with its length as a varint.
fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = encode_varint(body.len() as i32);
    out.extend(body);
    out
}

/// Build the framed handshake packet:
/// `[len][0x00][protocol][host][u16 port BE][next_state=1]`.
pub fn handshake_packet(protocol_version: i32, host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    write_varint(&mut body, PACKET_ID_STATUS);
    write_varint(&mut body, protocol_version);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    frame(body)
}

/// Build the framed, empty status request: `[0x01][0x00]`.
pub fn status_request_packet() -> Vec<u8> {
    frame(encode_varint(PACKET_ID_STATUS))
}

/// Extract the JSON document from a status response body.
///
/// `body` is everything after the outer packet-length prefix:
/// `[varint packet id][varint json length][json bytes]`. Fails when the body
/// is shorter than the advertised JSON length or the bytes are not UTF-8.
pub fn decode_status_response(body: &[u8]) -> Result<String> {
    let (_packet_id, used) = decode_varint(body)?;
    let rest = &body[used..];
    let (json_len, used) = decode_length(rest, "json")?;
    let rest = &rest[used..];
    if rest.len() < json_len {
        return Err(MonitorError::Protocol(format!(
            "response truncated: expected {json_len} json bytes, got {}",
            rest.len()
        )));
    }
    String::from_utf8(rest[..json_len].to_vec())
        .map_err(|e| MonitorError::Protocol(format!("json is not valid UTF-8: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
