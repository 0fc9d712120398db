//! Framing for the Login and Auth TCP channels.
//!
//! On the stream, every exchange is one *frame*:
//!
//! ```text
//! frame_length:u16 BE
//! ┌───────────────────────────────────────────────┐
//! │ send_counter:u16 BE   reserved:u16            │
//! │ payload_length:u32 BE reserved:u16            │
//! │ payload_length_short:u16 BE                   │ 12-byte packet header
//! ├───────────────────────────────────────────────┤
//! │ payload (encrypted message)                   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The decrypted payload is itself a *message*: a 12-byte header, an
//! optional 16-byte response sub-header, then the record bytes. The
//! `request_index` rides little-endian; everything else is big-endian.

use crate::cursor::{Cursor, DecodeError};

/// Upper bound on one frame; anything larger closes the connection.
pub const MAX_PACKET_LEN: usize = 8192;

const PACKET_HEADER_LEN: usize = 12;
const MESSAGE_HEADER_LEN: usize = 12;

/// The 16-byte response sub-header. Constant on the wire; the second word
/// is always one.
pub const RESPONSE_SUB_HEADER: [u8; 16] = [
    0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0,
];

// ─── Packet ──────────────────────────────────────────────────────────────────

/// One framed TCP packet: the 12-byte header plus its (encrypted) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpPacket {
    pub send_counter: u16,
    pub payload: Vec<u8>,
}

impl TcpPacket {
    /// Serialize including the leading `u16` frame length.
    pub fn to_frame_bytes(&self) -> Vec<u8> {
        let body_len = PACKET_HEADER_LEN + self.payload.len();
        let mut out = Vec::with_capacity(2 + body_len);
        out.extend((body_len as u16).to_be_bytes());
        out.extend(self.send_counter.to_be_bytes());
        out.extend([0u8; 2]);
        out.extend((self.payload.len() as u32).to_be_bytes());
        out.extend([0u8; 2]);
        out.extend((self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one frame body (the bytes *after* the length prefix).
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::from_slice(body);
        let send_counter = cur.read_u16_be()?;
        cur.read_u16_be()?; // reserved
        let payload_length = cur.read_u32_be()? as usize;
        cur.read_u16_be()?; // reserved
        let payload_length_short = cur.read_u16_be()? as usize;

        if payload_length != payload_length_short {
            return Err(DecodeError::LengthMismatch {
                header: payload_length,
                actual: payload_length_short,
            });
        }
        if payload_length != cur.remaining() {
            return Err(DecodeError::LengthMismatch {
                header: payload_length,
                actual: cur.remaining(),
            });
        }

        Ok(Self { send_counter, payload: cur.read_to_end().to_vec() })
    }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// One message inside a decrypted packet payload.
///
/// A zero `reserved` word marks a message that carries the response
/// sub-header; the server emits all its messages that way, the client's
/// requests arrive without it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpMessage {
    pub request_index: u32,
    pub is_response: bool,
    pub payload: Vec<u8>,
}

impl TcpMessage {
    /// A client-style request.
    pub fn request(request_index: u32, payload: Vec<u8>) -> Self {
        Self { request_index, is_response: false, payload }
    }

    /// A server-style response, echoing the request's index.
    pub fn response(request_index: u32, payload: Vec<u8>) -> Self {
        Self { request_index, is_response: true, payload }
    }

    /// Serialize into packet-payload bytes (pre-encryption).
    pub fn to_bytes(&self) -> Vec<u8> {
        let sub = if self.is_response { RESPONSE_SUB_HEADER.len() } else { 0 };
        let reserved: u32 = if self.is_response { 0 } else { 1 };
        let mut out = Vec::with_capacity(MESSAGE_HEADER_LEN + sub + self.payload.len());
        out.extend((MESSAGE_HEADER_LEN as u32).to_be_bytes());
        out.extend(reserved.to_be_bytes());
        out.extend(self.request_index.to_le_bytes());
        if self.is_response {
            out.extend_from_slice(&RESPONSE_SUB_HEADER);
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse from decrypted packet-payload bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::from_slice(bytes);
        cur.read_u32_be()?; // header_size, nominally 12
        let reserved = cur.read_u32_be()?;
        let request_index = cur.read_u32_le()?;

        let is_response = reserved == 0;
        if is_response {
            let mut sub = [0u8; 16];
            cur.read_exact(&mut sub)?;
        }

        Ok(Self { request_index, is_response, payload: cur.read_to_end().to_vec() })
    }
}
