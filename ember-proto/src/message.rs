//! The game-message header above the fragment layer.
//!
//! ```text
//! header_size:u32 BE = 12
//! msg_type:u32 BE          (an opcode from the title's table, or 0 = Reply)
//! msg_index:u32 LE
//! [response sub-header: 16 bytes]   only when msg_type == Reply
//! record bytes …
//! ```

use crate::cursor::{Cursor, DecodeError};
use crate::tcp::RESPONSE_SUB_HEADER;

/// `msg_type` of a reply pairing back to an outstanding request.
pub const REPLY: u32 = 0;

const HEADER_LEN: usize = 12;

/// One game message: an opcode, the session-scoped message index, and the
/// serialized record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameMessage {
    pub msg_type: u32,
    pub msg_index: u32,
    pub payload: Vec<u8>,
}

impl GameMessage {
    pub fn is_reply(&self) -> bool {
        self.msg_type == REPLY
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sub = if self.is_reply() { RESPONSE_SUB_HEADER.len() } else { 0 };
        let mut out = Vec::with_capacity(HEADER_LEN + sub + self.payload.len());
        out.extend((HEADER_LEN as u32).to_be_bytes());
        out.extend(self.msg_type.to_be_bytes());
        out.extend(self.msg_index.to_le_bytes());
        if self.is_reply() {
            out.extend_from_slice(&RESPONSE_SUB_HEADER);
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::from_slice(bytes);
        cur.read_u32_be()?; // header_size, nominally 12
        let msg_type = cur.read_u32_be()?;
        let msg_index = cur.read_u32_le()?;

        if msg_type == REPLY {
            let mut sub = [0u8; 16];
            cur.read_exact(&mut sub)?;
        }

        Ok(Self { msg_type, msg_index, payload: cur.read_to_end().to_vec() })
    }
}
