//! The fragmentation header carried in DAT/DAT_ACK payloads.
//!
//! ```text
//! fragment_counter:u16      (little-endian; a quirk, see below)
//! compress_flag:u8
//! reserved: 3 bytes
//! total_payload_length:u16 BE
//! reserved:u8
//! fragment_index:u8
//! fragment_length:u16 BE
//! [uncompressed_size:u32 BE]  only when compress_flag && fragment_index == 0
//! ```
//!
//! The counter is the one field of this header the client never
//! byte-swaps, so it rides little-endian while its neighbors are
//! big-endian.

use crate::cursor::{Cursor, DecodeError};

/// Largest payload slice one fragment may carry.
pub const MAX_FRAGMENT_LEN: usize = 1024;

/// Payloads at least this large are deflated before fragmentation.
pub const MIN_COMPRESS_SIZE: usize = 256;

/// Fixed header length, excluding the optional uncompressed-size word.
pub const HEADER_LEN: usize = 12;

/// One fragment of a (possibly compressed) application payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Shared across all fragments of one payload.
    pub fragment_counter: u16,
    pub compressed: bool,
    /// Total length of the (compressed) payload across all fragments.
    pub total_payload_length: u16,
    pub fragment_index: u8,
    pub fragment_length: u16,
    /// Pre-compression payload size. Meaningful only on fragment 0 of a
    /// compressed payload.
    pub uncompressed_size: u32,
    pub payload: Vec<u8>,
}

impl Fragment {
    fn carries_size(&self) -> bool {
        self.compressed && self.fragment_index == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let extra = if self.carries_size() { 4 } else { 0 };
        let mut out = Vec::with_capacity(HEADER_LEN + extra + self.payload.len());
        out.extend(self.fragment_counter.to_le_bytes());
        out.push(self.compressed as u8);
        out.extend([0u8; 3]);
        out.extend(self.total_payload_length.to_be_bytes());
        out.push(0);
        out.push(self.fragment_index);
        out.extend(self.fragment_length.to_be_bytes());
        if self.carries_size() {
            out.extend(self.uncompressed_size.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::from_slice(bytes);
        let fragment_counter = cur.read_u16_le()?;
        let compressed = cur.read_byte()? != 0;
        let mut reserved = [0u8; 3];
        cur.read_exact(&mut reserved)?;
        let total_payload_length = cur.read_u16_be()?;
        cur.read_byte()?; // reserved
        let fragment_index = cur.read_byte()?;
        let fragment_length = cur.read_u16_be()?;

        let uncompressed_size = if compressed && fragment_index == 0 {
            cur.read_u32_be()?
        } else {
            0
        };

        Ok(Self {
            fragment_counter,
            compressed,
            total_payload_length,
            fragment_index,
            fragment_length,
            uncompressed_size,
            payload: cur.read_to_end().to_vec(),
        })
    }
}
