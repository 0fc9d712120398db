//! The reliable-UDP packet header: a crude reimplementation of most of
//! TCP's machinery in seven bytes.
//!
//! ```text
//! magic:u16 = 0x02F5 (wire bytes F5 02)
//! ack_counters: 3 bytes — two packed 12-bit fields
//! opcode:u8
//! reserved:u8 = 0xFF
//! ```
//!
//! The packed counters are `(local, remote)`: *local* is the sequence
//! number this packet consumes (zero for un-sequenced opcodes), *remote*
//! the highest peer sequence it acknowledges.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::cursor::{Cursor, DecodeError};

/// Marker at the front of every reliable-UDP payload. Stored
/// little-endian, the one multi-byte field in this header that is.
pub const MAGIC: u16 = 0x02F5;

/// Header length on the wire.
pub const HEADER_LEN: usize = 7;

/// Sequence numbers are 12 bits; zero is reserved for "no sequence".
pub const SEQUENCE_MASK: u16 = 0x0FFF;

/// Payload sent with SYN packets. Opaque; connections missing it are
/// rejected by the client.
pub const SYN_PAYLOAD: [u8; 8] = [0x12, 0x10, 0x20, 0x20, 0x00, 0x00, 0xA0, 0x00];

/// Payload sent with SYN_ACK packets. Same deal.
pub const SYN_ACK_PAYLOAD: [u8; 8] = [0x12, 0x10, 0x20, 0x20, 0x00, 0x01, 0x00, 0x00];

// ─── Opcode ──────────────────────────────────────────────────────────────────

/// Reliable-UDP packet operations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    /// Establishes a connection and syncs sequence numbers.
    Syn = 0x02,
    /// Seemingly unused by the client.
    Rack = 0x03,
    /// Data fragment.
    Dat = 0x04,
    /// Heartbeat.
    Hbt = 0x05,
    /// Connection termination.
    Fin = 0x06,
    /// Connection reset.
    Rst = 0x07,
    /// Seemingly unused by the client.
    PtDatFrag = 0x08,
    /// Acknowledges the highest in-order sequence received.
    Ack = 0x31,
    /// SYN acknowledgement, carries the sequence handshake payload.
    SynAck = 0x32,
    /// Data that simultaneously acknowledges; the protocol's "reply".
    DatAck = 0x34,
    /// FIN acknowledgement.
    FinAck = 0x36,
    /// Seemingly unused by the client.
    PtDatFragAck = 0x38,
}

impl Opcode {
    /// Whether packets with this opcode consume a sequence number and
    /// travel through the retransmission path.
    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::Dat | Self::DatAck | Self::SynAck | Self::FinAck)
    }
}

// ─── Ack counters ────────────────────────────────────────────────────────────

/// Pack `(local, remote)` into the three wire bytes: low byte of local,
/// the two high nibbles side by side, low byte of remote.
pub fn pack_ack_counters(local: u16, remote: u16) -> [u8; 3] {
    [
        (local & 0xFF) as u8,
        ((((local >> 8) & 0xF) << 4) | ((remote >> 8) & 0xF)) as u8,
        (remote & 0xFF) as u8,
    ]
}

/// Inverse of [`pack_ack_counters`].
pub fn unpack_ack_counters(bytes: [u8; 3]) -> (u16, u16) {
    let local = bytes[0] as u16 | (((bytes[1] & 0xF0) as u16) << 4);
    let remote = bytes[2] as u16 | (((bytes[1] & 0x0F) as u16) << 8);
    (local, remote)
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// One reliable-UDP packet as the reliability layer sees it (the
/// enclosing UDP datagram additionally carries auth-token and cipher
/// framing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RudpPacket {
    pub local: u16,
    pub remote: u16,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl RudpPacket {
    /// An un-sequenced packet with no payload (ACK, HBT, …).
    pub fn bare(opcode: Opcode, remote: u16) -> Self {
        Self { local: 0, remote, opcode, payload: Vec::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend(MAGIC.to_le_bytes());
        out.extend(pack_ack_counters(self.local, self.remote));
        out.push(self.opcode.into());
        out.push(0xFF);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::from_slice(bytes);
        let magic = cur.read_u16_le()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic { got: magic, expected: MAGIC });
        }

        let mut ack = [0u8; 3];
        cur.read_exact(&mut ack)?;
        let (local, remote) = unpack_ack_counters(ack);

        let opcode_byte = cur.read_byte()?;
        let opcode = Opcode::try_from(opcode_byte)
            .map_err(|_| DecodeError::UnknownOpcode { opcode: opcode_byte })?;
        cur.read_byte()?; // reserved

        Ok(Self { local, remote, opcode, payload: cur.read_to_end().to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_counters_pack_exactly() {
        for (local, remote) in [(0u16, 0u16), (1, 0), (0xFF, 0x100), (0xABC, 0xDEF), (0xFFF, 0xFFF)] {
            let packed = pack_ack_counters(local, remote);
            assert_eq!(unpack_ack_counters(packed), (local, remote));
        }
        // Spot-check the byte layout itself.
        assert_eq!(pack_ack_counters(0x123, 0x456), [0x23, 0x14, 0x56]);
    }

    #[test]
    fn packet_round_trip() {
        let packet = RudpPacket {
            local: 2,
            remote: 1,
            opcode: Opcode::DatAck,
            payload: vec![9, 9, 9],
        };
        let wire = packet.to_bytes();
        assert_eq!(&wire[..2], &[0xF5, 0x02]);
        assert_eq!(wire[6], 0xFF);
        assert_eq!(RudpPacket::parse(&wire).unwrap(), packet);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut wire = RudpPacket::bare(Opcode::Ack, 1).to_bytes();
        wire[0] = 0x00;
        assert!(matches!(
            RudpPacket::parse(&wire),
            Err(DecodeError::BadMagic { .. })
        ));
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut wire = RudpPacket::bare(Opcode::Ack, 1).to_bytes();
        wire[5] = 0x7E;
        assert_eq!(
            RudpPacket::parse(&wire),
            Err(DecodeError::UnknownOpcode { opcode: 0x7E })
        );
    }

    #[test]
    fn sequenced_opcode_partition() {
        use Opcode::*;
        for op in [Dat, DatAck, SynAck, FinAck] {
            assert!(op.is_sequenced());
        }
        for op in [Syn, Rack, Hbt, Fin, Rst, PtDatFrag, Ack, PtDatFragAck] {
            assert!(!op.is_sequenced());
        }
    }
}
