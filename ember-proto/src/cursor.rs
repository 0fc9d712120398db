//! The [`Cursor`] buffer and the crate-wide [`DecodeError`].

use std::fmt;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur while parsing any of the wire formats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Ran out of bytes before the structure was fully read.
    UnexpectedEof,
    /// A magic marker did not match.
    BadMagic { got: u16, expected: u16 },
    /// An opcode byte outside the protocol's alphabet.
    UnknownOpcode { opcode: u8 },
    /// A message type absent from the title's opcode table.
    UnknownMessageType { msg_type: u32 },
    /// Two length fields that must agree did not.
    LengthMismatch { header: usize, actual: usize },
    /// A declared length that cannot fit the enclosing buffer.
    ImpossibleLength { length: usize },
    /// A varint ran past its maximum width.
    BadVarint,
    /// A protobuf wire type this codec does not carry.
    UnsupportedWireType { wire_type: u8 },
    /// Field bytes that are not valid UTF-8 where a string is required.
    BadString,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::BadMagic { got, expected } => {
                write!(f, "bad magic marker: got {got:#06x}, expected {expected:#06x}")
            }
            Self::UnknownOpcode { opcode } => write!(f, "unknown opcode {opcode:#04x}"),
            Self::UnknownMessageType { msg_type } => {
                write!(f, "unknown message type {msg_type:#010x}")
            }
            Self::LengthMismatch { header, actual } => {
                write!(f, "length fields disagree: header says {header}, actual {actual}")
            }
            Self::ImpossibleLength { length } => write!(f, "impossible length {length}"),
            Self::BadVarint => write!(f, "varint too wide"),
            Self::UnsupportedWireType { wire_type } => {
                write!(f, "unsupported protobuf wire type {wire_type}")
            }
            Self::BadString => write!(f, "string field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Specialized `Result` for wire parsing.
pub type Result<T> = std::result::Result<T, DecodeError>;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// A cursor over an in-memory byte slice.
///
/// Narrower than `std::io::Cursor`: the only failure a header parse can
/// hit is running out of bytes, so that is the only error surfaced here.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize { self.pos }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        match self.buf.get(self.pos).copied() {
            Some(b) => { self.pos += 1; Ok(b) }
            None    => Err(DecodeError::UnexpectedEof),
        }
    }

    /// Read exactly `out.len()` bytes.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let end = self.pos + out.len();
        if end > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Borrow the next `len` bytes without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::UnexpectedEof)?;
        if end > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Consume all remaining bytes.
    pub fn read_to_end(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_endian_reads() {
        let mut cur = Cursor::from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(cur.read_u16_be().unwrap(), 0x0102);
        assert_eq!(cur.read_u32_le().unwrap(), 0x0605_0403);
        assert_eq!(cur.remaining(), 0);
        assert_eq!(cur.read_byte(), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn slice_does_not_overrun() {
        let mut cur = Cursor::from_slice(b"abc");
        assert_eq!(cur.read_slice(2).unwrap(), b"ab");
        assert_eq!(cur.read_slice(2), Err(DecodeError::UnexpectedEof));
    }
}
