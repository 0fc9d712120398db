//! The 184-byte struct Auth hands the client to point it at the Game
//! service. Not a record: the client reads it as a packed struct, so the
//! layout is frozen.
//!
//! The 112-byte reserved region was uninitialized stack in the original
//! server and is never validated by the client; it is zero-filled here for
//! determinism. The auth token travels as its little-endian byte image,
//! the same image the client echoes at the front of every UDP datagram.

use crate::cursor::{Cursor, DecodeError};

/// Total serialized size.
pub const LEN: usize = 184;

/// Constant tail words observed on the wire; meaning unknown, values
/// required by the client.
const TAIL_WORDS: [u32; 11] = [
    0x0000_8000, 0x0000_8000, 0x0000_A000, 0x0000_A000, 0x0000_0080,
    0x0000_8000, 0x0000_A000, 0x0004_93E0, 0x0000_61A8, 0x0000_000C,
    0,
];

/// Where the client should open its game session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameServerInfo {
    pub auth_token: u64,
    /// Dotted IPv4 string, at most 15 bytes.
    pub game_server_ip: String,
    pub game_port: u16,
}

impl GameServerInfo {
    pub fn to_bytes(&self) -> [u8; LEN] {
        let mut out = [0u8; LEN];
        out[..8].copy_from_slice(&self.auth_token.to_le_bytes());

        let ip = self.game_server_ip.as_bytes();
        let ip_len = ip.len().min(15); // leave at least one NUL
        out[8..8 + ip_len].copy_from_slice(&ip[..ip_len]);

        // bytes 24..136 stay zero (reserved region)
        out[136..138].copy_from_slice(&self.game_port.to_be_bytes());
        // bytes 138..140 stay zero (padding)
        for (i, word) in TAIL_WORDS.iter().enumerate() {
            out[140 + i * 4..144 + i * 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Parse; used by test clients only, the server never receives one.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != LEN {
            return Err(DecodeError::ImpossibleLength { length: bytes.len() });
        }
        let mut cur = Cursor::from_slice(bytes);
        let auth_token = cur.read_u64_le()?;

        let ip_raw = cur.read_slice(16)?;
        let nul = ip_raw.iter().position(|&b| b == 0).unwrap_or(16);
        let game_server_ip = std::str::from_utf8(&ip_raw[..nul])
            .map_err(|_| DecodeError::BadString)?
            .to_string();

        cur.read_slice(112)?; // reserved
        let game_port = cur.read_u16_be()?;
        Ok(Self { auth_token, game_server_ip, game_port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_frozen() {
        let info = GameServerInfo {
            auth_token: 0x1122_3344_5566_7788,
            game_server_ip: "127.0.0.1".into(),
            game_port: 50020,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), LEN);
        assert_eq!(&bytes[..8], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[8..17], b"127.0.0.1");
        assert!(bytes[17..136].iter().all(|&b| b == 0));
        assert_eq!(&bytes[136..138], &50020u16.to_be_bytes());
        assert_eq!(&bytes[140..144], &0x0000_8000u32.to_be_bytes());
        assert_eq!(&bytes[180..184], &[0, 0, 0, 0]);
    }

    #[test]
    fn round_trip() {
        let info = GameServerInfo {
            auth_token: 42,
            game_server_ip: "10.0.0.2".into(),
            game_port: 50010,
        };
        assert_eq!(GameServerInfo::parse(&info.to_bytes()).unwrap(), info);
    }

    #[test]
    fn oversize_ip_is_clamped() {
        let info = GameServerInfo {
            auth_token: 1,
            game_server_ip: "111.222.333.444.555".into(),
            game_port: 1,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes[8 + 15], 0); // terminator always survives
    }
}
