//! The two UDP datagram framings of the game channel.
//!
//! Client→server datagrams carry the session auth token and a packet-type
//! marker in clear, both folded into the authenticated header region:
//!
//! ```text
//! auth_token(8) ‖ IV(11) ‖ tag(16) ‖ packet_type(1) ‖ ciphertext
//! ```
//!
//! Server→client datagrams drop the prefix and keep only the IV in the
//! associated data:
//!
//! ```text
//! IV(11) ‖ tag(16) ‖ ciphertext
//! ```
//!
//! The auth token travels as its little-endian byte image; the receiver
//! compares images, never reordered integers.

use crate::cwc::{CwcCore, NONCE_LEN, TAG_LEN};
use crate::{Cipher, CipherError, fill_random};

/// Marker byte appended to the authenticated client→server header.
const PACKET_TYPE: u8 = 1;

const CLIENT_PREFIX: usize = 8 + NONCE_LEN + TAG_LEN + 1;

/// Read the auth-token image from the front of a client→server datagram.
///
/// Used by the game service to pick a session before any decryption runs.
pub fn peek_auth_token(datagram: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = datagram.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

// ─── Client→server ───────────────────────────────────────────────────────────

/// The client→server framing. The server holds one per session for inbound
/// datagrams; test harnesses use `encrypt` to speak as a client.
pub struct ClientUdpCipher {
    core: CwcCore,
    token: [u8; 8],
}

impl ClientUdpCipher {
    pub fn new(key: &[u8; 16], auth_token: u64) -> Self {
        Self { core: CwcCore::new(key), token: auth_token.to_le_bytes() }
    }

    fn aad(&self, nonce: &[u8; NONCE_LEN], packet_type: u8) -> [u8; 20] {
        let mut aad = [0u8; 20];
        aad[..NONCE_LEN].copy_from_slice(nonce);
        aad[NONCE_LEN..NONCE_LEN + 8].copy_from_slice(&self.token);
        aad[19] = packet_type;
        aad
    }
}

impl Cipher for ClientUdpCipher {
    fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce);

        let mut payload = plain.to_vec();
        let tag = self.core.seal(&nonce, &self.aad(&nonce, PACKET_TYPE), &mut payload);

        let mut out = Vec::with_capacity(CLIENT_PREFIX + payload.len());
        out.extend_from_slice(&self.token);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.push(PACKET_TYPE);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CipherError> {
        if cipher.len() < CLIENT_PREFIX {
            return Err(CipherError::ShortInput);
        }
        if cipher[..8] != self.token {
            return Err(CipherError::TagMismatch);
        }

        let nonce: [u8; NONCE_LEN] = cipher[8..8 + NONCE_LEN].try_into().unwrap();
        let tag: [u8; TAG_LEN] =
            cipher[8 + NONCE_LEN..8 + NONCE_LEN + TAG_LEN].try_into().unwrap();
        let packet_type = cipher[8 + NONCE_LEN + TAG_LEN];
        let mut payload = cipher[CLIENT_PREFIX..].to_vec();

        self.core.open(&nonce, &self.aad(&nonce, packet_type), &mut payload, &tag)?;
        Ok(payload)
    }
}

// ─── Server→client ───────────────────────────────────────────────────────────

/// The server→client framing: no token prefix, IV-only associated data.
pub struct ServerUdpCipher {
    core: CwcCore,
}

impl ServerUdpCipher {
    pub fn new(key: &[u8; 16]) -> Self {
        Self { core: CwcCore::new(key) }
    }
}

impl Cipher for ServerUdpCipher {
    fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce);

        let mut payload = plain.to_vec();
        let tag = self.core.seal(&nonce, &nonce, &mut payload);

        let mut out = Vec::with_capacity(NONCE_LEN + TAG_LEN + payload.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CipherError> {
        if cipher.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::ShortInput);
        }

        let nonce: [u8; NONCE_LEN] = cipher[..NONCE_LEN].try_into().unwrap();
        let tag: [u8; TAG_LEN] = cipher[NONCE_LEN..NONCE_LEN + TAG_LEN].try_into().unwrap();
        let mut payload = cipher[NONCE_LEN + TAG_LEN..].to_vec();

        self.core.open(&nonce, &nonce, &mut payload, &tag)?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";
    const TOKEN: u64 = 0xDEAD_BEEF_CAFE_F00D;

    #[test]
    fn client_round_trip() {
        let mut c = ClientUdpCipher::new(&KEY, TOKEN);
        let wire = c.encrypt(b"reliable udp payload").unwrap();
        assert_eq!(peek_auth_token(&wire), Some(TOKEN));
        assert_eq!(c.decrypt(&wire).unwrap(), b"reliable udp payload");
    }

    #[test]
    fn server_round_trip() {
        let mut c = ServerUdpCipher::new(&KEY);
        let wire = c.encrypt(b"push").unwrap();
        assert_eq!(wire.len(), NONCE_LEN + TAG_LEN + 4);
        assert_eq!(c.decrypt(&wire).unwrap(), b"push");
    }

    #[test]
    fn foreign_token_rejected() {
        let mut ours = ClientUdpCipher::new(&KEY, TOKEN);
        let mut theirs = ClientUdpCipher::new(&KEY, TOKEN + 1);
        let wire = theirs.encrypt(b"stale session").unwrap();
        assert_eq!(ours.decrypt(&wire), Err(CipherError::TagMismatch));
    }

    #[test]
    fn header_tamper_rejected() {
        let mut c = ClientUdpCipher::new(&KEY, TOKEN);
        let mut wire = c.encrypt(b"x").unwrap();
        // Flip the packet-type byte; it sits in the authenticated region.
        wire[8 + NONCE_LEN + TAG_LEN] ^= 0xFF;
        assert!(c.decrypt(&wire).is_err());
    }
}
