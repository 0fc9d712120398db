//! Cryptographic primitives for the Ember game server.
//!
//! Provides:
//! - AES-128-CWC authenticated encryption, in the three framings the
//!   client speaks (TCP, client→server UDP, server→client UDP)
//! - RSA X.931 (server signs) and RSA-OAEP/SHA-1 (client encrypts) padding
//! - RSA key pair loading from PKCS#1 PEM files
//! - SHA-1 / SHA-256 hash macros
//!
//! Every channel cipher implements [`Cipher`]: `encrypt` never fails for a
//! valid key, `decrypt` fails when the authentication tag does not verify.

#![deny(unsafe_code)]

pub mod cwc;
mod keys;
pub mod rsa;
mod sha;
#[cfg(test)]
mod testkey;
pub mod udp;

pub use cwc::CwcCipher;
pub use keys::{
    KeyFileError, load_private_key_pem, load_public_key_pem, parse_private_key_pem,
    parse_public_key_pem,
};
pub use rsa::{ClientMessageCipher, RsaPrivateKey, RsaPublicKey, ServerMessageCipher};
pub use udp::{ClientUdpCipher, ServerUdpCipher, peek_auth_token};

use std::fmt;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from [`Cipher::encrypt`] / [`Cipher::decrypt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CipherError {
    /// Input shorter than the fixed cipher framing.
    ShortInput,
    /// The authentication tag did not verify; wrong key, corruption, or replay.
    TagMismatch,
    /// Padding bytes did not match the expected scheme on unpad.
    BadPadding,
    /// Plaintext too long for one RSA block.
    MessageTooLong,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortInput      => write!(f, "input shorter than cipher framing"),
            Self::TagMismatch     => write!(f, "authentication tag mismatch"),
            Self::BadPadding      => write!(f, "invalid padding"),
            Self::MessageTooLong  => write!(f, "message too long for RSA block"),
        }
    }
}

impl std::error::Error for CipherError {}

// ─── Cipher ──────────────────────────────────────────────────────────────────

/// A symmetric (or asymmetric) channel cipher.
///
/// Message streams swap the active cipher mid-connection (RSA during the
/// first exchange, CWC afterwards), so implementations are used behind
/// `Box<dyn Cipher>`.
pub trait Cipher: Send {
    /// Encrypt `plain`, producing the full wire framing (IV, tag, ciphertext).
    fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Strip the framing and decrypt, verifying authenticity.
    fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Fill `buf` with cryptographically secure random bytes.
pub fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

/// A freshly random `u64`, used for auth tokens and key halves.
pub fn random_u64() -> u64 {
    let mut b = [0u8; 8];
    fill_random(&mut b);
    u64::from_le_bytes(b)
}
