//! RSA key pair loading from PKCS#1 PEM files.
//!
//! The server keypair lives on disk at the paths named in the runtime
//! configuration; the public half is what patched clients carry. Only the
//! `RSA PRIVATE KEY` / `RSA PUBLIC KEY` framings are understood.

use std::fmt;
use std::path::Path;

use base64::Engine;
use num_bigint::BigUint;

use crate::rsa::{RsaPrivateKey, RsaPublicKey};

/// Errors while loading a key file.
#[derive(Debug)]
pub enum KeyFileError {
    Io(std::io::Error),
    /// Missing or mismatched PEM armor, or an undecodable body.
    Pem,
    /// The DER inside the armor is not a PKCS#1 key.
    Der,
}

impl fmt::Display for KeyFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "key file: {e}"),
            Self::Pem   => write!(f, "key file is not valid PEM"),
            Self::Der   => write!(f, "key file is not a PKCS#1 key"),
        }
    }
}

impl std::error::Error for KeyFileError {}

impl From<std::io::Error> for KeyFileError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

fn pem_body(text: &str, tag: &str) -> Result<Vec<u8>, KeyFileError> {
    let begin = format!("-----BEGIN {tag}-----");
    let end = format!("-----END {tag}-----");

    let start = text.find(&begin).ok_or(KeyFileError::Pem)? + begin.len();
    let stop = text.find(&end).ok_or(KeyFileError::Pem)?;
    let body: String = text[start..stop].split_whitespace().collect();

    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|_| KeyFileError::Pem)
}

// ─── Minimal DER ─────────────────────────────────────────────────────────────

struct Der<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Der<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, KeyFileError> {
        let b = *self.buf.get(self.pos).ok_or(KeyFileError::Der)?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, KeyFileError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let mut len = 0usize;
        for _ in 0..(first & 0x7F) {
            len = len.checked_mul(256).ok_or(KeyFileError::Der)? + self.byte()? as usize;
        }
        Ok(len)
    }

    /// Enter a SEQUENCE, leaving the cursor at its first element.
    fn sequence(&mut self) -> Result<(), KeyFileError> {
        if self.byte()? != 0x30 {
            return Err(KeyFileError::Der);
        }
        self.length()?;
        Ok(())
    }

    fn integer(&mut self) -> Result<BigUint, KeyFileError> {
        if self.byte()? != 0x02 {
            return Err(KeyFileError::Der);
        }
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(KeyFileError::Der)?;
        let bytes = self.buf.get(self.pos..end).ok_or(KeyFileError::Der)?;
        self.pos = end;
        Ok(BigUint::from_bytes_be(bytes))
    }
}

// ─── Loaders ─────────────────────────────────────────────────────────────────

/// Load a PKCS#1 `RSA PRIVATE KEY` PEM file.
pub fn load_private_key_pem(path: impl AsRef<Path>) -> Result<RsaPrivateKey, KeyFileError> {
    let text = std::fs::read_to_string(path)?;
    parse_private_key_pem(&text)
}

/// Load a PKCS#1 `RSA PUBLIC KEY` PEM file.
pub fn load_public_key_pem(path: impl AsRef<Path>) -> Result<RsaPublicKey, KeyFileError> {
    let text = std::fs::read_to_string(path)?;
    parse_public_key_pem(&text)
}

/// Parse an in-memory private key PEM. The CRT parameters after `d` are
/// ignored; exponentiation runs on `(n, d)` directly.
pub fn parse_private_key_pem(text: &str) -> Result<RsaPrivateKey, KeyFileError> {
    let der = pem_body(text, "RSA PRIVATE KEY")?;
    let mut cur = Der::new(&der);
    cur.sequence()?;
    let _version = cur.integer()?;
    let n = cur.integer()?;
    let e = cur.integer()?;
    let d = cur.integer()?;
    Ok(RsaPrivateKey { n, e, d })
}

/// Parse an in-memory public key PEM.
pub fn parse_public_key_pem(text: &str) -> Result<RsaPublicKey, KeyFileError> {
    let der = pem_body(text, "RSA PUBLIC KEY")?;
    let mut cur = Der::new(&der);
    cur.sequence()?;
    let n = cur.integer()?;
    let e = cur.integer()?;
    Ok(RsaPublicKey { n, e })
}
