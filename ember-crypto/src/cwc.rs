//! AES-128 in CWC mode (Carter–Wegman + CTR).
//!
//! The client's channels all use CWC: CTR-mode encryption with a
//! polynomial universal hash over GF(2^127 − 1) for authentication.
//! Counter blocks are `0x80 ‖ nonce(11) ‖ counter(u32 BE)`; block 0 is
//! reserved for masking the tag, data starts at block 1. The hash subkey
//! is `AES_K(0xC0 ‖ 0¹⁵)` with the top bit cleared.
//!
//! Only the associated-data layout differs between the TCP and UDP
//! framings; the mode itself lives in [`CwcCore`] and is shared.

use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes128, Block};

use crate::{Cipher, CipherError, fill_random};

type Aes128Ctr = ctr::Ctr32BE<Aes128>;

/// Nonce length used by every framing.
pub const NONCE_LEN: usize = 11;
/// Tag length used by every framing.
pub const TAG_LEN: usize = 16;

// ─── GF(2^127 − 1) ───────────────────────────────────────────────────────────

const P: u128 = (1u128 << 127) - 1;

fn gf_fold(x: u128) -> u128 {
    let mut r = (x >> 127) + (x & P);
    if r >= P {
        r -= P;
    }
    r
}

fn gf_add(a: u128, b: u128) -> u128 {
    // a, b < 2^127 so the sum cannot overflow u128.
    gf_fold(a + b)
}

/// Multiply two field elements via four 64×64 partial products, then fold
/// the 256-bit result with 2^128 ≡ 2 (mod 2^127 − 1).
fn gf_mul(a: u128, b: u128) -> u128 {
    let (a_hi, a_lo) = ((a >> 64) as u64, a as u64);
    let (b_hi, b_lo) = ((b >> 64) as u64, b as u64);

    let ll = (a_lo as u128) * (b_lo as u128);
    let lh = (a_lo as u128) * (b_hi as u128);
    let hl = (a_hi as u128) * (b_lo as u128);
    let hh = (a_hi as u128) * (b_hi as u128);

    let (mid, mid_carry) = lh.overflowing_add(hl);
    let (lo, lo_carry) = ll.overflowing_add(mid << 64);
    let hi = hh
        + (mid >> 64)
        + ((mid_carry as u128) << 64)
        + lo_carry as u128;

    // x = hi·2^128 + lo; fold the high half in as hi·2.
    gf_fold(gf_fold(hi << 1) + (lo >> 127) + (lo & P))
}

// ─── Core mode ───────────────────────────────────────────────────────────────

/// Keyed CWC state: the AES key schedule plus the derived hash subkey.
pub(crate) struct CwcCore {
    key: [u8; 16],
    block: Aes128,
    hash_key: u128,
}

impl CwcCore {
    pub(crate) fn new(key: &[u8; 16]) -> Self {
        let block = Aes128::new(key.into());

        let mut subkey = Block::default();
        subkey[0] = 0xC0;
        block.encrypt_block(&mut subkey);
        let hash_key = u128::from_be_bytes(subkey.into()) & P;

        Self { key: *key, block, hash_key }
    }

    fn keystream(&self, nonce: &[u8; NONCE_LEN]) -> Aes128Ctr {
        let mut iv = [0u8; 16];
        iv[0] = 0x80;
        iv[1..12].copy_from_slice(nonce);
        Aes128Ctr::new(&self.key.into(), &iv.into())
    }

    /// Horner evaluation of the hash polynomial over 96-bit chunks of the
    /// associated data followed by the ciphertext, with the two lengths
    /// folded into the final term.
    fn hash(&self, aad: &[u8], ciphertext: &[u8]) -> u128 {
        let mut y = 0u128;
        for part in [aad, ciphertext] {
            for chunk in part.chunks(12) {
                let mut block = [0u8; 16];
                block[4..4 + chunk.len()].copy_from_slice(chunk);
                y = gf_mul(gf_add(y, u128::from_be_bytes(block)), self.hash_key);
            }
        }
        gf_add(y, ((aad.len() as u128) << 64) | ciphertext.len() as u128)
    }

    fn tag(&self, nonce: &[u8; NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let mut mask = [0u8; 16];
        self.keystream(nonce).apply_keystream(&mut mask);

        let mut tag: Block = self.hash(aad, ciphertext).to_be_bytes().into();
        self.block.encrypt_block(&mut tag);
        let mut tag: [u8; TAG_LEN] = tag.into();
        for (t, m) in tag.iter_mut().zip(mask) {
            *t ^= m;
        }
        tag
    }

    /// Encrypt `data` in place, returning the authentication tag.
    pub(crate) fn seal(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        data: &mut [u8],
    ) -> [u8; TAG_LEN] {
        let mut ks = self.keystream(nonce);
        let mut skip = [0u8; 16];
        ks.apply_keystream(&mut skip); // burn block 0, it masks the tag
        ks.apply_keystream(data);
        self.tag(nonce, aad, data)
    }

    /// Verify the tag over the still-encrypted `data`, then decrypt in place.
    pub(crate) fn open(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        data: &mut [u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<(), CipherError> {
        let expected = self.tag(nonce, aad, data);
        let mut diff = 0u8;
        for (a, b) in expected.iter().zip(tag) {
            diff |= a ^ b;
        }
        if diff != 0 {
            return Err(CipherError::TagMismatch);
        }

        let mut ks = self.keystream(nonce);
        let mut skip = [0u8; 16];
        ks.apply_keystream(&mut skip);
        ks.apply_keystream(data);
        Ok(())
    }
}

// ─── TCP framing ─────────────────────────────────────────────────────────────

/// CWC cipher with the TCP message framing: `IV(11) ‖ tag(16) ‖ ciphertext`,
/// with the IV doubling as the associated data.
pub struct CwcCipher {
    core: CwcCore,
}

impl CwcCipher {
    pub fn new(key: &[u8; 16]) -> Self {
        Self { core: CwcCore::new(key) }
    }
}

impl Cipher for CwcCipher {
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
