//! RSA padding used on the first message of the Login and Auth channels.
//!
//! The server *signs* its replies with X9.31 padding (a private-key
//! operation the client verifies with the distributed public key), and
//! *decrypts* client requests padded with OAEP/SHA-1. Both run over a
//! 2048-bit modulus via plain modular exponentiation.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::{Cipher, CipherError, fill_random, sha1};

const SHA1_LEN: usize = 20;

/// SHA-1 of the empty OAEP label.
const EMPTY_LABEL_HASH: [u8; SHA1_LEN] = [
    0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55,
    0xbf, 0xef, 0x95, 0x60, 0x18, 0x90, 0xaf, 0xd8, 0x07, 0x09,
];

// ─── Keys ────────────────────────────────────────────────────────────────────

/// An RSA public key `(n, e)`.
#[derive(Clone)]
pub struct RsaPublicKey {
    pub(crate) n: BigUint,
    pub(crate) e: BigUint,
}

/// An RSA private key `(n, e, d)`.
#[derive(Clone)]
pub struct RsaPrivateKey {
    pub(crate) n: BigUint,
    pub(crate) e: BigUint,
    pub(crate) d: BigUint,
}

impl RsaPublicKey {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    /// Modulus length in bytes; every cipher block has this size.
    pub fn block_len(&self) -> usize {
        (self.n.bits() as usize).div_ceil(8)
    }

    /// SHA-256 fingerprint of the big-endian modulus, for startup logging.
    pub fn fingerprint(&self) -> String {
        use base64::Engine;
        let digest = crate::sha256!(&self.n.to_bytes_be());
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)
    }
}

impl RsaPrivateKey {
    /// Parse decimal `n`, `e` and `d` strings.
    pub fn new(n: &str, e: &str, d: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
            d: BigUint::parse_bytes(d.as_bytes(), 10)?,
        })
    }

    /// The matching public key.
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey { n: self.n.clone(), e: self.e.clone() }
    }

    pub fn block_len(&self) -> usize {
        (self.n.bits() as usize).div_ceil(8)
    }
}

fn to_block(value: &BigUint, len: usize) -> Vec<u8> {
    let mut block = value.to_bytes_be();
    while block.len() < len {
        block.insert(0, 0);
    }
    block
}

// ─── X9.31 (server signs) ────────────────────────────────────────────────────

/// Pad `data` into an X9.31 block: `6B BB…BB BA ‖ data ‖ CC`.
fn x931_pad(data: &[u8], block_len: usize) -> Result<Vec<u8>, CipherError> {
    if data.len() + 2 > block_len {
        return Err(CipherError::MessageTooLong);
    }
    let fill = block_len - data.len() - 2;

    let mut block = Vec::with_capacity(block_len);
    if fill == 0 {
        block.push(0x6A);
    } else {
        block.push(0x6B);
        block.extend(std::iter::repeat_n(0xBB, fill - 1));
        block.push(0xBA);
    }
    block.extend_from_slice(data);
    block.push(0xCC);
    Ok(block)
}

fn x931_unpad(block: &[u8]) -> Result<Vec<u8>, CipherError> {
    if block.last() != Some(&0xCC) {
        return Err(CipherError::BadPadding);
    }
    let start = match block.first() {
        Some(0x6A) => 1,
        Some(0x6B) => {
            let ba = block
                .iter()
                .position(|&b| b == 0xBA)
                .ok_or(CipherError::BadPadding)?;
            if block[1..ba].iter().any(|&b| b != 0xBB) {
                return Err(CipherError::BadPadding);
            }
            ba + 1
        }
        _ => return Err(CipherError::BadPadding),
    };
    Ok(block[start..block.len() - 1].to_vec())
}

/// Sign `data` with X9.31 padding. The signature is `min(s, n − s)`, as the
/// standard requires.
pub fn x931_sign(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CipherError> {
    let len = key.block_len();
    let padded = BigUint::from_bytes_be(&x931_pad(data, len)?);
    let s = padded.modpow(&key.d, &key.n);
    let alt = &key.n - &s;
    Ok(to_block(if alt < s { &alt } else { &s }, len))
}

/// Recover the payload of an X9.31 signature with the public key.
pub fn x931_verify(key: &RsaPublicKey, signature: &[u8]) -> Result<Vec<u8>, CipherError> {
    let s = BigUint::from_bytes_be(signature);
    if s >= key.n {
        return Err(CipherError::BadPadding);
    }
    let mut t = s.modpow(&key.e, &key.n);
    // The signer emitted min(s, n − s); the true block ends in 0xC mod 16.
    if (&t % 16u8) != BigUint::from(12u8) {
        t = &key.n - &t;
    }
    x931_unpad(&to_block(&t, key.block_len()))
}

// ─── OAEP / SHA-1 (client encrypts) ──────────────────────────────────────────

/// MGF1 mask generation over SHA-1.
fn mgf1(seed: &[u8], len: usize) -> Vec<u8> {
    let mut mask = Vec::with_capacity(len);
    let mut counter = 0u32;
    while mask.len() < len {
        mask.extend_from_slice(&sha1!(seed, &counter.to_be_bytes()));
        counter += 1;
    }
    mask.truncate(len);
    mask
}

/// OAEP-encrypt `data` with the server public key (the client side of the
/// first exchange; the server only uses this through test harnesses).
pub fn oaep_encrypt(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>, CipherError> {
    let k = key.block_len();
    if data.len() > k - 2 * SHA1_LEN - 2 {
        return Err(CipherError::MessageTooLong);
    }

    // DB = lHash ‖ 0…0 ‖ 01 ‖ M
    let mut db = Vec::with_capacity(k - SHA1_LEN - 1);
    db.extend_from_slice(&EMPTY_LABEL_HASH);
    db.extend(std::iter::repeat_n(0u8, k - data.len() - 2 * SHA1_LEN - 2));
    db.push(0x01);
    db.extend_from_slice(data);

    let mut seed = [0u8; SHA1_LEN];
    fill_random(&mut seed);

    for (b, m) in db.iter_mut().zip(mgf1(&seed, k - SHA1_LEN - 1)) {
        *b ^= m;
    }
    let mut masked_seed = seed;
    for (b, m) in masked_seed.iter_mut().zip(mgf1(&db, SHA1_LEN)) {
        *b ^= m;
    }

    let mut em = Vec::with_capacity(k);
    em.push(0x00);
    em.extend_from_slice(&masked_seed);
    em.extend_from_slice(&db);

    let m = BigUint::from_bytes_be(&em);
    Ok(to_block(&m.modpow(&key.e, &key.n), k))
}

/// OAEP-decrypt one block with the private key.
pub fn oaep_decrypt(key: &RsaPrivateKey, cipher: &[u8]) -> Result<Vec<u8>, CipherError> {
    let k = key.block_len();
    let c = BigUint::from_bytes_be(cipher);
    if c >= key.n || c.is_zero() {
        return Err(CipherError::BadPadding);
    }
    let em = to_block(&c.modpow(&key.d, &key.n), k);

    if em[0] != 0x00 {
        return Err(CipherError::BadPadding);
    }
    let mut seed: [u8; SHA1_LEN] = em[1..1 + SHA1_LEN].try_into().unwrap();
    let mut db = em[1 + SHA1_LEN..].to_vec();

    for (b, m) in seed.iter_mut().zip(mgf1(&db, SHA1_LEN)) {
        *b ^= m;
    }
    for (b, m) in db.iter_mut().zip(mgf1(&seed, k - SHA1_LEN - 1)) {
        *b ^= m;
    }

    if db[..SHA1_LEN] != EMPTY_LABEL_HASH {
        return Err(CipherError::BadPadding);
    }
    let sep = db[SHA1_LEN..]
        .iter()
        .position(|&b| b != 0)
        .ok_or(CipherError::BadPadding)?;
    if db[SHA1_LEN + sep] != 0x01 {
        return Err(CipherError::BadPadding);
    }
    Ok(db[SHA1_LEN + sep + 1..].to_vec())
}

// ─── Channel ciphers ─────────────────────────────────────────────────────────

/// The server's RSA channel cipher: signs outbound with X9.31, decrypts
/// inbound with OAEP. Active only until the handshake swaps in CWC.
pub struct ServerMessageCipher {
    key: RsaPrivateKey,
}

impl ServerMessageCipher {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }
}

impl Cipher for ServerMessageCipher {
    fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        x931_sign(&self.key, plain)
    }

    fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CipherError> {
        oaep_decrypt(&self.key, cipher)
    }
}

/// The mirror image of [`ServerMessageCipher`], for test clients.
pub struct ClientMessageCipher {
    key: RsaPublicKey,
}

impl ClientMessageCipher {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }
}

impl Cipher for ClientMessageCipher {
    fn encrypt(&mut self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        oaep_encrypt(&self.key, plain)
    }

    fn decrypt(&mut self, cipher: &[u8]) -> Result<Vec<u8>, CipherError> {
        x931_verify(&self.key, cipher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkey;

    #[test]
    fn x931_round_trip() {
        let key = testkey::private_key();
        let signed = x931_sign(&key, b"auth endpoint reply").unwrap();
        assert_eq!(signed.len(), key.block_len());
        let opened = x931_verify(&key.public_key(), &signed).unwrap();
        assert_eq!(opened, b"auth endpoint reply");
    }

    #[test]
    fn x931_rejects_garbage() {
        let key = testkey::private_key();
        let garbage = vec![0x5A; key.block_len()];
        assert!(x931_verify(&key.public_key(), &garbage).is_err());
    }

    #[test]
    fn oaep_round_trip() {
        let key = testkey::private_key();
        let cipher = oaep_encrypt(&key.public_key(), b"cwc key material").unwrap();
        assert_eq!(cipher.len(), key.block_len());
        assert_eq!(oaep_decrypt(&key, &cipher).unwrap(), b"cwc key material");
    }

    #[test]
    fn oaep_size_limit() {
        let key = testkey::private_key();
        let too_long = vec![0u8; key.block_len() - 2 * SHA1_LEN - 1];
        assert_eq!(
            oaep_encrypt(&key.public_key(), &too_long),
            Err(CipherError::MessageTooLong)
        );
    }

    #[test]
    fn channel_ciphers_mirror() {
        let key = testkey::private_key();
        let mut server = ServerMessageCipher::new(key.clone());
        let mut client = ClientMessageCipher::new(key.public_key());

        let inbound = client.encrypt(b"RequestHandshake").unwrap();
        assert_eq!(server.decrypt(&inbound).unwrap(), b"RequestHandshake");

        let outbound = server.encrypt(b"27 byte fill").unwrap();
        assert_eq!(client.decrypt(&outbound).unwrap(), b"27 byte fill");
    }
}
