//! Cryptographic primitives for Pulse.
//!
//! Provides two things:
//!   1. SHA-256 content checksums: whole-file integrity, hex encoded
//!   2. The cipher channel: XSalsa20-Poly1305 over a 32-byte session key
//!
//! Every frame gets a fresh random 24-byte nonce, so identical plaintexts
//! never produce identical ciphertexts on the relay.
//!
//! Session keys derive ZeroizeOnDrop: wiped from memory when dropped.
//! There is no unsafe code in this module.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session key length in bytes.
pub const KEY_SIZE: usize = 32;

/// XSalsa20 nonce length, prepended to every ciphertext.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag length, appended by the AEAD.
pub const TAG_SIZE: usize = 16;

// ── Checksums ─────────────────────────────────────────────────────────────────

/// SHA-256 of a byte slice, lower-case hex.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental SHA-256 for content that arrives in pieces.
///
/// # Example
/// ```
/// use pulse_core::crypto::ChecksumHasher;
/// let mut h = ChecksumHasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// assert_eq!(h.finalize(), pulse_core::crypto::checksum(b"hello world"));
/// ```
pub struct ChecksumHasher(Sha256);

impl ChecksumHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> String {
        hex::encode(self.0.finalize())
    }
}

impl Default for ChecksumHasher {
    fn default() -> Self {
        Self::new()
    }
}

// ── Session Key ───────────────────────────────────────────────────────────────

/// A 32-byte symmetric key shared by the two endpoints of one session.
///
/// Generated by whichever endpoint starts the session and handed to the peer
/// out-of-band in a URL fragment. The relay never sees it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// URL-safe base64 without padding, suitable for a URL fragment.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse a base64 key. Accepts URL-safe (unpadded) and standard alphabets.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .or_else(|_| STANDARD.decode(encoded))
            .map_err(|_| CryptoError::KeyEncoding)?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKey(v.len()))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Generate a fresh random session key.
pub fn generate_key() -> SessionKey {
    SessionKey::generate()
}

// ── Cipher Channel ────────────────────────────────────────────────────────────

/// Encrypt one frame.
///
/// Wire format: `[nonce (24 bytes)] [ciphertext (plaintext.len() + 16)]`.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt one frame produced by [`encrypt`].
///
/// Fails with `Authentication` if the tag does not verify: wrong key or
/// tampered bytes. Never returns altered plaintext.
pub fn decrypt(ciphertext: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::TooShort(ciphertext.len()));
    }

    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Authentication)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("authentication failed: wrong key or tampered ciphertext")]
    Authentication,

    #[error("ciphertext too short ({0} bytes, need at least 40: 24 nonce + 16 tag)")]
    TooShort(usize),

    #[error("encryption failed")]
    Encryption,

    #[error("session key must be 32 bytes, got {0}")]
    InvalidKey(usize),

    #[error("session key is not valid base64")]
    KeyEncoding,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
