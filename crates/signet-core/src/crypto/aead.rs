// crates/signet-core/src/crypto/aead.rs
// ============================================================================
// Module: AEAD Encryption
// Description: AES-256-GCM seal/open with the split ciphertext/IV at-rest form.
// Purpose: Protect provider secrets and other small payloads at rest.
// Dependencies: aes-gcm, rand, base64
// ============================================================================

//! ## Overview
//! At-rest secrets are sealed with AES-256-GCM under a process-wide key using
//! a fresh 12-byte IV per value. The database form keeps
//! `base64(ciphertext).base64(tag)` in one column and `base64(iv)` in a
//! separate one, so either can be audited independently. Decryption with any
//! other key, or any altered component, fails with an encryption error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::Payload;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

use crate::crypto::CryptoError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// AES-256 key length in bytes.
const KEY_BYTES: usize = 32;
/// GCM IV length in bytes.
const IV_BYTES: usize = 12;
/// GCM authentication tag length in bytes.
const TAG_BYTES: usize = 16;

// ============================================================================
// SECTION: Key
// ============================================================================

/// Process-wide AEAD key.
///
/// # Invariants
/// - Exactly 32 bytes; loaded at startup and immutable for the process
///   lifetime.
#[derive(Clone)]
pub struct AeadKey([u8; KEY_BYTES]);

impl AeadKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parses a standard-base64 key string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] when the encoding or length is wrong.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::Malformed("invalid key encoding".to_string()))?;
        let bytes: [u8; KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("key must be 32 bytes".to_string()))?;
        Ok(Self(bytes))
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the standard-base64 encoding of the key.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Returns the raw key bytes for sibling primitives.
    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

// ============================================================================
// SECTION: Serialized Form
// ============================================================================

/// AEAD ciphertext in the at-rest database form.
///
/// # Invariants
/// - `ciphertext` is `base64(ct).base64(tag)`; `iv` is stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// `base64(ciphertext).base64(tag)`.
    pub ciphertext: String,
    /// `base64(iv)`.
    pub iv: String,
}

// ============================================================================
// SECTION: Seal / Open
// ============================================================================

/// Seals `plaintext` with a fresh IV under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] when sealing fails.
pub fn seal(key: &AeadKey, plaintext: &[u8], aad: &[u8]) -> Result<EncryptedSecret, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let mut iv = [0u8; IV_BYTES];
    rand::thread_rng().fill_bytes(&mut iv);
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("aead seal failed".to_string()))?;
    let split = sealed.len().saturating_sub(TAG_BYTES);
    let (ct, tag) = sealed.split_at(split);
    Ok(EncryptedSecret {
        ciphertext: format!("{}.{}", BASE64.encode(ct), BASE64.encode(tag)),
        iv: BASE64.encode(iv),
    })
}

/// Opens a sealed value under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] when the key is wrong or any component
/// was altered, and [`CryptoError::Malformed`] when the encoding is invalid.
pub fn open(key: &AeadKey, sealed: &EncryptedSecret, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (ct_part, tag_part) = sealed
        .ciphertext
        .split_once('.')
        .ok_or_else(|| CryptoError::Malformed("missing tag separator".to_string()))?;
    let ct = BASE64
        .decode(ct_part)
        .map_err(|_| CryptoError::Malformed("invalid ciphertext encoding".to_string()))?;
    let tag = BASE64
        .decode(tag_part)
        .map_err(|_| CryptoError::Malformed("invalid tag encoding".to_string()))?;
    let iv = BASE64
        .decode(&sealed.iv)
        .map_err(|_| CryptoError::Malformed("invalid iv encoding".to_string()))?;
    if iv.len() != IV_BYTES || tag.len() != TAG_BYTES {
        return Err(CryptoError::Malformed("invalid iv or tag length".to_string()));
    }
    let mut combined = ct;
    combined.extend_from_slice(&tag);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("aead open failed".to_string()))
}
