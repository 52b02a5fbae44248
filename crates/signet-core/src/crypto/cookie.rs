// crates/signet-core/src/crypto/cookie.rs
// ============================================================================
// Module: Session Cookie Sealing
// Description: JWE-compact (dir + A256GCM) envelope for the session cookie.
// Purpose: Bind browser sessions to an encrypted, tamper-proof cookie value.
// Dependencies: aes-gcm, base64, serde_json
// ============================================================================

//! ## Overview
//! The session cookie carries `{sid, tid, v, iat}` sealed as a JWE compact
//! serialization with direct key agreement and A256GCM content encryption:
//! `b64(header)..b64(iv).b64(ciphertext).b64(tag)` with the encoded header as
//! associated data. The encrypted-key part is empty because the process-wide
//! cookie secret is used directly.

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
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::crypto::CryptoError;
use crate::crypto::aead::AeadKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed protected header for the direct A256GCM envelope.
const PROTECTED_HEADER: &str = r#"{"alg":"dir","enc":"A256GCM"}"#;
/// GCM IV length in bytes.
const IV_BYTES: usize = 12;
/// GCM authentication tag length in bytes.
const TAG_BYTES: usize = 16;
/// Maximum accepted cookie value length.
const MAX_COOKIE_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Decrypted session cookie contents.
///
/// # Invariants
/// - `v` mirrors the browser session version at emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePayload {
    /// Browser session identifier.
    pub sid: SessionId,
    /// Tenant identifier.
    pub tid: TenantId,
    /// Session version at emission time.
    pub v: u64,
    /// Emission time in unix seconds.
    pub iat: i64,
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Seals and opens session cookie payloads.
///
/// # Invariants
/// - The cookie secret is loaded at startup and immutable for the process
///   lifetime.
#[derive(Clone)]
pub struct CookieCodec {
    /// Process-wide cookie secret.
    key: AeadKey,
}

impl CookieCodec {
    /// Creates a codec over the process-wide cookie secret.
    #[must_use]
    pub const fn new(key: AeadKey) -> Self {
        Self { key }
    }

    /// Seals a payload into the JWE compact cookie value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when serialization or sealing fails.
    pub fn seal(&self, payload: &CookiePayload) -> Result<String, CryptoError> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|err| CryptoError::Malformed(err.to_string()))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(PROTECTED_HEADER.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let mut iv = [0u8; IV_BYTES];
        rand::thread_rng().fill_bytes(&mut iv);
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &plaintext,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encryption("cookie seal failed".to_string()))?;
        let split = sealed.len().saturating_sub(TAG_BYTES);
        let (ct, tag) = sealed.split_at(split);
        Ok(format!(
            "{header_b64}..{}.{}.{}",
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(ct),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Opens a cookie value back into its payload.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] for any tampered or foreign cookie
    /// and [`CryptoError::Malformed`] for structurally invalid values.
    pub fn open(&self, cookie: &str) -> Result<CookiePayload, CryptoError> {
        if cookie.len() > MAX_COOKIE_LENGTH {
            return Err(CryptoError::Malformed("cookie value too long".to_string()));
        }
        let parts: Vec<&str> = cookie.split('.').collect();
        let [header_b64, encrypted_key, iv_b64, ct_b64, tag_b64] = parts.as_slice() else {
            return Err(CryptoError::Malformed("cookie is not a compact envelope".to_string()));
        };
        if !encrypted_key.is_empty() {
            return Err(CryptoError::Malformed("unexpected encrypted key".to_string()));
        }
        let header = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| CryptoError::Malformed("invalid header encoding".to_string()))?;
        if header != PROTECTED_HEADER.as_bytes() {
            return Err(CryptoError::Malformed("unsupported cookie header".to_string()));
        }
        let iv = URL_SAFE_NO_PAD
            .decode(iv_b64)
            .map_err(|_| CryptoError::Malformed("invalid iv encoding".to_string()))?;
        let ct = URL_SAFE_NO_PAD
            .decode(ct_b64)
            .map_err(|_| CryptoError::Malformed("invalid ciphertext encoding".to_string()))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| CryptoError::Malformed("invalid tag encoding".to_string()))?;
        if iv.len() != IV_BYTES || tag.len() != TAG_BYTES {
            return Err(CryptoError::Malformed("invalid iv or tag length".to_string()));
        }
        let mut combined = ct;
        combined.extend_from_slice(&tag);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &combined,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encryption("cookie open failed".to_string()))?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| CryptoError::Malformed("invalid cookie payload".to_string()))
    }
}
