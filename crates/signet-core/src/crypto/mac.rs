// crates/signet-core/src/crypto/mac.rs
// ============================================================================
// Module: HMAC Tags
// Description: HMAC-SHA256 tagging for codes and cross-request state.
// Purpose: Bind short-lived values to the process key without storing them.
// Dependencies: hmac, sha2, subtle, base64
// ============================================================================

//! ## Overview
//! One-time login codes and upstream OAuth `state` values are stored or
//! transmitted as HMAC-SHA256 tags rather than plaintext, keyed by the
//! process-wide cookie secret. Verification is constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::crypto::CryptoError;
use crate::crypto::aead::AeadKey;

// ============================================================================
// SECTION: Tagging
// ============================================================================

/// HMAC-SHA256 instantiation used throughout the issuer.
type HmacSha256 = Hmac<Sha256>;

/// Computes the URL-safe base64 HMAC tag of `data` under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] when the key cannot initialize the MAC.
pub fn tag(key: &AeadKey, data: &[u8]) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::Malformed("invalid mac key".to_string()))?;
    mac.update(data);
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Verifies that `expected` is the tag of `data` under `key` in constant time.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] when the key cannot initialize the MAC.
pub fn verify_tag(key: &AeadKey, data: &[u8], expected: &str) -> Result<bool, CryptoError> {
    let computed = tag(key, data)?;
    Ok(computed.as_bytes().ct_eq(expected.as_bytes()).into())
}
