// crates/signet-core/src/crypto/mod.rs
// ============================================================================
// Module: Crypto Primitives
// Description: Secret generation/hashing, AEAD, cookie sealing, JWT signing.
// Purpose: Provide the small, audited crypto surface the issuer builds on.
// Dependencies: aes-gcm, pbkdf2, hmac, sha2, subtle, rand, base64, jsonwebtoken, rcgen
// ============================================================================

//! ## Overview
//! All cryptographic behavior lives behind this module: random secrets and
//! PBKDF2 hashing, AES-256-GCM for at-rest secrets and the session cookie,
//! HMAC tags for one-time codes and cross-request state, and the ES256
//! signing key set backing access tokens and the JWKS document. Failures
//! collapse into [`CryptoError`] without leaking key material.
//!
//! Security posture: ciphertext and encoded inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aead;
pub mod cookie;
pub mod jwt;
pub mod mac;
pub mod secrets;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Crypto primitive errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; messages never include
///   key material or plaintext.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption or decryption failed (wrong key, altered ciphertext/IV/tag).
    #[error("encryption error: {0}")]
    Encryption(String),
    /// Stored hash or encoded value is malformed.
    #[error("malformed crypto material: {0}")]
    Malformed(String),
    /// Signing key generation or loading failed.
    #[error("signing key error: {0}")]
    SigningKey(String),
    /// Token signing or verification failed.
    #[error("token signature error: {0}")]
    TokenSignature(String),
}
