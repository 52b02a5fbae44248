// crates/signet-core/src/crypto/secrets.rs
// ============================================================================
// Module: Secrets and Hashing
// Description: CSPRNG secrets and PBKDF2-SHA256 secret hashing.
// Purpose: Generate opaque credentials and verify them in constant time.
// Dependencies: rand, pbkdf2, sha2, subtle, base64
// ============================================================================

//! ## Overview
//! Opaque credentials (client secrets, refresh tokens, session ids,
//! authorization codes) are 256 bits from the platform CSPRNG, rendered as
//! URL-safe base64. Secrets that must be verified later are stored as
//! `$pbkdf2-sha256$<iterations>$<b64url salt>$<b64url hash>` and compared in
//! constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::crypto::CryptoError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Secret entropy in bytes (256 bits).
const SECRET_BYTES: usize = 32;
/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: u32 = 100_000;
/// Salt length in bytes.
const SALT_BYTES: usize = 16;
/// Derived hash length in bytes.
const HASH_BYTES: usize = 32;
/// Scheme label embedded in the stored hash format.
const SCHEME: &str = "pbkdf2-sha256";

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Generates a 256-bit URL-safe base64 secret.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates an identifier with a short prefix (for example `usr_<b64>`).
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generates a six-digit one-time code with leading zeros preserved.
#[must_use]
pub fn generate_six_digit_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Hashes a plaintext secret into the stored PBKDF2 format.
#[must_use]
pub fn hash_secret(plaintext: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut derived = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut derived);
    format!(
        "${SCHEME}${PBKDF2_ITERATIONS}${}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(derived)
    )
}

/// Verifies a plaintext secret against a stored PBKDF2 hash.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] when the stored hash does not parse.
pub fn verify_secret(plaintext: &str, stored: &str) -> Result<bool, CryptoError> {
    let mut parts = stored.split('$');
    let (empty, scheme, iterations, salt, hash) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    );
    if parts.next().is_some() {
        return Err(CryptoError::Malformed("trailing hash fields".to_string()));
    }
    let (Some(""), Some(scheme), Some(iterations), Some(salt), Some(hash)) =
        (empty, scheme, iterations, salt, hash)
    else {
        return Err(CryptoError::Malformed("missing hash fields".to_string()));
    };
    if scheme != SCHEME {
        return Err(CryptoError::Malformed(format!("unknown hash scheme: {scheme}")));
    }
    let iterations: u32 = iterations
        .parse()
        .map_err(|_| CryptoError::Malformed("invalid iteration count".to_string()))?;
    let salt = URL_SAFE_NO_PAD
        .decode(salt)
        .map_err(|_| CryptoError::Malformed("invalid salt encoding".to_string()))?;
    let expected = URL_SAFE_NO_PAD
        .decode(hash)
        .map_err(|_| CryptoError::Malformed("invalid hash encoding".to_string()))?;
    let mut derived = vec![0u8; expected.len().max(1)];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, iterations, &mut derived);
    Ok(derived.ct_eq(&expected).into())
}
