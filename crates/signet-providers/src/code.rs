// crates/signet-providers/src/code.rs
// ============================================================================
// Module: One-Time Code Provider
// Description: Email one-time-code issue and verification.
// Purpose: Authenticate users by a short-lived six-digit code.
// Dependencies: signet-core
// ============================================================================

//! ## Overview
//! The code provider issues a six-digit code bound to an email address and
//! verifies it within a short window and a bounded number of attempts. The
//! code itself is returned to the caller for delivery (mail is external);
//! only its HMAC tag is persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use signet_core::AeadKey;
use signet_core::Timestamp;
use signet_core::crypto::mac;
use signet_core::crypto::secrets;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::TenantScopedStore;
use signet_core::store::read_json;
use signet_core::store::write_json;

use crate::ProviderError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Code lifetime in seconds.
const CODE_TTL_SECS: u64 = 600;
/// Maximum verification attempts per issued code.
const MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Issued code awaiting verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedCode {
    /// Lower-cased email the code was issued for.
    email: String,
    /// HMAC tag of the code.
    code_tag: String,
    /// Verification attempts consumed.
    attempts: u32,
    /// Issue time.
    issued_at: Timestamp,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// One-time code provider operating on tenant-scoped storage handles.
///
/// # Invariants
/// - At most one live code per email; reissuing replaces the previous code.
pub struct CodeProvider {
    /// Process key for code tagging.
    mac_key: AeadKey,
}

impl CodeProvider {
    /// Creates a provider.
    #[must_use]
    pub const fn new(mac_key: AeadKey) -> Self {
        Self { mac_key }
    }

    /// Returns the storage key for an issued code.
    fn code_key(email: &str) -> KeyPath {
        KeyPath::from_segments(&["otcode", email])
    }

    /// Issues a fresh code for the email, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidInput`] for malformed emails.
    pub fn issue(&self, store: &TenantScopedStore, email: &str) -> Result<String, ProviderError> {
        let email = normalize_email(email)?;
        let code = secrets::generate_six_digit_code();
        let issued = IssuedCode {
            email: email.clone(),
            code_tag: mac::tag(&self.mac_key, format!("{email}:{code}").as_bytes())?,
            attempts: 0,
            issued_at: Timestamp::now(),
        };
        write_json(store, &Self::code_key(&email), &issued, Some(CODE_TTL_SECS))?;
        Ok(code)
    }

    /// Verifies and consumes a code.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthenticationFailed`] for wrong, expired, or
    /// attempt-exhausted codes.
    pub fn verify(
        &self,
        store: &TenantScopedStore,
        email: &str,
        code: &str,
    ) -> Result<String, ProviderError> {
        let email = normalize_email(email)?;
        let key = Self::code_key(&email);
        let Some(mut issued) = read_json::<IssuedCode>(store, &key)? else {
            return Err(ProviderError::AuthenticationFailed("no code issued".to_string()));
        };
        if issued.attempts >= MAX_ATTEMPTS {
            store.remove(&key)?;
            return Err(ProviderError::AuthenticationFailed(
                "verification attempts exhausted".to_string(),
            ));
        }
        let valid =
            mac::verify_tag(&self.mac_key, format!("{email}:{code}").as_bytes(), &issued.code_tag)?;
        if !valid {
            issued.attempts += 1;
            write_json(store, &key, &issued, Some(CODE_TTL_SECS))?;
            return Err(ProviderError::AuthenticationFailed("wrong code".to_string()));
        }
        store.remove(&key)?;
        Ok(email)
    }
}

/// Lower-cases and minimally validates an email address.
fn normalize_email(email: &str) -> Result<String, ProviderError> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(ProviderError::InvalidInput(format!("invalid email: {email}")));
    }
    Ok(normalized)
}
