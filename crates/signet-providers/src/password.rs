// crates/signet-providers/src/password.rs
// ============================================================================
// Module: Password Provider
// Description: Local password registration, verification, and login.
// Purpose: Authenticate users without an upstream provider.
// Dependencies: signet-core
// ============================================================================

//! ## Overview
//! Registration is two-step: `register` validates the password against the
//! pluggable policy, stores a pending record with a six-digit verification
//! code (kept as an HMAC tag, never plaintext), and `verify` promotes the
//! pending record into a durable credential. Login verifies the PBKDF2 hash.
//! Strength enforcement beyond the injected policy is out of scope.

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
use signet_core::store::take_json;
use signet_core::store::write_json;

use crate::ProviderError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pending registration lifetime in seconds.
const PENDING_TTL_SECS: u64 = 600;
/// Maximum verification attempts per pending registration.
const MAX_VERIFY_ATTEMPTS: u32 = 5;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Pluggable password acceptance policy.
pub trait PasswordPolicy: Send + Sync {
    /// Returns an error message when the password is unacceptable.
    fn validate(&self, password: &str) -> Result<(), String>;
}

/// Default policy requiring a minimum length.
#[derive(Debug, Clone, Copy)]
pub struct MinimumLengthPolicy {
    /// Minimum accepted password length.
    pub min_length: usize,
}

impl Default for MinimumLengthPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordPolicy for MinimumLengthPolicy {
    fn validate(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!("password must be at least {} characters", self.min_length));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Pending registration awaiting code verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRegistration {
    /// Lower-cased email.
    email: String,
    /// PBKDF2 hash of the chosen password.
    password_hash: String,
    /// HMAC tag of the verification code.
    code_tag: String,
    /// Verification attempts consumed.
    attempts: u32,
    /// Creation time.
    created_at: Timestamp,
}

/// Durable password credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordCredential {
    /// Lower-cased email.
    email: String,
    /// PBKDF2 hash of the password.
    password_hash: String,
    /// Creation time.
    created_at: Timestamp,
    /// Last password change time.
    updated_at: Timestamp,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Password provider operating on tenant-scoped storage handles.
///
/// # Invariants
/// - Verification codes are stored as HMAC tags under the process key.
/// - Credential records never hold plaintext passwords.
pub struct PasswordProvider {
    /// Process key for code tagging.
    mac_key: AeadKey,
    /// Injected password policy.
    policy: Box<dyn PasswordPolicy>,
}

impl PasswordProvider {
    /// Creates a provider with the given policy.
    #[must_use]
    pub fn new(mac_key: AeadKey, policy: Box<dyn PasswordPolicy>) -> Self {
        Self { mac_key, policy }
    }

    /// Returns the storage key for a pending registration.
    fn pending_key(email: &str) -> KeyPath {
        KeyPath::from_segments(&["password", "pending", email])
    }

    /// Returns the storage key for a durable credential.
    fn credential_key(email: &str) -> KeyPath {
        KeyPath::from_segments(&["password", "creds", email])
    }

    /// Starts a registration and returns the six-digit verification code.
    ///
    /// The code is handed to the caller for delivery (mail is external) and
    /// only its tag is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidInput`] for policy violations or
    /// mismatched repeats, and [`ProviderError::ProviderExists`] when the
    /// email already has a credential.
    pub fn register(
        &self,
        store: &TenantScopedStore,
        email: &str,
        password: &str,
        repeat: &str,
    ) -> Result<String, ProviderError> {
        let email = normalize_email(email)?;
        if password != repeat {
            return Err(ProviderError::InvalidInput("passwords do not match".to_string()));
        }
        self.policy.validate(password).map_err(ProviderError::InvalidInput)?;
        if read_json::<PasswordCredential>(store, &Self::credential_key(&email))?.is_some() {
            return Err(ProviderError::ProviderExists(email));
        }
        let code = secrets::generate_six_digit_code();
        let pending = PendingRegistration {
            email: email.clone(),
            password_hash: secrets::hash_secret(password),
            code_tag: mac::tag(&self.mac_key, format!("{email}:{code}").as_bytes())?,
            attempts: 0,
            created_at: Timestamp::now(),
        };
        write_json(store, &Self::pending_key(&email), &pending, Some(PENDING_TTL_SECS))?;
        Ok(code)
    }

    /// Verifies the registration code and promotes the credential.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthenticationFailed`] for wrong codes,
    /// exhausted attempts, or expired registrations.
    pub fn verify(
        &self,
        store: &TenantScopedStore,
        email: &str,
        code: &str,
    ) -> Result<String, ProviderError> {
        let email = normalize_email(email)?;
        let key = Self::pending_key(&email);
        let Some(mut pending) = read_json::<PendingRegistration>(store, &key)? else {
            return Err(ProviderError::AuthenticationFailed(
                "no pending registration".to_string(),
            ));
        };
        if pending.attempts >= MAX_VERIFY_ATTEMPTS {
            store.remove(&key)?;
            return Err(ProviderError::AuthenticationFailed(
                "verification attempts exhausted".to_string(),
            ));
        }
        let valid = mac::verify_tag(
            &self.mac_key,
            format!("{email}:{code}").as_bytes(),
            &pending.code_tag,
        )?;
        if !valid {
            pending.attempts += 1;
            write_json(store, &key, &pending, Some(PENDING_TTL_SECS))?;
            return Err(ProviderError::AuthenticationFailed("wrong verification code".to_string()));
        }
        let taken: Option<PendingRegistration> = take_json(store, &key)?;
        let Some(pending) = taken else {
            return Err(ProviderError::AuthenticationFailed(
                "no pending registration".to_string(),
            ));
        };
        let now = Timestamp::now();
        let credential = PasswordCredential {
            email: email.clone(),
            password_hash: pending.password_hash,
            created_at: now,
            updated_at: now,
        };
        write_json(store, &Self::credential_key(&email), &credential, None)?;
        Ok(email)
    }

    /// Verifies a password login.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthenticationFailed`] for unknown emails or
    /// wrong passwords; the two cases are indistinguishable to the caller.
    pub fn login(
        &self,
        store: &TenantScopedStore,
        email: &str,
        password: &str,
    ) -> Result<String, ProviderError> {
        let email = normalize_email(email)?;
        let credential = read_json::<PasswordCredential>(store, &Self::credential_key(&email))?;
        let Some(credential) = credential else {
            return Err(ProviderError::AuthenticationFailed("invalid credentials".to_string()));
        };
        let valid = secrets::verify_secret(password, &credential.password_hash).unwrap_or(false);
        if !valid {
            return Err(ProviderError::AuthenticationFailed("invalid credentials".to_string()));
        }
        Ok(email)
    }

    /// Replaces the password for an existing credential.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthenticationFailed`] when no credential
    /// exists, and [`ProviderError::InvalidInput`] for policy violations.
    pub fn change_password(
        &self,
        store: &TenantScopedStore,
        email: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        let email = normalize_email(email)?;
        self.policy.validate(new_password).map_err(ProviderError::InvalidInput)?;
        let key = Self::credential_key(&email);
        let Some(mut credential) = read_json::<PasswordCredential>(store, &key)? else {
            return Err(ProviderError::AuthenticationFailed("unknown account".to_string()));
        };
        credential.password_hash = secrets::hash_secret(new_password);
        credential.updated_at = Timestamp::now();
        write_json(store, &key, &credential, None)?;
        Ok(())
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
