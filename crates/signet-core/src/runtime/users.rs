// crates/signet-core/src/runtime/users.rs
// ============================================================================
// Module: User Registry
// Description: User account CRUD and provider identity linking.
// Purpose: Manage tenant-scoped user accounts with unique emails.
// Dependencies: crate::core, crate::store
// ============================================================================

//! ## Overview
//! Users are addressed by id with a lower-cased email index per tenant.
//! Provider identities link `(provider, provider_user_id)` pairs to users so
//! the success hook can find or create the account behind an upstream login.
//! Suspension only flips the status; the admin surface orchestrates session
//! revocation and reports the count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ProviderName;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;
use crate::core::user::User;
use crate::core::user::UserIdentity;
use crate::core::user::UserStatus;
use crate::crypto::secrets;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;
use crate::store::TenantScopedStore;
use crate::store::read_json;
use crate::store::write_json;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// User registry errors.
#[derive(Debug, Error)]
pub enum UserError {
    /// No user exists for the identifier or email.
    #[error("user not found: {0}")]
    UserNotFound(String),
    /// Email already registered within the tenant.
    #[error("user exists: {0}")]
    UserExists(String),
    /// Identity already linked within the tenant.
    #[error("identity exists: {0}")]
    IdentityExists(String),
    /// Input failed validation.
    #[error("invalid user input: {0}")]
    InvalidInput(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Input for user creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Email address (stored lower-cased).
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional free-form metadata.
    pub metadata: Option<Value>,
}

/// Partial update for an existing user.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// Replacement display name.
    pub name: Option<Option<String>>,
    /// Replacement metadata.
    pub metadata: Option<Option<Value>>,
    /// Replacement password-reset flag.
    pub password_reset_required: Option<bool>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// User registry operating on tenant-scoped storage handles.
///
/// # Invariants
/// - Emails are lower-cased before storage and indexing.
/// - `(provider, provider_user_id)` is unique per tenant.
#[derive(Debug, Default)]
pub struct UserRegistry;

impl UserRegistry {
    /// Creates a registry.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the storage key for a user record.
    fn user_key(id: &UserId) -> KeyPath {
        KeyPath::from_segments(&["users", "records", id.as_str()])
    }

    /// Returns the storage key for the email index.
    fn email_key(email: &str) -> KeyPath {
        KeyPath::from_segments(&["users", "emails", email])
    }

    /// Returns the storage key for an identity record.
    fn identity_key(provider: &ProviderName, provider_user_id: &str) -> KeyPath {
        KeyPath::from_segments(&["identities", provider.as_str(), provider_user_id])
    }

    /// Returns the storage key for a user's identity index.
    fn user_identity_key(user_id: &UserId, identity_id: &str) -> KeyPath {
        KeyPath::from_segments(&["users", "identities", user_id.as_str(), identity_id])
    }

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserExists`] when the email is registered.
    pub fn create(&self, store: &TenantScopedStore, input: NewUser) -> Result<User, UserError> {
        let email = normalize_email(&input.email)?;
        let email_key = Self::email_key(&email);
        if read_json::<UserId>(store, &email_key)?.is_some() {
            return Err(UserError::UserExists(email));
        }
        let now = Timestamp::now();
        let user = User {
            id: UserId::new(secrets::generate_id("usr")),
            tenant_id: store.tenant_id().clone(),
            email,
            name: input.name,
            metadata: input.metadata,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            password_reset_required: false,
        };
        write_json(store, &Self::user_key(&user.id), &user, None)?;
        write_json(store, &email_key, &user.id, None)?;
        Ok(user)
    }

    /// Returns a user by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when absent.
    pub fn get(&self, store: &TenantScopedStore, id: &UserId) -> Result<User, UserError> {
        read_json::<User>(store, &Self::user_key(id))?
            .ok_or_else(|| UserError::UserNotFound(id.to_string()))
    }

    /// Returns a user by email (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when absent.
    pub fn get_by_email(&self, store: &TenantScopedStore, email: &str) -> Result<User, UserError> {
        let email = normalize_email(email)?;
        let id = read_json::<UserId>(store, &Self::email_key(&email))?
            .ok_or_else(|| UserError::UserNotFound(email.clone()))?;
        self.get(store, &id)
    }

    /// Lists users ordered by email.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Store`] when the scan fails.
    pub fn list(
        &self,
        store: &TenantScopedStore,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<User>, UserError> {
        let prefix = KeyPath::from_segments(&["users", "records"]);
        let mut users: Vec<User> = store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when absent.
    pub fn update(
        &self,
        store: &TenantScopedStore,
        id: &UserId,
        update: UserUpdate,
    ) -> Result<User, UserError> {
        let mut user = self.get(store, id)?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(metadata) = update.metadata {
            user.metadata = metadata;
        }
        if let Some(flag) = update.password_reset_required {
            user.password_reset_required = flag;
        }
        user.updated_at = Timestamp::now();
        write_json(store, &Self::user_key(id), &user, None)?;
        Ok(user)
    }

    /// Sets the user status, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when absent.
    pub fn set_status(
        &self,
        store: &TenantScopedStore,
        id: &UserId,
        status: UserStatus,
    ) -> Result<User, UserError> {
        let mut user = self.get(store, id)?;
        user.status = status;
        user.updated_at = Timestamp::now();
        write_json(store, &Self::user_key(id), &user, None)?;
        Ok(user)
    }

    /// Stamps a successful login.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when absent.
    pub fn record_login(&self, store: &TenantScopedStore, id: &UserId) -> Result<(), UserError> {
        let mut user = self.get(store, id)?;
        user.last_login_at = Some(Timestamp::now());
        write_json(store, &Self::user_key(id), &user, None)?;
        Ok(())
    }

    /// Links a provider identity to a user.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::IdentityExists`] when the pair is already linked.
    pub fn link_identity(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        provider: &ProviderName,
        provider_user_id: &str,
        provider_data: Option<Value>,
    ) -> Result<UserIdentity, UserError> {
        self.get(store, user_id)?;
        let identity_key = Self::identity_key(provider, provider_user_id);
        if read_json::<UserIdentity>(store, &identity_key)?.is_some() {
            return Err(UserError::IdentityExists(format!("{provider}:{provider_user_id}")));
        }
        let identity = UserIdentity {
            id: secrets::generate_id("idn"),
            user_id: user_id.clone(),
            tenant_id: store.tenant_id().clone(),
            provider: provider.clone(),
            provider_user_id: provider_user_id.to_string(),
            provider_data,
        };
        write_json(store, &identity_key, &identity, None)?;
        write_json(store, &Self::user_identity_key(user_id, &identity.id), &identity.id, None)?;
        Ok(identity)
    }

    /// Removes a provider identity link.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::UserNotFound`] when the identity is absent.
    pub fn unlink_identity(
        &self,
        store: &TenantScopedStore,
        provider: &ProviderName,
        provider_user_id: &str,
    ) -> Result<(), UserError> {
        let identity_key = Self::identity_key(provider, provider_user_id);
        let Some(identity) = read_json::<UserIdentity>(store, &identity_key)? else {
            return Err(UserError::UserNotFound(format!("{provider}:{provider_user_id}")));
        };
        store.remove(&identity_key)?;
        store.remove(&Self::user_identity_key(&identity.user_id, &identity.id))?;
        Ok(())
    }

    /// Returns the user linked to a provider identity, when any.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Store`] when storage fails.
    pub fn find_by_identity(
        &self,
        store: &TenantScopedStore,
        provider: &ProviderName,
        provider_user_id: &str,
    ) -> Result<Option<User>, UserError> {
        let identity =
            read_json::<UserIdentity>(store, &Self::identity_key(provider, provider_user_id))?;
        match identity {
            Some(identity) => self.get(store, &identity.user_id).map(Some),
            None => Ok(None),
        }
    }

    /// Finds or creates the user behind a provider login and links it.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::InvalidInput`] when no email is available for a
    /// new account.
    pub fn find_or_create_by_identity(
        &self,
        store: &TenantScopedStore,
        provider: &ProviderName,
        provider_user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        provider_data: Option<Value>,
    ) -> Result<User, UserError> {
        if let Some(user) = self.find_by_identity(store, provider, provider_user_id)? {
            return Ok(user);
        }
        let user = match email {
            Some(email) => match self.get_by_email(store, email) {
                Ok(user) => user,
                Err(UserError::UserNotFound(_)) => self.create(
                    store,
                    NewUser {
                        email: email.to_string(),
                        name: name.map(ToString::to_string),
                        metadata: None,
                    },
                )?,
                Err(err) => return Err(err),
            },
            None => {
                return Err(UserError::InvalidInput(
                    "provider identity carries no email".to_string(),
                ));
            }
        };
        self.link_identity(store, &user.id, provider, provider_user_id, provider_data)?;
        Ok(user)
    }
}

/// Lower-cases and minimally validates an email address.
fn normalize_email(email: &str) -> Result<String, UserError> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(UserError::InvalidInput(format!("invalid email: {email}")));
    }
    Ok(normalized)
}
