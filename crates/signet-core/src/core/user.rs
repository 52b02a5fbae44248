// crates/signet-core/src/core/user.rs
// ============================================================================
// Module: User Records
// Description: End-user accounts and linked provider identities.
// Purpose: Define user shapes with tenant-unique emails and identity links.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Users are tenant-scoped accounts keyed by a lower-cased email that is
//! unique within the tenant. Provider identities live in separate
//! [`UserIdentity`] records so one user can link several providers; the pair
//! `(provider, provider_user_id)` is unique per tenant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ProviderName;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Account may authenticate.
    Active,
    /// Account is suspended; sessions are revoked on transition.
    Suspended,
    /// Account is soft-deleted.
    Deleted,
}

impl UserStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

// ============================================================================
// SECTION: User
// ============================================================================

/// End-user account.
///
/// # Invariants
/// - `email` is stored lower-cased and is unique within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lower-cased email address.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Lifecycle status.
    pub status: UserStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
    /// Last successful login, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<Timestamp>,
    /// Whether the next login must run the password-reset flow.
    #[serde(default)]
    pub password_reset_required: bool,
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Provider identity linked to a user.
///
/// # Invariants
/// - `(provider, provider_user_id)` is unique per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Identity record identifier.
    pub id: String,
    /// Linked user.
    pub user_id: UserId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Provider name that authenticated this identity.
    pub provider: ProviderName,
    /// Stable subject identifier at the provider.
    pub provider_user_id: String,
    /// Optional raw provider profile data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<Value>,
}
