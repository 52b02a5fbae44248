// crates/signet-core/src/core/session.rs
// ============================================================================
// Module: Session Records
// Description: Browser and account session records plus OIDC prompt values.
// Purpose: Define the persisted shapes managed by the session engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A browser session is bound to one encrypted cookie and holds up to N
//! account sessions, exactly one of which is active when any exist. The
//! records here are plain state; all mutation rules (capacity, eviction,
//! optimistic concurrency) live in the session engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TokenId;
use crate::core::identifiers::UserId;
use crate::core::subject::SubjectType;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Prompt
// ============================================================================

/// OIDC `prompt` parameter values recognized by the issuer.
///
/// # Invariants
/// - Variants are stable wire labels per OIDC Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Never interact; fail with `login_required` when no valid session exists.
    None,
    /// Force re-authentication without consuming the existing session.
    Login,
    /// Proceed; consent UI is handled outside this core.
    Consent,
    /// Show the account picker when two or more accounts exist.
    SelectAccount,
}

impl Prompt {
    /// Parses a wire label into a prompt value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "login" => Some(Self::Login),
            "consent" => Some(Self::Consent),
            "select_account" => Some(Self::SelectAccount),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Browser Session
// ============================================================================

/// Server-side state bound to one browser cookie.
///
/// # Invariants
/// - `version` increases monotonically; writers compare-and-swap on it.
/// - `account_user_ids` is ordered by last authentication, oldest first.
/// - `active_user_id` is `Some` exactly when `account_user_ids` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSession {
    /// Session identifier (256-bit random).
    pub id: SessionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last observed activity; drives the sliding window.
    pub last_activity: Timestamp,
    /// User agent observed at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Remote IP observed at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Monotone version counter for optimistic concurrency.
    pub version: u64,
    /// Currently active account, when any accounts exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_user_id: Option<UserId>,
    /// Account users ordered by last authentication, oldest first.
    #[serde(default)]
    pub account_user_ids: Vec<UserId>,
}

impl BrowserSession {
    /// Returns true when the session holds an account for `user_id`.
    #[must_use]
    pub fn has_account(&self, user_id: &UserId) -> bool {
        self.account_user_ids.contains(user_id)
    }

    /// Returns the least-recently-authenticated account, when any exist.
    #[must_use]
    pub fn least_recent_account(&self) -> Option<&UserId> {
        self.account_user_ids.first()
    }
}

// ============================================================================
// SECTION: Account Session
// ============================================================================

/// One logged-in user within a browser session.
///
/// # Invariants
/// - `(browser_session_id, user_id)` is unique.
/// - Exactly one account session per browser session has `is_active = true`
///   while any exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSession {
    /// Account session identifier.
    pub id: SessionId,
    /// Owning browser session.
    pub browser_session_id: SessionId,
    /// Authenticated user.
    pub user_id: UserId,
    /// Whether this account is the active one.
    pub is_active: bool,
    /// Authentication time (drives `max_age` checks and LRA eviction).
    pub authenticated_at: Timestamp,
    /// Expiry of this account session.
    pub expires_at: Timestamp,
    /// Subject category from the provider flow.
    pub subject_type: SubjectType,
    /// Opaque claims bag from the provider flow.
    pub subject_properties: Value,
    /// Refresh token bound to this account session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<TokenId>,
    /// Client the account authenticated through.
    pub client_id: ClientId,
}

impl AccountSession {
    /// Returns true when the account session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !now.is_before(self.expires_at)
    }

    /// Returns the account email from the claims bag, when present.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.subject_properties.get("email").and_then(Value::as_str)
    }
}
