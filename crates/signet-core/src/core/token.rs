// crates/signet-core/src/core/token.rs
// ============================================================================
// Module: Token Records
// Description: Authorization code grants, refresh token families, PKCE.
// Purpose: Define the persisted token state driving the authorization engine.
// Dependencies: serde, sha2, base64, subtle
// ============================================================================

//! ## Overview
//! Authorization codes are short-lived, single-use handles mapping to a
//! pending grant. Refresh tokens are opaque values chained into families so
//! the engine can revoke an entire lineage when a consumed token is replayed.
//! PKCE verification lives here because it is pure data checking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::FamilyId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TokenId;
use crate::core::subject::Subject;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: PKCE
// ============================================================================

/// PKCE challenge methods per RFC 7636.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PkceMethod {
    /// Plain-text comparison.
    #[serde(rename = "plain")]
    Plain,
    /// SHA-256 of the verifier, base64url without padding.
    S256,
}

impl PkceMethod {
    /// Parses a wire label into a PKCE method.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }
}

/// Stored PKCE challenge bound to an authorization code.
///
/// # Invariants
/// - `challenge` is compared in constant time during redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// Challenge value as received on `/authorize`.
    pub challenge: String,
    /// Challenge method.
    pub method: PkceMethod,
}

impl PkceChallenge {
    /// Returns true when `verifier` satisfies this challenge.
    #[must_use]
    pub fn verify(&self, verifier: &str) -> bool {
        let derived = match self.method {
            PkceMethod::Plain => verifier.to_string(),
            PkceMethod::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                URL_SAFE_NO_PAD.encode(digest)
            }
        };
        derived.as_bytes().ct_eq(self.challenge.as_bytes()).into()
    }
}

// ============================================================================
// SECTION: Authorization Code
// ============================================================================

/// Pending grant stored behind an opaque authorization code.
///
/// # Invariants
/// - Stored with a TTL of at most ten minutes and removed on redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    /// Issuing tenant.
    pub tenant_id: TenantId,
    /// Redeeming client.
    pub client_id: ClientId,
    /// Redirect URI the code was issued against.
    pub redirect_uri: String,
    /// Authenticated subject.
    pub subject: Subject,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// OIDC nonce, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// PKCE challenge, when supplied or required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce: Option<PkceChallenge>,
    /// Issue time.
    pub issued_at: Timestamp,
}

// ============================================================================
// SECTION: Refresh Tokens
// ============================================================================

/// Persisted refresh token state.
///
/// # Invariants
/// - `token_id` equals the opaque presented value.
/// - `consumed_at` is set at most once; presenting a consumed token revokes
///   the whole family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Opaque token value.
    pub token_id: TokenId,
    /// Family linking the rotation chain.
    pub family_id: FamilyId,
    /// Token this one replaced, when not the family root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<TokenId>,
    /// Subject the family was issued to.
    pub subject: Subject,
    /// Stable subject key used for storage addressing.
    pub subject_key: String,
    /// Issuing tenant.
    pub tenant_id: TenantId,
    /// Client the family belongs to.
    pub client_id: ClientId,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Issue time.
    pub issued_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Consumption marker set when the token is rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<Timestamp>,
}

impl RefreshTokenRecord {
    /// Returns true when the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !now.is_before(self.expires_at)
    }
}
