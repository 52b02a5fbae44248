// crates/signet-core/src/core/client.rs
// ============================================================================
// Module: OAuth Client Records
// Description: Registered relying-party records with hashed secrets.
// Purpose: Define client shapes and the field-level validation rules.
// Dependencies: serde, serde_json, url
// ============================================================================

//! ## Overview
//! One [`OAuthClient`] exists per relying party per tenant. Secrets are never
//! stored in plaintext; the record carries the current PBKDF2 hash and, after
//! a rotation, the previous hash with its grace expiry. Validation helpers
//! here are pure; the client registry enforces uniqueness and persistence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum client name length.
pub const MAX_CLIENT_NAME_LENGTH: usize = 100;
/// Maximum number of registered scopes.
pub const MAX_CLIENT_SCOPES: usize = 50;
/// Maximum number of registered redirect URIs.
pub const MAX_REDIRECT_URIS: usize = 10;
/// Maximum serialized metadata size in bytes.
pub const MAX_METADATA_BYTES: usize = 10 * 1024;

// ============================================================================
// SECTION: Grant Types
// ============================================================================

/// OAuth grant types a client may use.
///
/// # Invariants
/// - Variants are stable wire labels per RFC 6749.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code grant.
    AuthorizationCode,
    /// Refresh token grant.
    RefreshToken,
    /// Client credentials grant (machine-to-machine).
    ClientCredentials,
}

impl GrantType {
    /// Returns the stable wire label for this grant type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Parses a wire label into a grant type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Bounded free-form client metadata.
///
/// # Invariants
/// - Serialized size is at most [`MAX_METADATA_BYTES`]; enforced by
///   [`ClientMetadata::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMetadata(pub serde_json::Value);

impl ClientMetadata {
    /// Returns true when the serialized metadata fits the size bound.
    #[must_use]
    pub fn validate(&self) -> bool {
        serde_json::to_vec(&self.0).map(|bytes| bytes.len() <= MAX_METADATA_BYTES).unwrap_or(false)
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Registered OAuth client.
///
/// # Invariants
/// - `(tenant_id, name)` is unique; `id` is globally unique.
/// - At most one active and one grace secret hash exist at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Client identifier.
    pub id: ClientId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Client name, unique within the tenant.
    pub name: String,
    /// PBKDF2 hash of the current secret.
    pub secret_hash: String,
    /// PBKDF2 hash of the previous secret during the rotation grace window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_secret_hash: Option<String>,
    /// Expiry of the previous secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_secret_expires_at: Option<Timestamp>,
    /// Permitted grant types.
    pub grant_types: Vec<GrantType>,
    /// Registered scopes.
    pub scopes: Vec<String>,
    /// Registered redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Bounded free-form metadata.
    #[serde(default)]
    pub metadata: ClientMetadata,
    /// Whether the client may authenticate.
    pub enabled: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
    /// Last secret rotation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<Timestamp>,
}

impl OAuthClient {
    /// Returns true when the client registered the grant type.
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Returns true when `uri` matches a registered redirect URI.
    ///
    /// Matching is exact, or prefix-based when the registered entry ends with
    /// a trailing slash and the candidate shares scheme, host, and port.
    #[must_use]
    pub fn allows_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| {
            if registered == uri {
                return true;
            }
            registered.ends_with('/') && uri.starts_with(registered.as_str()) && {
                match (Url::parse(registered), Url::parse(uri)) {
                    (Ok(a), Ok(b)) => {
                        a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port() == b.port()
                    }
                    _ => false,
                }
            }
        })
    }

    /// Returns true when the client has no usable secret (public client).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.secret_hash.is_empty()
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Returns true when the client name matches `[A-Za-z0-9_\- ]{1,100}`.
#[must_use]
pub fn is_valid_client_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_CLIENT_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ')
}

/// Returns true when a scope token uses only `[A-Za-z0-9_:.\-]`.
#[must_use]
pub fn is_valid_scope(scope: &str) -> bool {
    !scope.is_empty()
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.' || c == '-')
}

/// Returns true when the redirect URI is HTTPS, or HTTP on a loopback host.
#[must_use]
pub fn is_valid_redirect_uri(uri: &str) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };
    match parsed.scheme() {
        "https" => true,
        "http" => matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")),
        _ => false,
    }
}
