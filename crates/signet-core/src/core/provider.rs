// crates/signet-core/src/core/provider.rs
// ============================================================================
// Module: Identity Provider Records
// Description: Per-tenant dynamic identity provider configuration.
// Purpose: Define provider records with secrets encrypted at rest.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Provider records configure how a tenant authenticates users: social OAuth,
//! enterprise OIDC, password, one-time code, or custom OAuth2. The client
//! secret is AEAD-encrypted before the record is persisted and is only
//! decrypted when a provider instance is materialized for a flow. API reads
//! expose the secret masked to its last four characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ProviderName;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::crypto::aead::EncryptedSecret;

// ============================================================================
// SECTION: Provider Kinds
// ============================================================================

/// Closed set of provider categories.
///
/// # Invariants
/// - Variants are stable wire labels; the catalog maps each to endpoint
///   defaults and validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google social login.
    Google,
    /// GitHub social login.
    Github,
    /// Microsoft social/enterprise login.
    Microsoft,
    /// Apple social login.
    Apple,
    /// Generic enterprise OIDC provider.
    Oidc,
    /// Custom OAuth2 provider with explicit endpoints.
    CustomOauth2,
    /// Local password authentication.
    Password,
    /// One-time email code authentication.
    Code,
}

impl ProviderKind {
    /// Returns the stable wire label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Microsoft => "microsoft",
            Self::Apple => "apple",
            Self::Oidc => "oidc",
            Self::CustomOauth2 => "custom_oauth2",
            Self::Password => "password",
            Self::Code => "code",
        }
    }

    /// Parses a wire label into a provider kind.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            "microsoft" => Some(Self::Microsoft),
            "apple" => Some(Self::Apple),
            "oidc" => Some(Self::Oidc),
            "custom_oauth2" => Some(Self::CustomOauth2),
            "password" => Some(Self::Password),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    /// Returns true when the kind performs an upstream OAuth2 redirect.
    #[must_use]
    pub const fn is_upstream_oauth(self) -> bool {
        matches!(
            self,
            Self::Google | Self::Github | Self::Microsoft | Self::Apple | Self::Oidc | Self::CustomOauth2
        )
    }
}

// ============================================================================
// SECTION: Provider Record
// ============================================================================

/// Dynamic identity provider configuration for a tenant.
///
/// # Invariants
/// - `(tenant_id, name)` is unique.
/// - `secret` is never exposed plaintext through the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Record identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Provider category.
    pub kind: ProviderKind,
    /// Provider name, unique per tenant.
    pub name: ProviderName,
    /// Display name shown by the UI renderer.
    pub display_name: String,
    /// Upstream client identifier (empty for local providers).
    #[serde(default)]
    pub client_id: String,
    /// AEAD-encrypted upstream client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<EncryptedSecret>,
    /// Typed per-category configuration (endpoint overrides, scopes, realm).
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Whether the provider is available for flows.
    pub enabled: bool,
    /// Sort order for login UIs.
    #[serde(default)]
    pub display_order: u32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl ProviderRecord {
    /// Returns the masked form of a plaintext secret (last four characters).
    #[must_use]
    pub fn mask_secret(plaintext: &str) -> String {
        let visible = plaintext
            .char_indices()
            .rev()
            .nth(3)
            .map_or(plaintext, |(idx, _)| &plaintext[idx..]);
        format!("****{visible}")
    }
}
