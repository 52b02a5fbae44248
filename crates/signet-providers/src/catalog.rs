// crates/signet-providers/src/catalog.rs
// ============================================================================
// Module: Provider Catalog
// Description: Per-type endpoint defaults, scopes, and requirements.
// Purpose: Supply validation data and endpoint templates for provider kinds.
// Dependencies: signet-core
// ============================================================================

//! ## Overview
//! The catalog is configured data, not logic: for every provider kind it
//! lists the default authorization/token/userinfo/JWKS endpoints, the default
//! scopes, and whether PKCE and a client secret are required. Endpoint
//! templates may carry `{tenant}`, `{region}`, `{domain}`, `{baseUrl}`, and
//! `{realm}` placeholders interpolated from tenant configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use signet_core::ProviderKind;

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Static metadata describing one provider kind.
///
/// # Invariants
/// - Endpoint templates are `None` for local (non-upstream) kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    /// Provider kind.
    pub kind: ProviderKind,
    /// Human-readable label for admin UIs.
    pub label: &'static str,
    /// Authorization endpoint template.
    pub authorization_endpoint: Option<&'static str>,
    /// Token endpoint template.
    pub token_endpoint: Option<&'static str>,
    /// Userinfo endpoint template.
    pub userinfo_endpoint: Option<&'static str>,
    /// JWKS endpoint template.
    pub jwks_endpoint: Option<&'static str>,
    /// Default scopes requested from the upstream provider.
    pub default_scopes: &'static [&'static str],
    /// Whether PKCE is mandatory for this kind.
    pub pkce_required: bool,
    /// Whether a client secret must be configured.
    pub secret_required: bool,
}

/// Returns the full provider type catalog.
#[must_use]
pub const fn catalog() -> &'static [ProviderDescriptor] {
    CATALOG
}

/// Returns the descriptor for one provider kind.
#[must_use]
pub fn descriptor_for(kind: ProviderKind) -> &'static ProviderDescriptor {
    CATALOG
        .iter()
        .find(|descriptor| descriptor.kind == kind)
        .unwrap_or(&FALLBACK_DESCRIPTOR)
}

/// Catalog entries, one per provider kind.
const CATALOG: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        kind: ProviderKind::Google,
        label: "Google",
        authorization_endpoint: Some("https://accounts.google.com/o/oauth2/v2/auth"),
        token_endpoint: Some("https://oauth2.googleapis.com/token"),
        userinfo_endpoint: Some("https://openidconnect.googleapis.com/v1/userinfo"),
        jwks_endpoint: Some("https://www.googleapis.com/oauth2/v3/certs"),
        default_scopes: &["openid", "email", "profile"],
        pkce_required: true,
        secret_required: true,
    },
    ProviderDescriptor {
        kind: ProviderKind::Github,
        label: "GitHub",
        authorization_endpoint: Some("https://github.com/login/oauth/authorize"),
        token_endpoint: Some("https://github.com/login/oauth/access_token"),
        userinfo_endpoint: Some("https://api.github.com/user"),
        jwks_endpoint: None,
        default_scopes: &["read:user", "user:email"],
        pkce_required: false,
        secret_required: true,
    },
    ProviderDescriptor {
        kind: ProviderKind::Microsoft,
        label: "Microsoft",
        authorization_endpoint: Some(
            "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize",
        ),
        token_endpoint: Some("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token"),
        userinfo_endpoint: Some("https://graph.microsoft.com/oidc/userinfo"),
        jwks_endpoint: Some("https://login.microsoftonline.com/{tenant}/discovery/v2.0/keys"),
        default_scopes: &["openid", "email", "profile"],
        pkce_required: true,
        secret_required: true,
    },
    ProviderDescriptor {
        kind: ProviderKind::Apple,
        label: "Apple",
        authorization_endpoint: Some("https://appleid.apple.com/auth/authorize"),
        token_endpoint: Some("https://appleid.apple.com/auth/token"),
        userinfo_endpoint: None,
        jwks_endpoint: Some("https://appleid.apple.com/auth/keys"),
        default_scopes: &["name", "email"],
        pkce_required: true,
        secret_required: true,
    },
    ProviderDescriptor {
        kind: ProviderKind::Oidc,
        label: "Enterprise OIDC",
        authorization_endpoint: Some("{baseUrl}/realms/{realm}/protocol/openid-connect/auth"),
        token_endpoint: Some("{baseUrl}/realms/{realm}/protocol/openid-connect/token"),
        userinfo_endpoint: Some("{baseUrl}/realms/{realm}/protocol/openid-connect/userinfo"),
        jwks_endpoint: Some("{baseUrl}/realms/{realm}/protocol/openid-connect/certs"),
        default_scopes: &["openid", "email", "profile"],
        pkce_required: true,
        secret_required: true,
    },
    ProviderDescriptor {
        kind: ProviderKind::CustomOauth2,
        label: "Custom OAuth2",
        authorization_endpoint: Some("{baseUrl}/authorize"),
        token_endpoint: Some("{baseUrl}/token"),
        userinfo_endpoint: Some("{baseUrl}/userinfo"),
        jwks_endpoint: None,
        default_scopes: &[],
        pkce_required: false,
        secret_required: false,
    },
    ProviderDescriptor {
        kind: ProviderKind::Password,
        label: "Password",
        authorization_endpoint: None,
        token_endpoint: None,
        userinfo_endpoint: None,
        jwks_endpoint: None,
        default_scopes: &[],
        pkce_required: false,
        secret_required: false,
    },
    ProviderDescriptor {
        kind: ProviderKind::Code,
        label: "One-Time Code",
        authorization_endpoint: None,
        token_endpoint: None,
        userinfo_endpoint: None,
        jwks_endpoint: None,
        default_scopes: &[],
        pkce_required: false,
        secret_required: false,
    },
];

/// Descriptor used when a kind is somehow missing from the catalog.
const FALLBACK_DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::CustomOauth2,
    label: "Unknown",
    authorization_endpoint: None,
    token_endpoint: None,
    userinfo_endpoint: None,
    jwks_endpoint: None,
    default_scopes: &[],
    pkce_required: true,
    secret_required: false,
};

// ============================================================================
// SECTION: Interpolation
// ============================================================================

/// Values substituted into endpoint templates.
#[derive(Debug, Clone, Default)]
pub struct InterpolationVars {
    /// Upstream tenant identifier (`{tenant}`).
    pub tenant: Option<String>,
    /// Upstream region (`{region}`).
    pub region: Option<String>,
    /// Upstream domain (`{domain}`).
    pub domain: Option<String>,
    /// Upstream base URL (`{baseUrl}`).
    pub base_url: Option<String>,
    /// Upstream realm (`{realm}`).
    pub realm: Option<String>,
}

impl InterpolationVars {
    /// Substitutes every known placeholder in `template`.
    #[must_use]
    pub fn apply(&self, template: &str) -> String {
        let mut out = template.to_string();
        let pairs = [
            ("{tenant}", self.tenant.as_deref()),
            ("{region}", self.region.as_deref()),
            ("{domain}", self.domain.as_deref()),
            ("{baseUrl}", self.base_url.as_deref()),
            ("{realm}", self.realm.as_deref()),
        ];
        for (placeholder, value) in pairs {
            if let Some(value) = value {
                out = out.replace(placeholder, value);
            }
        }
        out
    }
}
