// crates/signet-core/src/core/tenant.rs
// ============================================================================
// Module: Tenant Records
// Description: Tenant, branding, and settings records.
// Purpose: Define the organizational boundary partitioning all issuer state.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A tenant is the organizational boundary for every other record: clients,
//! providers, users, sessions, and roles are all stored under a tenant
//! prefix. The reserved tenant id `default` supplies fallback branding when a
//! tenant has none of its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ProviderName;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a tenant.
///
/// # Invariants
/// - `Deleted` is terminal; transitions are gated by the tenant registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Tenant is active and serves traffic.
    Active,
    /// Tenant is administratively suspended; requests fail closed.
    Suspended,
    /// Tenant is provisioned but not yet activated.
    Pending,
    /// Tenant is soft-deleted.
    Deleted,
}

impl TenantStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Pending => "pending",
            Self::Deleted => "deleted",
        }
    }

    /// Returns true when a transition from `self` to `next` is permitted.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Deleted, _) => false,
            (Self::Pending, Self::Active | Self::Deleted)
            | (Self::Active, Self::Suspended | Self::Deleted)
            | (Self::Suspended, Self::Active | Self::Deleted) => true,
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Branding
// ============================================================================

/// Logo references keyed by color mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingLogos {
    /// Logo URL for light backgrounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<String>,
    /// Logo URL for dark backgrounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark: Option<String>,
}

/// Tenant branding consumed by the external UI renderer.
///
/// # Invariants
/// - All fields are optional; absent values fall back to the default tenant
///   and then to the built-in theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    /// Primary theme color (CSS color value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    /// Background color (CSS color value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Logos by color mode.
    #[serde(default)]
    pub logos: BrandingLogos,
    /// Font family stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Custom CSS appended after the theme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
    /// Email template references keyed by template name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub email_templates: BTreeMap<String, String>,
}

impl Branding {
    /// Returns a branding with every field of `self`, falling back to `base`.
    #[must_use]
    pub fn merged_over(&self, base: &Self) -> Self {
        Self {
            primary_color: self.primary_color.clone().or_else(|| base.primary_color.clone()),
            background_color: self
                .background_color
                .clone()
                .or_else(|| base.background_color.clone()),
            logos: BrandingLogos {
                light: self.logos.light.clone().or_else(|| base.logos.light.clone()),
                dark: self.logos.dark.clone().or_else(|| base.logos.dark.clone()),
            },
            font_family: self.font_family.clone().or_else(|| base.font_family.clone()),
            custom_css: self.custom_css.clone().or_else(|| base.custom_css.clone()),
            email_templates: if self.email_templates.is_empty() {
                base.email_templates.clone()
            } else {
                self.email_templates.clone()
            },
        }
    }

    /// Returns the built-in theme used when no tenant branding applies.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            primary_color: Some("#1f2a44".to_string()),
            background_color: Some("#ffffff".to_string()),
            logos: BrandingLogos::default(),
            font_family: Some("system-ui, sans-serif".to_string()),
            custom_css: None,
            email_templates: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Per-tenant issuer settings.
///
/// # Invariants
/// - `max_accounts_per_session` >= 1.
/// - `session_lifetime_secs` > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Maximum concurrent account sessions per browser session.
    #[serde(default = "default_max_accounts")]
    pub max_accounts_per_session: usize,
    /// Browser session lifetime in seconds.
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,
    /// Whether unauthenticated users may self-register.
    #[serde(default)]
    pub allow_public_registration: bool,
    /// Whether email verification is required before first login.
    #[serde(default)]
    pub require_email_verification: bool,
    /// Provider names permitted for this tenant (empty means all enabled providers).
    #[serde(default)]
    pub allowed_providers: Vec<ProviderName>,
    /// Whether multi-factor authentication is required.
    #[serde(default)]
    pub mfa_required: bool,
}

/// Default account cap per browser session.
const fn default_max_accounts() -> usize {
    3
}

/// Default browser session lifetime (7 days).
const fn default_session_lifetime() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            max_accounts_per_session: default_max_accounts(),
            session_lifetime_secs: default_session_lifetime(),
            allow_public_registration: false,
            require_email_verification: false,
            allowed_providers: Vec::new(),
            mfa_required: false,
        }
    }
}

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// Tenant record.
///
/// # Invariants
/// - `id` is stable and opaque; `domain` is unique across tenants when set.
/// - `deleted_at` is set exactly when `status` is [`TenantStatus::Deleted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Optional custom domain served by this tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Human-readable tenant name.
    pub name: String,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Branding overrides for the UI renderer.
    #[serde(default)]
    pub branding: Branding,
    /// Issuer settings.
    #[serde(default)]
    pub settings: TenantSettings,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}
