// crates/signet-core/src/core/identifiers.rs
// ============================================================================
// Module: Signet Identifiers
// Description: Canonical opaque identifiers for tenants, clients, and tokens.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Signet.
//! Identifiers are opaque UTF-8 strings and serialize transparently on the
//! wire. No normalization is applied at construction; services that need a
//! normalized form (for example lower-cased tenant slugs) normalize before
//! constructing the identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Declares an opaque string identifier with the shared accessor surface.
macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

opaque_id! {
    /// Tenant identifier partitioning all issuer state.
    TenantId
}

impl TenantId {
    /// Reserved identifier for the fallback tenant supplying default branding.
    pub const DEFAULT: &'static str = "default";

    /// Returns the reserved default tenant identifier.
    #[must_use]
    pub fn default_tenant() -> Self {
        Self::new(Self::DEFAULT)
    }

    /// Returns true when this is the reserved default tenant.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.as_str() == Self::DEFAULT
    }
}

opaque_id! {
    /// OAuth client identifier, globally unique across tenants.
    ClientId
}

opaque_id! {
    /// End-user identifier scoped to a tenant.
    UserId
}

opaque_id! {
    /// Browser or account session identifier (256-bit random, URL-safe base64).
    SessionId
}

opaque_id! {
    /// Opaque refresh token identifier (the presented token value).
    TokenId
}

opaque_id! {
    /// Refresh token family identifier linking a rotation chain.
    FamilyId
}

opaque_id! {
    /// Role identifier scoped to a tenant.
    RoleId
}

opaque_id! {
    /// Permission identifier scoped to a client.
    PermissionId
}

opaque_id! {
    /// Identity provider name, unique per tenant (lowercase alnum, `-`, `_`).
    ProviderName
}

impl ProviderName {
    /// Maximum accepted provider name length.
    pub const MAX_LENGTH: usize = 64;

    /// Returns true when the name satisfies the provider naming rule.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let name = self.as_str();
        !name.is_empty()
            && name.len() <= Self::MAX_LENGTH
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }
}
