// crates/signet-providers/src/lib.rs
// ============================================================================
// Module: Signet Providers
// Description: Identity provider variants, catalog, and dynamic registry.
// Purpose: Authenticate end users via upstream OAuth, password, or code flows.
// Dependencies: signet-core, reqwest, serde, url
// ============================================================================

//! ## Overview
//! Providers are how a tenant's users prove who they are. Upstream OAuth2 and
//! OIDC providers redirect to a remote authorization server and exchange the
//! returned code; the password and one-time-code providers authenticate
//! locally against tenant-scoped storage. The catalog supplies per-type
//! endpoint defaults, and the dynamic registry persists tenant provider
//! configuration with AEAD-encrypted secrets behind a TTL/LRU cache.
//!
//! Security posture: provider callbacks and stored configuration are
//! untrusted; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod code;
pub mod oauth2;
pub mod password;
pub mod registry;

#[cfg(test)]
mod tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use signet_core::CryptoError;
use signet_core::store::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use catalog::InterpolationVars;
pub use catalog::ProviderDescriptor;
pub use catalog::catalog;
pub use catalog::descriptor_for;
pub use code::CodeProvider;
pub use oauth2::UpstreamOAuthProvider;
pub use oauth2::UpstreamTokens;
pub use password::MinimumLengthPolicy;
pub use password::PasswordPolicy;
pub use password::PasswordProvider;
pub use registry::DynamicProviderRegistry;
pub use registry::NewProvider;
pub use registry::ProviderUpdate;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider subsystem errors.
///
/// # Invariants
/// - Variants map 1:1 to the stable domain error codes.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider exists for the tenant and name.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
    /// A provider with the name already exists for the tenant.
    #[error("provider exists: {0}")]
    ProviderExists(String),
    /// Input failed validation.
    #[error("invalid provider input: {0}")]
    InvalidInput(String),
    /// Login attempt failed (wrong password, wrong or spent code).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Upstream provider call failed.
    #[error("upstream provider error: {0}")]
    Upstream(String),
    /// Secret encryption or decryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
