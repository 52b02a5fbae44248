// crates/signet-core/src/lib.rs
// ============================================================================
// Module: Signet Core
// Description: Domain model, storage contract, crypto, and runtime engines.
// Purpose: Provide the backend-agnostic core of the Signet identity issuer.
// Dependencies: serde, thiserror, sha2, aes-gcm, pbkdf2, jsonwebtoken
// ============================================================================

//! ## Overview
//! Signet Core contains everything the identity issuer needs that does not
//! touch HTTP or a concrete database: the data model (tenants, clients,
//! providers, users, sessions, roles, tokens), the key-addressed storage
//! contract with tenant scoping, the crypto primitives (secret hashing, AEAD,
//! cookie sealing, JWT signing), and the runtime engines that implement the
//! OAuth/OIDC semantics on top of those pieces.
//!
//! Security posture: all inputs crossing these APIs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod crypto;
pub mod runtime;
pub mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::audit::AuditQuery;
pub use crate::core::audit::TokenEventType;
pub use crate::core::audit::TokenUsageEvent;
pub use crate::core::client::ClientMetadata;
pub use crate::core::client::GrantType;
pub use crate::core::client::OAuthClient;
pub use crate::core::identifiers::ClientId;
pub use crate::core::identifiers::FamilyId;
pub use crate::core::identifiers::PermissionId;
pub use crate::core::identifiers::ProviderName;
pub use crate::core::identifiers::RoleId;
pub use crate::core::identifiers::SessionId;
pub use crate::core::identifiers::TenantId;
pub use crate::core::identifiers::TokenId;
pub use crate::core::identifiers::UserId;
pub use crate::core::provider::ProviderKind;
pub use crate::core::provider::ProviderRecord;
pub use crate::core::rbac::Permission;
pub use crate::core::rbac::Role;
pub use crate::core::rbac::RolePermission;
pub use crate::core::rbac::UserRole;
pub use crate::core::session::AccountSession;
pub use crate::core::session::BrowserSession;
pub use crate::core::session::Prompt;
pub use crate::core::subject::Subject;
pub use crate::core::subject::SubjectType;
pub use crate::core::tenant::Branding;
pub use crate::core::tenant::Tenant;
pub use crate::core::tenant::TenantSettings;
pub use crate::core::tenant::TenantStatus;
pub use crate::core::time::Timestamp;
pub use crate::core::token::AuthorizationCodeGrant;
pub use crate::core::token::PkceChallenge;
pub use crate::core::token::PkceMethod;
pub use crate::core::token::RefreshTokenRecord;
pub use crate::core::user::User;
pub use crate::core::user::UserIdentity;
pub use crate::core::user::UserStatus;
pub use crypto::CryptoError;
pub use crypto::aead::AeadKey;
pub use crypto::aead::EncryptedSecret;
pub use crypto::cookie::CookieCodec;
pub use crypto::cookie::CookiePayload;
pub use crypto::jwt::AccessClaims;
pub use crypto::jwt::Jwk;
pub use crypto::jwt::JwksDocument;
pub use crypto::jwt::SigningKeySet;
pub use crypto::jwt::StoredKeySet;
pub use crypto::jwt::TokenMode;
pub use runtime::audit::AuditMetrics;
pub use runtime::audit::AuditRecorder;
pub use runtime::audit::AuditStore;
pub use runtime::audit::InMemoryAuditStore;
pub use runtime::audit::MultiRegionAuditQuery;
pub use runtime::breaker::CircuitBreaker;
pub use runtime::breaker::CircuitBreakerConfig;
pub use runtime::breaker::CircuitBreakerError;
pub use runtime::breaker::CircuitState;
pub use runtime::breaker::RetryPolicy;
pub use runtime::cache::CacheConfig;
pub use runtime::cache::TtlLruCache;
pub use runtime::clients::ClientRegistry;
pub use runtime::clients::ClientRegistryError;
pub use runtime::clients::ClientUpdate;
pub use runtime::clients::CreatedClient;
pub use runtime::clients::InMemoryReplicationQueue;
pub use runtime::clients::NewClient;
pub use runtime::clients::NoopReplicationQueue;
pub use runtime::clients::ReplicationQueue;
pub use runtime::clients::SyncMessage;
pub use runtime::clients::SyncOp;
pub use runtime::rbac::RbacConfig;
pub use runtime::rbac::RbacEngine;
pub use runtime::rbac::RbacError;
pub use runtime::rbac::TokenEnrichment;
pub use runtime::sessions::AddAccount;
pub use runtime::sessions::AuthorizeSessionParams;
pub use runtime::sessions::PromptOutcome;
pub use runtime::sessions::SessionConfig;
pub use runtime::sessions::SessionEngine;
pub use runtime::sessions::SessionError;
pub use runtime::tenants::NewTenant;
pub use runtime::tenants::ResolutionRequest;
pub use runtime::tenants::ResolvedTenant;
pub use runtime::tenants::TenantError;
pub use runtime::tenants::TenantRegistry;
pub use runtime::tenants::TenantResolver;
pub use runtime::tenants::TenantUpdate;
pub use runtime::tokens::AuditContext;
pub use runtime::tokens::IntrospectionResponse;
pub use runtime::tokens::MintParams;
pub use runtime::tokens::MintedTokens;
pub use runtime::tokens::ScopeValidation;
pub use runtime::tokens::TokenConfig;
pub use runtime::tokens::TokenEngine;
pub use runtime::tokens::TokenError;
pub use runtime::tokens::subject_key;
pub use runtime::tokens::validate_scopes;
pub use runtime::users::NewUser;
pub use runtime::users::UserError;
pub use runtime::users::UserRegistry;
pub use runtime::users::UserUpdate;
pub use store::KeyPath;
pub use store::KeyValueStore;
pub use store::MemoryStore;
pub use store::StoreError;
pub use store::TenantScopedStore;
