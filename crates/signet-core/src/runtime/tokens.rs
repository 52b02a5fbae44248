// crates/signet-core/src/runtime/tokens.rs
// ============================================================================
// Module: Token Engine
// Description: Code issuance/redemption, token minting, refresh families.
// Purpose: Implement the grant semantics behind `/authorize` and `/token`.
// Dependencies: crate::core, crate::crypto, crate::store, crate::runtime::audit
// ============================================================================

//! ## Overview
//! Authorization codes are 256-bit single-use handles with a short TTL whose
//! redemption is an atomic take. Refresh tokens rotate within a family:
//! consuming a token mints a successor pointing back at it, and presenting an
//! already-consumed token revokes the entire family and emits a `reused`
//! audit event before the caller sees `invalid_grant`. Scope validation
//! intersects requested and allowed scopes and fails the whole request when
//! any requested scope is denied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::audit::TokenEventType;
use crate::core::audit::TokenUsageEvent;
use crate::core::client::OAuthClient;
use crate::core::identifiers::FamilyId;
use crate::core::identifiers::TokenId;
use crate::core::subject::Subject;
use crate::core::time::Timestamp;
use crate::core::time::now_unix_millis;
use crate::core::token::AuthorizationCodeGrant;
use crate::core::token::RefreshTokenRecord;
use crate::crypto::CryptoError;
use crate::crypto::jwt::AccessClaims;
use crate::crypto::jwt::SigningKeySet;
use crate::crypto::jwt::TokenMode;
use crate::crypto::secrets;
use crate::runtime::audit::AuditRecorder;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;
use crate::store::TenantScopedStore;
use crate::store::read_json;
use crate::store::take_json;
use crate::store::write_json;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Token engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,
    /// Authorization code lifetime in seconds (at most ten minutes).
    pub code_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 3600,
            refresh_ttl_secs: 30 * 24 * 60 * 60,
            code_ttl_secs: 600,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token engine errors.
///
/// # Invariants
/// - `InvalidGrant` covers unknown, expired, replayed, and mismatched codes
///   and refresh tokens, matching RFC 6749 error mapping.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Code or refresh token is unknown, expired, consumed, or mismatched.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),
    /// One or more requested scopes were denied.
    #[error("invalid scope: denied {denied:?}")]
    InvalidScope {
        /// Scopes granted before the failure was detected.
        granted: Vec<String>,
        /// Requested scopes outside the allowed set.
        denied: Vec<String>,
    },
    /// PKCE verification failed or a required verifier is missing.
    #[error("pkce verification failed: {0}")]
    PkceFailed(String),
    /// Crypto failure during minting or verification.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Scope Validation
// ============================================================================

/// Result of validating requested scopes against an allowed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeValidation {
    /// True when every requested scope is allowed.
    pub valid: bool,
    /// Requested scopes that are allowed (all allowed scopes when none were
    /// requested).
    pub granted: Vec<String>,
    /// Requested scopes outside the allowed set.
    pub denied: Vec<String>,
}

/// Validates a whitespace-separated scope request against allowed scopes.
///
/// An empty request grants every allowed scope.
#[must_use]
pub fn validate_scopes(requested: &str, allowed: &[String]) -> ScopeValidation {
    let tokens: Vec<&str> = requested.split_whitespace().collect();
    if tokens.is_empty() {
        return ScopeValidation {
            valid: true,
            granted: allowed.to_vec(),
            denied: Vec::new(),
        };
    }
    let mut granted = Vec::new();
    let mut denied = Vec::new();
    for token in tokens {
        if allowed.iter().any(|scope| scope == token) {
            if !granted.iter().any(|existing: &String| existing == token) {
                granted.push(token.to_string());
            }
        } else if !denied.iter().any(|existing: &String| existing == token) {
            denied.push(token.to_string());
        }
    }
    ScopeValidation {
        valid: denied.is_empty(),
        granted,
        denied,
    }
}

// ============================================================================
// SECTION: Minting Shapes
// ============================================================================

/// Inputs for minting an access (and optionally refresh) token.
#[derive(Debug, Clone)]
pub struct MintParams {
    /// Issuer URL for the `iss` claim.
    pub issuer: String,
    /// Client receiving the tokens.
    pub client_id: String,
    /// Authenticated subject.
    pub subject: Subject,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Issuance mode.
    pub mode: TokenMode,
    /// Role names for claim embedding.
    pub roles: Option<Vec<String>>,
    /// Permission names for claim embedding.
    pub permissions: Option<Vec<String>>,
    /// Whether a refresh token is minted alongside the access token.
    pub with_refresh: bool,
}

/// Minted token pair.
#[derive(Debug, Clone)]
pub struct MintedTokens {
    /// Signed access token.
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Opaque refresh token, when minted.
    pub refresh_token: Option<TokenId>,
    /// Space-separated granted scopes, when any.
    pub scope: Option<String>,
}

/// RFC 7662 introspection response shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is active at this issuer.
    pub active: bool,
    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable subject name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Token type label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry in unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time in unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issuer URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Caller context recorded into audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    /// Caller IP, when known.
    pub ip_address: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Token engine operating on tenant-scoped storage handles.
///
/// # Invariants
/// - Codes redeem at most once (atomic take).
/// - Refresh consumption is atomic; double-spend triggers family revocation
///   before the error response.
pub struct TokenEngine {
    /// Signing key set (newest signs, all verify).
    keys: Arc<SigningKeySet>,
    /// Engine tuning.
    config: TokenConfig,
}

impl TokenEngine {
    /// Creates an engine over the process signing keys.
    #[must_use]
    pub fn new(keys: Arc<SigningKeySet>, config: TokenConfig) -> Self {
        Self { keys, config }
    }

    /// Returns the engine tuning.
    #[must_use]
    pub const fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Returns the signing key set.
    #[must_use]
    pub fn keys(&self) -> &Arc<SigningKeySet> {
        &self.keys
    }

    /// Returns the storage key for an authorization code.
    fn code_key(code: &str) -> KeyPath {
        KeyPath::from_segments(&["codes", code])
    }

    /// Returns the storage key for a refresh token record.
    fn refresh_key(token_id: &TokenId) -> KeyPath {
        KeyPath::from_segments(&["refresh", "tokens", token_id.as_str()])
    }

    /// Returns the storage key for a family index marker.
    fn family_key(family_id: &FamilyId, token_id: &TokenId) -> KeyPath {
        KeyPath::from_segments(&["refresh", "families", family_id.as_str(), token_id.as_str()])
    }

    // ------------------------------------------------------------------
    // Authorization codes
    // ------------------------------------------------------------------

    /// Mints and stores a single-use authorization code.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Store`] when persistence fails.
    pub fn issue_code(
        &self,
        store: &TenantScopedStore,
        grant: &AuthorizationCodeGrant,
    ) -> Result<String, TokenError> {
        let code = secrets::generate_secret();
        write_json(store, &Self::code_key(&code), grant, Some(self.config.code_ttl_secs))?;
        Ok(code)
    }

    /// Redeems a code atomically, verifying client, redirect, and PKCE binding.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidGrant`] for unknown or replayed codes and
    /// binding mismatches, [`TokenError::PkceFailed`] for verifier failures.
    pub fn redeem_code(
        &self,
        store: &TenantScopedStore,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<AuthorizationCodeGrant, TokenError> {
        let grant: AuthorizationCodeGrant = take_json(store, &Self::code_key(code))?
            .ok_or_else(|| TokenError::InvalidGrant("unknown or already redeemed code".to_string()))?;
        if grant.client_id.as_str() != client_id {
            return Err(TokenError::InvalidGrant("code issued to another client".to_string()));
        }
        if grant.redirect_uri != redirect_uri {
            return Err(TokenError::InvalidGrant("redirect_uri mismatch".to_string()));
        }
        if let Some(challenge) = &grant.pkce {
            let Some(verifier) = pkce_verifier else {
                return Err(TokenError::PkceFailed("code_verifier is required".to_string()));
            };
            if !challenge.verify(verifier) {
                return Err(TokenError::PkceFailed("code_verifier mismatch".to_string()));
            }
        }
        Ok(grant)
    }

    // ------------------------------------------------------------------
    // Minting
    // ------------------------------------------------------------------

    /// Mints an access token and optionally a family-root refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Crypto`] when signing fails.
    pub fn mint(
        &self,
        store: &TenantScopedStore,
        audit: &AuditRecorder,
        params: MintParams,
        ctx: &AuditContext,
    ) -> Result<MintedTokens, TokenError> {
        let now = Timestamp::now();
        let subject_key = subject_key(&params.subject);
        let claims = self.build_claims(store, &params, &subject_key, now);
        let access_token = self.keys.sign(&claims)?;
        let refresh_token = if params.with_refresh {
            let token_id = TokenId::new(secrets::generate_secret());
            let family_id = FamilyId::new(secrets::generate_id("fam"));
            let record = RefreshTokenRecord {
                token_id: token_id.clone(),
                family_id: family_id.clone(),
                previous_id: None,
                subject: params.subject.clone(),
                subject_key: subject_key.clone(),
                tenant_id: store.tenant_id().clone(),
                client_id: crate::core::identifiers::ClientId::new(params.client_id.clone()),
                scopes: params.scopes.clone(),
                issued_at: now,
                expires_at: now.plus_secs(self.config.refresh_ttl_secs),
                consumed_at: None,
            };
            self.store_refresh(store, &record)?;
            audit.record(TokenUsageEvent {
                token_id: token_id.clone(),
                subject: subject_key,
                event_type: TokenEventType::Generated,
                client_id: Some(record.client_id),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                timestamp_ms: now_unix_millis(),
                metadata: None,
                region: None,
            });
            Some(token_id)
        } else {
            None
        };
        Ok(MintedTokens {
            access_token,
            expires_in: self.config.access_ttl_secs,
            refresh_token,
            scope: if params.scopes.is_empty() { None } else { Some(params.scopes.join(" ")) },
        })
    }

    /// Consumes a refresh token and mints its successor pair.
    ///
    /// Presenting an already-consumed token revokes the entire family and
    /// emits a `reused` audit event before the `invalid_grant` error.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidGrant`] for unknown, expired, replayed,
    /// or mismatched tokens.
    #[expect(clippy::too_many_arguments, reason = "Every part of the rotation is required.")]
    pub fn refresh(
        &self,
        store: &TenantScopedStore,
        audit: &AuditRecorder,
        presented: &TokenId,
        client: &OAuthClient,
        issuer: &str,
        roles: Option<Vec<String>>,
        permissions: Option<Vec<String>>,
        ctx: &AuditContext,
    ) -> Result<MintedTokens, TokenError> {
        let now = Timestamp::now();
        let record: RefreshTokenRecord = read_json(store, &Self::refresh_key(presented))?
            .ok_or_else(|| TokenError::InvalidGrant("unknown refresh token".to_string()))?;
        if record.client_id != client.id {
            return Err(TokenError::InvalidGrant("token issued to another client".to_string()));
        }
        if record.is_expired(now) {
            return Err(TokenError::InvalidGrant("refresh token expired".to_string()));
        }
        if record.consumed_at.is_some() {
            self.revoke_family(store, &record.family_id)?;
            audit.record(TokenUsageEvent {
                token_id: presented.clone(),
                subject: record.subject_key.clone(),
                event_type: TokenEventType::Reused,
                client_id: Some(record.client_id),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                timestamp_ms: now_unix_millis(),
                metadata: None,
                region: None,
            });
            return Err(TokenError::InvalidGrant("refresh token reuse detected".to_string()));
        }
        // Atomic consumption: exactly one concurrent caller wins the take.
        let taken: Option<RefreshTokenRecord> =
            take_json(store, &Self::refresh_key(presented))?;
        let Some(mut consumed) = taken else {
            return Err(TokenError::InvalidGrant("refresh token already consumed".to_string()));
        };
        consumed.consumed_at = Some(now);
        self.store_refresh(store, &consumed)?;

        let successor_id = TokenId::new(secrets::generate_secret());
        let successor = RefreshTokenRecord {
            token_id: successor_id.clone(),
            family_id: consumed.family_id.clone(),
            previous_id: Some(presented.clone()),
            subject: consumed.subject.clone(),
            subject_key: consumed.subject_key.clone(),
            tenant_id: consumed.tenant_id.clone(),
            client_id: consumed.client_id.clone(),
            scopes: consumed.scopes.clone(),
            issued_at: now,
            expires_at: now.plus_secs(self.config.refresh_ttl_secs),
            consumed_at: None,
        };
        self.store_refresh(store, &successor)?;

        let params = MintParams {
            issuer: issuer.to_string(),
            client_id: client.id.as_str().to_string(),
            subject: consumed.subject.clone(),
            scopes: consumed.scopes.clone(),
            mode: TokenMode::User,
            roles,
            permissions,
            with_refresh: false,
        };
        let claims =
            self.build_claims(store, &params, &consumed.subject_key, now);
        let access_token = self.keys.sign(&claims)?;
        audit.record(TokenUsageEvent {
            token_id: successor_id.clone(),
            subject: consumed.subject_key,
            event_type: TokenEventType::Refreshed,
            client_id: Some(consumed.client_id),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            timestamp_ms: now_unix_millis(),
            metadata: None,
            region: None,
        });
        Ok(MintedTokens {
            access_token,
            expires_in: self.config.access_ttl_secs,
            refresh_token: Some(successor_id),
            scope: if consumed.scopes.is_empty() { None } else { Some(consumed.scopes.join(" ")) },
        })
    }

    /// Revokes a refresh token and its entire family.
    ///
    /// Unknown tokens succeed silently per RFC 7009.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Store`] when storage fails.
    pub fn revoke(
        &self,
        store: &TenantScopedStore,
        audit: &AuditRecorder,
        presented: &TokenId,
        ctx: &AuditContext,
    ) -> Result<(), TokenError> {
        let Some(record): Option<RefreshTokenRecord> =
            read_json(store, &Self::refresh_key(presented))?
        else {
            return Ok(());
        };
        self.revoke_family(store, &record.family_id)?;
        audit.record(TokenUsageEvent {
            token_id: presented.clone(),
            subject: record.subject_key,
            event_type: TokenEventType::Revoked,
            client_id: Some(record.client_id),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            timestamp_ms: now_unix_millis(),
            metadata: None,
            region: None,
        });
        Ok(())
    }

    /// Introspects a token string per RFC 7662.
    ///
    /// JWT access tokens verify against the key set; other values are treated
    /// as refresh tokens. Unknown, revoked, expired, and foreign tokens all
    /// yield `active: false`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Store`] when storage fails.
    pub fn introspect(
        &self,
        store: &TenantScopedStore,
        token: &str,
        issuer: &str,
    ) -> Result<IntrospectionResponse, TokenError> {
        if token.split('.').count() == 3 {
            return Ok(match self.keys.verify(token, issuer, None) {
                Ok(claims) => IntrospectionResponse {
                    active: true,
                    scope: claims.scope,
                    client_id: Some(claims.client_id),
                    username: None,
                    token_type: Some("access_token".to_string()),
                    exp: Some(claims.exp),
                    iat: Some(claims.iat),
                    sub: Some(claims.sub),
                    aud: Some(claims.aud),
                    iss: Some(claims.iss),
                    jti: Some(claims.jti),
                },
                Err(_) => IntrospectionResponse::default(),
            });
        }
        let token_id = TokenId::new(token);
        let record: Option<RefreshTokenRecord> = read_json(store, &Self::refresh_key(&token_id))?;
        Ok(match record {
            Some(record)
                if record.consumed_at.is_none() && !record.is_expired(Timestamp::now()) =>
            {
                IntrospectionResponse {
                    active: true,
                    scope: if record.scopes.is_empty() {
                        None
                    } else {
                        Some(record.scopes.join(" "))
                    },
                    client_id: Some(record.client_id.into_inner()),
                    username: None,
                    token_type: Some("refresh_token".to_string()),
                    exp: Some(record.expires_at.as_unix()),
                    iat: Some(record.issued_at.as_unix()),
                    sub: Some(record.subject_key),
                    aud: None,
                    iss: Some(issuer.to_string()),
                    jti: Some(record.token_id.into_inner()),
                }
            }
            _ => IntrospectionResponse::default(),
        })
    }

    /// Returns the family history for a refresh token, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Store`] when storage fails.
    pub fn family_records(
        &self,
        store: &TenantScopedStore,
        family_id: &FamilyId,
    ) -> Result<Vec<RefreshTokenRecord>, TokenError> {
        let prefix = KeyPath::from_segments(&["refresh", "families", family_id.as_str()]);
        let mut records = Vec::new();
        for (key, _) in store.scan(&prefix)? {
            let Some(token) = key.segments().last() else {
                continue;
            };
            let token_id = TokenId::new(token.clone());
            if let Some(record) =
                read_json::<RefreshTokenRecord>(store, &Self::refresh_key(&token_id))?
            {
                records.push(record);
            }
        }
        records.sort_by_key(|record| record.issued_at);
        Ok(records)
    }

    /// Persists a refresh record and its family index marker.
    fn store_refresh(
        &self,
        store: &TenantScopedStore,
        record: &RefreshTokenRecord,
    ) -> Result<(), TokenError> {
        let ttl = record.expires_at.seconds_since(Timestamp::now()).max(1);
        write_json(store, &Self::refresh_key(&record.token_id), record, Some(ttl))?;
        write_json(
            store,
            &Self::family_key(&record.family_id, &record.token_id),
            &true,
            Some(ttl),
        )?;
        Ok(())
    }

    /// Removes every token of a family.
    fn revoke_family(
        &self,
        store: &TenantScopedStore,
        family_id: &FamilyId,
    ) -> Result<(), TokenError> {
        let prefix = KeyPath::from_segments(&["refresh", "families", family_id.as_str()]);
        for (key, _) in store.scan(&prefix)? {
            if let Some(token) = key.segments().last() {
                let token_id = TokenId::new(token.clone());
                store.remove(&Self::refresh_key(&token_id))?;
            }
            store.remove(&key)?;
        }
        Ok(())
    }

    /// Builds access token claims from minting parameters.
    fn build_claims(
        &self,
        store: &TenantScopedStore,
        params: &MintParams,
        subject_key: &str,
        now: Timestamp,
    ) -> AccessClaims {
        AccessClaims {
            iss: params.issuer.clone(),
            sub: subject_key.to_string(),
            aud: params.client_id.clone(),
            iat: now.as_unix(),
            exp: now.plus_secs(self.config.access_ttl_secs).as_unix(),
            jti: secrets::generate_id("jti"),
            subject_type: params.subject.subject_type.as_str().to_string(),
            properties: params.subject.properties.clone(),
            mode: params.mode,
            tenant_id: store.tenant_id().as_str().to_string(),
            client_id: params.client_id.clone(),
            scope: if params.scopes.is_empty() { None } else { Some(params.scopes.join(" ")) },
            roles: params.roles.clone(),
            permissions: params.permissions.clone(),
        }
    }
}

/// Returns the stable storage key for a subject (its `id`, or a placeholder).
#[must_use]
pub fn subject_key(subject: &Subject) -> String {
    subject.id().map_or_else(|| "anonymous".to_string(), ToString::to_string)
}
