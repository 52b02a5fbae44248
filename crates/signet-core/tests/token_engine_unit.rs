// crates/signet-core/tests/token_engine_unit.rs
// ============================================================================
// Module: Token Engine Unit Tests
// Description: Code single-use, refresh families, scope validation tests.
// Purpose: Validate grant semantics including reuse detection and PKCE.
// ============================================================================

//! Unit tests for the token engine: code single-use redemption, refresh
//! rotation with family-wide reuse revocation, scope validation, PKCE
//! verification, and introspection of live and dead tokens.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use signet_core::AuditContext;
use signet_core::AuditQuery;
use signet_core::AuditRecorder;
use signet_core::AuditStore;
use signet_core::AuthorizationCodeGrant;
use signet_core::ClientId;
use signet_core::ClientMetadata;
use signet_core::GrantType;
use signet_core::InMemoryAuditStore;
use signet_core::MemoryStore;
use signet_core::MintParams;
use signet_core::OAuthClient;
use signet_core::PkceChallenge;
use signet_core::PkceMethod;
use signet_core::SigningKeySet;
use signet_core::Subject;
use signet_core::TenantId;
use signet_core::TenantScopedStore;
use signet_core::Timestamp;
use signet_core::TokenConfig;
use signet_core::TokenEngine;
use signet_core::TokenError;
use signet_core::TokenEventType;
use signet_core::TokenMode;
use signet_core::validate_scopes;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const ISSUER: &str = "http://localhost:9876";

fn scoped_store() -> TenantScopedStore {
    TenantScopedStore::new(Arc::new(MemoryStore::new()), TenantId::new("acme"))
}

fn engine() -> TokenEngine {
    let keys = Arc::new(SigningKeySet::generate().unwrap());
    TokenEngine::new(keys, TokenConfig::default())
}

fn recorder() -> (AuditRecorder, Arc<InMemoryAuditStore>) {
    let store = Arc::new(InMemoryAuditStore::new());
    (AuditRecorder::new(Arc::clone(&store) as Arc<dyn signet_core::AuditStore>), store)
}

fn subject() -> Subject {
    Subject::user(json!({ "id": "usr_1", "email": "alice@example.com" }))
}

fn code_grant(pkce: Option<PkceChallenge>) -> AuthorizationCodeGrant {
    AuthorizationCodeGrant {
        tenant_id: TenantId::new("acme"),
        client_id: ClientId::new("test-client"),
        redirect_uri: "http://localhost:3000/callback".to_string(),
        subject: subject(),
        scopes: vec!["read".to_string()],
        nonce: None,
        pkce,
        issued_at: Timestamp::now(),
    }
}

fn client() -> OAuthClient {
    let now = Timestamp::now();
    OAuthClient {
        id: ClientId::new("test-client"),
        tenant_id: TenantId::new("acme"),
        name: "Test Client".to_string(),
        secret_hash: String::new(),
        previous_secret_hash: None,
        previous_secret_expires_at: None,
        grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        scopes: vec!["read".to_string()],
        redirect_uris: vec!["http://localhost:3000/callback".to_string()],
        metadata: ClientMetadata::default(),
        enabled: true,
        created_at: now,
        updated_at: now,
        rotated_at: None,
    }
}

fn mint_params(with_refresh: bool) -> MintParams {
    MintParams {
        issuer: ISSUER.to_string(),
        client_id: "test-client".to_string(),
        subject: subject(),
        scopes: vec!["read".to_string()],
        mode: TokenMode::User,
        roles: None,
        permissions: None,
        with_refresh,
    }
}

// ============================================================================
// SECTION: Scope Validation
// ============================================================================

/// Fully allowed requests grant exactly the requested scopes.
#[test]
fn scopes_all_allowed() {
    let allowed = vec!["read".to_string(), "write".to_string(), "delete".to_string()];
    let result = validate_scopes("read write", &allowed);
    assert!(result.valid);
    assert_eq!(result.granted, vec!["read", "write"]);
    assert!(result.denied.is_empty());
}

/// Any denied scope invalidates the whole request and lists the denials.
#[test]
fn scopes_partial_denial() {
    let allowed = vec!["read".to_string()];
    let result = validate_scopes("admin read", &allowed);
    assert!(!result.valid);
    assert_eq!(result.granted, vec!["read"]);
    assert_eq!(result.denied, vec!["admin"]);
}

/// An empty request grants every allowed scope.
#[test]
fn scopes_empty_request_grants_all() {
    let allowed = vec!["read".to_string(), "write".to_string()];
    let result = validate_scopes("  ", &allowed);
    assert!(result.valid);
    assert_eq!(result.granted, allowed);
}

// ============================================================================
// SECTION: Authorization Codes
// ============================================================================

/// A code redeems at most once; the second redemption is `invalid_grant`.
#[test]
fn code_is_single_use() {
    let store = scoped_store();
    let engine = engine();
    let code = engine.issue_code(&store, &code_grant(None)).unwrap();
    engine
        .redeem_code(&store, &code, "test-client", "http://localhost:3000/callback", None)
        .unwrap();
    let err = engine
        .redeem_code(&store, &code, "test-client", "http://localhost:3000/callback", None)
        .unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));
}

/// Redemption enforces the client and redirect URI binding.
#[test]
fn code_binding_is_enforced() {
    let store = scoped_store();
    let engine = engine();
    let code = engine.issue_code(&store, &code_grant(None)).unwrap();
    let err = engine
        .redeem_code(&store, &code, "other-client", "http://localhost:3000/callback", None)
        .unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));
}

/// S256 PKCE verifies the SHA-256 of the verifier and rejects mismatches.
#[test]
fn pkce_s256_round_trip() {
    let store = scoped_store();
    let engine = engine();
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    let code = engine
        .issue_code(
            &store,
            &code_grant(Some(PkceChallenge {
                challenge,
                method: PkceMethod::S256,
            })),
        )
        .unwrap();
    let err = engine
        .redeem_code(
            &store,
            &code,
            "test-client",
            "http://localhost:3000/callback",
            Some("wrong-verifier"),
        )
        .unwrap_err();
    assert!(matches!(err, TokenError::PkceFailed(_)));

    // The code was consumed by the failed attempt; a fresh one verifies.
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    let code = engine
        .issue_code(
            &store,
            &code_grant(Some(PkceChallenge {
                challenge,
                method: PkceMethod::S256,
            })),
        )
        .unwrap();
    engine
        .redeem_code(&store, &code, "test-client", "http://localhost:3000/callback", Some(verifier))
        .unwrap();
}

// ============================================================================
// SECTION: Minting + Refresh
// ============================================================================

/// Minting produces a verifiable JWT with the expected claims.
#[test]
fn minted_access_token_verifies() {
    let store = scoped_store();
    let engine = engine();
    let (audit, _) = recorder();
    let minted = engine.mint(&store, &audit, mint_params(false), &AuditContext::default()).unwrap();
    let claims = engine.keys().verify(&minted.access_token, ISSUER, Some("test-client")).unwrap();
    assert_eq!(claims.sub, "usr_1");
    assert_eq!(claims.tenant_id, "acme");
    assert_eq!(claims.subject_type, "user");
    assert_eq!(claims.scope.as_deref(), Some("read"));
    assert!(minted.refresh_token.is_none());
}

/// Refreshing rotates the token and both values change.
#[test]
fn refresh_rotates_within_family() {
    let store = scoped_store();
    let engine = engine();
    let (audit, _) = recorder();
    let minted = engine.mint(&store, &audit, mint_params(true), &AuditContext::default()).unwrap();
    let r0 = minted.refresh_token.unwrap();
    let rotated = engine
        .refresh(&store, &audit, &r0, &client(), ISSUER, None, None, &AuditContext::default())
        .unwrap();
    let r1 = rotated.refresh_token.unwrap();
    assert_ne!(r0, r1);
    assert_ne!(minted.access_token, rotated.access_token);
}

/// Replaying a consumed token revokes the family and audits `reused`.
#[test]
fn refresh_reuse_revokes_family() {
    let store = scoped_store();
    let engine = engine();
    let (audit, audit_store) = recorder();
    let ctx = AuditContext::default();
    let minted = engine.mint(&store, &audit, mint_params(true), &ctx).unwrap();
    let r0 = minted.refresh_token.unwrap();
    let rotated = engine.refresh(&store, &audit, &r0, &client(), ISSUER, None, None, &ctx).unwrap();
    let r1 = rotated.refresh_token.unwrap();
    let rotated = engine.refresh(&store, &audit, &r1, &client(), ISSUER, None, None, &ctx).unwrap();
    let r2 = rotated.refresh_token.unwrap();

    // Replay the consumed root: the whole family dies.
    let err = engine.refresh(&store, &audit, &r0, &client(), ISSUER, None, None, &ctx).unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));

    let reused = audit_store
        .query(&AuditQuery {
            event_type: Some(TokenEventType::Reused),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(reused.len(), 1);

    // Surviving descendants were revoked with the family.
    let err = engine.refresh(&store, &audit, &r2, &client(), ISSUER, None, None, &ctx).unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));
}

/// Refreshing with a foreign client fails without consuming the token.
#[test]
fn refresh_rejects_foreign_client() {
    let store = scoped_store();
    let engine = engine();
    let (audit, _) = recorder();
    let ctx = AuditContext::default();
    let minted = engine.mint(&store, &audit, mint_params(true), &ctx).unwrap();
    let r0 = minted.refresh_token.unwrap();
    let mut foreign = client();
    foreign.id = ClientId::new("other-client");
    let err = engine.refresh(&store, &audit, &r0, &foreign, ISSUER, None, None, &ctx).unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));
    // The rightful client can still refresh.
    engine.refresh(&store, &audit, &r0, &client(), ISSUER, None, None, &ctx).unwrap();
}

// ============================================================================
// SECTION: Revocation + Introspection
// ============================================================================

/// Revoking one token kills its whole family; unknown tokens succeed.
#[test]
fn revoke_kills_family() {
    let store = scoped_store();
    let engine = engine();
    let (audit, _) = recorder();
    let ctx = AuditContext::default();
    let minted = engine.mint(&store, &audit, mint_params(true), &ctx).unwrap();
    let r0 = minted.refresh_token.unwrap();
    engine.revoke(&store, &audit, &r0, &ctx).unwrap();
    let err = engine.refresh(&store, &audit, &r0, &client(), ISSUER, None, None, &ctx).unwrap_err();
    assert!(matches!(err, TokenError::InvalidGrant(_)));
    engine.revoke(&store, &audit, &signet_core::TokenId::new("unknown"), &ctx).unwrap();
}

/// Introspection reports live access and refresh tokens and dead ones.
#[test]
fn introspection_reports_activity() {
    let store = scoped_store();
    let engine = engine();
    let (audit, _) = recorder();
    let ctx = AuditContext::default();
    let minted = engine.mint(&store, &audit, mint_params(true), &ctx).unwrap();

    let access = engine.introspect(&store, &minted.access_token, ISSUER).unwrap();
    assert!(access.active);
    assert_eq!(access.client_id.as_deref(), Some("test-client"));

    let r0 = minted.refresh_token.unwrap();
    let refresh = engine.introspect(&store, r0.as_str(), ISSUER).unwrap();
    assert!(refresh.active);
    assert_eq!(refresh.token_type.as_deref(), Some("refresh_token"));

    engine.revoke(&store, &audit, &r0, &ctx).unwrap();
    let revoked = engine.introspect(&store, r0.as_str(), ISSUER).unwrap();
    assert!(!revoked.active);

    let unknown = engine.introspect(&store, "not-a-token", ISSUER).unwrap();
    assert!(!unknown.active);
}
