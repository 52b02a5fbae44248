// crates/signet-server/tests/middleware_unit.rs
// ============================================================================
// Module: Middleware Unit Tests
// Description: Bearer parsing, verification backends, limits, and cookies.
// Purpose: Validate the guard-rail pieces without a served instance.
// ============================================================================

//! Unit tests for the middleware layer: case-insensitive bearer extraction,
//! JWKS-backed verification, scope and tenant checks, the sliding-window
//! limiter with overrides, cookie rendering, and config validation bounds.

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
use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use serde_json::json;
use signet_core::AccessClaims;
use signet_core::SigningKeySet;
use signet_core::Timestamp;
use signet_core::TokenMode;
use signet_server::AuthContext;
use signet_server::SignetConfig;
use signet_server::TokenVerifier;
use signet_server::cookies;
use signet_server::ratelimit::RateDecision;
use signet_server::ratelimit::SlidingWindowLimiter;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const ISSUER: &str = "http://localhost:9876";

fn sample_claims(scope: Option<&str>, mode: TokenMode) -> AccessClaims {
    let now = Timestamp::now();
    AccessClaims {
        iss: ISSUER.to_string(),
        sub: "usr_1".to_string(),
        aud: "test-client".to_string(),
        iat: now.as_unix(),
        exp: now.plus_secs(600).as_unix(),
        jti: "jti_1".to_string(),
        subject_type: "user".to_string(),
        properties: json!({ "id": "usr_1" }),
        mode,
        tenant_id: "acme".to_string(),
        client_id: "test-client".to_string(),
        scope: scope.map(ToString::to_string),
        roles: None,
        permissions: None,
    }
}

// ============================================================================
// SECTION: Bearer Extraction
// ============================================================================

/// The Authorization scheme matches case-insensitively.
#[test]
fn bearer_extraction_is_case_insensitive() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("BeArEr abc.def.ghi"));
    assert_eq!(signet_server::middleware::bearer_token(&headers), Some("abc.def.ghi"));

    headers.insert("authorization", HeaderValue::from_static("Basic abc"));
    assert_eq!(signet_server::middleware::bearer_token(&headers), None);

    headers.insert("authorization", HeaderValue::from_static("Bearer "));
    assert_eq!(signet_server::middleware::bearer_token(&headers), None);
}

// ============================================================================
// SECTION: Verification Backends
// ============================================================================

/// Local-key and inline-JWKS verification accept the same token.
#[tokio::test]
async fn verifier_backends_agree() {
    let keys = Arc::new(SigningKeySet::generate().expect("generate keys"));
    let token = keys.sign(&sample_claims(Some("read"), TokenMode::User)).expect("sign");

    let local = TokenVerifier::LocalKeys(Arc::clone(&keys));
    let claims = local.verify(&token, ISSUER).await.expect("local verify");
    assert_eq!(claims.sub, "usr_1");

    let inline = TokenVerifier::InlineJwks(keys.jwks().expect("jwks"));
    let claims = inline.verify(&token, ISSUER).await.expect("inline verify");
    assert_eq!(claims.client_id, "test-client");

    // A foreign key set rejects the token.
    let foreign = TokenVerifier::LocalKeys(Arc::new(SigningKeySet::generate().expect("keys")));
    assert!(foreign.verify(&token, ISSUER).await.is_err());

    // A wrong issuer rejects the token.
    assert!(local.verify(&token, "http://other:1").await.is_err());
}

/// Rotation keeps old tokens verifiable and signs with the new key.
#[tokio::test]
async fn rotation_keeps_old_tokens_valid() {
    let mut keys = SigningKeySet::generate().expect("generate keys");
    let old_token = keys.sign(&sample_claims(None, TokenMode::User)).expect("sign old");
    keys.rotate().expect("rotate");
    let new_token = keys.sign(&sample_claims(None, TokenMode::User)).expect("sign new");
    let verifier = TokenVerifier::LocalKeys(Arc::new(keys));
    assert!(verifier.verify(&old_token, ISSUER).await.is_ok());
    assert!(verifier.verify(&new_token, ISSUER).await.is_ok());
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Scope and tenant checks follow the token claims.
#[test]
fn auth_context_checks() {
    let ctx = AuthContext::from_claims(sample_claims(Some("read write"), TokenMode::User));
    assert_eq!(ctx.tenant_id, "acme");
    assert!(ctx.require_scope("read").is_ok());
    assert!(ctx.require_scope("admin").is_err());
    assert!(ctx.require_any_scope(&["admin", "write"]).is_ok());
    assert!(ctx.require_any_scope(&["admin", "root"]).is_err());
    assert!(ctx.require_m2m().is_err());
    assert!(ctx.require_tenant_match("acme").is_ok());
    assert!(ctx.require_tenant_match("beta").is_err());

    let m2m = AuthContext::from_claims(sample_claims(None, TokenMode::M2m));
    assert!(m2m.require_m2m().is_ok());

    // Empty tenant claims default to the reserved tenant.
    let mut claims = sample_claims(None, TokenMode::User);
    claims.tenant_id = String::new();
    assert_eq!(AuthContext::from_claims(claims).tenant_id, "default");
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

/// The window admits up to the cap and reports a retry delay beyond it.
#[test]
fn limiter_enforces_window() {
    let limiter = SlidingWindowLimiter::new(true, 3, Duration::from_secs(60));
    for _ in 0..3 {
        assert_eq!(limiter.check("/token", "ip:1.2.3.4"), RateDecision::Allowed);
    }
    assert!(matches!(
        limiter.check("/token", "ip:1.2.3.4"),
        RateDecision::Limited { retry_after_secs } if retry_after_secs >= 1
    ));
    // Other callers and routes have their own windows.
    assert_eq!(limiter.check("/token", "ip:5.6.7.8"), RateDecision::Allowed);
    assert_eq!(limiter.check("/authorize", "ip:1.2.3.4"), RateDecision::Allowed);
}

/// Per-endpoint overrides replace the default tuning.
#[test]
fn limiter_supports_overrides() {
    let mut limiter = SlidingWindowLimiter::new(true, 100, Duration::from_secs(60));
    limiter.set_override("/token", 1, Duration::from_secs(60));
    assert_eq!(limiter.check("/token", "ip:1.2.3.4"), RateDecision::Allowed);
    assert!(matches!(
        limiter.check("/token", "ip:1.2.3.4"),
        RateDecision::Limited { .. }
    ));
}

/// A disabled limiter admits everything.
#[test]
fn limiter_disabled_admits_all() {
    let limiter = SlidingWindowLimiter::new(false, 1, Duration::from_secs(60));
    for _ in 0..10 {
        assert_eq!(limiter.check("/token", "ip:1.2.3.4"), RateDecision::Allowed);
    }
}

// ============================================================================
// SECTION: Cookies
// ============================================================================

/// Cookie parsing finds the named cookie among several.
#[test]
fn cookie_parsing_and_rendering() {
    let mut headers = HeaderMap::new();
    headers.insert(
        "cookie",
        HeaderValue::from_static("other=1; __session=sealed-value; last=2"),
    );
    assert_eq!(cookies::cookie_value(&headers, "__session"), Some("sealed-value"));
    assert_eq!(cookies::cookie_value(&headers, "missing"), None);

    let settings = cookies::CookieSettings {
        name: "__session".to_string(),
        max_age_secs: 604_800,
        domain: Some("id.example.com".to_string()),
        secure: true,
    };
    let rendered = cookies::render_set_cookie(&settings, "sealed");
    assert!(rendered.starts_with("__session=sealed"));
    assert!(rendered.contains("HttpOnly"));
    assert!(rendered.contains("SameSite=Lax"));
    assert!(rendered.contains("Path=/"));
    assert!(rendered.contains("Max-Age=604800"));
    assert!(rendered.contains("Secure"));
    assert!(rendered.contains("Domain=id.example.com"));

    let cleared = cookies::render_clear_cookie(&settings);
    assert!(cleared.contains("Max-Age=0"));
}

// ============================================================================
// SECTION: Config Validation
// ============================================================================

/// Out-of-bounds values fail validation with stable messages.
#[test]
fn config_validation_bounds() {
    let mut config = SignetConfig::default();
    assert!(config.validate().is_ok());

    config.token.code_ttl_seconds = 9_000;
    assert!(config.validate().is_err());
    config.token.code_ttl_seconds = 600;

    config.session.sliding_window_seconds = config.session.session_lifetime_seconds + 1;
    assert!(config.validate().is_err());
    config.session.sliding_window_seconds = 60;

    config.server.issuer = "http://localhost:9876/".to_string();
    assert!(config.validate().is_err());
}
