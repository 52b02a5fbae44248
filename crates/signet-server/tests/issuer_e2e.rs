// crates/signet-server/tests/issuer_e2e.rs
// ============================================================================
// Module: Issuer End-to-End Tests
// Description: Full HTTP scenarios against a served issuer instance.
// Purpose: Validate metadata, login, token, refresh, and admin flows.
// ============================================================================

//! ## Overview
//! These tests bind the issuer on an ephemeral loopback port and drive it
//! with a cookie-carrying HTTP client, redirects disabled so every 302 can
//! be asserted: well-known metadata, the password register/verify code
//! grant, refresh rotation with reuse detection, silent `prompt=none`
//! failures, scope denial, session endpoints, and the admin surface with
//! tenant isolation.

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

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use serde_json::json;
use signet_core::AuditQuery;
use signet_core::ClientId;
use signet_core::ClientMetadata;
use signet_core::GrantType;
use signet_core::NewClient;
use signet_core::TenantId;
use signet_core::TokenEventType;
use signet_server::AppState;
use signet_server::SignetConfig;
use signet_server::build_router;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// A served issuer instance with its base URL and state handle.
struct Issuer {
    /// Base URL of the bound instance.
    base: String,
    /// Shared state for white-box assertions.
    state: Arc<AppState>,
    /// Plaintext secret of the seeded admin client.
    admin_secret: String,
}

/// Binds and serves an issuer with seeded clients.
async fn spawn_issuer(mutate: impl FnOnce(&mut SignetConfig)) -> Issuer {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind ephemeral listener");
    let port = listener.local_addr().expect("local addr").port();

    let mut config = SignetConfig::default();
    config.server.issuer = format!("http://localhost:{port}");
    config.cookie.secure = false;
    config.features.pkce_required_for_public = false;
    mutate(&mut config);
    let state = AppState::build(config).expect("build state");

    let tenant = TenantId::new("default");
    state
        .clients
        .create(
            &tenant,
            NewClient {
                id: Some(ClientId::new("test-client")),
                name: "Test Client".to_string(),
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                scopes: vec!["read".to_string(), "write".to_string()],
                redirect_uris: vec!["http://localhost:3000/callback".to_string()],
                metadata: ClientMetadata::default(),
                confidential: false,
            },
        )
        .expect("seed test client");
    let admin = state
        .clients
        .create(
            &tenant,
            NewClient {
                id: Some(ClientId::new("admin-client")),
                name: "Admin Client".to_string(),
                grant_types: vec![GrantType::ClientCredentials],
                scopes: vec!["admin".to_string()],
                redirect_uris: vec![],
                metadata: ClientMetadata::default(),
                confidential: true,
            },
        )
        .expect("seed admin client");

    let router = build_router(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    Issuer {
        base: format!("http://localhost:{port}"),
        state,
        admin_secret: admin.secret.unwrap_or_default(),
    }
}

/// Builds the test HTTP client (cookies on, redirects off).
fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build http client")
}

/// Decodes a JWT payload without verification.
fn jwt_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).expect("jwt payload part");
    let bytes = URL_SAFE_NO_PAD.decode(payload).expect("payload decoding");
    serde_json::from_slice(&bytes).expect("payload json")
}

/// Runs the password register + verify flow and returns the token response.
async fn password_login_tokens(issuer: &Issuer, http: &reqwest::Client, state: &str) -> Value {
    let authorize = http
        .get(format!(
            "{}/authorize?client_id=test-client&redirect_uri=http://localhost:3000/callback&response_type=code&state={state}&provider=password",
            issuer.base
        ))
        .send()
        .await
        .expect("authorize request");
    assert_eq!(authorize.status(), reqwest::StatusCode::FOUND);
    let location = authorize
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("authorize location")
        .to_string();
    assert!(location.starts_with("/password/authorize"));

    let login_page = http
        .get(format!("{}{}", issuer.base, location))
        .send()
        .await
        .expect("password authorize page");
    assert_eq!(login_page.status(), reqwest::StatusCode::OK);

    let register = http
        .post(format!("{}/password/register", issuer.base))
        .form(&[
            ("action", "register"),
            ("email", "alice@example.com"),
            ("password", "SecurePassword123!"),
            ("repeat", "SecurePassword123!"),
        ])
        .send()
        .await
        .expect("register request");
    assert_eq!(register.status(), reqwest::StatusCode::OK);
    let body: Value = register.json().await.expect("register body");
    let code = body["code"].as_str().expect("verification code").to_string();
    assert_eq!(code.len(), 6);

    let verify = http
        .post(format!("{}/password/register", issuer.base))
        .form(&[("action", "verify"), ("code", code.as_str())])
        .send()
        .await
        .expect("verify request");
    assert_eq!(verify.status(), reqwest::StatusCode::FOUND);
    let callback = verify
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("callback location")
        .to_string();
    assert!(callback.starts_with("http://localhost:3000/callback"));
    assert!(callback.contains(&format!("state={state}")));
    let auth_code = callback
        .split_once("code=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
        .expect("code parameter")
        .to_string();

    let token = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", auth_code.as_str()),
            ("redirect_uri", "http://localhost:3000/callback"),
            ("client_id", "test-client"),
        ])
        .send()
        .await
        .expect("token request");
    assert_eq!(token.status(), reqwest::StatusCode::OK);
    token.json().await.expect("token body")
}

// ============================================================================
// SECTION: Metadata (S1)
// ============================================================================

/// Well-known metadata names the issuer and its endpoints.
#[tokio::test]
async fn well_known_metadata_is_complete() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let response = http
        .get(format!("{}/.well-known/oauth-authorization-server", issuer.base))
        .send()
        .await
        .expect("metadata request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("metadata body");
    assert_eq!(body["issuer"], json!(issuer.base));
    assert_eq!(body["authorization_endpoint"], json!(format!("{}/authorize", issuer.base)));
    assert_eq!(body["token_endpoint"], json!(format!("{}/token", issuer.base)));
    assert_eq!(body["jwks_uri"], json!(format!("{}/.well-known/jwks.json", issuer.base)));
    assert!(body["response_types_supported"]
        .as_array()
        .expect("response types")
        .contains(&json!("code")));
    let grants = body["grant_types_supported"].as_array().expect("grant types");
    assert!(grants.contains(&json!("authorization_code")));
    assert!(grants.contains(&json!("refresh_token")));

    let jwks: Value = http
        .get(format!("{}/.well-known/jwks.json", issuer.base))
        .send()
        .await
        .expect("jwks request")
        .json()
        .await
        .expect("jwks body");
    let keys = jwks["keys"].as_array().expect("jwks keys");
    assert!(!keys.is_empty());
    assert_eq!(keys[0]["kty"], json!("EC"));
    assert_eq!(keys[0]["crv"], json!("P-256"));
}

// ============================================================================
// SECTION: Password Code Grant (S2)
// ============================================================================

/// Register, verify, and exchange the code for tokens.
#[tokio::test]
async fn password_register_and_code_grant() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let tokens = password_login_tokens(&issuer, &http, "S1").await;

    assert_eq!(tokens["token_type"], json!("bearer"));
    assert!(tokens["expires_in"].as_u64().expect("expires_in") > 0);
    let access = tokens["access_token"].as_str().expect("access token");
    assert!(!access.is_empty());
    assert!(!tokens["refresh_token"].as_str().expect("refresh token").is_empty());

    let payload = jwt_payload(access);
    assert_eq!(payload["type"], json!("user"));
    assert_eq!(payload["iss"], json!(issuer.base));
    assert!(!payload["properties"]["id"].as_str().expect("subject id").is_empty());

    // The minted token satisfies /userinfo.
    let userinfo: Value = http
        .get(format!("{}/userinfo", issuer.base))
        .bearer_auth(access)
        .send()
        .await
        .expect("userinfo request")
        .json()
        .await
        .expect("userinfo body");
    assert_eq!(userinfo["email"], json!("alice@example.com"));
}

// ============================================================================
// SECTION: Refresh + Reuse (S3)
// ============================================================================

/// Refresh rotates both tokens; replaying the old one revokes the family.
#[tokio::test]
async fn refresh_rotation_and_reuse_detection() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let tokens = password_login_tokens(&issuer, &http, "S3").await;
    let access_0 = tokens["access_token"].as_str().expect("access").to_string();
    let r0 = tokens["refresh_token"].as_str().expect("refresh").to_string();

    let refreshed = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", r0.as_str()),
            ("client_id", "test-client"),
        ])
        .send()
        .await
        .expect("refresh request");
    assert_eq!(refreshed.status(), reqwest::StatusCode::OK);
    let refreshed: Value = refreshed.json().await.expect("refresh body");
    assert_ne!(refreshed["access_token"].as_str(), Some(access_0.as_str()));
    assert_ne!(refreshed["refresh_token"].as_str(), Some(r0.as_str()));

    // Replaying the consumed token fails and revokes the family.
    let replay = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", r0.as_str()),
            ("client_id", "test-client"),
        ])
        .send()
        .await
        .expect("replay request");
    assert_eq!(replay.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = replay.json().await.expect("replay body");
    assert_eq!(body["error"], json!("invalid_grant"));

    let reused = issuer
        .state
        .audit
        .query(&AuditQuery {
            event_type: Some(TokenEventType::Reused),
            ..AuditQuery::default()
        })
        .expect("audit query");
    assert_eq!(reused.len(), 1);

    // The rotated descendant is dead too.
    let descendant = refreshed["refresh_token"].as_str().expect("descendant");
    let dead = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", descendant),
            ("client_id", "test-client"),
        ])
        .send()
        .await
        .expect("descendant request");
    assert_eq!(dead.status(), reqwest::StatusCode::BAD_REQUEST);
}

// ============================================================================
// SECTION: Prompt=none (S4)
// ============================================================================

/// Without a session, `prompt=none` redirects with `login_required`.
#[tokio::test]
async fn prompt_none_without_session_redirects() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let response = http
        .get(format!(
            "{}/authorize?client_id=test-client&redirect_uri=http://localhost:3000/callback&response_type=code&state=S4&prompt=none",
            issuer.base
        ))
        .send()
        .await
        .expect("authorize request");
    assert_eq!(response.status(), reqwest::StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location");
    assert!(location.starts_with("http://localhost:3000/callback"));
    assert!(location.contains("error=login_required"));
    assert!(location.contains("error_description="));
    assert!(location.contains("state=S4"));
}

/// With a live session, `prompt=none` issues a code silently.
#[tokio::test]
async fn prompt_none_with_session_issues_code() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let _ = password_login_tokens(&issuer, &http, "first").await;

    let response = http
        .get(format!(
            "{}/authorize?client_id=test-client&redirect_uri=http://localhost:3000/callback&response_type=code&state=silent&prompt=none",
            issuer.base
        ))
        .send()
        .await
        .expect("silent authorize");
    assert_eq!(response.status(), reqwest::StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location");
    assert!(location.contains("code="));
    assert!(location.contains("state=silent"));
    assert!(!location.contains("error="));
}

// ============================================================================
// SECTION: Scope Denial (S5)
// ============================================================================

/// Client credentials with a denied scope fail with the denied list.
#[tokio::test]
async fn client_credentials_scope_denial() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let secret = issuer.admin_secret.clone();

    let denied = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "admin-client"),
            ("client_secret", secret.as_str()),
            ("scope", "admin read"),
        ])
        .send()
        .await
        .expect("denied request");
    assert_eq!(denied.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = denied.json().await.expect("denied body");
    assert_eq!(body["error"], json!("invalid_scope"));
    assert_eq!(body["details"]["granted"], json!(["admin"]));
    assert_eq!(body["details"]["denied"], json!(["read"]));

    // The fully-allowed request succeeds with an m2m token.
    let granted = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "admin-client"),
            ("client_secret", secret.as_str()),
        ])
        .send()
        .await
        .expect("granted request");
    assert_eq!(granted.status(), reqwest::StatusCode::OK);
    let body: Value = granted.json().await.expect("granted body");
    let payload = jwt_payload(body["access_token"].as_str().expect("access"));
    assert_eq!(payload["mode"], json!("m2m"));
    assert_eq!(payload["scope"], json!("admin"));
}

// ============================================================================
// SECTION: Introspection + Revocation
// ============================================================================

/// Introspection reports activity; disabled features answer 501.
#[tokio::test]
async fn introspection_and_feature_gating() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let tokens = password_login_tokens(&issuer, &http, "intro").await;
    let refresh = tokens["refresh_token"].as_str().expect("refresh");

    let live: Value = http
        .post(format!("{}/token/introspect", issuer.base))
        .form(&[("token", refresh)])
        .send()
        .await
        .expect("introspect request")
        .json()
        .await
        .expect("introspect body");
    assert_eq!(live["active"], json!(true));

    let revoke = http
        .post(format!("{}/token/revoke", issuer.base))
        .form(&[("token", refresh)])
        .send()
        .await
        .expect("revoke request");
    assert_eq!(revoke.status(), reqwest::StatusCode::OK);

    let dead: Value = http
        .post(format!("{}/token/introspect", issuer.base))
        .form(&[("token", refresh)])
        .send()
        .await
        .expect("introspect request")
        .json()
        .await
        .expect("introspect body");
    assert_eq!(dead["active"], json!(false));

    // A second issuer with the features disabled answers 501.
    let gated = spawn_issuer(|config| {
        config.features.introspection = false;
        config.features.revocation = false;
    })
    .await;
    let response = http
        .post(format!("{}/token/introspect", gated.base))
        .form(&[("token", "whatever")])
        .send()
        .await
        .expect("gated introspect");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_IMPLEMENTED);
    let response = http
        .post(format!("{}/token/revoke", gated.base))
        .form(&[("token", "whatever")])
        .send()
        .await
        .expect("gated revoke");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_IMPLEMENTED);
}

// ============================================================================
// SECTION: Session Endpoints
// ============================================================================

/// The session API lists the logged-in account and the silent check agrees.
#[tokio::test]
async fn session_endpoints_reflect_login() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();

    let unauthenticated: Value = http
        .get(format!("{}/session/check", issuer.base))
        .send()
        .await
        .expect("check request")
        .json()
        .await
        .expect("check body");
    assert_eq!(unauthenticated["authenticated"], json!(false));

    let _ = password_login_tokens(&issuer, &http, "sess").await;

    let accounts: Value = http
        .get(format!("{}/session/accounts", issuer.base))
        .send()
        .await
        .expect("accounts request")
        .json()
        .await
        .expect("accounts body");
    let listed = accounts["accounts"].as_array().expect("accounts array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["email"], json!("alice@example.com"));
    assert_eq!(listed[0]["active"], json!(true));

    let check: Value = http
        .get(format!("{}/session/check", issuer.base))
        .send()
        .await
        .expect("check request")
        .json()
        .await
        .expect("check body");
    assert_eq!(check["authenticated"], json!(true));
}

// ============================================================================
// SECTION: Admin Surface + Tenant Isolation (S6)
// ============================================================================

/// Fetches an admin access token via client credentials.
async fn admin_token(issuer: &Issuer, http: &reqwest::Client) -> String {
    let secret = issuer.admin_secret.clone();
    let body: Value = http
        .post(format!("{}/token", issuer.base))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "admin-client"),
            ("client_secret", secret.as_str()),
            ("scope", "admin"),
        ])
        .send()
        .await
        .expect("admin token request")
        .json()
        .await
        .expect("admin token body");
    body["access_token"].as_str().expect("admin access token").to_string()
}

/// Admin routes enforce auth, return exact codes, and isolate tenants.
#[tokio::test]
async fn admin_api_and_tenant_isolation() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();

    // No token: 401 with a stable code.
    let denied = http
        .get(format!("{}/api/tenants", issuer.base))
        .send()
        .await
        .expect("unauthenticated request");
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: Value = denied.json().await.expect("denied body");
    assert_eq!(body["error"], json!("missing_token"));

    let token = admin_token(&issuer, &http).await;

    // Tenant creation answers 201; unknown lookups answer 404.
    let created = http
        .post(format!("{}/api/tenants", issuer.base))
        .bearer_auth(&token)
        .json(&json!({ "id": "tenant-a", "name": "Tenant A" }))
        .send()
        .await
        .expect("create tenant");
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let missing = http
        .get(format!("{}/api/tenants/ghost", issuer.base))
        .bearer_auth(&token)
        .send()
        .await
        .expect("missing tenant");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let created = http
        .post(format!("{}/api/tenants", issuer.base))
        .bearer_auth(&token)
        .json(&json!({ "id": "tenant-b", "name": "Tenant B" }))
        .send()
        .await
        .expect("create tenant b");
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);

    // Same-named clients in both tenants succeed; listings never cross.
    let client_body = json!({
        "name": "X",
        "grant_types": ["authorization_code"],
        "redirect_uris": ["https://app.example.com/cb"],
    });
    let a = http
        .post(format!("{}/api/clients", issuer.base))
        .bearer_auth(&token)
        .header("x-tenant-id", "tenant-a")
        .json(&client_body)
        .send()
        .await
        .expect("create client a");
    assert_eq!(a.status(), reqwest::StatusCode::CREATED);
    let a: Value = a.json().await.expect("client a body");
    assert!(!a["secret"].as_str().expect("plaintext secret").is_empty());
    let a_id = a["client"]["id"].as_str().expect("client a id").to_string();

    let b = http
        .post(format!("{}/api/clients", issuer.base))
        .bearer_auth(&token)
        .header("x-tenant-id", "tenant-b")
        .json(&client_body)
        .send()
        .await
        .expect("create client b");
    assert_eq!(b.status(), reqwest::StatusCode::CREATED);

    let listed: Value = http
        .get(format!("{}/api/clients", issuer.base))
        .bearer_auth(&token)
        .header("x-tenant-id", "tenant-a")
        .send()
        .await
        .expect("list clients a")
        .json()
        .await
        .expect("list clients a body");
    let clients = listed["clients"].as_array().expect("clients array");
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["id"], json!(a_id));

    // Rotation returns a fresh plaintext secret once.
    let rotated: Value = http
        .post(format!("{}/api/clients/{a_id}/rotate", issuer.base))
        .bearer_auth(&token)
        .header("x-tenant-id", "tenant-a")
        .send()
        .await
        .expect("rotate request")
        .json()
        .await
        .expect("rotate body");
    assert!(!rotated["secret"].as_str().expect("rotated secret").is_empty());

    // Reads never expose the stored hash or plaintext again.
    let fetched: Value = http
        .get(format!("{}/api/clients/{a_id}", issuer.base))
        .bearer_auth(&token)
        .header("x-tenant-id", "tenant-a")
        .send()
        .await
        .expect("get client")
        .json()
        .await
        .expect("get client body");
    assert!(fetched.get("secret").is_none());
    assert!(fetched.get("secret_hash").is_none());
}

/// Provider admin reads mask the stored secret.
#[tokio::test]
async fn provider_admin_masks_secret() {
    let issuer = spawn_issuer(|_| {}).await;
    let http = http_client();
    let token = admin_token(&issuer, &http).await;

    let created = http
        .post(format!("{}/api/providers", issuer.base))
        .bearer_auth(&token)
        .json(&json!({
            "type": "github",
            "name": "github",
            "display_name": "GitHub",
            "client_id": "gh-client",
            "client_secret": "gh-secret-0042",
        }))
        .send()
        .await
        .expect("create provider");
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let body: Value = created.json().await.expect("provider body");
    assert_eq!(body["client_secret_masked"], json!("****0042"));
    assert!(body.get("client_secret").is_none());

    let types = http
        .post(format!("{}/api/providers/types", issuer.base))
        .bearer_auth(&token)
        .send()
        .await
        .expect("provider types");
    assert_eq!(types.status(), reqwest::StatusCode::OK);
    let types: Value = types.json().await.expect("types body");
    assert!(types["types"].as_array().expect("types array").len() >= 8);
}
