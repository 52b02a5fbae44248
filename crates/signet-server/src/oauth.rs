// crates/signet-server/src/oauth.rs
// ============================================================================
// Module: OAuth Endpoints
// Description: Authorize, token, introspection, revocation, and metadata.
// Purpose: Implement the OAuth 2.0 / OIDC wire surface of the issuer.
// Dependencies: axum, signet-core, signet-providers, url
// ============================================================================

//! ## Overview
//! `/authorize` validates the client and redirect URI, evaluates the session
//! prompt semantics, and either issues a code silently, renders the account
//! picker, or hands off to a provider flow via a stored pending request.
//! `/token` serves the three grants: authorization code (single-use atomic
//! redemption with PKCE), refresh (rotation with family reuse detection),
//! and client credentials (scope intersection, `mode:"m2m"`). Introspection
//! and revocation answer 501 when disabled. Well-known metadata bypasses the
//! tenant status gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use signet_core::AccountSession;
use signet_core::AuditContext;
use signet_core::AuthorizationCodeGrant;
use signet_core::ClientId;
use signet_core::GrantType;
use signet_core::MintParams;
use signet_core::OAuthClient;
use signet_core::PkceChallenge;
use signet_core::PkceMethod;
use signet_core::PromptOutcome;
use signet_core::ProviderName;
use signet_core::ResolvedTenant;
use signet_core::SessionId;
use signet_core::Subject;
use signet_core::Timestamp;
use signet_core::TokenId;
use signet_core::TokenMode;
use signet_core::UserId;
use signet_core::runtime::sessions::AuthorizeSessionParams;
use signet_core::runtime::tokens::validate_scopes;
use signet_core::store::KeyPath;
use signet_core::store::TenantScopedStore;
use signet_core::store::read_json;
use signet_core::store::write_json;
use url::Url;

use crate::cookies;
use crate::error::ApiError;
use crate::middleware::bearer_token;
use crate::state::AppState;
use crate::tenancy;

// ============================================================================
// SECTION: Pending Requests
// ============================================================================

/// Pending authorization request stored across the provider handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthRequest {
    /// Requesting client.
    pub client_id: ClientId,
    /// Validated redirect URI.
    pub redirect_uri: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Opaque client state echoed on the final redirect.
    pub state: Option<String>,
    /// OIDC nonce.
    pub nonce: Option<String>,
    /// PKCE challenge.
    pub pkce: Option<PkceChallenge>,
    /// Login hint propagated into provider UIs.
    pub login_hint: Option<String>,
    /// Provider chosen for the flow, when known.
    pub provider: Option<ProviderName>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl PendingAuthRequest {
    /// Returns the storage key for a pending request.
    fn key(id: &str) -> KeyPath {
        KeyPath::from_segments(&["authreq", id])
    }
}

/// Renders a `302 Found` redirect (OAuth redirects are 302, not 303).
#[must_use]
pub fn found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(location) {
        response.headers_mut().insert(axum::http::header::LOCATION, value);
    }
    response
}

/// Persists a pending request and returns its identifier.
pub fn store_pending(
    state: &AppState,
    store: &TenantScopedStore,
    pending: &PendingAuthRequest,
) -> Result<String, ApiError> {
    let id = signet_core::crypto::secrets::generate_id("req");
    write_json(
        store,
        &PendingAuthRequest::key(&id),
        pending,
        Some(state.tokens.config().code_ttl_secs),
    )?;
    Ok(id)
}

/// Loads a pending request by identifier.
pub fn load_pending(
    store: &TenantScopedStore,
    id: &str,
) -> Result<PendingAuthRequest, ApiError> {
    read_json::<PendingAuthRequest>(store, &PendingAuthRequest::key(id))?
        .ok_or_else(|| ApiError::invalid_request("unknown or expired authorization request"))
}

/// Removes a pending request after completion.
pub fn clear_pending(store: &TenantScopedStore, id: &str) {
    let _ = signet_core::store::KeyValueStore::remove(store, &PendingAuthRequest::key(id));
}

// ============================================================================
// SECTION: Well-Known Metadata
// ============================================================================

/// Builds the shared authorization-server metadata document.
fn metadata_document(issuer: &str) -> serde_json::Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "introspection_endpoint": format!("{issuer}/token/introspect"),
        "revocation_endpoint": format!("{issuer}/token/revoke"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
        "code_challenge_methods_supported": ["plain", "S256"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["ES256"],
    })
}

/// GET `/.well-known/openid-configuration` (tenant gate bypassed).
pub async fn well_known_openid(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(metadata_document(state.issuer()))
}

/// GET `/.well-known/oauth-authorization-server` (tenant gate bypassed).
pub async fn well_known_oauth(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(metadata_document(state.issuer()))
}

/// GET `/.well-known/jwks.json`.
pub async fn jwks(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let document = state.keys.jwks().map_err(|_| ApiError::internal())?;
    Ok(Json(serde_json::to_value(document).map_err(|_| ApiError::internal())?))
}

// ============================================================================
// SECTION: Authorize
// ============================================================================

/// Query parameters accepted by `/authorize`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeQuery {
    /// Requesting client.
    pub client_id: String,
    /// Redirect URI (must match a registered entry).
    pub redirect_uri: String,
    /// Response type (`code` only).
    pub response_type: String,
    /// Requested scopes, whitespace separated.
    #[serde(default)]
    pub scope: Option<String>,
    /// Opaque client state.
    #[serde(default)]
    pub state: Option<String>,
    /// OIDC nonce.
    #[serde(default)]
    pub nonce: Option<String>,
    /// OIDC prompt.
    #[serde(default)]
    pub prompt: Option<String>,
    /// OIDC max_age in seconds.
    #[serde(default)]
    pub max_age: Option<u64>,
    /// Login hint (matched against account emails).
    #[serde(default)]
    pub login_hint: Option<String>,
    /// Account hint (matched against account user ids).
    #[serde(default)]
    pub account_hint: Option<String>,
    /// PKCE challenge.
    #[serde(default)]
    pub code_challenge: Option<String>,
    /// PKCE method (`plain` or `S256`).
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    /// Explicit provider selection.
    #[serde(default)]
    pub provider: Option<String>,
    /// Tenant query override consumed by the resolver.
    #[serde(default)]
    pub tenant: Option<String>,
}

/// GET `/authorize`.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/authorize", query.tenant.as_deref())?;

    if query.response_type != "code" {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unsupported_response_type",
            "only response_type=code is supported",
        ));
    }
    let client = state.clients.get_by_id(&ClientId::new(query.client_id.clone()))?;
    if client.tenant_id != resolved.tenant.id || !client.enabled {
        return Err(ApiError::invalid_client("unknown client for tenant"));
    }
    if !client.allows_grant(GrantType::AuthorizationCode) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "client may not use the authorization code grant",
        ));
    }
    if !client.allows_redirect(&query.redirect_uri) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            "redirect_uri is not registered for this client",
        ));
    }

    let scope_request = query.scope.clone().unwrap_or_default();
    let validation = validate_scopes(&scope_request, &client.scopes);
    if !validation.valid {
        return Ok(error_redirect(
            &query.redirect_uri,
            "invalid_scope",
            &format!("scopes denied: {}", validation.denied.join(" ")),
            query.state.as_deref(),
        ));
    }

    let pkce = parse_pkce(&query)?;
    if pkce.is_none() && client.is_public() && state.config.features.pkce_required_for_public {
        return Err(ApiError::invalid_request("public clients must use PKCE"));
    }

    let prompt = query.prompt.as_deref().and_then(signet_core::Prompt::parse);
    let session_params = AuthorizeSessionParams {
        prompt,
        max_age: query.max_age,
        login_hint: query.login_hint.clone(),
        account_hint: query.account_hint.clone(),
    };
    let sid = cookies::read_session_cookie(
        &state.cookie_codec,
        &headers,
        &state.config.cookie.name,
    )
    .filter(|payload| payload.tid == resolved.tenant.id)
    .map(|payload| payload.sid);
    let outcome =
        state.sessions.evaluate_authorize(&resolved.store, sid.as_ref(), &session_params)?;

    match outcome {
        PromptOutcome::Proceed { account } => {
            let redirect = issue_code_for_account(
                &state,
                &resolved,
                &client,
                &query.redirect_uri,
                validation.granted,
                query.state.as_deref(),
                query.nonce.clone(),
                pkce,
                &account,
            )?;
            Ok(redirect)
        }
        PromptOutcome::LoginRequired => Ok(error_redirect(
            &query.redirect_uri,
            "login_required",
            "no active session and prompt=none forbids interaction",
            query.state.as_deref(),
        )),
        PromptOutcome::SelectAccount { accounts } => {
            let pending = PendingAuthRequest {
                client_id: client.id.clone(),
                redirect_uri: query.redirect_uri.clone(),
                scopes: validation.granted,
                state: query.state.clone(),
                nonce: query.nonce.clone(),
                pkce,
                login_hint: query.login_hint.clone(),
                provider: query.provider.clone().map(ProviderName::new),
                created_at: Timestamp::now(),
            };
            let request_id = store_pending(&state, &resolved.store, &pending)?;
            Ok(account_picker_page(&request_id, &accounts).into_response())
        }
        PromptOutcome::ShowLogin => {
            let pending = PendingAuthRequest {
                client_id: client.id.clone(),
                redirect_uri: query.redirect_uri.clone(),
                scopes: validation.granted,
                state: query.state.clone(),
                nonce: query.nonce.clone(),
                pkce,
                login_hint: query.login_hint.clone(),
                provider: query.provider.clone().map(ProviderName::new),
                created_at: Timestamp::now(),
            };
            let request_id = store_pending(&state, &resolved.store, &pending)?;
            dispatch_to_provider(&state, &resolved, &pending, &request_id)
        }
    }
}

/// Parses and validates the PKCE parameters.
fn parse_pkce(query: &AuthorizeQuery) -> Result<Option<PkceChallenge>, ApiError> {
    let Some(challenge) = &query.code_challenge else {
        return Ok(None);
    };
    let method = match query.code_challenge_method.as_deref() {
        None | Some("plain") => PkceMethod::Plain,
        Some("S256") => PkceMethod::S256,
        Some(other) => {
            return Err(ApiError::invalid_request(format!(
                "unsupported code_challenge_method: {other}"
            )));
        }
    };
    Ok(Some(PkceChallenge {
        challenge: challenge.clone(),
        method,
    }))
}

/// Chooses the provider for the login handoff and redirects to its UI.
fn dispatch_to_provider(
    state: &AppState,
    resolved: &ResolvedTenant,
    pending: &PendingAuthRequest,
    request_id: &str,
) -> Result<Response, ApiError> {
    let provider_name = match &pending.provider {
        Some(name) => name.clone(),
        None => {
            let enabled = state.providers.list_enabled(&resolved.store)?;
            let allowed = &resolved.tenant.settings.allowed_providers;
            let usable: Vec<_> = enabled
                .into_iter()
                .filter(|record| allowed.is_empty() || allowed.contains(&record.name))
                .collect();
            match usable.as_slice() {
                [] => ProviderName::new("password"),
                [single] => single.name.clone(),
                many => {
                    return Ok(provider_chooser_page(request_id, many).into_response());
                }
            }
        }
    };

    match provider_name.as_str() {
        "password" => Ok(found(&format!("/password/authorize?request={request_id}"))),
        "code" => {
            Ok(found(&format!("/code/authorize?request={request_id}")))
        }
        _ => {
            let record = state.providers.get(&resolved.store, &provider_name)?;
            if record.kind.is_upstream_oauth() {
                let vars = tenancy::interpolation_vars(&record);
                let provider =
                    state.providers.materialize(&resolved.store, &provider_name, &vars)?;
                let callback = format!("{}/{}/callback", state.issuer(), provider_name);
                let upstream_state = format!("{}:{request_id}", resolved.tenant.id);
                let url = provider
                    .authorize_url(&callback, &upstream_state, None)
                    .map_err(ApiError::from)?;
                Ok(found(url.as_str()))
            } else {
                Ok(found(&format!("/{provider_name}/authorize?request={request_id}")))
            }
        }
    }
}

/// Issues a code for an already-authenticated account and redirects.
#[expect(clippy::too_many_arguments, reason = "All parts of the grant are required here.")]
fn issue_code_for_account(
    state: &AppState,
    resolved: &ResolvedTenant,
    client: &OAuthClient,
    redirect_uri: &str,
    scopes: Vec<String>,
    client_state: Option<&str>,
    nonce: Option<String>,
    pkce: Option<PkceChallenge>,
    account: &AccountSession,
) -> Result<Response, ApiError> {
    let subject = Subject {
        subject_type: account.subject_type.clone(),
        properties: account.subject_properties.clone(),
    };
    let grant = AuthorizationCodeGrant {
        tenant_id: resolved.tenant.id.clone(),
        client_id: client.id.clone(),
        redirect_uri: redirect_uri.to_string(),
        subject,
        scopes,
        nonce,
        pkce,
        issued_at: Timestamp::now(),
    };
    let code = state.tokens.issue_code(&resolved.store, &grant)?;
    Ok(code_redirect(redirect_uri, &code, client_state))
}

/// Completes a provider login: mints the user, session, and code.
///
/// This is the configured success hook shared by every provider flow.
#[expect(clippy::too_many_arguments, reason = "The success hook joins every subsystem.")]
pub fn complete_login(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
    request_id: &str,
    provider: &ProviderName,
    provider_user_id: &str,
    email: Option<&str>,
    name: Option<&str>,
) -> Result<Response, ApiError> {
    let pending = load_pending(&resolved.store, request_id)?;
    let user = state.users.find_or_create_by_identity(
        &resolved.store,
        provider,
        provider_user_id,
        email,
        name,
        None,
    )?;
    state.users.record_login(&resolved.store, &user.id)?;

    let session_payload = cookies::read_session_cookie(
        &state.cookie_codec,
        headers,
        &state.config.cookie.name,
    )
    .filter(|payload| payload.tid == resolved.tenant.id);
    let session = match session_payload {
        Some(payload) => {
            match state.sessions.get_browser_session(&resolved.store, &payload.sid) {
                Ok(session) => session,
                Err(_) => state.sessions.create_browser_session(
                    &resolved.store,
                    headers
                        .get(axum::http::header::USER_AGENT)
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string),
                    None,
                )?,
            }
        }
        None => state.sessions.create_browser_session(
            &resolved.store,
            headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
            None,
        )?,
    };

    let subject_properties = json!({
        "id": user.id.as_str(),
        "email": user.email,
        "name": user.name,
        "provider": provider.as_str(),
    });
    state.sessions.add_account(
        &resolved.store,
        &session.id,
        signet_core::AddAccount {
            user_id: user.id.clone(),
            subject_type: signet_core::SubjectType::User,
            subject_properties: subject_properties.clone(),
            refresh_token: None,
            client_id: pending.client_id.clone(),
            ttl_secs: resolved.tenant.settings.session_lifetime_secs,
        },
    )?;

    let grant = AuthorizationCodeGrant {
        tenant_id: resolved.tenant.id.clone(),
        client_id: pending.client_id.clone(),
        redirect_uri: pending.redirect_uri.clone(),
        subject: Subject::user(subject_properties),
        scopes: pending.scopes.clone(),
        nonce: pending.nonce.clone(),
        pkce: pending.pkce.clone(),
        issued_at: Timestamp::now(),
    };
    let code = state.tokens.issue_code(&resolved.store, &grant)?;
    clear_pending(&resolved.store, request_id);

    let refreshed = state.sessions.get_browser_session(&resolved.store, &session.id)?;
    let sealed = state.cookie_codec.seal(&signet_core::CookiePayload {
        sid: refreshed.id.clone(),
        tid: resolved.tenant.id.clone(),
        v: refreshed.version,
        iat: Timestamp::now().as_unix(),
    })?;
    let mut response = code_redirect(&pending.redirect_uri, &code, pending.state.as_deref());
    let settings = tenancy::cookie_settings(state, &resolved.tenant);
    cookies::append_set_cookie(response.headers_mut(), &cookies::render_set_cookie(&settings, &sealed));
    Ok(response)
}

/// Renders the final `redirect_uri?code=...&state=...` response.
fn code_redirect(redirect_uri: &str, code: &str, state: Option<&str>) -> Response {
    let mut url = match Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(_) => return ApiError::invalid_request("redirect_uri failed to parse").into_response(),
    };
    url.query_pairs_mut().append_pair("code", code);
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    found(url.as_str())
}

/// Renders an OAuth error redirect back to the client.
fn error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let mut url = match Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(_) => return ApiError::invalid_request("redirect_uri failed to parse").into_response(),
    };
    url.query_pairs_mut().append_pair("error", error);
    url.query_pairs_mut().append_pair("error_description", description);
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    found(url.as_str())
}

/// Minimal account picker shell consumed by the external UI renderer.
fn account_picker_page(request_id: &str, accounts: &[AccountSession]) -> Html<String> {
    let entries: Vec<serde_json::Value> = accounts
        .iter()
        .map(|account| {
            json!({
                "user_id": account.user_id.as_str(),
                "email": account.email(),
                "active": account.is_active,
            })
        })
        .collect();
    let island = json!({
        "view": "select_account",
        "request": request_id,
        "accounts": entries,
    });
    Html(format!(
        "<!doctype html><html><body><script id=\"signet-data\" type=\"application/json\">{island}</script></body></html>"
    ))
}

/// Minimal provider chooser shell consumed by the external UI renderer.
fn provider_chooser_page(
    request_id: &str,
    providers: &[signet_core::ProviderRecord],
) -> Html<String> {
    let entries: Vec<serde_json::Value> = providers
        .iter()
        .map(|record| {
            json!({
                "name": record.name.as_str(),
                "display_name": record.display_name,
                "kind": record.kind.as_str(),
            })
        })
        .collect();
    let island = json!({
        "view": "select_provider",
        "request": request_id,
        "providers": entries,
    });
    Html(format!(
        "<!doctype html><html><body><script id=\"signet-data\" type=\"application/json\">{island}</script></body></html>"
    ))
}

// ============================================================================
// SECTION: Token
// ============================================================================

/// Form parameters accepted by `/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenForm {
    /// Grant type selector.
    pub grant_type: String,
    /// Authorization code (code grant).
    #[serde(default)]
    pub code: Option<String>,
    /// Redirect URI (code grant).
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Client identifier.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client secret (confidential clients).
    #[serde(default)]
    pub client_secret: Option<String>,
    /// PKCE verifier (code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,
    /// Refresh token (refresh grant).
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Requested scopes (client credentials grant).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token response body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponseBody {
    /// Signed access token.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Opaque refresh token, when minted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// POST `/token`.
pub async fn token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Form(form): axum::extract::Form<TokenForm>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/token", None)?;
    let ctx = audit_context(&headers);
    match form.grant_type.as_str() {
        "authorization_code" => code_grant(&state, &resolved, &headers, &form, &ctx).await,
        "refresh_token" => refresh_grant(&state, &resolved, &headers, &form, &ctx).await,
        "client_credentials" => client_credentials_grant(&state, &resolved, &headers, &form).await,
        other => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            format!("unsupported grant_type: {other}"),
        )),
    }
}

/// Builds the audit context from request headers.
fn audit_context(headers: &HeaderMap) -> AuditContext {
    AuditContext {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
    }
}

/// Resolves client credentials from the Basic header or form fields.
fn client_credentials_from(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<(String, Option<String>), ApiError> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(encoded) = value.strip_prefix("Basic ")
        && let Ok(decoded) = BASE64.decode(encoded.trim())
        && let Ok(decoded) = String::from_utf8(decoded)
        && let Some((id, secret)) = decoded.split_once(':')
    {
        return Ok((id.to_string(), Some(secret.to_string())));
    }
    let id = form_client_id
        .ok_or_else(|| ApiError::invalid_request("client_id is required"))?
        .to_string();
    Ok((id, form_client_secret.map(ToString::to_string)))
}

/// Authenticates a client for token-endpoint calls.
///
/// Confidential clients must present their secret (current or grace hash);
/// public clients authenticate by identity alone.
fn authenticate_client(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<OAuthClient, ApiError> {
    let (client_id, secret) = client_credentials_from(headers, form_client_id, form_client_secret)?;
    let client_id = ClientId::new(client_id);
    let client = state.clients.get_by_id(&client_id)?;
    if client.tenant_id != resolved.tenant.id || !client.enabled {
        return Err(ApiError::invalid_client("unknown client for tenant"));
    }
    if client.is_public() {
        return Ok(client);
    }
    let Some(secret) = secret else {
        return Err(ApiError::invalid_client("client secret required"));
    };
    state
        .clients
        .verify_credentials(&client_id, &secret)
        .map_err(|_| ApiError::invalid_client("client authentication failed"))
}

/// Handles `grant_type=authorization_code`.
async fn code_grant(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
    form: &TokenForm,
    ctx: &AuditContext,
) -> Result<Response, ApiError> {
    let client =
        authenticate_client(state, resolved, headers, form.client_id.as_deref(), form.client_secret.as_deref())?;
    let code = form
        .code
        .as_deref()
        .ok_or_else(|| ApiError::invalid_request("code is required"))?;
    let redirect_uri = form
        .redirect_uri
        .as_deref()
        .ok_or_else(|| ApiError::invalid_request("redirect_uri is required"))?;
    let grant = state.tokens.redeem_code(
        &resolved.store,
        code,
        client.id.as_str(),
        redirect_uri,
        form.code_verifier.as_deref(),
    )?;

    let (roles, permissions) = enrichment_for(state, resolved, &grant.subject, &client.id)?;
    let minted = state.tokens.mint(
        &resolved.store,
        &state.audit,
        MintParams {
            issuer: state.issuer().to_string(),
            client_id: client.id.as_str().to_string(),
            subject: grant.subject.clone(),
            scopes: grant.scopes.clone(),
            mode: TokenMode::User,
            roles,
            permissions,
            with_refresh: client.allows_grant(GrantType::RefreshToken),
        },
        ctx,
    )?;

    if let (Some(refresh), Some(user_id)) = (&minted.refresh_token, grant.subject.id()) {
        let _ = state.sessions.bind_refresh_token(
            &resolved.store,
            &UserId::new(user_id),
            &client.id,
            refresh,
        );
    }
    Ok(token_response(minted))
}

/// Handles `grant_type=refresh_token`.
async fn refresh_grant(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
    form: &TokenForm,
    ctx: &AuditContext,
) -> Result<Response, ApiError> {
    let client =
        authenticate_client(state, resolved, headers, form.client_id.as_deref(), form.client_secret.as_deref())?;
    if !client.allows_grant(GrantType::RefreshToken) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "client may not use the refresh token grant",
        ));
    }
    let presented = form
        .refresh_token
        .as_deref()
        .ok_or_else(|| ApiError::invalid_request("refresh_token is required"))?;
    let presented = TokenId::new(presented);

    // Enrichment needs the subject before rotation.
    let (roles, permissions) = match read_refresh_subject(resolved, &presented) {
        Some(subject) => enrichment_for(state, resolved, &subject, &client.id)?,
        None => (None, None),
    };
    let minted = state.tokens.refresh(
        &resolved.store,
        &state.audit,
        &presented,
        &client,
        state.issuer(),
        roles,
        permissions,
        ctx,
    )?;
    if let Some(refresh) = &minted.refresh_token
        && let Some(subject) = read_refresh_subject(resolved, refresh)
        && let Some(user_id) = subject.id()
    {
        let _ = state.sessions.bind_refresh_token(
            &resolved.store,
            &UserId::new(user_id),
            &client.id,
            refresh,
        );
    }
    Ok(token_response(minted))
}

/// Reads the subject stored behind a refresh token, when it exists.
fn read_refresh_subject(resolved: &ResolvedTenant, token: &TokenId) -> Option<Subject> {
    let key = KeyPath::from_segments(&["refresh", "tokens", token.as_str()]);
    let record: Option<signet_core::RefreshTokenRecord> =
        read_json(&resolved.store, &key).ok().flatten();
    record.map(|record| record.subject)
}

/// Handles `grant_type=client_credentials`.
async fn client_credentials_grant(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
    form: &TokenForm,
) -> Result<Response, ApiError> {
    let (client_id, secret) =
        client_credentials_from(headers, form.client_id.as_deref(), form.client_secret.as_deref())?;
    let Some(secret) = secret else {
        return Err(ApiError::invalid_client("client secret required"));
    };
    let client_id = ClientId::new(client_id);
    let client = state
        .clients
        .verify_credentials(&client_id, &secret)
        .map_err(|_| ApiError::invalid_client("client authentication failed"))?;
    if client.tenant_id != resolved.tenant.id {
        return Err(ApiError::invalid_client("unknown client for tenant"));
    }
    if !client.allows_grant(GrantType::ClientCredentials) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "client may not use the client credentials grant",
        ));
    }
    let requested = form.scope.clone().unwrap_or_default();
    let validation = validate_scopes(&requested, &client.scopes);
    if !validation.valid {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_scope",
            "one or more requested scopes were denied",
        )
        .with_details(json!({ "granted": validation.granted, "denied": validation.denied })));
    }

    let subject = Subject {
        subject_type: signet_core::SubjectType::Custom("client".to_string()),
        properties: json!({ "id": client.id.as_str(), "name": client.name }),
    };
    let minted = state.tokens.mint(
        &resolved.store,
        &state.audit,
        MintParams {
            issuer: state.issuer().to_string(),
            client_id: client.id.as_str().to_string(),
            subject,
            scopes: validation.granted,
            mode: TokenMode::M2m,
            roles: None,
            permissions: None,
            with_refresh: false,
        },
        &AuditContext::default(),
    )?;
    Ok(token_response(minted))
}

/// Resolves RBAC enrichment for a user subject, when identifiable.
fn enrichment_for(
    state: &AppState,
    resolved: &ResolvedTenant,
    subject: &Subject,
    client_id: &ClientId,
) -> Result<(Option<Vec<String>>, Option<Vec<String>>), ApiError> {
    let Some(user_id) = subject.id() else {
        return Ok((None, None));
    };
    let enrichment =
        state.rbac.enrich(&resolved.store, &UserId::new(user_id), client_id)?;
    let roles = (!enrichment.roles.is_empty()).then_some(enrichment.roles);
    let permissions = (!enrichment.permissions.is_empty()).then_some(enrichment.permissions);
    Ok((roles, permissions))
}

/// Renders the token response body.
fn token_response(minted: signet_core::MintedTokens) -> Response {
    Json(TokenResponseBody {
        access_token: minted.access_token,
        token_type: "bearer",
        expires_in: minted.expires_in,
        refresh_token: minted.refresh_token.map(signet_core::TokenId::into_inner),
        scope: minted.scope,
    })
    .into_response()
}

// ============================================================================
// SECTION: Introspection + Revocation + Userinfo
// ============================================================================

/// Form parameters for introspection and revocation.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenIntrospectForm {
    /// Token under inspection.
    pub token: String,
}

/// POST `/token/introspect` (501 when the feature is disabled).
pub async fn introspect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Form(form): axum::extract::Form<TokenIntrospectForm>,
) -> Result<Response, ApiError> {
    if !state.config.features.introspection {
        return Err(ApiError::not_implemented("introspection is disabled"));
    }
    let resolved = tenancy::resolve(&state, &headers, "/token/introspect", None)?;
    let response = state.tokens.introspect(&resolved.store, &form.token, state.issuer())?;
    Ok(Json(response).into_response())
}

/// POST `/token/revoke` (501 when the feature is disabled).
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Form(form): axum::extract::Form<TokenIntrospectForm>,
) -> Result<Response, ApiError> {
    if !state.config.features.revocation {
        return Err(ApiError::not_implemented("revocation is disabled"));
    }
    let resolved = tenancy::resolve(&state, &headers, "/token/revoke", None)?;
    let ctx = audit_context(&headers);
    state.tokens.revoke(&resolved.store, &state.audit, &TokenId::new(form.token), &ctx)?;
    Ok(StatusCode::OK.into_response())
}

/// GET `/userinfo`.
pub async fn userinfo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(&headers) else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "missing_token",
            "authorization bearer token required",
        ));
    };
    let claims = state
        .keys
        .verify(token, state.issuer(), None)
        .map_err(|_| ApiError::unauthorized("access token failed verification"))?;
    let mut body = serde_json::Map::new();
    body.insert("sub".to_string(), json!(claims.sub));
    if let Some(object) = claims.properties.as_object() {
        for (key, value) in object {
            body.insert(key.clone(), value.clone());
        }
    }
    Ok(Json(serde_json::Value::Object(body)).into_response())
}

/// GET `/healthz`: storage readiness probe.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve_default(&state)?;
    signet_core::store::KeyValueStore::readiness(&resolved.store)?;
    Ok(Json(json!({ "status": "ok" })).into_response())
}

// ============================================================================
// SECTION: Account Picker Continuation
// ============================================================================

/// Query parameters for the account picker continuation.
#[derive(Debug, Clone, Deserialize)]
pub struct PickerQuery {
    /// Pending request identifier.
    pub request: String,
    /// Chosen account user id.
    pub user_id: String,
}

/// GET `/authorize/select`: completes a picker selection.
pub async fn authorize_select(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PickerQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/authorize/select", None)?;
    let pending = load_pending(&resolved.store, &query.request)?;
    let payload = cookies::read_session_cookie(
        &state.cookie_codec,
        &headers,
        &state.config.cookie.name,
    )
    .filter(|payload| payload.tid == resolved.tenant.id)
    .ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "invalid_cookie", "session cookie required")
    })?;
    let sid: SessionId = payload.sid;
    state.sessions.switch_active(&resolved.store, &sid, &UserId::new(query.user_id.clone()))?;
    let Some(account) = state.sessions.active_account(&resolved.store, &sid)? else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "session_expired",
            "selected account is no longer valid",
        ));
    };
    let client = state.clients.get_by_id(&pending.client_id)?;
    clear_pending(&resolved.store, &query.request);
    issue_code_for_account(
        &state,
        &resolved,
        &client,
        &pending.redirect_uri,
        pending.scopes,
        pending.state.as_deref(),
        pending.nonce,
        pending.pkce,
        &account,
    )
}

/// Shared query type for provider handoff routes.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestQuery {
    /// Pending request identifier.
    pub request: String,
}

/// Upstream provider callback query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamCallbackQuery {
    /// Authorization code from the upstream provider.
    #[serde(default)]
    pub code: Option<String>,
    /// State echoed by the upstream provider (`<tenant>:<request>`).
    #[serde(default)]
    pub state: Option<String>,
    /// Upstream error code, when the login failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// GET `/{provider}/callback`: completes an upstream OAuth flow.
pub async fn upstream_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<UpstreamCallbackQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/callback", None)?;
    if let Some(error) = &query.error {
        return Err(ApiError::unauthorized(format!("upstream login failed: {error}")));
    }
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| ApiError::invalid_request("code is required"))?;
    let upstream_state = query
        .state
        .as_deref()
        .ok_or_else(|| ApiError::invalid_request("state is required"))?;
    let request_id = upstream_state
        .split_once(':')
        .map(|(_, request)| request)
        .ok_or_else(|| ApiError::invalid_request("malformed state"))?;

    let provider_name = ProviderName::new(provider);
    let record = state.providers.get(&resolved.store, &provider_name)?;
    let vars = tenancy::interpolation_vars(&record);
    let upstream = state.providers.materialize(&resolved.store, &provider_name, &vars)?;
    let callback = format!("{}/{}/callback", state.issuer(), provider_name);
    let tokens = upstream.exchange_code(&state.http, code, &callback, None).await?;
    let claims = upstream.fetch_userinfo(&state.http, &tokens.access_token).await?;

    let provider_user_id = claims
        .get("sub")
        .or_else(|| claims.get("id"))
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| ApiError::unauthorized("upstream userinfo has no subject"))?;
    let email = claims.get("email").and_then(serde_json::Value::as_str);
    let name = claims.get("name").and_then(serde_json::Value::as_str);
    complete_login(
        &state,
        &resolved,
        &headers,
        request_id,
        &provider_name,
        &provider_user_id,
        email,
        name,
    )
}
