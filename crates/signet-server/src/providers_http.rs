// crates/signet-server/src/providers_http.rs
// ============================================================================
// Module: Provider Flow Routes
// Description: Password, one-time-code, and upstream provider endpoints.
// Purpose: Drive interactive logins and hand results to the success hook.
// Dependencies: axum, signet-core, signet-providers
// ============================================================================

//! ## Overview
//! Interactive flows ride on a short-lived flow cookie carrying the pending
//! authorization request id, set when the provider UI is first served. The
//! password provider registers in two steps (register, then verify with a
//! six-digit code); the code provider issues and verifies one-time codes.
//! Codes are returned in the JSON body because mail delivery is an external
//! collaborator. Upstream providers redirect out and return through
//! `/{provider}/callback`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Form;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use signet_core::ProviderName;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::read_json;
use signet_core::store::write_json;

use crate::cookies;
use crate::error::ApiError;
use crate::oauth;
use crate::state::AppState;
use crate::tenancy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name of the short-lived flow cookie.
const FLOW_COOKIE: &str = "__signet_flow";
/// Flow cookie and flow state lifetime in seconds.
const FLOW_TTL_SECS: u64 = 600;

// ============================================================================
// SECTION: Flow State
// ============================================================================

/// Per-flow state persisted between provider steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlowState {
    /// Email the flow is operating on, once known.
    email: Option<String>,
}

/// Returns the storage key for flow state.
fn flow_key(request_id: &str) -> KeyPath {
    KeyPath::from_segments(&["authflow", request_id])
}

/// Reads the flow cookie.
fn flow_request_id(headers: &HeaderMap) -> Result<String, ApiError> {
    cookies::cookie_value(headers, FLOW_COOKIE)
        .map(ToString::to_string)
        .ok_or_else(|| ApiError::invalid_request("login flow cookie missing or expired"))
}

/// Renders the Set-Cookie value binding the flow to the browser.
fn flow_set_cookie(request_id: &str, secure: bool) -> String {
    let mut cookie =
        format!("{FLOW_COOKIE}={request_id}; HttpOnly; SameSite=Lax; Path=/; Max-Age={FLOW_TTL_SECS}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

// ============================================================================
// SECTION: Password Provider
// ============================================================================

/// GET `/password/authorize`: serves the login/registration shell.
pub async fn password_authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<oauth::RequestQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/password/authorize", None)?;
    let pending = oauth::load_pending(&resolved.store, &query.request)?;
    let branding = state.tenants.branding_for(&resolved.tenant)?;
    let island = json!({
        "view": "password_login",
        "request": query.request,
        "login_hint": pending.login_hint,
        "branding": branding,
        "allow_registration": resolved.tenant.settings.allow_public_registration
            || resolved.tenant.id.is_default(),
    });
    write_json(
        &resolved.store,
        &flow_key(&query.request),
        &FlowState { email: None },
        Some(FLOW_TTL_SECS),
    )?;
    let mut response = Html(format!(
        "<!doctype html><html><body><script id=\"signet-data\" type=\"application/json\">{island}</script></body></html>"
    ))
    .into_response();
    cookies::append_set_cookie(
        response.headers_mut(),
        &flow_set_cookie(&query.request, state.config.cookie.secure),
    );
    Ok(response)
}

/// Form accepted by `/password/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRegisterForm {
    /// Step selector: `register` or `verify`.
    pub action: String,
    /// Email (register step).
    #[serde(default)]
    pub email: Option<String>,
    /// Password (register step).
    #[serde(default)]
    pub password: Option<String>,
    /// Password repeat (register step).
    #[serde(default)]
    pub repeat: Option<String>,
    /// Six-digit verification code (verify step).
    #[serde(default)]
    pub code: Option<String>,
}

/// POST `/password/register`.
pub async fn password_register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<PasswordRegisterForm>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/password/register", None)?;
    let request_id = flow_request_id(&headers)?;
    oauth::load_pending(&resolved.store, &request_id)?;

    match form.action.as_str() {
        "register" => {
            if !resolved.tenant.settings.allow_public_registration
                && !resolved.tenant.id.is_default()
            {
                return Err(ApiError::forbidden("public registration is disabled"));
            }
            let email = form
                .email
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("email is required"))?;
            let password = form
                .password
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("password is required"))?;
            let repeat = form
                .repeat
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("repeat is required"))?;
            let code = state.password.register(&resolved.store, email, password, repeat)?;
            write_json(
                &resolved.store,
                &flow_key(&request_id),
                &FlowState {
                    email: Some(email.trim().to_ascii_lowercase()),
                },
                Some(FLOW_TTL_SECS),
            )?;
            // The verification code rides in the response because mail
            // delivery is an external collaborator.
            Ok(Json(json!({
                "status": "verification_required",
                "email": email.trim().to_ascii_lowercase(),
                "code": code,
            }))
            .into_response())
        }
        "verify" => {
            let code = form
                .code
                .as_deref()
                .ok_or_else(|| ApiError::invalid_request("code is required"))?;
            let flow: FlowState = read_json(&resolved.store, &flow_key(&request_id))?
                .ok_or_else(|| ApiError::invalid_request("login flow expired"))?;
            let email = flow
                .email
                .ok_or_else(|| ApiError::invalid_request("no registration in progress"))?;
            let email = state.password.verify(&resolved.store, &email, code)?;
            let _ = resolved.store.remove(&flow_key(&request_id));
            oauth::complete_login(
                &state,
                &resolved,
                &headers,
                &request_id,
                &ProviderName::new("password"),
                &email,
                Some(&email),
                None,
            )
        }
        other => Err(ApiError::invalid_request(format!("unknown action: {other}"))),
    }
}

/// Form accepted by `/password/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordLoginForm {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// POST `/password/login`.
pub async fn password_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<PasswordLoginForm>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/password/login", None)?;
    let request_id = flow_request_id(&headers)?;
    oauth::load_pending(&resolved.store, &request_id)?;
    let email = state.password.login(&resolved.store, &form.email, &form.password)?;
    oauth::complete_login(
        &state,
        &resolved,
        &headers,
        &request_id,
        &ProviderName::new("password"),
        &email,
        Some(&email),
        None,
    )
}

// ============================================================================
// SECTION: One-Time Code Provider
// ============================================================================

/// GET `/code/authorize`: serves the code-entry shell.
pub async fn code_authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<oauth::RequestQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/code/authorize", None)?;
    let pending = oauth::load_pending(&resolved.store, &query.request)?;
    let island = json!({
        "view": "code_login",
        "request": query.request,
        "login_hint": pending.login_hint,
    });
    write_json(
        &resolved.store,
        &flow_key(&query.request),
        &FlowState { email: None },
        Some(FLOW_TTL_SECS),
    )?;
    let mut response = Html(format!(
        "<!doctype html><html><body><script id=\"signet-data\" type=\"application/json\">{island}</script></body></html>"
    ))
    .into_response();
    cookies::append_set_cookie(
        response.headers_mut(),
        &flow_set_cookie(&query.request, state.config.cookie.secure),
    );
    Ok(response)
}

/// Form accepted by `/code/send`.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSendForm {
    /// Email the code is issued for.
    pub email: String,
}

/// POST `/code/send`: issues a one-time code.
pub async fn code_send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CodeSendForm>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/code/send", None)?;
    let request_id = flow_request_id(&headers)?;
    oauth::load_pending(&resolved.store, &request_id)?;
    let code = state.code.issue(&resolved.store, &form.email)?;
    write_json(
        &resolved.store,
        &flow_key(&request_id),
        &FlowState {
            email: Some(form.email.trim().to_ascii_lowercase()),
        },
        Some(FLOW_TTL_SECS),
    )?;
    Ok(Json(json!({
        "status": "code_sent",
        "email": form.email.trim().to_ascii_lowercase(),
        "code": code,
    }))
    .into_response())
}

/// Form accepted by `/code/verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeVerifyForm {
    /// Six-digit code under verification.
    pub code: String,
}

/// POST `/code/verify`: verifies the code and completes the login.
pub async fn code_verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CodeVerifyForm>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/code/verify", None)?;
    let request_id = flow_request_id(&headers)?;
    oauth::load_pending(&resolved.store, &request_id)?;
    let flow: FlowState = read_json(&resolved.store, &flow_key(&request_id))?
        .ok_or_else(|| ApiError::invalid_request("login flow expired"))?;
    let email =
        flow.email.ok_or_else(|| ApiError::invalid_request("no code was requested"))?;
    let email = state.code.verify(&resolved.store, &email, &form.code)?;
    let _ = resolved.store.remove(&flow_key(&request_id));
    oauth::complete_login(
        &state,
        &resolved,
        &headers,
        &request_id,
        &ProviderName::new("code"),
        &email,
        Some(&email),
        None,
    )
}

// ============================================================================
// SECTION: Upstream Handoff
// ============================================================================

/// GET `/{provider}/authorize`: redirects to an upstream provider.
pub async fn upstream_authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<oauth::RequestQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/authorize", None)?;
    oauth::load_pending(&resolved.store, &query.request)?;
    let provider_name = ProviderName::new(provider);
    let record = state.providers.get(&resolved.store, &provider_name)?;
    if !record.kind.is_upstream_oauth() {
        return Err(ApiError::invalid_request("provider does not use an upstream flow"));
    }
    let vars = tenancy::interpolation_vars(&record);
    let upstream = state.providers.materialize(&resolved.store, &provider_name, &vars)?;
    let callback = format!("{}/{}/callback", state.issuer(), provider_name);
    let upstream_state = format!("{}:{}", resolved.tenant.id, query.request);
    let url = upstream.authorize_url(&callback, &upstream_state, None)?;
    Ok(crate::oauth::found(url.as_str()))
}
