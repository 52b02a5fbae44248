// crates/signet-server/src/session_routes.rs
// ============================================================================
// Module: Session Routes
// Description: Multi-account session endpoints and admin revocation.
// Purpose: Expose account listing, switching, removal, and silent checks.
// Dependencies: axum, signet-core
// ============================================================================

//! ## Overview
//! Session routes operate on the browser session named by the sealed cookie.
//! Every read applies the sliding window: when the stored session refreshed
//! its `last_activity`, the response re-emits the cookie with the bumped
//! version. `/session/check` is CORS-enabled for silent checks from relying
//! parties. Admin revocation endpoints ride behind bearer auth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use signet_core::BrowserSession;
use signet_core::CookiePayload;
use signet_core::ResolvedTenant;
use signet_core::SessionId;
use signet_core::Timestamp;
use signet_core::UserId;

use crate::cookies;
use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads the current session, applying the sliding window.
///
/// Returns the session and, when the window refreshed it, the re-sealed
/// cookie value to emit.
fn current_session(
    state: &AppState,
    resolved: &ResolvedTenant,
    headers: &HeaderMap,
) -> Result<(BrowserSession, Option<String>), ApiError> {
    let payload = cookies::read_session_cookie(
        &state.cookie_codec,
        headers,
        &state.config.cookie.name,
    )
    .filter(|payload| payload.tid == resolved.tenant.id)
    .ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "invalid_cookie", "session cookie required")
    })?;
    let (session, refreshed) = state.sessions.touch(&resolved.store, &payload.sid)?;
    let set_cookie = if refreshed || payload.v != session.version {
        let sealed = state.cookie_codec.seal(&CookiePayload {
            sid: session.id.clone(),
            tid: resolved.tenant.id.clone(),
            v: session.version,
            iat: Timestamp::now().as_unix(),
        })?;
        let settings = tenancy::cookie_settings(state, &resolved.tenant);
        Some(cookies::render_set_cookie(&settings, &sealed))
    } else {
        None
    };
    Ok((session, set_cookie))
}

/// Attaches the refreshed cookie to a response when present.
fn with_cookie(mut response: Response, set_cookie: Option<String>) -> Response {
    if let Some(rendered) = set_cookie {
        cookies::append_set_cookie(response.headers_mut(), &rendered);
    }
    response
}

/// Serializes the account list for wire responses.
fn accounts_body(
    state: &AppState,
    resolved: &ResolvedTenant,
    session: &BrowserSession,
) -> Result<serde_json::Value, ApiError> {
    let accounts = state.sessions.list_accounts(&resolved.store, &session.id)?;
    let entries: Vec<serde_json::Value> = accounts
        .iter()
        .map(|account| {
            json!({
                "user_id": account.user_id.as_str(),
                "email": account.email(),
                "active": account.is_active,
                "authenticated_at": account.authenticated_at.to_rfc3339(),
                "expires_at": account.expires_at.to_rfc3339(),
                "client_id": account.client_id.as_str(),
            })
        })
        .collect();
    Ok(json!({
        "session_id": session.id.as_str(),
        "active_user_id": session.active_user_id.as_ref().map(UserId::as_str),
        "accounts": entries,
    }))
}

// ============================================================================
// SECTION: Cookie-Bound Routes
// ============================================================================

/// GET `/session/accounts`.
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/session/accounts", None)?;
    let (session, set_cookie) = current_session(&state, &resolved, &headers)?;
    let body = accounts_body(&state, &resolved, &session)?;
    Ok(with_cookie(Json(body).into_response(), set_cookie))
}

/// Body accepted by `/session/switch`.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchBody {
    /// Account to activate.
    pub user_id: String,
}

/// POST `/session/switch`.
pub async fn switch_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SwitchBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/session/switch", None)?;
    let (session, set_cookie) = current_session(&state, &resolved, &headers)?;
    let session = state.sessions.switch_active(
        &resolved.store,
        &session.id,
        &UserId::new(body.user_id),
    )?;
    let body = accounts_body(&state, &resolved, &session)?;
    Ok(with_cookie(Json(body).into_response(), set_cookie))
}

/// DELETE `/session/accounts/{user_id}`.
pub async fn remove_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/session/accounts", None)?;
    let (session, set_cookie) = current_session(&state, &resolved, &headers)?;
    let session =
        state.sessions.remove_account(&resolved.store, &session.id, &UserId::new(user_id))?;
    let body = accounts_body(&state, &resolved, &session)?;
    Ok(with_cookie(Json(body).into_response(), set_cookie))
}

/// DELETE `/session/all`.
pub async fn remove_all_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/session/all", None)?;
    let (session, set_cookie) = current_session(&state, &resolved, &headers)?;
    let session = state.sessions.remove_all_accounts(&resolved.store, &session.id)?;
    let body = accounts_body(&state, &resolved, &session)?;
    Ok(with_cookie(Json(body).into_response(), set_cookie))
}

/// GET `/session/check`: CORS-enabled silent session check.
pub async fn check_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let Ok(resolved) = tenancy::resolve(&state, &headers, "/session/check", None) else {
        return cors_json(json!({ "authenticated": false }));
    };
    let payload = cookies::read_session_cookie(
        &state.cookie_codec,
        &headers,
        &state.config.cookie.name,
    )
    .filter(|payload| payload.tid == resolved.tenant.id);
    let authenticated = payload
        .and_then(|payload| {
            state.sessions.active_account(&resolved.store, &payload.sid).ok().flatten()
        })
        .is_some();
    cors_json(json!({ "authenticated": authenticated }))
}

/// Renders a JSON response with permissive CORS headers.
fn cors_json(body: serde_json::Value) -> Response {
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        axum::http::HeaderValue::from_static("*"),
    );
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        axum::http::HeaderValue::from_static("true"),
    );
    response
}

// ============================================================================
// SECTION: Admin Routes
// ============================================================================

/// Body accepted by `/admin/sessions/revoke-user`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeUserBody {
    /// User whose sessions are revoked.
    pub user_id: String,
}

/// POST `/admin/sessions/revoke-user`.
pub async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RevokeUserBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/admin/sessions/revoke-user", None)?;
    let revoked = state
        .sessions
        .revoke_user_sessions(&resolved.store, &UserId::new(body.user_id))?;
    Ok(Json(json!({ "revoked_sessions": revoked })).into_response())
}

/// Body accepted by `/admin/sessions/revoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeSessionBody {
    /// Browser session to delete.
    pub session_id: String,
}

/// POST `/admin/sessions/revoke`.
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RevokeSessionBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/admin/sessions/revoke", None)?;
    state
        .sessions
        .revoke_browser_session(&resolved.store, &SessionId::new(body.session_id))?;
    Ok(Json(json!({ "revoked": true })).into_response())
}
