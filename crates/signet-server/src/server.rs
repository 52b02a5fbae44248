// crates/signet-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: Router assembly and serving loop for the Signet issuer.
// Purpose: Wire every endpoint with its middleware and serve it on tokio.
// Dependencies: axum, tokio, signet-core
// ============================================================================

//! ## Overview
//! The router splits into the public OAuth surface, cookie-bound session
//! routes, and the bearer-protected admin surface. Rate limiting and the
//! per-request deadline wrap everything; admin routes additionally pass
//! bearer verification before any handler runs. Serving uses a plain TCP
//! listener with graceful shutdown on interrupt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::extract::State;
use axum::middleware::Next;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use thiserror::Error;

use crate::admin;
use crate::error::ApiError;
use crate::middleware::rate_limit;
use crate::middleware::require_bearer;
use crate::oauth;
use crate::providers_http;
use crate::session_routes;
use crate::state::AppState;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Serving errors.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Bind(String),
    /// The server loop failed.
    #[error("server failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/.well-known/openid-configuration", get(oauth::well_known_openid))
        .route("/.well-known/oauth-authorization-server", get(oauth::well_known_oauth))
        .route("/.well-known/jwks.json", get(oauth::jwks))
        .route("/healthz", get(oauth::healthz))
        .route("/authorize", get(oauth::authorize))
        .route("/authorize/select", get(oauth::authorize_select))
        .route("/token", post(oauth::token))
        .route("/token/introspect", post(oauth::introspect))
        .route("/token/revoke", post(oauth::revoke))
        .route("/userinfo", get(oauth::userinfo))
        .route("/password/authorize", get(providers_http::password_authorize))
        .route("/password/register", post(providers_http::password_register))
        .route("/password/login", post(providers_http::password_login))
        .route("/code/authorize", get(providers_http::code_authorize))
        .route("/code/send", post(providers_http::code_send))
        .route("/code/verify", post(providers_http::code_verify))
        .route("/{provider}/authorize", get(providers_http::upstream_authorize))
        .route("/{provider}/callback", get(oauth::upstream_callback));

    let session = Router::new()
        .route("/session/accounts", get(session_routes::list_accounts))
        .route("/session/switch", post(session_routes::switch_account))
        .route("/session/accounts/{user_id}", delete(session_routes::remove_account))
        .route("/session/all", delete(session_routes::remove_all_accounts))
        .route("/session/check", get(session_routes::check_session));

    let admin_api = Router::new()
        .route("/api/tenants", post(admin::create_tenant).get(admin::list_tenants))
        .route(
            "/api/tenants/{id}",
            get(admin::get_tenant).put(admin::update_tenant).delete(admin::delete_tenant),
        )
        .route("/api/tenants/{id}/branding", put(admin::update_tenant_branding))
        .route("/api/tenants/{id}/settings", put(admin::update_tenant_settings))
        .route("/api/clients", post(admin::create_client).get(admin::list_clients))
        .route(
            "/api/clients/{id}",
            get(admin::get_client).put(admin::update_client).delete(admin::delete_client),
        )
        .route("/api/clients/{id}/rotate", post(admin::rotate_client_secret))
        .route("/api/providers/types", post(admin::provider_types))
        .route("/api/providers", post(admin::create_provider).get(admin::list_providers))
        .route(
            "/api/providers/{name}",
            get(admin::get_provider).put(admin::update_provider).delete(admin::delete_provider),
        )
        .route("/api/users", post(admin::create_user).get(admin::list_users))
        .route(
            "/api/users/{id}",
            get(admin::get_user).put(admin::update_user).delete(admin::delete_user),
        )
        .route("/api/users/{id}/suspend", post(admin::suspend_user))
        .route("/api/users/{id}/unsuspend", post(admin::unsuspend_user))
        .route("/api/users/{id}/identities", post(admin::link_identity))
        .route(
            "/api/users/{id}/identities/{provider}/{provider_user_id}",
            delete(admin::unlink_identity),
        )
        .route("/api/audit/events", get(admin::audit_events))
        .route("/rbac/check", post(admin::rbac_check))
        .route("/rbac/check/batch", post(admin::rbac_check_batch))
        .route("/rbac/roles", post(admin::rbac_create_role).get(admin::rbac_list_roles))
        .route("/rbac/roles/{id}", delete(admin::rbac_delete_role))
        .route("/rbac/roles/{id}/permissions", post(admin::rbac_grant_permission))
        .route(
            "/rbac/roles/{id}/permissions/{permission_id}",
            delete(admin::rbac_revoke_permission),
        )
        .route(
            "/rbac/permissions",
            post(admin::rbac_create_permission).get(admin::rbac_list_permissions),
        )
        .route("/rbac/permissions/{id}", delete(admin::rbac_delete_permission))
        .route("/admin/sessions/revoke-user", post(session_routes::revoke_user_sessions))
        .route("/admin/sessions/revoke", post(session_routes::revoke_session))
        .layer(from_fn_with_state(Arc::clone(&state), require_bearer));

    Router::new()
        .merge(public)
        .merge(session)
        .merge(admin_api)
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(from_fn_with_state(Arc::clone(&state), request_deadline))
        .with_state(state)
}

/// Per-request deadline middleware.
async fn request_deadline(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let deadline = Duration::from_secs(state.config.server.request_deadline_secs);
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::new(
            axum::http::StatusCode::GATEWAY_TIMEOUT,
            "request_timeout",
            "request exceeded its deadline",
        )
        .into_response(),
    }
}

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Serves the issuer until interrupted.
///
/// # Errors
///
/// Returns [`ServeError`] when binding or serving fails.
pub async fn serve(state: Arc<AppState>) -> Result<(), ServeError> {
    let bind = state.config.server.bind;
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| ServeError::Bind(err.to_string()))?;
    tracing::info!(address = %bind, "signet issuer listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServeError::Serve(err.to_string()))
}

/// Resolves when the process receives an interrupt.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
