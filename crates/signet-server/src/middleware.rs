// crates/signet-server/src/middleware.rs
// ============================================================================
// Module: Middleware Layer
// Description: Bearer auth, scope checks, tenant guard, and rate limiting.
// Purpose: Enforce the request-level guard rails around every API surface.
// Dependencies: axum, jsonwebtoken via signet-core, signet-core
// ============================================================================

//! ## Overview
//! Bearer auth extracts `Authorization: Bearer <jwt>` case-insensitively and
//! verifies it against the local signing keys, an inlined JWKS, or a JWKS
//! URL cached with a TTL. Verified requests carry an [`AuthContext`] in the
//! request extensions; scope checks and the tenant guard read it there. The
//! rate limit middleware keys its sliding window by subject, client, or
//! peer IP, in that order of preference.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use signet_core::AccessClaims;
use signet_core::JwksDocument;
use signet_core::SigningKeySet;
use signet_core::TokenMode;
use std::sync::Mutex;

use crate::error::ApiError;
use crate::ratelimit::RateDecision;
use crate::state::AppState;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TTL for cached JWKS documents fetched from a URL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
/// Deadline for JWKS fetches.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Verified caller context attached to request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified claims.
    pub claims: AccessClaims,
    /// Tenant from the token (defaulting to `default`).
    pub tenant_id: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Issuance mode.
    pub mode: TokenMode,
}

impl AuthContext {
    /// Builds a context from verified claims.
    #[must_use]
    pub fn from_claims(claims: AccessClaims) -> Self {
        let tenant_id = if claims.tenant_id.is_empty() {
            "default".to_string()
        } else {
            claims.tenant_id.clone()
        };
        let scopes = claims
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(ToString::to_string).collect())
            .unwrap_or_default();
        Self {
            tenant_id,
            client_id: claims.client_id.clone(),
            scopes,
            mode: claims.mode,
            claims,
        }
    }

    /// Requires one scope to be present.
    ///
    /// # Errors
    ///
    /// Returns 403 `insufficient_scope` when absent.
    pub fn require_scope(&self, scope: &str) -> Result<(), ApiError> {
        if self.scopes.iter().any(|granted| granted == scope) {
            return Ok(());
        }
        Err(ApiError::new(
            axum::http::StatusCode::FORBIDDEN,
            "insufficient_scope",
            format!("scope required: {scope}"),
        ))
    }

    /// Requires at least one of the scopes to be present.
    ///
    /// # Errors
    ///
    /// Returns 403 `insufficient_scope` when none is present.
    pub fn require_any_scope(&self, scopes: &[&str]) -> Result<(), ApiError> {
        if scopes.iter().any(|scope| self.scopes.iter().any(|granted| granted == scope)) {
            return Ok(());
        }
        Err(ApiError::new(
            axum::http::StatusCode::FORBIDDEN,
            "insufficient_scope",
            format!("one of these scopes required: {}", scopes.join(", ")),
        ))
    }

    /// Requires a machine-to-machine token.
    ///
    /// # Errors
    ///
    /// Returns 403 `forbidden` for user tokens.
    pub fn require_m2m(&self) -> Result<(), ApiError> {
        if self.mode == TokenMode::M2m {
            return Ok(());
        }
        Err(ApiError::forbidden("m2m token required"))
    }

    /// Requires the token's tenant to match the resolved request tenant.
    ///
    /// # Errors
    ///
    /// Returns 403 `forbidden` on mismatch.
    pub fn require_tenant_match(&self, resolved_tenant: &str) -> Result<(), ApiError> {
        if self.tenant_id == resolved_tenant {
            return Ok(());
        }
        Err(ApiError::forbidden(format!(
            "token tenant {} does not match request tenant {resolved_tenant}",
            self.tenant_id
        )))
    }
}

// ============================================================================
// SECTION: Token Verification
// ============================================================================

/// Token verification backends for bearer auth.
pub enum TokenVerifier {
    /// Verify against the local signing key set.
    LocalKeys(Arc<SigningKeySet>),
    /// Verify against an inlined JWKS document.
    InlineJwks(JwksDocument),
    /// Verify against a JWKS URL with TTL caching.
    JwksUrl {
        /// JWKS document URL.
        url: String,
        /// HTTP client for fetches.
        http: reqwest::Client,
        /// Cached document with its fetch instant.
        cache: Mutex<Option<(JwksDocument, Instant)>>,
    },
}

impl TokenVerifier {
    /// Verifies a bearer token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns 401 `invalid_token` for any verification failure.
    pub async fn verify(&self, token: &str, issuer: &str) -> Result<AccessClaims, ApiError> {
        match self {
            Self::LocalKeys(keys) => keys
                .verify(token, issuer, None)
                .map_err(|_| invalid_token()),
            Self::InlineJwks(jwks) => verify_with_jwks(token, issuer, jwks),
            Self::JwksUrl { url, http, cache } => {
                let jwks = fetch_jwks(url, http, cache).await?;
                verify_with_jwks(token, issuer, &jwks)
            }
        }
    }
}

/// Returns the standard 401 `invalid_token` error.
fn invalid_token() -> ApiError {
    ApiError::new(
        axum::http::StatusCode::UNAUTHORIZED,
        "invalid_token",
        "bearer token failed verification",
    )
}

/// Verifies a token against a JWKS document by `kid`.
fn verify_with_jwks(
    token: &str,
    issuer: &str,
    jwks: &JwksDocument,
) -> Result<AccessClaims, ApiError> {
    let header = jsonwebtoken::decode_header(token).map_err(|_| invalid_token())?;
    let kid = header.kid.ok_or_else(invalid_token)?;
    let jwk = jwks.keys.iter().find(|jwk| jwk.kid == kid).ok_or_else(invalid_token)?;
    let decoding_key =
        jsonwebtoken::DecodingKey::from_ec_components(&jwk.x, &jwk.y).map_err(|_| invalid_token())?;
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::ES256);
    validation.set_issuer(&[issuer]);
    validation.validate_aud = false;
    jsonwebtoken::decode::<AccessClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|_| invalid_token())
}

/// Fetches (or serves from cache) a JWKS document.
async fn fetch_jwks(
    url: &str,
    http: &reqwest::Client,
    cache: &Mutex<Option<(JwksDocument, Instant)>>,
) -> Result<JwksDocument, ApiError> {
    if let Ok(guard) = cache.lock()
        && let Some((jwks, fetched_at)) = guard.as_ref()
        && fetched_at.elapsed() < JWKS_CACHE_TTL
    {
        return Ok(jwks.clone());
    }
    let jwks: JwksDocument = http
        .get(url)
        .timeout(JWKS_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|_| invalid_token())?
        .json()
        .await
        .map_err(|_| invalid_token())?;
    if let Ok(mut guard) = cache.lock() {
        *guard = Some((jwks.clone(), Instant::now()));
    }
    Ok(jwks)
}

// ============================================================================
// SECTION: Middleware Functions
// ============================================================================

/// Extracts the bearer token from the Authorization header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim()).filter(|token| !token.is_empty())
}

/// Bearer auth middleware verifying against the local signing keys.
///
/// # Errors
///
/// Returns 401 `missing_token` or `invalid_token`.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(ApiError::new(
            axum::http::StatusCode::UNAUTHORIZED,
            "missing_token",
            "authorization bearer token required",
        ));
    };
    let claims = state.verifier.verify(token, state.issuer()).await?;
    request.extensions_mut().insert(AuthContext::from_claims(claims));
    Ok(next.run(request).await)
}

/// Rate limit middleware keyed by subject, client, or peer IP.
///
/// # Errors
///
/// Returns 429 `rate_limit_exceeded` with a `Retry-After` header.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let route = request.uri().path().to_string();
    let caller = caller_key(&request);
    match state.limiter.check(&route, &caller) {
        RateDecision::Allowed => Ok(next.run(request).await),
        RateDecision::Limited { retry_after_secs } => {
            let mut response = ApiError::new(
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "request rate exceeded; slow down",
            )
            .into_response();
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
            Err(response)
        }
    }
}

/// Derives the rate limit key: token subject, then client id, then peer IP.
fn caller_key(request: &Request) -> String {
    if let Some(token) = bearer_token(request.headers())
        && let Some(subject) = unverified_subject(token)
    {
        return format!("sub:{subject}");
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    "anonymous".to_string()
}

/// Reads the unverified `sub` claim purely for rate limit keying.
fn unverified_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("sub").and_then(serde_json::Value::as_str).map(ToString::to_string)
}
