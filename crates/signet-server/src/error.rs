// crates/signet-server/src/error.rs
// ============================================================================
// Module: API Errors
// Description: HTTP error mapping with stable codes and JSON bodies.
// Purpose: Translate domain errors into `{error, error_description}` bodies.
// Dependencies: axum, serde_json, signet-core, signet-providers
// ============================================================================

//! ## Overview
//! Domain and OAuth errors flow to the wire verbatim with their stable
//! codes; infrastructure and unexpected errors collapse into `internal_error`
//! with no detail leakage. The body shape is always
//! `{ "error": <code>, "error_description": <human string>, "details"?: [...] }`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::Value;
use serde_json::json;
use signet_core::ClientRegistryError;
use signet_core::CryptoError;
use signet_core::RbacError;
use signet_core::SessionError;
use signet_core::TenantError;
use signet_core::TokenError;
use signet_core::UserError;
use signet_core::store::StoreError;
use signet_providers::ProviderError;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// API error with a stable code and HTTP status.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable description.
    pub description: String,
    /// Optional structured details.
    pub details: Option<Value>,
}

impl ApiError {
    /// Creates an error with the given status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, description: impl Into<String>) -> Self {
        Self {
            status,
            code,
            description: description.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 400 `invalid_request`.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    /// 400 `invalid_grant`.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
    }

    /// 401 `invalid_client`.
    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_client", description)
    }

    /// 401 `unauthorized`.
    #[must_use]
    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", description)
    }

    /// 403 `forbidden`.
    #[must_use]
    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", description)
    }

    /// 404 `not_found`.
    #[must_use]
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", description)
    }

    /// 409 `conflict`.
    #[must_use]
    pub fn conflict(description: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", description)
    }

    /// 501 `not_implemented` for disabled optional subsystems.
    #[must_use]
    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, "not_implemented", description)
    }

    /// 500 `internal_error` with no detail surface.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "an internal error occurred",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.code,
            "error_description": self.description,
        });
        if let Some(details) = self.details
            && let Some(map) = body.as_object_mut()
        {
            map.insert("details".to_string(), details);
        }
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Domain Error Mapping
// ============================================================================

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match &err {
            TenantError::TenantNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "tenant_not_found", err.to_string())
            }
            TenantError::TenantSuspended(_) => {
                Self::new(StatusCode::FORBIDDEN, "tenant_suspended", err.to_string())
            }
            TenantError::TenantDeleted(_) => {
                Self::new(StatusCode::NOT_FOUND, "tenant_deleted", err.to_string())
            }
            TenantError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            TenantError::InvalidTransition(_) | TenantError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
            }
            TenantError::Store(_) => internal(&err),
        }
    }
}

impl From<ClientRegistryError> for ApiError {
    fn from(err: ClientRegistryError) -> Self {
        match &err {
            ClientRegistryError::ClientNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "client_not_found", err.to_string())
            }
            ClientRegistryError::ClientNameConflict(_) => {
                Self::new(StatusCode::CONFLICT, "client_name_conflict", err.to_string())
            }
            ClientRegistryError::InvalidGrantType(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_grant_type", err.to_string())
            }
            ClientRegistryError::InvalidScopeFormat(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_scope_format", err.to_string())
            }
            ClientRegistryError::InvalidRedirectUri(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_redirect_uri", err.to_string())
            }
            ClientRegistryError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
            }
            ClientRegistryError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_client", err.to_string())
            }
            ClientRegistryError::CircuitOpen(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "storage circuit open",
            ),
            ClientRegistryError::Store(_) => internal(&err),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::MaxAccountsExceeded => {
                Self::new(StatusCode::BAD_REQUEST, "max_accounts_exceeded", err.to_string())
            }
            SessionError::SessionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "session_not_found", err.to_string())
            }
            SessionError::AccountNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "account_not_found", err.to_string())
            }
            SessionError::SessionExpired(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "session_expired", err.to_string())
            }
            SessionError::VersionConflict(_) => {
                Self::new(StatusCode::CONFLICT, "version_conflict", err.to_string())
            }
            SessionError::InvalidCookie(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_cookie", err.to_string())
            }
            SessionError::Store(_) => internal(&err),
        }
    }
}

impl From<RbacError> for ApiError {
    fn from(err: RbacError) -> Self {
        match &err {
            RbacError::RoleNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "role_not_found", err.to_string())
            }
            RbacError::PermissionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "permission_not_found", err.to_string())
            }
            RbacError::RoleExists(_) | RbacError::PermissionExists(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            RbacError::RoleAlreadyAssigned(_) => {
                Self::new(StatusCode::CONFLICT, "role_already_assigned", err.to_string())
            }
            RbacError::CannotDeleteSystemRole(_) => {
                Self::new(StatusCode::FORBIDDEN, "cannot_delete_system_role", err.to_string())
            }
            RbacError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
            }
            RbacError::Store(_) => internal(&err),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match &err {
            TokenError::InvalidGrant(_) | TokenError::PkceFailed(_) => {
                Self::invalid_grant(err.to_string())
            }
            TokenError::InvalidScope { granted, denied } => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_scope",
                "one or more requested scopes were denied",
            )
            .with_details(json!({ "granted": granted, "denied": denied })),
            TokenError::Crypto(_) | TokenError::Store(_) => internal(&err),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::ProviderNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "provider_not_found", err.to_string())
            }
            ProviderError::ProviderExists(_) => {
                Self::new(StatusCode::CONFLICT, "provider_exists", err.to_string())
            }
            ProviderError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
            }
            ProviderError::AuthenticationFailed(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
            }
            ProviderError::Upstream(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream provider call failed",
            ),
            ProviderError::Crypto(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "encryption_error",
                "secret decryption failed",
            ),
            ProviderError::Store(_) => internal(&err),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match &err {
            UserError::UserNotFound(_) => Self::not_found(err.to_string()),
            UserError::UserExists(_) | UserError::IdentityExists(_) => {
                Self::conflict(err.to_string())
            }
            UserError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
            }
            UserError::Store(_) => internal(&err),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match &err {
            CryptoError::Encryption(_) | CryptoError::Malformed(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "encryption_error",
                "payload failed to decrypt",
            ),
            CryptoError::SigningKey(_) | CryptoError::TokenSignature(_) => internal(&err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        internal(&err)
    }
}

/// Logs the cause and returns an opaque 500.
fn internal(err: &dyn std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "request failed internally");
    ApiError::internal()
}
