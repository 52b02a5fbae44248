// crates/signet-server/src/tenancy.rs
// ============================================================================
// Module: Request Tenancy
// Description: Tenant resolution from HTTP requests and cookie settings.
// Purpose: Bridge axum request parts into the core tenant resolver.
// Dependencies: axum, signet-core, signet-providers
// ============================================================================

//! ## Overview
//! Handlers resolve their tenant through this bridge: the Host header, the
//! request path, the `X-Tenant-ID` header, and the `?tenant=` query are fed
//! into the core resolver, which applies the documented precedence and
//! status gating. Well-known metadata handlers simply skip the call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::header::HOST;
use serde_json::Value;
use signet_core::ProviderRecord;
use signet_core::ResolvedTenant;
use signet_core::Tenant;
use signet_core::runtime::tenants::ResolutionRequest;
use signet_providers::InterpolationVars;

use crate::cookies::CookieSettings;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the tenant for an inbound request.
///
/// # Errors
///
/// Returns the tenant status error mapped onto the API error shape.
pub fn resolve(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    tenant_query: Option<&str>,
) -> Result<ResolvedTenant, ApiError> {
    let host = headers.get(HOST).and_then(|value| value.to_str().ok());
    let tenant_header = headers.get("x-tenant-id").and_then(|value| value.to_str().ok());
    let request = ResolutionRequest {
        host,
        path,
        tenant_header,
        tenant_query,
    };
    state.resolver.resolve(&request).map_err(ApiError::from)
}

/// Resolves the reserved default tenant (used by probes).
///
/// # Errors
///
/// Returns the tenant status error mapped onto the API error shape.
pub fn resolve_default(state: &AppState) -> Result<ResolvedTenant, ApiError> {
    state
        .resolver
        .resolve(&ResolutionRequest {
            host: None,
            path: "/",
            tenant_header: None,
            tenant_query: None,
        })
        .map_err(ApiError::from)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds endpoint interpolation variables from a provider record.
#[must_use]
pub fn interpolation_vars(record: &ProviderRecord) -> InterpolationVars {
    let get = |key: &str| {
        record.config.get(key).and_then(Value::as_str).map(ToString::to_string)
    };
    InterpolationVars {
        tenant: get("tenant"),
        region: get("region"),
        domain: get("domain"),
        base_url: get("base_url").or_else(|| get("baseUrl")),
        realm: get("realm"),
    }
}

/// Builds the cookie settings for a tenant.
#[must_use]
pub fn cookie_settings(state: &AppState, tenant: &Tenant) -> CookieSettings {
    CookieSettings {
        name: state.config.cookie.name.clone(),
        max_age_secs: tenant.settings.session_lifetime_secs,
        domain: state.config.cookie.domain.clone(),
        secure: state.config.cookie.secure,
    }
}
