// crates/signet-server/src/admin.rs
// ============================================================================
// Module: Admin API
// Description: Tenant, client, provider, user, RBAC, and audit admin routes.
// Purpose: Expose the management surface with exact status codes.
// Dependencies: axum, signet-core, signet-providers
// ============================================================================

//! ## Overview
//! Admin routes ride behind bearer auth with the `admin` scope; tokens from
//! tenants other than `default` are additionally confined to their own
//! tenant. Client creation and secret rotation return the plaintext secret
//! exactly once; provider reads mask secrets to their last four characters;
//! user suspension revokes the user's sessions and reports the count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use signet_core::AuditQuery;
use signet_core::Branding;
use signet_core::ClientId;
use signet_core::ClientMetadata;
use signet_core::ClientUpdate;
use signet_core::GrantType;
use signet_core::NewClient;
use signet_core::NewTenant;
use signet_core::NewUser;
use signet_core::PermissionId;
use signet_core::ProviderKind;
use signet_core::ProviderName;
use signet_core::ProviderRecord;
use signet_core::ResolvedTenant;
use signet_core::RoleId;
use signet_core::TenantId;
use signet_core::TenantSettings;
use signet_core::TenantStatus;
use signet_core::TenantUpdate;
use signet_core::Timestamp;
use signet_core::UserId;
use signet_core::UserStatus;
use signet_core::UserUpdate;
use signet_providers::NewProvider;
use signet_providers::ProviderUpdate;
use signet_providers::catalog;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;
use crate::tenancy;

// ============================================================================
// SECTION: Authorization Helper
// ============================================================================

/// Requires the `admin` scope and tenant confinement for non-default tokens.
fn authorize_admin(ctx: &AuthContext, resolved: &ResolvedTenant) -> Result<(), ApiError> {
    ctx.require_scope("admin")?;
    if ctx.tenant_id != "default" {
        ctx.require_tenant_match(resolved.tenant.id.as_str())?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tenants
// ============================================================================

/// Body accepted by `POST /api/tenants`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantBody {
    /// Tenant identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional custom domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Branding overrides.
    #[serde(default)]
    pub branding: Branding,
    /// Issuer settings.
    #[serde(default)]
    pub settings: Option<TenantSettings>,
}

/// POST `/api/tenants` (201).
pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateTenantBody>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    if ctx.tenant_id != "default" {
        return Err(ApiError::forbidden("only default-tenant admins may create tenants"));
    }
    let tenant = state.tenants.create(NewTenant {
        id: TenantId::new(body.id),
        name: body.name,
        domain: body.domain,
        branding: body.branding,
        settings: body.settings.unwrap_or_default(),
        status: TenantStatus::Active,
    })?;
    Ok((StatusCode::CREATED, Json(tenant)).into_response())
}

/// Query parameters accepted by `GET /api/tenants`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListTenantsQuery {
    /// Status filter.
    #[serde(default)]
    pub status: Option<String>,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
}

/// Default page size for listings.
const fn default_limit() -> usize {
    50
}

/// GET `/api/tenants`.
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListTenantsQuery>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let status = match query.status.as_deref() {
        None => None,
        Some("active") => Some(TenantStatus::Active),
        Some("suspended") => Some(TenantStatus::Suspended),
        Some("pending") => Some(TenantStatus::Pending),
        Some("deleted") => Some(TenantStatus::Deleted),
        Some(other) => {
            return Err(ApiError::invalid_request(format!("unknown status filter: {other}")));
        }
    };
    let tenants = state.tenants.list(status, query.limit, query.offset)?;
    Ok(Json(json!({ "tenants": tenants })).into_response())
}

/// GET `/api/tenants/{id}` (404 when unknown).
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let tenant = state.tenants.get(&TenantId::new(id))?;
    Ok(Json(tenant).into_response())
}

/// Body accepted by `PUT /api/tenants/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenantBody {
    /// Replacement name.
    #[serde(default)]
    pub name: Option<String>,
    /// Replacement domain.
    #[serde(default)]
    pub domain: Option<Option<String>>,
    /// Replacement status.
    #[serde(default)]
    pub status: Option<String>,
}

/// PUT `/api/tenants/{id}`.
pub async fn update_tenant(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTenantBody>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let status = match body.status.as_deref() {
        None => None,
        Some("active") => Some(TenantStatus::Active),
        Some("suspended") => Some(TenantStatus::Suspended),
        Some("pending") => Some(TenantStatus::Pending),
        Some("deleted") => Some(TenantStatus::Deleted),
        Some(other) => {
            return Err(ApiError::invalid_request(format!("unknown status: {other}")));
        }
    };
    let tenant_id = TenantId::new(id);
    let tenant = state.tenants.update(
        &tenant_id,
        TenantUpdate {
            name: body.name,
            domain: body.domain,
            status,
            branding: None,
            settings: None,
        },
    )?;
    state.providers.invalidate_tenant(&tenant_id);
    Ok(Json(tenant).into_response())
}

/// PUT `/api/tenants/{id}/branding`.
pub async fn update_tenant_branding(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(branding): Json<Branding>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let tenant = state.tenants.update(
        &TenantId::new(id),
        TenantUpdate {
            branding: Some(branding),
            ..TenantUpdate::default()
        },
    )?;
    Ok(Json(tenant).into_response())
}

/// PUT `/api/tenants/{id}/settings`.
pub async fn update_tenant_settings(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(settings): Json<TenantSettings>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let tenant_id = TenantId::new(id);
    let tenant = state.tenants.update(
        &tenant_id,
        TenantUpdate {
            settings: Some(settings),
            ..TenantUpdate::default()
        },
    )?;
    state.providers.invalidate_tenant(&tenant_id);
    Ok(Json(tenant).into_response())
}

/// DELETE `/api/tenants/{id}` (soft delete).
pub async fn delete_tenant(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let tenant = state.tenants.soft_delete(&TenantId::new(id))?;
    Ok(Json(tenant).into_response())
}

// ============================================================================
// SECTION: Clients
// ============================================================================

/// Serializes a client for admin responses (hashes withheld).
fn client_body(client: &signet_core::OAuthClient) -> Value {
    json!({
        "id": client.id.as_str(),
        "tenant_id": client.tenant_id.as_str(),
        "name": client.name,
        "grant_types": client.grant_types,
        "scopes": client.scopes,
        "redirect_uris": client.redirect_uris,
        "metadata": client.metadata,
        "enabled": client.enabled,
        "created_at": client.created_at.to_rfc3339(),
        "updated_at": client.updated_at.to_rfc3339(),
        "rotated_at": client.rotated_at.map(Timestamp::to_rfc3339),
        "public": client.is_public(),
    })
}

/// Body accepted by `POST /api/clients`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClientBody {
    /// Client name.
    pub name: String,
    /// Grant type labels.
    pub grant_types: Vec<String>,
    /// Registered scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Whether the client is confidential (receives a secret).
    #[serde(default = "default_confidential")]
    pub confidential: bool,
}

/// Clients are confidential unless stated otherwise.
const fn default_confidential() -> bool {
    true
}

/// POST `/api/clients` (201, plaintext secret returned once).
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<CreateClientBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    let mut grant_types = Vec::with_capacity(body.grant_types.len());
    for label in &body.grant_types {
        let grant = GrantType::parse(label).ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_grant_type",
                format!("unknown grant type: {label}"),
            )
        })?;
        grant_types.push(grant);
    }
    let created = state.clients.create(
        &resolved.tenant.id,
        NewClient {
            id: None,
            name: body.name,
            grant_types,
            scopes: body.scopes,
            redirect_uris: body.redirect_uris,
            metadata: ClientMetadata(body.metadata.unwrap_or(Value::Null)),
            confidential: body.confidential,
        },
    )?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "client": client_body(&created.client),
            "secret": created.secret,
        })),
    )
        .into_response())
}

/// GET `/api/clients`.
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    let clients = state.clients.list(&resolved.tenant.id)?;
    let bodies: Vec<Value> = clients.iter().map(client_body).collect();
    Ok(Json(json!({ "clients": bodies })).into_response())
}

/// GET `/api/clients/{id}`.
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    let client = state.clients.get(&ClientId::new(id), &resolved.tenant.id)?;
    Ok(Json(client_body(&client)).into_response())
}

/// Body accepted by `PUT /api/clients/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClientBody {
    /// Replacement name.
    #[serde(default)]
    pub name: Option<String>,
    /// Replacement grant types.
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    /// Replacement scopes.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// Replacement redirect URIs.
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
    /// Replacement metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Replacement enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// PUT `/api/clients/{id}`.
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateClientBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    let grant_types = match body.grant_types {
        None => None,
        Some(labels) => {
            let mut grants = Vec::with_capacity(labels.len());
            for label in &labels {
                let grant = GrantType::parse(label).ok_or_else(|| {
                    ApiError::new(
                        StatusCode::BAD_REQUEST,
                        "invalid_grant_type",
                        format!("unknown grant type: {label}"),
                    )
                })?;
                grants.push(grant);
            }
            Some(grants)
        }
    };
    let client = state.clients.update(
        &ClientId::new(id),
        &resolved.tenant.id,
        ClientUpdate {
            name: body.name,
            grant_types,
            scopes: body.scopes,
            redirect_uris: body.redirect_uris,
            metadata: body.metadata.map(ClientMetadata),
            enabled: body.enabled,
        },
    )?;
    Ok(Json(client_body(&client)).into_response())
}

/// DELETE `/api/clients/{id}`.
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.clients.delete(&ClientId::new(id), &resolved.tenant.id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST `/api/clients/{id}/rotate` (plaintext secret returned once).
pub async fn rotate_client_secret(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/clients", None)?;
    authorize_admin(&ctx, &resolved)?;
    let secret = state.clients.rotate_secret(&ClientId::new(id), &resolved.tenant.id)?;
    Ok(Json(json!({ "secret": secret })).into_response())
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Serializes a provider for admin responses (secret masked).
fn provider_body(
    state: &AppState,
    resolved: &ResolvedTenant,
    record: &ProviderRecord,
) -> Result<Value, ApiError> {
    let masked = state.providers.masked_secret(&resolved.store, record)?;
    Ok(json!({
        "id": record.id,
        "tenant_id": record.tenant_id.as_str(),
        "type": record.kind.as_str(),
        "name": record.name.as_str(),
        "display_name": record.display_name,
        "client_id": record.client_id,
        "client_secret_masked": masked,
        "config": record.config,
        "enabled": record.enabled,
        "display_order": record.display_order,
        "created_at": record.created_at.to_rfc3339(),
        "updated_at": record.updated_at.to_rfc3339(),
    }))
}

/// POST `/api/providers/types`: provider type catalog.
pub async fn provider_types(
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    Ok(Json(json!({ "types": catalog() })).into_response())
}

/// Body accepted by `POST /api/providers`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProviderBody {
    /// Provider type label.
    #[serde(rename = "type")]
    pub kind: String,
    /// Provider name (lowercase alnum, `-`, `_`; at most 64).
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Upstream client identifier.
    #[serde(default)]
    pub client_id: String,
    /// Upstream client secret plaintext.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Per-category configuration.
    #[serde(default)]
    pub config: std::collections::BTreeMap<String, Value>,
    /// Whether the provider is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Sort order.
    #[serde(default)]
    pub display_order: u32,
}

/// Providers are enabled on creation unless stated otherwise.
const fn default_enabled() -> bool {
    true
}

/// POST `/api/providers` (201).
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<CreateProviderBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/providers", None)?;
    authorize_admin(&ctx, &resolved)?;
    let kind = ProviderKind::parse(&body.kind).ok_or_else(|| {
        ApiError::invalid_request(format!("unknown provider type: {}", body.kind))
    })?;
    let record = state.providers.create(
        &resolved.store,
        NewProvider {
            kind,
            name: ProviderName::new(body.name),
            display_name: body.display_name,
            client_id: body.client_id,
            client_secret: body.client_secret,
            config: body.config,
            enabled: body.enabled,
            display_order: body.display_order,
        },
    )?;
    let body = provider_body(&state, &resolved, &record)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// GET `/api/providers`.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/providers", None)?;
    authorize_admin(&ctx, &resolved)?;
    let records = state.providers.list(&resolved.store)?;
    let mut bodies = Vec::with_capacity(records.len());
    for record in &records {
        bodies.push(provider_body(&state, &resolved, record)?);
    }
    Ok(Json(json!({ "providers": bodies })).into_response())
}

/// GET `/api/providers/{name}`.
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/providers", None)?;
    authorize_admin(&ctx, &resolved)?;
    let record = state.providers.get(&resolved.store, &ProviderName::new(name))?;
    let body = provider_body(&state, &resolved, &record)?;
    Ok(Json(body).into_response())
}

/// Body accepted by `PUT /api/providers/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProviderBody {
    /// Replacement display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Replacement upstream client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Replacement secret (null clears it).
    #[serde(default)]
    pub client_secret: Option<Option<String>>,
    /// Replacement configuration.
    #[serde(default)]
    pub config: Option<std::collections::BTreeMap<String, Value>>,
    /// Replacement enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Replacement display order.
    #[serde(default)]
    pub display_order: Option<u32>,
}

/// PUT `/api/providers/{name}`.
pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<UpdateProviderBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/providers", None)?;
    authorize_admin(&ctx, &resolved)?;
    let record = state.providers.update(
        &resolved.store,
        &ProviderName::new(name),
        ProviderUpdate {
            display_name: body.display_name,
            client_id: body.client_id,
            client_secret: body.client_secret,
            config: body.config,
            enabled: body.enabled,
            display_order: body.display_order,
        },
    )?;
    let body = provider_body(&state, &resolved, &record)?;
    Ok(Json(body).into_response())
}

/// DELETE `/api/providers/{name}`.
pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/providers", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.providers.delete(&resolved.store, &ProviderName::new(name))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ============================================================================
// SECTION: Users
// ============================================================================

/// Body accepted by `POST /api/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserBody {
    /// Email address.
    pub email: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// POST `/api/users` (201).
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<CreateUserBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user = state.users.create(
        &resolved.store,
        NewUser {
            email: body.email,
            name: body.name,
            metadata: body.metadata,
        },
    )?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// GET `/api/users`.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<ListTenantsQuery>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let users = state.users.list(&resolved.store, query.limit, query.offset)?;
    Ok(Json(json!({ "users": users })).into_response())
}

/// GET `/api/users/{id}`.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user = state.users.get(&resolved.store, &UserId::new(id))?;
    Ok(Json(user).into_response())
}

/// Body accepted by `PUT /api/users/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserBody {
    /// Replacement display name (null clears it).
    #[serde(default)]
    pub name: Option<Option<String>>,
    /// Replacement metadata (null clears it).
    #[serde(default)]
    pub metadata: Option<Option<Value>>,
    /// Replacement password-reset flag.
    #[serde(default)]
    pub password_reset_required: Option<bool>,
}

/// PUT `/api/users/{id}`.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user = state.users.update(
        &resolved.store,
        &UserId::new(id),
        UserUpdate {
            name: body.name,
            metadata: body.metadata,
            password_reset_required: body.password_reset_required,
        },
    )?;
    Ok(Json(user).into_response())
}

/// DELETE `/api/users/{id}` (soft delete).
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user = state.users.set_status(&resolved.store, &UserId::new(id), UserStatus::Deleted)?;
    Ok(Json(user).into_response())
}

/// POST `/api/users/{id}/suspend`: suspends and revokes sessions.
pub async fn suspend_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user_id = UserId::new(id);
    let user = state.users.set_status(&resolved.store, &user_id, UserStatus::Suspended)?;
    let revoked = state.sessions.revoke_user_sessions(&resolved.store, &user_id)?;
    Ok(Json(json!({ "user": user, "revoked_sessions": revoked })).into_response())
}

/// POST `/api/users/{id}/unsuspend`.
pub async fn unsuspend_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let user = state.users.set_status(&resolved.store, &UserId::new(id), UserStatus::Active)?;
    Ok(Json(user).into_response())
}

/// Body accepted by identity link requests.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkIdentityBody {
    /// Provider name.
    pub provider: String,
    /// Stable subject at the provider.
    pub provider_user_id: String,
    /// Optional raw provider data.
    #[serde(default)]
    pub provider_data: Option<Value>,
}

/// POST `/api/users/{id}/identities` (201).
pub async fn link_identity(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<LinkIdentityBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let identity = state.users.link_identity(
        &resolved.store,
        &UserId::new(id),
        &ProviderName::new(body.provider),
        &body.provider_user_id,
        body.provider_data,
    )?;
    Ok((StatusCode::CREATED, Json(identity)).into_response())
}

/// DELETE `/api/users/{id}/identities/{provider}/{provider_user_id}`.
pub async fn unlink_identity(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((_, provider, provider_user_id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/api/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.users.unlink_identity(
        &resolved.store,
        &ProviderName::new(provider),
        &provider_user_id,
    )?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ============================================================================
// SECTION: RBAC
// ============================================================================

/// Body accepted by `POST /rbac/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct RbacCheckBody {
    /// User under evaluation.
    pub user_id: String,
    /// Client scoping the permissions.
    pub client_id: String,
    /// Permission name under test.
    pub permission: String,
}

/// POST `/rbac/check`.
pub async fn rbac_check(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<RbacCheckBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/check", None)?;
    ctx.require_tenant_match(resolved.tenant.id.as_str())?;
    let allowed = state.rbac.check(
        &resolved.store,
        &UserId::new(body.user_id),
        &ClientId::new(body.client_id),
        &body.permission,
    )?;
    Ok(Json(json!({ "allowed": allowed })).into_response())
}

/// Body accepted by `POST /rbac/check/batch`.
#[derive(Debug, Clone, Deserialize)]
pub struct RbacBatchBody {
    /// User under evaluation.
    pub user_id: String,
    /// Client scoping the permissions.
    pub client_id: String,
    /// Permission names under test.
    pub permissions: Vec<String>,
}

/// POST `/rbac/check/batch`.
pub async fn rbac_check_batch(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<RbacBatchBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/check/batch", None)?;
    ctx.require_tenant_match(resolved.tenant.id.as_str())?;
    let results = state.rbac.check_batch(
        &resolved.store,
        &UserId::new(body.user_id),
        &ClientId::new(body.client_id),
        &body.permissions,
    )?;
    Ok(Json(json!({ "results": results })).into_response())
}

/// GET `/rbac/roles`.
pub async fn rbac_list_roles(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/roles", None)?;
    ctx.require_tenant_match(resolved.tenant.id.as_str())?;
    let roles = state.rbac.list_roles(&resolved.store)?;
    Ok(Json(json!({ "roles": roles })).into_response())
}

/// GET `/rbac/permissions`.
pub async fn rbac_list_permissions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/permissions", None)?;
    ctx.require_tenant_match(resolved.tenant.id.as_str())?;
    let client_id = query.get("client_id").map(|id| ClientId::new(id.clone()));
    let permissions = state.rbac.list_permissions(&resolved.store, client_id.as_ref())?;
    Ok(Json(json!({ "permissions": permissions })).into_response())
}

/// Body accepted by `POST /rbac/roles`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleBody {
    /// Role name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether this is an undeletable system role.
    #[serde(default)]
    pub is_system_role: bool,
}

/// POST `/rbac/roles` (201).
pub async fn rbac_create_role(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<CreateRoleBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/roles", None)?;
    authorize_admin(&ctx, &resolved)?;
    let role = state.rbac.create_role(
        &resolved.store,
        &body.name,
        body.description,
        body.is_system_role,
    )?;
    Ok((StatusCode::CREATED, Json(role)).into_response())
}

/// DELETE `/rbac/roles/{id}`.
pub async fn rbac_delete_role(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/roles", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.rbac.delete_role(&resolved.store, &RoleId::new(id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Body accepted by `POST /rbac/permissions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermissionBody {
    /// Qualified permission name.
    pub name: String,
    /// Owning client.
    pub client_id: String,
    /// Resource component.
    pub resource: String,
    /// Action component.
    pub action: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// POST `/rbac/permissions` (201).
pub async fn rbac_create_permission(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<CreatePermissionBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/permissions", None)?;
    authorize_admin(&ctx, &resolved)?;
    let permission = state.rbac.create_permission(
        &resolved.store,
        &ClientId::new(body.client_id),
        &body.name,
        &body.resource,
        &body.action,
        body.description,
    )?;
    Ok((StatusCode::CREATED, Json(permission)).into_response())
}

/// DELETE `/rbac/permissions/{id}`.
pub async fn rbac_delete_permission(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/permissions", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.rbac.delete_permission(&resolved.store, &PermissionId::new(id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Body accepted by role-permission grants.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantBody {
    /// Granted permission.
    pub permission_id: String,
}

/// POST `/rbac/roles/{id}/permissions` (201).
pub async fn rbac_grant_permission(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<GrantBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/roles", None)?;
    authorize_admin(&ctx, &resolved)?;
    let grant = state.rbac.grant_permission(
        &resolved.store,
        &RoleId::new(id),
        &PermissionId::new(body.permission_id),
        &UserId::new(ctx.claims.sub.clone()),
    )?;
    Ok((StatusCode::CREATED, Json(grant)).into_response())
}

/// DELETE `/rbac/roles/{id}/permissions/{permission_id}`.
pub async fn rbac_revoke_permission(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((id, permission_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/roles", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.rbac.revoke_permission(
        &resolved.store,
        &RoleId::new(id),
        &PermissionId::new(permission_id),
    )?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Body accepted by role assignments.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRoleBody {
    /// Assigned role.
    pub role_id: String,
    /// Optional expiry in unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// POST `/rbac/users/{id}/roles` (201).
pub async fn rbac_assign_role(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleBody>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    let assignment = state.rbac.assign_role(
        &resolved.store,
        &UserId::new(id),
        &RoleId::new(body.role_id),
        &UserId::new(ctx.claims.sub.clone()),
        body.expires_at.map(Timestamp::from_unix),
    )?;
    Ok((StatusCode::CREATED, Json(assignment)).into_response())
}

/// DELETE `/rbac/users/{id}/roles/{role_id}`.
pub async fn rbac_revoke_role(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path((id, role_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let resolved = tenancy::resolve(&state, &headers, "/rbac/users", None)?;
    authorize_admin(&ctx, &resolved)?;
    state.rbac.revoke_role(&resolved.store, &UserId::new(id), &RoleId::new(role_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Query parameters accepted by `GET /api/audit/events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditEventsQuery {
    /// Filter by subject key.
    #[serde(default)]
    pub subject: Option<String>,
    /// Filter by event type label.
    #[serde(default)]
    pub event_type: Option<String>,
    /// Filter by client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Inclusive lower bound in unix milliseconds.
    #[serde(default)]
    pub from_ms: Option<i64>,
    /// Exclusive upper bound in unix milliseconds.
    #[serde(default)]
    pub until_ms: Option<i64>,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
}

/// GET `/api/audit/events`: local-region audit query.
pub async fn audit_events(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<AuditEventsQuery>,
) -> Result<Response, ApiError> {
    ctx.require_scope("admin")?;
    let event_type = match query.event_type.as_deref() {
        None => None,
        Some("generated") => Some(signet_core::TokenEventType::Generated),
        Some("refreshed") => Some(signet_core::TokenEventType::Refreshed),
        Some("revoked") => Some(signet_core::TokenEventType::Revoked),
        Some("reused") => Some(signet_core::TokenEventType::Reused),
        Some(other) => {
            return Err(ApiError::invalid_request(format!("unknown event type: {other}")));
        }
    };
    let events = state.audit.query(&AuditQuery {
        subject: query.subject,
        event_type,
        client_id: query.client_id.map(ClientId::new),
        from_ms: query.from_ms,
        until_ms: query.until_ms,
        limit: Some(query.limit),
        offset: query.offset,
    })?;
    let metrics = state.audit.metrics();
    Ok(Json(json!({
        "events": events,
        "metrics": {
            "success_count": metrics.success_count,
            "failure_count": metrics.failure_count,
            "failure_rate": metrics.failure_rate,
            "last_failure_ms": metrics.last_failure_ms,
        },
    }))
    .into_response())
}
