// crates/signet-core/src/runtime/tenants.rs
// ============================================================================
// Module: Tenant Registry + Resolver
// Description: Tenant lifecycle, request resolution, and branding fallback.
// Purpose: Partition the issuer per tenant and gate non-active tenants.
// Dependencies: crate::core, crate::store, crate::runtime::cache
// ============================================================================

//! ## Overview
//! The registry owns tenant lifecycle against the global store; the resolver
//! derives the tenant for an inbound request from (in order) custom domain,
//! subdomain, path prefix, header, query parameter, and finally the reserved
//! `default` tenant, returning a tenant-scoped storage handle alongside the
//! record. Branding resolution is explicit config, then the default tenant's
//! branding (cached for one hour), then the built-in theme.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::identifiers::TenantId;
use crate::core::tenant::Branding;
use crate::core::tenant::Tenant;
use crate::core::tenant::TenantSettings;
use crate::core::tenant::TenantStatus;
use crate::core::time::Timestamp;
use crate::runtime::cache::CacheConfig;
use crate::runtime::cache::TtlLruCache;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;
use crate::store::TenantScopedStore;
use crate::store::read_json;
use crate::store::write_json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cache key for the default tenant's branding.
const DEFAULT_BRANDING_CACHE_KEY: &str = "branding:default";
/// Default-tenant branding cache lifetime.
const BRANDING_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
/// Maximum tenant name length.
const MAX_TENANT_NAME_LENGTH: usize = 200;
/// Path prefix that carries a tenant slug.
const TENANT_PATH_PREFIX: &str = "/tenants/";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant registry and resolver errors.
///
/// # Invariants
/// - Variants map 1:1 to the stable domain error codes.
#[derive(Debug, Error)]
pub enum TenantError {
    /// No tenant exists for the identifier or domain.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    /// Tenant exists but is suspended.
    #[error("tenant suspended: {0}")]
    TenantSuspended(String),
    /// Tenant exists but is soft-deleted.
    #[error("tenant deleted: {0}")]
    TenantDeleted(String),
    /// Tenant or domain already exists.
    #[error("tenant conflict: {0}")]
    Conflict(String),
    /// Status transition is not permitted.
    #[error("invalid tenant status transition: {0}")]
    InvalidTransition(String),
    /// Input failed validation.
    #[error("invalid tenant input: {0}")]
    InvalidInput(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Input for tenant creation.
#[derive(Debug, Clone)]
pub struct NewTenant {
    /// Tenant identifier (stable, opaque).
    pub id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Optional custom domain.
    pub domain: Option<String>,
    /// Branding overrides.
    pub branding: Branding,
    /// Issuer settings.
    pub settings: TenantSettings,
    /// Initial status.
    pub status: TenantStatus,
}

/// Partial update for an existing tenant.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement domain (`Some(None)` clears it).
    pub domain: Option<Option<String>>,
    /// Replacement status (transition-gated).
    pub status: Option<TenantStatus>,
    /// Replacement branding.
    pub branding: Option<Branding>,
    /// Replacement settings.
    pub settings: Option<TenantSettings>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Tenant registry over the global store.
///
/// # Invariants
/// - Tenant records and the domain index live outside any tenant prefix.
/// - The default-tenant branding cache is invalidated on every default-tenant
///   update.
pub struct TenantRegistry {
    /// Global storage adapter.
    store: Arc<dyn KeyValueStore>,
    /// Default-tenant branding cache.
    branding_cache: TtlLruCache<Branding>,
}

impl TenantRegistry {
    /// Creates a registry over the global store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            branding_cache: TtlLruCache::new(CacheConfig {
                ttl: BRANDING_CACHE_TTL,
                max_size: 4,
            }),
        }
    }

    /// Returns the storage key for a tenant record.
    fn tenant_key(id: &TenantId) -> KeyPath {
        KeyPath::from_segments(&["tenants", id.as_str()])
    }

    /// Returns the storage key for a domain index entry.
    fn domain_key(domain: &str) -> KeyPath {
        KeyPath::from_segments(&["tenant_domains", domain])
    }

    /// Creates a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::Conflict`] when the id or domain is taken and
    /// [`TenantError::InvalidInput`] when validation fails.
    pub fn create(&self, input: NewTenant) -> Result<Tenant, TenantError> {
        if input.id.as_str().is_empty() {
            return Err(TenantError::InvalidInput("tenant id must not be empty".to_string()));
        }
        if input.name.is_empty() || input.name.len() > MAX_TENANT_NAME_LENGTH {
            return Err(TenantError::InvalidInput("tenant name length out of range".to_string()));
        }
        if input.settings.max_accounts_per_session == 0 {
            return Err(TenantError::InvalidInput(
                "max_accounts_per_session must be at least 1".to_string(),
            ));
        }
        let key = Self::tenant_key(&input.id);
        if read_json::<Tenant>(self.store.as_ref(), &key)?.is_some() {
            return Err(TenantError::Conflict(format!("tenant exists: {}", input.id)));
        }
        if let Some(domain) = &input.domain
            && read_json::<TenantId>(self.store.as_ref(), &Self::domain_key(domain))?.is_some()
        {
            return Err(TenantError::Conflict(format!("domain taken: {domain}")));
        }
        let now = Timestamp::now();
        let tenant = Tenant {
            id: input.id,
            domain: input.domain,
            name: input.name,
            status: input.status,
            branding: input.branding,
            settings: input.settings,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        write_json(self.store.as_ref(), &key, &tenant, None)?;
        if let Some(domain) = &tenant.domain {
            write_json(self.store.as_ref(), &Self::domain_key(domain), &tenant.id, None)?;
        }
        Ok(tenant)
    }

    /// Returns a tenant by identifier regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::TenantNotFound`] when no record exists.
    pub fn get(&self, id: &TenantId) -> Result<Tenant, TenantError> {
        read_json::<Tenant>(self.store.as_ref(), &Self::tenant_key(id))?
            .ok_or_else(|| TenantError::TenantNotFound(id.to_string()))
    }

    /// Returns a tenant gated to active status.
    ///
    /// # Errors
    ///
    /// Returns the status-specific error for suspended, deleted, or pending
    /// tenants.
    pub fn get_active(&self, id: &TenantId) -> Result<Tenant, TenantError> {
        let tenant = self.get(id)?;
        match tenant.status {
            TenantStatus::Active => Ok(tenant),
            TenantStatus::Suspended => Err(TenantError::TenantSuspended(id.to_string())),
            TenantStatus::Deleted => Err(TenantError::TenantDeleted(id.to_string())),
            TenantStatus::Pending => Err(TenantError::TenantNotFound(id.to_string())),
        }
    }

    /// Returns a tenant by custom domain.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::TenantNotFound`] when the domain is unmapped.
    pub fn get_by_domain(&self, domain: &str) -> Result<Tenant, TenantError> {
        let id = read_json::<TenantId>(self.store.as_ref(), &Self::domain_key(domain))?
            .ok_or_else(|| TenantError::TenantNotFound(domain.to_string()))?;
        self.get(&id)
    }

    /// Applies a partial update with gated status transitions.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::InvalidTransition`] for a disallowed status
    /// change and [`TenantError::Conflict`] when a new domain is taken.
    pub fn update(&self, id: &TenantId, update: TenantUpdate) -> Result<Tenant, TenantError> {
        let mut tenant = self.get(id)?;
        if let Some(status) = update.status
            && status != tenant.status
        {
            if !tenant.status.can_transition_to(status) {
                return Err(TenantError::InvalidTransition(format!(
                    "{} -> {}",
                    tenant.status.as_str(),
                    status.as_str()
                )));
            }
            tenant.status = status;
            if status == TenantStatus::Deleted {
                tenant.deleted_at = Some(Timestamp::now());
            }
        }
        if let Some(name) = update.name {
            if name.is_empty() || name.len() > MAX_TENANT_NAME_LENGTH {
                return Err(TenantError::InvalidInput(
                    "tenant name length out of range".to_string(),
                ));
            }
            tenant.name = name;
        }
        if let Some(domain) = update.domain
            && domain != tenant.domain
        {
            if let Some(new_domain) = &domain
                && read_json::<TenantId>(self.store.as_ref(), &Self::domain_key(new_domain))?
                    .is_some()
            {
                return Err(TenantError::Conflict(format!("domain taken: {new_domain}")));
            }
            if let Some(old_domain) = &tenant.domain {
                self.store.remove(&Self::domain_key(old_domain))?;
            }
            if let Some(new_domain) = &domain {
                write_json(self.store.as_ref(), &Self::domain_key(new_domain), &tenant.id, None)?;
            }
            tenant.domain = domain;
        }
        if let Some(branding) = update.branding {
            tenant.branding = branding;
        }
        if let Some(settings) = update.settings {
            if settings.max_accounts_per_session == 0 {
                return Err(TenantError::InvalidInput(
                    "max_accounts_per_session must be at least 1".to_string(),
                ));
            }
            tenant.settings = settings;
        }
        tenant.updated_at = Timestamp::now();
        write_json(self.store.as_ref(), &Self::tenant_key(id), &tenant, None)?;
        if tenant.id.is_default() {
            self.branding_cache.invalidate(DEFAULT_BRANDING_CACHE_KEY);
        }
        Ok(tenant)
    }

    /// Soft-deletes a tenant (status becomes `deleted`).
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::InvalidTransition`] when already deleted.
    pub fn soft_delete(&self, id: &TenantId) -> Result<Tenant, TenantError> {
        self.update(
            id,
            TenantUpdate {
                status: Some(TenantStatus::Deleted),
                ..TenantUpdate::default()
            },
        )
    }

    /// Lists tenants, optionally filtered by status, with pagination.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::Store`] when the scan fails.
    pub fn list(
        &self,
        status: Option<TenantStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Tenant>, TenantError> {
        let prefix = KeyPath::from_segments(&["tenants"]);
        let mut tenants: Vec<Tenant> = self
            .store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .filter(|tenant: &Tenant| status.is_none_or(|wanted| tenant.status == wanted))
            .collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tenants.into_iter().skip(offset).take(limit).collect())
    }

    /// Resolves effective branding: explicit, then default tenant, then built-in.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::Store`] when the default tenant read fails.
    pub fn branding_for(&self, tenant: &Tenant) -> Result<Branding, TenantError> {
        let default_branding = if tenant.id.is_default() {
            Branding::default()
        } else {
            self.default_branding()?
        };
        let base = default_branding.merged_over(&Branding::builtin());
        Ok(tenant.branding.merged_over(&base))
    }

    /// Returns the default tenant's branding, served from the one-hour cache.
    fn default_branding(&self) -> Result<Branding, TenantError> {
        if let Some(branding) = self.branding_cache.get(DEFAULT_BRANDING_CACHE_KEY) {
            return Ok(branding);
        }
        let branding = match self.get(&TenantId::default_tenant()) {
            Ok(tenant) => tenant.branding,
            Err(TenantError::TenantNotFound(_)) => Branding::default(),
            Err(err) => return Err(err),
        };
        self.branding_cache.insert(DEFAULT_BRANDING_CACHE_KEY, branding.clone());
        Ok(branding)
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Request attributes consulted during tenant resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRequest<'a> {
    /// `Host` header value, possibly with a port.
    pub host: Option<&'a str>,
    /// Request path.
    pub path: &'a str,
    /// `X-Tenant-ID` header value.
    pub tenant_header: Option<&'a str>,
    /// `?tenant=` query parameter value.
    pub tenant_query: Option<&'a str>,
}

/// Resolved tenant plus its scoped storage handle.
pub struct ResolvedTenant {
    /// Tenant record.
    pub tenant: Tenant,
    /// Storage handle confined to the tenant's key space.
    pub store: TenantScopedStore,
}

/// Tenant resolver for inbound requests.
///
/// # Invariants
/// - Resolution order: custom domain, subdomain, path prefix, header, query,
///   then the reserved default tenant.
pub struct TenantResolver {
    /// Tenant registry.
    registry: Arc<TenantRegistry>,
    /// Global adapter for building scoped handles.
    store: Arc<dyn KeyValueStore>,
    /// Base domain for subdomain resolution.
    base_domain: Option<String>,
}

impl TenantResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        registry: Arc<TenantRegistry>,
        store: Arc<dyn KeyValueStore>,
        base_domain: Option<String>,
    ) -> Self {
        Self {
            registry,
            store,
            base_domain,
        }
    }

    /// Returns the tenant registry behind this resolver.
    #[must_use]
    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    /// Returns a scoped handle for an already-known tenant id.
    #[must_use]
    pub fn scoped_store(&self, tenant_id: &TenantId) -> TenantScopedStore {
        TenantScopedStore::new(Arc::clone(&self.store), tenant_id.clone())
    }

    /// Resolves the tenant for an inbound request and gates its status.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::TenantNotFound`], [`TenantError::TenantSuspended`],
    /// or [`TenantError::TenantDeleted`] per the resolved tenant's status.
    pub fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<ResolvedTenant, TenantError> {
        let tenant = self.resolve_tenant(request)?;
        let store = self.scoped_store(&tenant.id);
        Ok(ResolvedTenant { tenant, store })
    }

    /// Applies the resolution order and status gating.
    fn resolve_tenant(&self, request: &ResolutionRequest<'_>) -> Result<Tenant, TenantError> {
        let host = request.host.map(strip_port);
        if let Some(host) = host {
            match self.registry.get_by_domain(host) {
                Ok(tenant) => return gate(tenant),
                Err(TenantError::TenantNotFound(_)) => {}
                Err(err) => return Err(err),
            }
            if let Some(base) = &self.base_domain
                && let Some(slug) = host.strip_suffix(base.as_str())
                && let Some(slug) = slug.strip_suffix('.')
                && !slug.is_empty()
                && !slug.contains('.')
            {
                return gate(self.registry.get(&TenantId::new(slug))?);
            }
        }
        if let Some(rest) = request.path.strip_prefix(TENANT_PATH_PREFIX) {
            let slug = rest.split('/').next().unwrap_or_default();
            if !slug.is_empty() {
                return gate(self.registry.get(&TenantId::new(slug))?);
            }
        }
        if let Some(header) = request.tenant_header
            && !header.is_empty()
        {
            return gate(self.registry.get(&TenantId::new(header))?);
        }
        if let Some(query) = request.tenant_query
            && !query.is_empty()
        {
            return gate(self.registry.get(&TenantId::new(query))?);
        }
        match self.registry.get(&TenantId::default_tenant()) {
            Ok(tenant) => gate(tenant),
            // The default tenant is implicit: resolution succeeds even before
            // an administrator has materialized the record.
            Err(TenantError::TenantNotFound(_)) => Ok(implicit_default_tenant()),
            Err(err) => Err(err),
        }
    }
}

/// Gates a tenant by status, mapping non-active statuses to errors.
fn gate(tenant: Tenant) -> Result<Tenant, TenantError> {
    match tenant.status {
        TenantStatus::Active => Ok(tenant),
        TenantStatus::Suspended => Err(TenantError::TenantSuspended(tenant.id.to_string())),
        TenantStatus::Deleted => Err(TenantError::TenantDeleted(tenant.id.to_string())),
        TenantStatus::Pending => Err(TenantError::TenantNotFound(tenant.id.to_string())),
    }
}

/// Strips a `:port` suffix from a host value.
fn strip_port(host: &str) -> &str {
    host.rsplit_once(':').map_or(host, |(name, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) { name } else { host }
    })
}

/// Returns the implicit default tenant used before explicit creation.
fn implicit_default_tenant() -> Tenant {
    let now = Timestamp::now();
    Tenant {
        id: TenantId::default_tenant(),
        domain: None,
        name: "Default".to_string(),
        status: TenantStatus::Active,
        branding: Branding::default(),
        settings: TenantSettings::default(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}
