// crates/signet-providers/src/registry.rs
// ============================================================================
// Module: Dynamic Provider Registry
// Description: Tenant provider CRUD with encrypted secrets and caching.
// Purpose: Persist and materialize per-tenant identity provider config.
// Dependencies: signet-core, crate::catalog, crate::oauth2
// ============================================================================

//! ## Overview
//! Provider records are stored per `(tenant, name)` with the upstream client
//! secret AEAD-encrypted under the process encryption key, using the tenant
//! and name as associated data so a record cannot be replayed across
//! tenants. Reads go through a TTL/LRU cache keyed
//! `provider:<tenant>:<name>`; admin mutations invalidate the affected entry
//! and tenant edits clear the whole tenant prefix. Secrets decrypt only when
//! a provider instance is materialized for a flow, and admin reads see at
//! most the last four characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use signet_core::AeadKey;
use signet_core::ProviderKind;
use signet_core::ProviderName;
use signet_core::ProviderRecord;
use signet_core::Timestamp;
use signet_core::TtlLruCache;
use signet_core::crypto::aead;
use signet_core::crypto::secrets;
use signet_core::runtime::cache::CacheConfig;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::TenantScopedStore;
use signet_core::store::read_json;
use signet_core::store::write_json;

use crate::ProviderError;
use crate::catalog::InterpolationVars;
use crate::catalog::descriptor_for;
use crate::oauth2::UpstreamOAuthProvider;

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Input for provider creation.
#[derive(Debug, Clone)]
pub struct NewProvider {
    /// Provider kind.
    pub kind: ProviderKind,
    /// Provider name, unique per tenant.
    pub name: ProviderName,
    /// Display name for login UIs.
    pub display_name: String,
    /// Upstream client identifier.
    pub client_id: String,
    /// Upstream client secret plaintext (encrypted before persistence).
    pub client_secret: Option<String>,
    /// Per-category configuration (endpoint overrides, scopes, realm).
    pub config: BTreeMap<String, Value>,
    /// Whether the provider is available for flows.
    pub enabled: bool,
    /// Sort order for login UIs.
    pub display_order: u32,
}

/// Partial update for an existing provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderUpdate {
    /// Replacement display name.
    pub display_name: Option<String>,
    /// Replacement upstream client id.
    pub client_id: Option<String>,
    /// Replacement secret (`Some(None)` clears it).
    pub client_secret: Option<Option<String>>,
    /// Replacement configuration.
    pub config: Option<BTreeMap<String, Value>>,
    /// Replacement enabled flag.
    pub enabled: Option<bool>,
    /// Replacement display order.
    pub display_order: Option<u32>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Dynamic provider registry.
///
/// # Invariants
/// - Secrets are sealed with `(tenant, name)` as associated data.
/// - The cache never holds decrypted secrets, only records.
pub struct DynamicProviderRegistry {
    /// Process encryption key for secrets at rest.
    encryption_key: AeadKey,
    /// Record cache keyed `provider:<tenant>:<name>`.
    cache: TtlLruCache<ProviderRecord>,
}

impl DynamicProviderRegistry {
    /// Creates a registry with the default cache tuning (60 s, 500 entries).
    #[must_use]
    pub fn new(encryption_key: AeadKey) -> Self {
        Self::with_cache(encryption_key, CacheConfig::default())
    }

    /// Creates a registry with explicit cache tuning.
    #[must_use]
    pub fn with_cache(encryption_key: AeadKey, cache: CacheConfig) -> Self {
        Self {
            encryption_key,
            cache: TtlLruCache::new(cache),
        }
    }

    /// Returns the storage key for a provider record.
    fn record_key(name: &ProviderName) -> KeyPath {
        KeyPath::from_segments(&["providers", name.as_str()])
    }

    /// Returns the cache key for a provider record.
    fn cache_key(store: &TenantScopedStore, name: &ProviderName) -> String {
        format!("provider:{}:{}", store.tenant_id(), name)
    }

    /// Returns the associated data binding a secret to its record.
    fn secret_aad(store: &TenantScopedStore, name: &ProviderName) -> Vec<u8> {
        format!("{}:{}", store.tenant_id(), name).into_bytes()
    }

    /// Creates a provider record, sealing the secret.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ProviderExists`] when the name is taken and
    /// [`ProviderError::InvalidInput`] for naming or secret-requirement
    /// violations.
    pub fn create(
        &self,
        store: &TenantScopedStore,
        input: NewProvider,
    ) -> Result<ProviderRecord, ProviderError> {
        if !input.name.is_valid() {
            return Err(ProviderError::InvalidInput(format!(
                "invalid provider name: {}",
                input.name
            )));
        }
        let descriptor = descriptor_for(input.kind);
        if descriptor.secret_required && input.client_secret.is_none() {
            return Err(ProviderError::InvalidInput(format!(
                "provider kind {} requires a client secret",
                input.kind.as_str()
            )));
        }
        let key = Self::record_key(&input.name);
        if read_json::<ProviderRecord>(store, &key)?.is_some() {
            return Err(ProviderError::ProviderExists(input.name.to_string()));
        }
        let secret = input
            .client_secret
            .as_deref()
            .map(|plaintext| {
                aead::seal(
                    &self.encryption_key,
                    plaintext.as_bytes(),
                    &Self::secret_aad(store, &input.name),
                )
            })
            .transpose()?;
        let now = Timestamp::now();
        let record = ProviderRecord {
            id: secrets::generate_id("prv"),
            tenant_id: store.tenant_id().clone(),
            kind: input.kind,
            name: input.name,
            display_name: input.display_name,
            client_id: input.client_id,
            secret,
            config: input.config,
            enabled: input.enabled,
            display_order: input.display_order,
            created_at: now,
            updated_at: now,
        };
        write_json(store, &key, &record, None)?;
        self.cache.invalidate(&Self::cache_key(store, &record.name));
        Ok(record)
    }

    /// Returns a provider record, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ProviderNotFound`] when absent.
    pub fn get(
        &self,
        store: &TenantScopedStore,
        name: &ProviderName,
    ) -> Result<ProviderRecord, ProviderError> {
        let cache_key = Self::cache_key(store, name);
        if let Some(record) = self.cache.get(&cache_key) {
            return Ok(record);
        }
        let record = read_json::<ProviderRecord>(store, &Self::record_key(name))?
            .ok_or_else(|| ProviderError::ProviderNotFound(name.to_string()))?;
        self.cache.insert(cache_key, record.clone());
        Ok(record)
    }

    /// Lists all providers of the tenant ordered by display order, then name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Store`] when the scan fails.
    pub fn list(&self, store: &TenantScopedStore) -> Result<Vec<ProviderRecord>, ProviderError> {
        let prefix = KeyPath::from_segments(&["providers"]);
        let mut records: Vec<ProviderRecord> = store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect();
        records.sort_by(|a, b| {
            a.display_order.cmp(&b.display_order).then_with(|| a.name.cmp(&b.name))
        });
        Ok(records)
    }

    /// Lists the enabled providers used during authorization.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Store`] when the scan fails.
    pub fn list_enabled(
        &self,
        store: &TenantScopedStore,
    ) -> Result<Vec<ProviderRecord>, ProviderError> {
        Ok(self.list(store)?.into_iter().filter(|record| record.enabled).collect())
    }

    /// Applies a partial update, resealing the secret when replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ProviderNotFound`] when absent.
    pub fn update(
        &self,
        store: &TenantScopedStore,
        name: &ProviderName,
        update: ProviderUpdate,
    ) -> Result<ProviderRecord, ProviderError> {
        let key = Self::record_key(name);
        let mut record = read_json::<ProviderRecord>(store, &key)?
            .ok_or_else(|| ProviderError::ProviderNotFound(name.to_string()))?;
        if let Some(display_name) = update.display_name {
            record.display_name = display_name;
        }
        if let Some(client_id) = update.client_id {
            record.client_id = client_id;
        }
        if let Some(secret) = update.client_secret {
            record.secret = secret
                .as_deref()
                .map(|plaintext| {
                    aead::seal(
                        &self.encryption_key,
                        plaintext.as_bytes(),
                        &Self::secret_aad(store, name),
                    )
                })
                .transpose()?;
        }
        if let Some(config) = update.config {
            record.config = config;
        }
        if let Some(enabled) = update.enabled {
            record.enabled = enabled;
        }
        if let Some(display_order) = update.display_order {
            record.display_order = display_order;
        }
        record.updated_at = Timestamp::now();
        write_json(store, &key, &record, None)?;
        self.cache.invalidate(&Self::cache_key(store, name));
        Ok(record)
    }

    /// Deletes a provider record.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ProviderNotFound`] when absent.
    pub fn delete(
        &self,
        store: &TenantScopedStore,
        name: &ProviderName,
    ) -> Result<(), ProviderError> {
        if store.remove(&Self::record_key(name))?.is_none() {
            return Err(ProviderError::ProviderNotFound(name.to_string()));
        }
        self.cache.invalidate(&Self::cache_key(store, name));
        Ok(())
    }

    /// Clears every cached provider of one tenant (called on tenant edits).
    pub fn invalidate_tenant(&self, tenant_id: &signet_core::TenantId) {
        self.cache.invalidate_prefix(&format!("provider:{tenant_id}:"));
    }

    /// Returns the masked secret (last four characters) for admin reads.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Crypto`] when the stored secret fails to
    /// decrypt.
    pub fn masked_secret(
        &self,
        store: &TenantScopedStore,
        record: &ProviderRecord,
    ) -> Result<Option<String>, ProviderError> {
        let Some(sealed) = &record.secret else {
            return Ok(None);
        };
        let plaintext =
            aead::open(&self.encryption_key, sealed, &Self::secret_aad(store, &record.name))?;
        let plaintext = String::from_utf8_lossy(&plaintext);
        Ok(Some(ProviderRecord::mask_secret(&plaintext)))
    }

    /// Materializes an upstream OAuth provider with its decrypted secret.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidInput`] for local (non-upstream)
    /// kinds and [`ProviderError::ProviderNotFound`] for missing or disabled
    /// records.
    pub fn materialize(
        &self,
        store: &TenantScopedStore,
        name: &ProviderName,
        vars: &InterpolationVars,
    ) -> Result<UpstreamOAuthProvider, ProviderError> {
        let record = self.get(store, name)?;
        if !record.enabled {
            return Err(ProviderError::ProviderNotFound(name.to_string()));
        }
        if !record.kind.is_upstream_oauth() {
            return Err(ProviderError::InvalidInput(format!(
                "provider {} does not use an upstream flow",
                record.name
            )));
        }
        let descriptor = descriptor_for(record.kind);
        let authorization_endpoint = endpoint(&record, "authorization_endpoint", descriptor
            .authorization_endpoint)
            .map(|template| vars.apply(&template))
            .ok_or_else(|| {
                ProviderError::InvalidInput("missing authorization endpoint".to_string())
            })?;
        let token_endpoint = endpoint(&record, "token_endpoint", descriptor.token_endpoint)
            .map(|template| vars.apply(&template))
            .ok_or_else(|| ProviderError::InvalidInput("missing token endpoint".to_string()))?;
        let userinfo_endpoint = endpoint(&record, "userinfo_endpoint", descriptor.userinfo_endpoint)
            .map(|template| vars.apply(&template));
        let client_secret = record
            .secret
            .as_ref()
            .map(|sealed| {
                aead::open(&self.encryption_key, sealed, &Self::secret_aad(store, name))
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .transpose()?;
        let scopes = record
            .config
            .get("scopes")
            .and_then(Value::as_array)
            .map(|values| {
                values.iter().filter_map(Value::as_str).map(ToString::to_string).collect()
            })
            .unwrap_or_else(|| {
                descriptor.default_scopes.iter().map(|scope| (*scope).to_string()).collect()
            });
        Ok(UpstreamOAuthProvider {
            name: record.name.clone(),
            kind: record.kind,
            client_id: record.client_id.clone(),
            client_secret,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            scopes,
            pkce_required: descriptor.pkce_required,
        })
    }
}

/// Returns the configured endpoint override or the catalog default.
fn endpoint(
    record: &ProviderRecord,
    config_key: &str,
    default_template: Option<&'static str>,
) -> Option<String> {
    record
        .config
        .get(config_key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| default_template.map(ToString::to_string))
}
