// crates/signet-server/src/state.rs
// ============================================================================
// Module: Application State
// Description: Engine wiring and startup key loading.
// Purpose: Build every runtime engine once and share them across handlers.
// Dependencies: signet-core, signet-providers, signet-store-sqlite
// ============================================================================

//! ## Overview
//! All engines are created at startup from configuration and injected
//! through one shared state value; tests substitute fakes by building the
//! state from their own configuration. Signing keys are loaded from the
//! global store when present and generated (and persisted) otherwise, so
//! restarts keep old tokens verifiable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use signet_core::AeadKey;
use signet_core::AuditRecorder;
use signet_core::AuditStore;
use signet_core::ClientRegistry;
use signet_core::CookieCodec;
use signet_core::InMemoryAuditStore;
use signet_core::NoopReplicationQueue;
use signet_core::RbacEngine;
use signet_core::SessionEngine;
use signet_core::SigningKeySet;
use signet_core::StoredKeySet;
use signet_core::TenantRegistry;
use signet_core::TenantResolver;
use signet_core::TokenEngine;
use signet_core::UserRegistry;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::MemoryStore;
use signet_core::store::read_json;
use signet_core::store::write_json;
use signet_providers::CodeProvider;
use signet_providers::DynamicProviderRegistry;
use signet_providers::MinimumLengthPolicy;
use signet_providers::PasswordProvider;
use signet_store_sqlite::SqliteStore;
use signet_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::audit::FileAuditStore;
use crate::config::AuditSinkType;
use crate::config::SignetConfig;
use crate::config::StoreType;
use crate::middleware::TokenVerifier;
use crate::ratelimit::SlidingWindowLimiter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Startup errors raised while wiring the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration is unusable.
    #[error("startup config error: {0}")]
    Config(String),
    /// Storage backend failed to open.
    #[error("startup storage error: {0}")]
    Storage(String),
    /// Key material failed to load or generate.
    #[error("startup key error: {0}")]
    Keys(String),
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared application state injected into every handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: SignetConfig,
    /// Tenant resolver (owns the tenant registry).
    pub resolver: TenantResolver,
    /// Tenant registry shared with admin routes.
    pub tenants: Arc<TenantRegistry>,
    /// Client registry.
    pub clients: ClientRegistry,
    /// Dynamic provider registry.
    pub providers: DynamicProviderRegistry,
    /// Local password provider.
    pub password: PasswordProvider,
    /// One-time code provider.
    pub code: CodeProvider,
    /// Session engine.
    pub sessions: SessionEngine,
    /// RBAC engine.
    pub rbac: RbacEngine,
    /// Token engine.
    pub tokens: TokenEngine,
    /// User registry.
    pub users: UserRegistry,
    /// Audit recorder for the local region.
    pub audit: AuditRecorder,
    /// Local region audit store (for query routes).
    pub audit_store: Arc<dyn AuditStore>,
    /// Session cookie codec.
    pub cookie_codec: CookieCodec,
    /// Signing key set shared with middleware.
    pub keys: Arc<SigningKeySet>,
    /// Bearer token verifier used by the middleware layer.
    pub verifier: TokenVerifier,
    /// Outbound HTTP client for upstream providers.
    pub http: reqwest::Client,
    /// Request rate limiter.
    pub limiter: SlidingWindowLimiter,
}

impl AppState {
    /// Builds the application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when storage, secrets, or keys fail to load.
    pub fn build(config: SignetConfig) -> Result<Arc<Self>, StartupError> {
        config.validate().map_err(|err| StartupError::Config(err.to_string()))?;
        let store = build_store(&config)?;

        let cookie_key = load_secret(config.secrets.cookie_secret.as_deref())?;
        let encryption_key = load_secret(config.secrets.encryption_secret.as_deref())?;
        let keys = Arc::new(load_or_generate_keys(store.as_ref())?);

        let tenants = Arc::new(TenantRegistry::new(Arc::clone(&store)));
        let resolver = TenantResolver::new(
            Arc::clone(&tenants),
            Arc::clone(&store),
            config.server.base_domain.clone(),
        );
        let clients = ClientRegistry::with_tuning(
            Arc::clone(&store),
            config.breaker_config(),
            config.retry_policy(),
            Arc::new(NoopReplicationQueue),
        );
        let providers =
            DynamicProviderRegistry::with_cache(encryption_key.clone(), config.cache_config());
        let password =
            PasswordProvider::new(cookie_key.clone(), Box::new(MinimumLengthPolicy::default()));
        let code = CodeProvider::new(cookie_key.clone());
        let sessions = SessionEngine::new(config.session_config());
        let rbac = RbacEngine::new(config.rbac_config());
        let tokens = TokenEngine::new(Arc::clone(&keys), config.token_config());
        let audit_store = build_audit_store(&config)?;
        let audit = AuditRecorder::new(Arc::clone(&audit_store));
        let limiter = SlidingWindowLimiter::new(
            config.rate_limit.enabled,
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| StartupError::Config(err.to_string()))?;

        Ok(Arc::new(Self {
            config,
            resolver,
            tenants,
            clients,
            providers,
            password,
            code,
            sessions,
            rbac,
            tokens,
            users: UserRegistry::new(),
            audit,
            audit_store,
            cookie_codec: CookieCodec::new(cookie_key),
            verifier: TokenVerifier::LocalKeys(Arc::clone(&keys)),
            keys,
            http,
            limiter,
        }))
    }

    /// Returns the configured issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.config.server.issuer
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds the storage backend from configuration.
fn build_store(config: &SignetConfig) -> Result<Arc<dyn KeyValueStore>, StartupError> {
    match config.store.store_type {
        StoreType::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreType::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| StartupError::Config("sqlite store requires path".to_string()))?;
            let store = SqliteStore::open(&SqliteStoreConfig {
                path,
                busy_timeout_ms: 5_000,
                journal_mode: config.store.journal_mode,
                sync_mode: config.store.sync_mode,
            })
            .map_err(|err| StartupError::Storage(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Builds the local-region audit store from configuration.
fn build_audit_store(config: &SignetConfig) -> Result<Arc<dyn AuditStore>, StartupError> {
    match config.audit.sink {
        AuditSinkType::Memory => Ok(Arc::new(InMemoryAuditStore::new())),
        AuditSinkType::File => {
            let path = config
                .audit
                .path
                .clone()
                .ok_or_else(|| StartupError::Config("file audit sink requires path".to_string()))?;
            let store = FileAuditStore::open(&path)
                .map_err(|err| StartupError::Storage(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Parses a configured secret or generates a fresh one (development only).
fn load_secret(encoded: Option<&str>) -> Result<AeadKey, StartupError> {
    match encoded {
        Some(encoded) => {
            AeadKey::from_base64(encoded).map_err(|err| StartupError::Keys(err.to_string()))
        }
        None => {
            tracing::warn!("no secret configured; generating an ephemeral one");
            Ok(AeadKey::generate())
        }
    }
}

/// Loads the signing key set from storage or generates and persists one.
fn load_or_generate_keys(store: &dyn KeyValueStore) -> Result<SigningKeySet, StartupError> {
    let key = KeyPath::from_segments(&["keys", "jwt"]);
    if let Ok(Some(stored)) = read_json::<StoredKeySet>(store, &key)
        && let Ok(keys) = SigningKeySet::from_stored(&stored)
    {
        return Ok(keys);
    }
    let keys = SigningKeySet::generate().map_err(|err| StartupError::Keys(err.to_string()))?;
    write_json(store, &key, &keys.to_stored(), None)
        .map_err(|err| StartupError::Keys(err.to_string()))?;
    Ok(keys)
}
