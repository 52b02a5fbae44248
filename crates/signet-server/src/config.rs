// crates/signet-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: Configuration loading and validation for the Signet issuer.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: signet-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits. Missing
//! or invalid configuration fails closed. Every tunable of the runtime
//! engines (sessions, RBAC, tokens, client retry/breaker, caches, tenant
//! resolution) is surfaced here with the documented defaults.
//! Security posture: config inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use signet_core::CircuitBreakerConfig;
use signet_core::RbacConfig;
use signet_core::RetryPolicy;
use signet_core::SessionConfig;
use signet_core::TokenConfig;
use signet_core::runtime::cache::CacheConfig;
use signet_store_sqlite::SqliteJournalMode;
use signet_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "signet.toml";
/// Environment variable used to override the config path.
const CONFIG_ENV_VAR: &str = "SIGNET_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Minimum accepted session lifetime in seconds.
const MIN_SESSION_LIFETIME_SECS: u64 = 60;
/// Maximum accepted accounts per browser session.
const MAX_ACCOUNTS_LIMIT: usize = 16;
/// Maximum accepted permissions-per-token budget.
const MAX_PERMISSIONS_LIMIT: usize = 500;
/// Maximum accepted retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Maximum accepted cache entries.
const MAX_CACHE_ENTRIES: usize = 100_000;
/// Default per-request deadline in seconds.
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 30;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing failed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A value failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// HTTP server and issuer identity settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Public issuer URL (scheme + host + optional port, no trailing slash).
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Per-request deadline in seconds.
    #[serde(default = "default_request_deadline")]
    pub request_deadline_secs: u64,
    /// Base domain for subdomain tenant resolution.
    #[serde(default)]
    pub base_domain: Option<String>,
    /// Region name stamped onto audit events.
    #[serde(default = "default_region")]
    pub region: String,
}

/// Default bind address (loopback).
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9876))
}

/// Default issuer URL for local development.
fn default_issuer() -> String {
    "http://localhost:9876".to_string()
}

/// Default per-request deadline.
const fn default_request_deadline() -> u64 {
    DEFAULT_REQUEST_DEADLINE_SECS
}

/// Default region label.
fn default_region() -> String {
    "local".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            issuer: default_issuer(),
            request_deadline_secs: default_request_deadline(),
            base_domain: None,
            region: default_region(),
        }
    }
}

/// Secret material settings.
///
/// # Invariants
/// - Secrets are standard base64 of exactly 32 bytes; absent secrets are
///   generated at startup (development only).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsSection {
    /// Cookie sealing key, standard base64 (32 bytes).
    #[serde(default)]
    pub cookie_secret: Option<String>,
    /// At-rest encryption key, standard base64 (32 bytes).
    #[serde(default)]
    pub encryption_secret: Option<String>,
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieSection {
    /// Cookie name.
    #[serde(default = "default_cookie_name")]
    pub name: String,
    /// Optional Domain attribute.
    #[serde(default)]
    pub domain: Option<String>,
    /// Whether the Secure flag is emitted (disable only for local dev).
    #[serde(default = "default_cookie_secure")]
    pub secure: bool,
}

/// Default cookie name.
fn default_cookie_name() -> String {
    "__session".to_string()
}

/// Default Secure flag.
const fn default_cookie_secure() -> bool {
    true
}

impl Default for CookieSection {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            secure: default_cookie_secure(),
        }
    }
}

/// Session engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Maximum accounts per browser session.
    #[serde(default = "default_max_accounts")]
    pub max_accounts_per_session: usize,
    /// Browser session lifetime in seconds.
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_seconds: u64,
    /// Sliding window in seconds.
    #[serde(default = "default_sliding_window")]
    pub sliding_window_seconds: u64,
}

/// Default account cap.
const fn default_max_accounts() -> usize {
    3
}

/// Default session lifetime (7 days).
const fn default_session_lifetime() -> u64 {
    7 * 24 * 60 * 60
}

/// Default sliding window (1 day).
const fn default_sliding_window() -> u64 {
    24 * 60 * 60
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_accounts_per_session: default_max_accounts(),
            session_lifetime_seconds: default_session_lifetime(),
            sliding_window_seconds: default_sliding_window(),
        }
    }
}

/// RBAC engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RbacSection {
    /// Maximum permissions embedded into a token.
    #[serde(default = "default_max_permissions")]
    pub max_permissions_in_token: usize,
    /// Permission cache TTL in seconds.
    #[serde(default = "default_rbac_cache_ttl")]
    pub permission_cache_ttl_seconds: u64,
}

/// Default token permission budget.
const fn default_max_permissions() -> usize {
    50
}

/// Default RBAC cache TTL.
const fn default_rbac_cache_ttl() -> u64 {
    60
}

impl Default for RbacSection {
    fn default() -> Self {
        Self {
            max_permissions_in_token: default_max_permissions(),
            permission_cache_ttl_seconds: default_rbac_cache_ttl(),
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSection {
    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: u64,
    /// Authorization code lifetime in seconds (at most 600).
    #[serde(default = "default_code_ttl")]
    pub code_ttl_seconds: u64,
}

/// Default access token lifetime.
const fn default_access_ttl() -> u64 {
    3600
}

/// Default refresh token lifetime (30 days).
const fn default_refresh_ttl() -> u64 {
    30 * 24 * 60 * 60
}

/// Default authorization code lifetime.
const fn default_code_ttl() -> u64 {
    600
}

impl Default for TokenSection {
    fn default() -> Self {
        Self {
            access_ttl_seconds: default_access_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            code_ttl_seconds: default_code_ttl(),
        }
    }
}

/// Client registry retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Maximum attempts including the first.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_initial")]
    pub initial_delay_ms: u64,
    /// Upper bound on any delay in milliseconds.
    #[serde(default = "default_retry_max")]
    pub max_delay_ms: u64,
    /// Multiplier applied per retry.
    #[serde(default = "default_retry_multiplier")]
    pub backoff_multiplier: f64,
}

/// Default retry attempts.
const fn default_retry_attempts() -> u32 {
    3
}

/// Default initial retry delay.
const fn default_retry_initial() -> u64 {
    100
}

/// Default maximum retry delay.
const fn default_retry_max() -> u64 {
    2_000
}

/// Default backoff multiplier.
const fn default_retry_multiplier() -> f64 {
    2.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial(),
            max_delay_ms: default_retry_max(),
            backoff_multiplier: default_retry_multiplier(),
        }
    }
}

/// Client registry circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSection {
    /// Failure rate that opens the circuit (0, 1].
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Minimum window occupancy before the rate is evaluated.
    #[serde(default = "default_minimum_requests")]
    pub minimum_requests: usize,
    /// Sliding window size in call outcomes.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Cooldown before half-open probes in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_period_ms: u64,
    /// Consecutive half-open successes required to reclose.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: usize,
}

/// Default failure threshold.
const fn default_failure_threshold() -> f64 {
    0.5
}

/// Default minimum requests.
const fn default_minimum_requests() -> usize {
    3
}

/// Default window size.
const fn default_window_size() -> usize {
    10
}

/// Default cooldown.
const fn default_cooldown_ms() -> u64 {
    1_000
}

/// Default success threshold.
const fn default_success_threshold() -> usize {
    2
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            minimum_requests: default_minimum_requests(),
            window_size: default_window_size(),
            cooldown_period_ms: default_cooldown_ms(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// Shared cache settings (provider cache and friends).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Entry TTL in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// Maximum resident entries.
    #[serde(default = "default_cache_max")]
    pub max_size: usize,
}

/// Default cache TTL.
const fn default_cache_ttl_ms() -> u64 {
    60_000
}

/// Default cache capacity.
const fn default_cache_max() -> usize {
    500
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            max_size: default_cache_max(),
        }
    }
}

/// Rate limiting settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Whether rate limiting is enforced.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Maximum requests per window.
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
    /// Window length in milliseconds.
    #[serde(default = "default_rate_limit_window")]
    pub window_ms: u64,
}

/// Default rate limit enablement.
const fn default_rate_limit_enabled() -> bool {
    true
}

/// Default requests per window.
const fn default_rate_limit_max() -> u32 {
    300
}

/// Default rate limit window.
const fn default_rate_limit_window() -> u64 {
    60_000
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_rate_limit_max(),
            window_ms: default_rate_limit_window(),
        }
    }
}

/// Optional feature toggles.
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesSection {
    /// Whether `/token/introspect` is served (501 otherwise).
    #[serde(default = "default_feature_on")]
    pub introspection: bool,
    /// Whether `/token/revoke` is served (501 otherwise).
    #[serde(default = "default_feature_on")]
    pub revocation: bool,
    /// Whether public clients must present a PKCE challenge on `/authorize`.
    #[serde(default = "default_feature_on")]
    pub pkce_required_for_public: bool,
}

/// Default feature enablement.
const fn default_feature_on() -> bool {
    true
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            introspection: default_feature_on(),
            revocation: default_feature_on(),
            pkce_required_for_public: default_feature_on(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (single node, volatile).
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Storage backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    /// Backend type.
    #[serde(default)]
    pub store_type: StoreType,
    /// Database path (required for sqlite).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// In-memory region store (tests and single node).
    #[default]
    Memory,
    /// JSON-line file store.
    File,
}

/// Audit pipeline settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditSection {
    /// Sink type for the local region.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log path (required for the file sink).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Signet issuer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignetConfig {
    /// Server and issuer identity.
    #[serde(default)]
    pub server: ServerSection,
    /// Secret material.
    #[serde(default)]
    pub secrets: SecretsSection,
    /// Session cookie flags.
    #[serde(default)]
    pub cookie: CookieSection,
    /// Session engine tuning.
    #[serde(default)]
    pub session: SessionSection,
    /// RBAC engine tuning.
    #[serde(default)]
    pub rbac: RbacSection,
    /// Token lifetimes.
    #[serde(default)]
    pub token: TokenSection,
    /// Client retry tuning.
    #[serde(default)]
    pub retry: RetrySection,
    /// Client circuit breaker tuning.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    /// Shared cache tuning.
    #[serde(default)]
    pub cache: CacheSection,
    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    /// Optional feature toggles.
    #[serde(default)]
    pub features: FeaturesSection,
    /// Storage backend.
    #[serde(default)]
    pub store: StoreSection,
    /// Audit pipeline.
    #[serde(default)]
    pub audit: AuditSection,
}

impl SignetConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a bound is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.issuer.is_empty() || self.server.issuer.ends_with('/') {
            return Err(ConfigError::Invalid(
                "issuer must be non-empty without a trailing slash".to_string(),
            ));
        }
        if self.session.max_accounts_per_session == 0
            || self.session.max_accounts_per_session > MAX_ACCOUNTS_LIMIT
        {
            return Err(ConfigError::Invalid(format!(
                "max_accounts_per_session must be in 1..={MAX_ACCOUNTS_LIMIT}"
            )));
        }
        if self.session.session_lifetime_seconds < MIN_SESSION_LIFETIME_SECS {
            return Err(ConfigError::Invalid(format!(
                "session_lifetime_seconds must be at least {MIN_SESSION_LIFETIME_SECS}"
            )));
        }
        if self.session.sliding_window_seconds > self.session.session_lifetime_seconds {
            return Err(ConfigError::Invalid(
                "sliding_window_seconds must not exceed session_lifetime_seconds".to_string(),
            ));
        }
        if self.rbac.max_permissions_in_token == 0
            || self.rbac.max_permissions_in_token > MAX_PERMISSIONS_LIMIT
        {
            return Err(ConfigError::Invalid(format!(
                "max_permissions_in_token must be in 1..={MAX_PERMISSIONS_LIMIT}"
            )));
        }
        if self.token.code_ttl_seconds == 0 || self.token.code_ttl_seconds > 600 {
            return Err(ConfigError::Invalid(
                "code_ttl_seconds must be in 1..=600".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "retry max_attempts must be in 1..={MAX_RETRY_ATTEMPTS}"
            )));
        }
        if !(self.circuit_breaker.failure_threshold > 0.0
            && self.circuit_breaker.failure_threshold <= 1.0)
        {
            return Err(ConfigError::Invalid(
                "failure_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.circuit_breaker.window_size < self.circuit_breaker.minimum_requests {
            return Err(ConfigError::Invalid(
                "window_size must be at least minimum_requests".to_string(),
            ));
        }
        if self.cache.max_size == 0 || self.cache.max_size > MAX_CACHE_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "cache max_size must be in 1..={MAX_CACHE_ENTRIES}"
            )));
        }
        if self.store.store_type == StoreType::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid("sqlite store requires path".to_string()));
        }
        if self.audit.sink == AuditSinkType::File && self.audit.path.is_none() {
            return Err(ConfigError::Invalid("file audit sink requires path".to_string()));
        }
        Ok(())
    }

    /// Returns the session engine tuning.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_accounts: self.session.max_accounts_per_session,
            session_lifetime_secs: self.session.session_lifetime_seconds,
            sliding_window_secs: self.session.sliding_window_seconds,
            version_retries: 3,
            strict_account_cap: false,
        }
    }

    /// Returns the RBAC engine tuning.
    #[must_use]
    pub const fn rbac_config(&self) -> RbacConfig {
        RbacConfig {
            max_permissions_in_token: self.rbac.max_permissions_in_token,
            cache_ttl: Duration::from_secs(self.rbac.permission_cache_ttl_seconds),
            cache_max_size: 10_000,
        }
    }

    /// Returns the token engine tuning.
    #[must_use]
    pub const fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_ttl_secs: self.token.access_ttl_seconds,
            refresh_ttl_secs: self.token.refresh_ttl_seconds,
            code_ttl_secs: self.token.code_ttl_seconds,
        }
    }

    /// Returns the client retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    /// Returns the client circuit breaker tuning.
    #[must_use]
    pub const fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            minimum_requests: self.circuit_breaker.minimum_requests,
            window_size: self.circuit_breaker.window_size,
            cooldown_period: Duration::from_millis(self.circuit_breaker.cooldown_period_ms),
            success_threshold: self.circuit_breaker.success_threshold,
        }
    }

    /// Returns the shared cache tuning.
    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_millis(self.cache.ttl_ms),
            max_size: self.cache.max_size,
        }
    }
}

/// Resolves the configuration path: explicit, environment, then default.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(from_env) = env::var(CONFIG_ENV_VAR)
        && !from_env.is_empty()
    {
        return PathBuf::from(from_env);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}
