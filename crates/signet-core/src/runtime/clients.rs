// crates/signet-core/src/runtime/clients.rs
// ============================================================================
// Module: Client Registry
// Description: OAuth client CRUD with hashed secrets, rotation, and replication.
// Purpose: Manage relying parties with breaker-protected storage access.
// Dependencies: crate::core, crate::crypto, crate::store, crate::runtime::breaker
// ============================================================================

//! ## Overview
//! Every storage call the registry makes runs through a circuit breaker and a
//! retry policy: transient errors back off exponentially, permanent errors
//! surface immediately, and domain errors (`client_not_found`,
//! `client_name_conflict`) are never wrapped or retried. Secrets are hashed
//! with PBKDF2; rotation keeps the previous hash verifiable until its grace
//! expiry. Writes optionally enqueue last-write-wins sync messages for
//! multi-region replication; reads are always local.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::client::ClientMetadata;
use crate::core::client::GrantType;
use crate::core::client::MAX_CLIENT_SCOPES;
use crate::core::client::MAX_REDIRECT_URIS;
use crate::core::client::OAuthClient;
use crate::core::client::is_valid_client_name;
use crate::core::client::is_valid_redirect_uri;
use crate::core::client::is_valid_scope;
use crate::core::identifiers::ClientId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::time::now_unix_millis;
use crate::crypto::secrets;
use crate::runtime::breaker::CircuitBreaker;
use crate::runtime::breaker::CircuitBreakerConfig;
use crate::runtime::breaker::CircuitBreakerError;
use crate::runtime::breaker::RetryPolicy;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default grace window for a rotated-out secret (24 hours).
const DEFAULT_ROTATION_GRACE_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client registry errors.
///
/// # Invariants
/// - Domain variants map 1:1 to stable error codes and are never produced by
///   the retry path.
#[derive(Debug, Error)]
pub enum ClientRegistryError {
    /// No client exists for the identifier.
    #[error("client not found: {0}")]
    ClientNotFound(String),
    /// Another client in the tenant already uses the name.
    #[error("client name conflict: {0}")]
    ClientNameConflict(String),
    /// Grant type outside the allowed set.
    #[error("invalid grant type: {0}")]
    InvalidGrantType(String),
    /// Scope token failed the format rule.
    #[error("invalid scope format: {0}")]
    InvalidScopeFormat(String),
    /// Redirect URI failed the HTTPS/localhost rule.
    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),
    /// Other input validation failure.
    #[error("invalid client input: {0}")]
    InvalidInput(String),
    /// Credentials did not verify.
    #[error("invalid client credentials")]
    InvalidCredentials,
    /// Circuit breaker rejected the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),
    /// Storage failed after retries.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Replication
// ============================================================================

/// Replicated write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    /// Client created.
    Create,
    /// Client updated (full record carried).
    Update,
    /// Client deleted.
    Delete,
}

/// Replication message applied idempotently with last-write-wins semantics.
///
/// # Invariants
/// - `timestamp_ms` is the local write time; `updated_at` on the carried
///   record is the deciding column during apply.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncMessage {
    /// Operation kind.
    pub op: SyncOp,
    /// Affected client.
    pub client_id: ClientId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Full record for create/update; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OAuthClient>,
    /// Local write time in unix milliseconds.
    pub timestamp_ms: i64,
}

/// Outbound replication queue.
pub trait ReplicationQueue: Send + Sync {
    /// Enqueues a sync message for remote regions.
    fn enqueue(&self, message: SyncMessage);
}

/// Queue that discards messages (replication disabled).
pub struct NoopReplicationQueue;

impl ReplicationQueue for NoopReplicationQueue {
    fn enqueue(&self, _message: SyncMessage) {}
}

/// In-memory queue used by tests and the sync-log consumer.
#[derive(Default)]
pub struct InMemoryReplicationQueue {
    /// Enqueued messages in arrival order.
    messages: Mutex<Vec<SyncMessage>>,
}

impl InMemoryReplicationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains all queued messages in arrival order.
    #[must_use]
    pub fn drain(&self) -> Vec<SyncMessage> {
        self.messages.lock().map(|mut messages| messages.drain(..).collect()).unwrap_or_default()
    }
}

impl ReplicationQueue for InMemoryReplicationQueue {
    fn enqueue(&self, message: SyncMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Input for client creation.
#[derive(Debug, Clone)]
pub struct NewClient {
    /// Explicit client id (generated when absent; must be globally unique).
    pub id: Option<ClientId>,
    /// Client name, unique within the tenant.
    pub name: String,
    /// Permitted grant types.
    pub grant_types: Vec<GrantType>,
    /// Registered scopes.
    pub scopes: Vec<String>,
    /// Registered redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Bounded free-form metadata.
    pub metadata: ClientMetadata,
    /// Whether the client receives a secret (confidential) or not (public).
    pub confidential: bool,
}

/// Partial update for an existing client.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement grant types.
    pub grant_types: Option<Vec<GrantType>>,
    /// Replacement scopes.
    pub scopes: Option<Vec<String>>,
    /// Replacement redirect URIs.
    pub redirect_uris: Option<Vec<String>>,
    /// Replacement metadata.
    pub metadata: Option<ClientMetadata>,
    /// Replacement enabled flag.
    pub enabled: Option<bool>,
}

/// Creation result carrying the plaintext secret exactly once.
#[derive(Debug)]
pub struct CreatedClient {
    /// Persisted record.
    pub client: OAuthClient,
    /// Plaintext secret; `None` for public clients. Never retrievable again.
    pub secret: Option<String>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Client registry over the global store.
///
/// # Invariants
/// - Records live under the owning tenant's prefix; a global id index maps
///   client id to tenant for `get_by_id`.
/// - Every storage access runs through the breaker and retry policy.
pub struct ClientRegistry {
    /// Global storage adapter.
    store: Arc<dyn KeyValueStore>,
    /// Breaker protecting storage access.
    breaker: CircuitBreaker,
    /// Retry policy for transient errors.
    retry: RetryPolicy,
    /// Outbound replication queue.
    replication: Arc<dyn ReplicationQueue>,
    /// Grace window for rotated-out secrets.
    rotation_grace_secs: u64,
}

impl ClientRegistry {
    /// Creates a registry with default breaker and retry tuning.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_tuning(
            store,
            CircuitBreakerConfig::default(),
            RetryPolicy::default(),
            Arc::new(NoopReplicationQueue),
        )
    }

    /// Creates a registry with explicit tuning and replication queue.
    #[must_use]
    pub fn with_tuning(
        store: Arc<dyn KeyValueStore>,
        breaker: CircuitBreakerConfig,
        retry: RetryPolicy,
        replication: Arc<dyn ReplicationQueue>,
    ) -> Self {
        Self {
            store,
            breaker: CircuitBreaker::new(breaker),
            retry,
            replication,
            rotation_grace_secs: DEFAULT_ROTATION_GRACE_SECS,
        }
    }

    /// Returns the breaker state for observability.
    #[must_use]
    pub fn breaker_state(&self) -> crate::runtime::breaker::CircuitState {
        self.breaker.state()
    }

    /// Overrides the rotation grace window.
    #[must_use]
    pub const fn with_rotation_grace(mut self, grace_secs: u64) -> Self {
        self.rotation_grace_secs = grace_secs;
        self
    }

    /// Returns the tenant-scoped record key.
    fn client_key(tenant_id: &TenantId, id: &ClientId) -> KeyPath {
        KeyPath::from_segments(&["t", tenant_id.as_str(), "clients", id.as_str()])
    }

    /// Returns the tenant-scoped name index key.
    fn name_key(tenant_id: &TenantId, name: &str) -> KeyPath {
        KeyPath::from_segments(&["t", tenant_id.as_str(), "client_names", name])
    }

    /// Returns the global id index key.
    fn id_index_key(id: &ClientId) -> KeyPath {
        KeyPath::from_segments(&["client_ids", id.as_str()])
    }

    /// Runs a storage operation through the breaker and retry policy.
    fn protected<T>(
        &self,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, ClientRegistryError> {
        let mut retries = 0u32;
        loop {
            self.breaker.try_acquire()?;
            match op() {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) if err.is_transient() && retries + 1 < self.retry.max_attempts => {
                    self.breaker.record_failure();
                    std::thread::sleep(self.retry.delay_for(retries));
                    retries += 1;
                }
                Err(err) => {
                    self.breaker.record_failure();
                    return Err(ClientRegistryError::Store(err));
                }
            }
        }
    }

    /// Reads and deserializes a JSON value through the protection layer.
    fn read<T: serde::de::DeserializeOwned>(
        &self,
        key: &KeyPath,
    ) -> Result<Option<T>, ClientRegistryError> {
        let bytes = self.protected(|| self.store.get(key))?;
        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| ClientRegistryError::Store(StoreError::Invalid(err.to_string()))),
            None => Ok(None),
        }
    }

    /// Serializes and writes a JSON value through the protection layer.
    fn write<T: serde::Serialize>(
        &self,
        key: &KeyPath,
        value: &T,
    ) -> Result<(), ClientRegistryError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| ClientRegistryError::Store(StoreError::Invalid(err.to_string())))?;
        self.protected(|| self.store.set(key, &bytes, None))
    }

    /// Validates creation/update fields shared by both paths.
    fn validate_fields(
        name: &str,
        grant_types: &[GrantType],
        scopes: &[String],
        redirect_uris: &[String],
        metadata: &ClientMetadata,
    ) -> Result<(), ClientRegistryError> {
        if !is_valid_client_name(name) {
            return Err(ClientRegistryError::InvalidInput(format!("invalid client name: {name}")));
        }
        if grant_types.is_empty() {
            return Err(ClientRegistryError::InvalidGrantType(
                "at least one grant type is required".to_string(),
            ));
        }
        if scopes.len() > MAX_CLIENT_SCOPES {
            return Err(ClientRegistryError::InvalidScopeFormat(format!(
                "too many scopes: {}",
                scopes.len()
            )));
        }
        for scope in scopes {
            if !is_valid_scope(scope) {
                return Err(ClientRegistryError::InvalidScopeFormat(scope.clone()));
            }
        }
        if redirect_uris.len() > MAX_REDIRECT_URIS {
            return Err(ClientRegistryError::InvalidRedirectUri(format!(
                "too many redirect uris: {}",
                redirect_uris.len()
            )));
        }
        for uri in redirect_uris {
            if !is_valid_redirect_uri(uri) {
                return Err(ClientRegistryError::InvalidRedirectUri(uri.clone()));
            }
        }
        if !metadata.validate() {
            return Err(ClientRegistryError::InvalidInput(
                "client metadata exceeds 10 KB".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates a client, returning the plaintext secret exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNameConflict`] when the name is
    /// taken within the tenant.
    pub fn create(
        &self,
        tenant_id: &TenantId,
        input: NewClient,
    ) -> Result<CreatedClient, ClientRegistryError> {
        Self::validate_fields(
            &input.name,
            &input.grant_types,
            &input.scopes,
            &input.redirect_uris,
            &input.metadata,
        )?;
        let name_key = Self::name_key(tenant_id, &input.name);
        if self.read::<ClientId>(&name_key)?.is_some() {
            return Err(ClientRegistryError::ClientNameConflict(input.name));
        }
        let id = match input.id {
            Some(id) => {
                if self.read::<TenantId>(&Self::id_index_key(&id))?.is_some() {
                    return Err(ClientRegistryError::InvalidInput(format!(
                        "client id taken: {id}"
                    )));
                }
                id
            }
            None => ClientId::new(secrets::generate_id("cli")),
        };
        let (secret, secret_hash) = if input.confidential {
            let plaintext = secrets::generate_secret();
            let hash = secrets::hash_secret(&plaintext);
            (Some(plaintext), hash)
        } else {
            (None, String::new())
        };
        let now = Timestamp::now();
        let client = OAuthClient {
            id: id.clone(),
            tenant_id: tenant_id.clone(),
            name: input.name,
            secret_hash,
            previous_secret_hash: None,
            previous_secret_expires_at: None,
            grant_types: input.grant_types,
            scopes: input.scopes,
            redirect_uris: input.redirect_uris,
            metadata: input.metadata,
            enabled: true,
            created_at: now,
            updated_at: now,
            rotated_at: None,
        };
        self.write(&Self::client_key(tenant_id, &id), &client)?;
        self.write(&name_key, &id)?;
        self.write(&Self::id_index_key(&id), tenant_id)?;
        self.replication.enqueue(SyncMessage {
            op: SyncOp::Create,
            client_id: id,
            tenant_id: tenant_id.clone(),
            data: Some(client.clone()),
            timestamp_ms: now_unix_millis(),
        });
        Ok(CreatedClient { client, secret })
    }

    /// Returns a client by id within a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNotFound`] when absent.
    pub fn get(
        &self,
        id: &ClientId,
        tenant_id: &TenantId,
    ) -> Result<OAuthClient, ClientRegistryError> {
        self.read::<OAuthClient>(&Self::client_key(tenant_id, id))?
            .ok_or_else(|| ClientRegistryError::ClientNotFound(id.to_string()))
    }

    /// Returns a client by globally unique id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNotFound`] when absent.
    pub fn get_by_id(&self, id: &ClientId) -> Result<OAuthClient, ClientRegistryError> {
        let tenant_id = self
            .read::<TenantId>(&Self::id_index_key(id))?
            .ok_or_else(|| ClientRegistryError::ClientNotFound(id.to_string()))?;
        self.get(id, &tenant_id)
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNameConflict`] when renaming onto
    /// a taken name.
    pub fn update(
        &self,
        id: &ClientId,
        tenant_id: &TenantId,
        update: ClientUpdate,
    ) -> Result<OAuthClient, ClientRegistryError> {
        let mut client = self.get(id, tenant_id)?;
        if let Some(name) = update.name
            && name != client.name
        {
            let new_name_key = Self::name_key(tenant_id, &name);
            if self.read::<ClientId>(&new_name_key)?.is_some() {
                return Err(ClientRegistryError::ClientNameConflict(name));
            }
            let old_name_key = Self::name_key(tenant_id, &client.name);
            self.protected(|| self.store.remove(&old_name_key))?;
            self.write(&new_name_key, id)?;
            client.name = name;
        }
        if let Some(grant_types) = update.grant_types {
            client.grant_types = grant_types;
        }
        if let Some(scopes) = update.scopes {
            client.scopes = scopes;
        }
        if let Some(redirect_uris) = update.redirect_uris {
            client.redirect_uris = redirect_uris;
        }
        if let Some(metadata) = update.metadata {
            client.metadata = metadata;
        }
        if let Some(enabled) = update.enabled {
            client.enabled = enabled;
        }
        Self::validate_fields(
            &client.name,
            &client.grant_types,
            &client.scopes,
            &client.redirect_uris,
            &client.metadata,
        )?;
        client.updated_at = Timestamp::now();
        self.write(&Self::client_key(tenant_id, id), &client)?;
        self.replication.enqueue(SyncMessage {
            op: SyncOp::Update,
            client_id: id.clone(),
            tenant_id: tenant_id.clone(),
            data: Some(client.clone()),
            timestamp_ms: now_unix_millis(),
        });
        Ok(client)
    }

    /// Deletes a client and its index entries.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNotFound`] when absent.
    pub fn delete(&self, id: &ClientId, tenant_id: &TenantId) -> Result<(), ClientRegistryError> {
        let client = self.get(id, tenant_id)?;
        let record_key = Self::client_key(tenant_id, id);
        let name_key = Self::name_key(tenant_id, &client.name);
        let index_key = Self::id_index_key(id);
        self.protected(|| self.store.remove(&record_key))?;
        self.protected(|| self.store.remove(&name_key))?;
        self.protected(|| self.store.remove(&index_key))?;
        self.replication.enqueue(SyncMessage {
            op: SyncOp::Delete,
            client_id: id.clone(),
            tenant_id: tenant_id.clone(),
            data: None,
            timestamp_ms: now_unix_millis(),
        });
        Ok(())
    }

    /// Lists all clients of a tenant ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::Store`] when the scan fails.
    pub fn list(&self, tenant_id: &TenantId) -> Result<Vec<OAuthClient>, ClientRegistryError> {
        let prefix = KeyPath::from_segments(&["t", tenant_id.as_str(), "clients"]);
        let entries = self.protected(|| self.store.scan(&prefix))?;
        let mut clients: Vec<OAuthClient> = entries
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    /// Rotates the client secret, returning the new plaintext exactly once.
    ///
    /// The outgoing hash stays verifiable until the grace expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::ClientNotFound`] when absent and
    /// [`ClientRegistryError::InvalidInput`] for public clients.
    pub fn rotate_secret(
        &self,
        id: &ClientId,
        tenant_id: &TenantId,
    ) -> Result<String, ClientRegistryError> {
        let mut client = self.get(id, tenant_id)?;
        if client.is_public() {
            return Err(ClientRegistryError::InvalidInput(
                "public clients have no secret to rotate".to_string(),
            ));
        }
        let plaintext = secrets::generate_secret();
        let now = Timestamp::now();
        client.previous_secret_hash = Some(std::mem::take(&mut client.secret_hash));
        client.previous_secret_expires_at = Some(now.plus_secs(self.rotation_grace_secs));
        client.secret_hash = secrets::hash_secret(&plaintext);
        client.rotated_at = Some(now);
        client.updated_at = now;
        self.write(&Self::client_key(tenant_id, id), &client)?;
        self.replication.enqueue(SyncMessage {
            op: SyncOp::Update,
            client_id: id.clone(),
            tenant_id: tenant_id.clone(),
            data: Some(client),
            timestamp_ms: now_unix_millis(),
        });
        Ok(plaintext)
    }

    /// Verifies client credentials against the current or grace hash.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::InvalidCredentials`] when neither hash
    /// verifies, and [`ClientRegistryError::ClientNotFound`] for unknown ids.
    pub fn verify_credentials(
        &self,
        id: &ClientId,
        plaintext_secret: &str,
    ) -> Result<OAuthClient, ClientRegistryError> {
        let client = self.get_by_id(id)?;
        if !client.enabled {
            return Err(ClientRegistryError::InvalidCredentials);
        }
        if client.is_public() {
            return Err(ClientRegistryError::InvalidCredentials);
        }
        let current = crate::crypto::secrets::verify_secret(plaintext_secret, &client.secret_hash)
            .unwrap_or(false);
        if current {
            return Ok(client);
        }
        let grace_live = client
            .previous_secret_expires_at
            .is_some_and(|expiry| Timestamp::now().is_before(expiry));
        if grace_live
            && let Some(previous) = &client.previous_secret_hash
            && crate::crypto::secrets::verify_secret(plaintext_secret, previous).unwrap_or(false)
        {
            return Ok(client);
        }
        Err(ClientRegistryError::InvalidCredentials)
    }

    /// Applies a replication message idempotently with last-write-wins.
    ///
    /// The guard column is `updated_at`: stale messages (older than the local
    /// record) are dropped without error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError::Store`] when storage fails.
    pub fn apply_sync_message(&self, message: &SyncMessage) -> Result<(), ClientRegistryError> {
        let record_key = Self::client_key(&message.tenant_id, &message.client_id);
        let existing = self.read::<OAuthClient>(&record_key)?;
        match message.op {
            SyncOp::Create | SyncOp::Update => {
                let Some(incoming) = &message.data else {
                    return Ok(());
                };
                if let Some(local) = &existing
                    && !local.updated_at.is_before(incoming.updated_at)
                {
                    return Ok(());
                }
                if let Some(local) = &existing
                    && local.name != incoming.name
                {
                    let old_name_key = Self::name_key(&message.tenant_id, &local.name);
                    self.protected(|| self.store.remove(&old_name_key))?;
                }
                self.write(&record_key, incoming)?;
                self.write(&Self::name_key(&message.tenant_id, &incoming.name), &incoming.id)?;
                self.write(&Self::id_index_key(&incoming.id), &message.tenant_id)?;
                Ok(())
            }
            SyncOp::Delete => {
                let Some(local) = existing else {
                    return Ok(());
                };
                let millis = local.updated_at.as_unix().saturating_mul(1000);
                if millis > message.timestamp_ms {
                    return Ok(());
                }
                let name_key = Self::name_key(&message.tenant_id, &local.name);
                let index_key = Self::id_index_key(&message.client_id);
                self.protected(|| self.store.remove(&record_key))?;
                self.protected(|| self.store.remove(&name_key))?;
                self.protected(|| self.store.remove(&index_key))?;
                Ok(())
            }
        }
    }
}
