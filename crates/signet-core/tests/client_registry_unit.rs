// crates/signet-core/tests/client_registry_unit.rs
// ============================================================================
// Module: Client Registry Unit Tests
// Description: CRUD, uniqueness, rotation grace, and replication tests.
// Purpose: Validate client lifecycle invariants and last-write-wins apply.
// ============================================================================

//! Unit tests for the client registry: name uniqueness, validation rules,
//! secret rotation with grace verification, and sync-message application.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use signet_core::ClientMetadata;
use signet_core::ClientRegistry;
use signet_core::ClientRegistryError;
use signet_core::GrantType;
use signet_core::InMemoryReplicationQueue;
use signet_core::MemoryStore;
use signet_core::NewClient;
use signet_core::SyncOp;
use signet_core::TenantId;
use signet_core::CircuitBreakerConfig;
use signet_core::RetryPolicy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn new_client(name: &str) -> NewClient {
    NewClient {
        id: None,
        name: name.to_string(),
        grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        scopes: vec!["read".to_string(), "write".to_string()],
        redirect_uris: vec!["https://app.example.com/callback".to_string()],
        metadata: ClientMetadata::default(),
        confidential: true,
    }
}

fn registry() -> ClientRegistry {
    ClientRegistry::new(Arc::new(MemoryStore::new()))
}

// ============================================================================
// SECTION: CRUD + Validation
// ============================================================================

/// Creation returns the plaintext secret exactly once and stores only a hash.
#[test]
fn create_returns_secret_once() {
    let registry = registry();
    let tenant = TenantId::new("acme");
    let created = registry.create(&tenant, new_client("Web App")).unwrap();
    let secret = created.secret.unwrap();
    assert!(!secret.is_empty());
    assert!(created.client.secret_hash.starts_with("$pbkdf2-sha256$"));
    let fetched = registry.get(&created.client.id, &tenant).unwrap();
    assert_ne!(fetched.secret_hash, secret);
}

/// Two clients with the same `(tenant, name)` cannot both persist.
#[test]
fn duplicate_name_in_tenant_conflicts() {
    let registry = registry();
    let tenant = TenantId::new("acme");
    registry.create(&tenant, new_client("Web App")).unwrap();
    let err = registry.create(&tenant, new_client("Web App")).unwrap_err();
    assert!(matches!(err, ClientRegistryError::ClientNameConflict(_)));
}

/// The same name is permitted across different tenants.
#[test]
fn same_name_across_tenants_is_allowed() {
    let registry = registry();
    registry.create(&TenantId::new("a"), new_client("X")).unwrap();
    registry.create(&TenantId::new("b"), new_client("X")).unwrap();
    assert_eq!(registry.list(&TenantId::new("a")).unwrap().len(), 1);
    assert_eq!(registry.list(&TenantId::new("b")).unwrap().len(), 1);
}

/// Non-HTTPS redirect URIs are rejected except on loopback hosts.
#[test]
fn redirect_uri_validation() {
    let registry = registry();
    let tenant = TenantId::new("acme");
    let mut input = new_client("Insecure");
    input.redirect_uris = vec!["http://evil.example.com/cb".to_string()];
    let err = registry.create(&tenant, input).unwrap_err();
    assert!(matches!(err, ClientRegistryError::InvalidRedirectUri(_)));

    let mut input = new_client("Local Dev");
    input.redirect_uris = vec!["http://localhost:3000/callback".to_string()];
    registry.create(&tenant, input).unwrap();
}

/// Scope tokens outside the allowed character set are rejected.
#[test]
fn scope_format_validation() {
    let registry = registry();
    let mut input = new_client("Bad Scopes");
    input.scopes = vec!["read write".to_string()];
    let err = registry.create(&TenantId::new("acme"), input).unwrap_err();
    assert!(matches!(err, ClientRegistryError::InvalidScopeFormat(_)));
}

/// Unknown clients surface `client_not_found` untouched.
#[test]
fn get_unknown_client_fails() {
    let registry = registry();
    let err = registry
        .get(&signet_core::ClientId::new("cli_missing"), &TenantId::new("acme"))
        .unwrap_err();
    assert!(matches!(err, ClientRegistryError::ClientNotFound(_)));
}

// ============================================================================
// SECTION: Rotation
// ============================================================================

/// After rotation both secrets verify until the grace expiry; after it only
/// the new one does.
#[test]
fn rotation_grace_window() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let registry = ClientRegistry::new(store).with_rotation_grace(1);
    let tenant = TenantId::new("acme");
    let created = registry.create(&tenant, new_client("Rotating")).unwrap();
    let old_secret = created.secret.unwrap();
    let new_secret = registry.rotate_secret(&created.client.id, &tenant).unwrap();

    assert!(registry.verify_credentials(&created.client.id, &new_secret).is_ok());
    assert!(registry.verify_credentials(&created.client.id, &old_secret).is_ok());

    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert!(registry.verify_credentials(&created.client.id, &new_secret).is_ok());
    assert!(matches!(
        registry.verify_credentials(&created.client.id, &old_secret),
        Err(ClientRegistryError::InvalidCredentials)
    ));
}

// ============================================================================
// SECTION: Replication
// ============================================================================

/// Writes enqueue sync messages; stale messages lose under last-write-wins.
#[test]
fn replication_applies_last_write_wins() {
    let queue = Arc::new(InMemoryReplicationQueue::new());
    let local = ClientRegistry::with_tuning(
        Arc::new(MemoryStore::new()),
        CircuitBreakerConfig::default(),
        RetryPolicy::default(),
        Arc::clone(&queue) as Arc<dyn signet_core::ReplicationQueue>,
    );
    let tenant = TenantId::new("acme");
    let created = local.create(&tenant, new_client("Synced")).unwrap();
    let messages = queue.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].op, SyncOp::Create);

    let remote = ClientRegistry::new(Arc::new(MemoryStore::new()));
    remote.apply_sync_message(&messages[0]).unwrap();
    let replica = remote.get(&created.client.id, &tenant).unwrap();
    assert_eq!(replica.name, "Synced");

    // Re-applying the same message is idempotent.
    remote.apply_sync_message(&messages[0]).unwrap();
    assert_eq!(remote.list(&tenant).unwrap().len(), 1);

    // A message older than the local record is dropped.
    let mut stale = messages[0].clone();
    if let Some(data) = &mut stale.data {
        data.name = "Stale Name".to_string();
        data.updated_at = signet_core::Timestamp::from_unix(0);
    }
    remote.apply_sync_message(&stale).unwrap();
    assert_eq!(remote.get(&created.client.id, &tenant).unwrap().name, "Synced");
}

/// Deletes replicate and tolerate unknown targets.
#[test]
fn replication_delete_is_idempotent() {
    let queue = Arc::new(InMemoryReplicationQueue::new());
    let local = ClientRegistry::with_tuning(
        Arc::new(MemoryStore::new()),
        CircuitBreakerConfig::default(),
        RetryPolicy::default(),
        Arc::clone(&queue) as Arc<dyn signet_core::ReplicationQueue>,
    );
    let tenant = TenantId::new("acme");
    let created = local.create(&tenant, new_client("Doomed")).unwrap();
    local.delete(&created.client.id, &tenant).unwrap();
    let messages = queue.drain();
    assert_eq!(messages.last().map(|m| m.op), Some(SyncOp::Delete));

    let remote = ClientRegistry::new(Arc::new(MemoryStore::new()));
    for message in &messages {
        remote.apply_sync_message(message).unwrap();
    }
    assert!(remote.list(&tenant).unwrap().is_empty());
    // Applying the delete again is a no-op.
    remote.apply_sync_message(messages.last().unwrap()).unwrap();
}
