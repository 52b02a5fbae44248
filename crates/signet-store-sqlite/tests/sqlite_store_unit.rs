// crates/signet-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Adapter contract, TTL, path safety, and outbox tests.
// Purpose: Validate durability semantics against a temp-dir database.
// ============================================================================

//! ## Overview
//! Unit-level tests for the `SQLite` adapter:
//! - Path safety checks (traversal and directory rejection)
//! - Round trips, atomic take, and whole-segment prefix scans
//! - Lazy TTL expiry and the purge sweep
//! - Identifier allowlisting for maintenance helpers
//! - Durable replication outbox ordering and drain-once semantics

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
use signet_core::GrantType;
use signet_core::NewClient;
use signet_core::TenantId;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::StoreError;
use signet_store_sqlite::SqliteStore;
use signet_store_sqlite::SqliteStoreConfig;
use signet_store_sqlite::SqliteStoreError;
use signet_store_sqlite::SqliteSyncOutbox;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store(dir: &TempDir) -> SqliteStore {
    let config = SqliteStoreConfig {
        path: dir.path().join("signet.db"),
        busy_timeout_ms: 1_000,
        journal_mode: signet_store_sqlite::SqliteJournalMode::Wal,
        sync_mode: signet_store_sqlite::SqliteSyncMode::Full,
    };
    SqliteStore::open(&config).expect("open sqlite store")
}

// ============================================================================
// SECTION: Path Safety
// ============================================================================

/// Parent traversal components are rejected before open.
#[test]
fn rejects_parent_traversal() {
    let config = SqliteStoreConfig {
        path: "state/../../../etc/passwd".into(),
        busy_timeout_ms: 1_000,
        journal_mode: signet_store_sqlite::SqliteJournalMode::Wal,
        sync_mode: signet_store_sqlite::SqliteSyncMode::Full,
    };
    assert!(matches!(
        SqliteStore::open(&config),
        Err(SqliteStoreError::InvalidPath(_))
    ));
}

/// Directories are rejected as database paths.
#[test]
fn rejects_directory_path() {
    let dir = TempDir::new().expect("tempdir");
    let config = SqliteStoreConfig {
        path: dir.path().to_path_buf(),
        busy_timeout_ms: 1_000,
        journal_mode: signet_store_sqlite::SqliteJournalMode::Wal,
        sync_mode: signet_store_sqlite::SqliteSyncMode::Full,
    };
    assert!(matches!(
        SqliteStore::open(&config),
        Err(SqliteStoreError::InvalidPath(_))
    ));
}

// ============================================================================
// SECTION: Adapter Contract
// ============================================================================

/// Values round-trip and survive reopening the database.
#[test]
fn values_round_trip_durably() {
    let dir = TempDir::new().expect("tempdir");
    let key = KeyPath::from_segments(&["tenants", "acme"]);
    {
        let store = open_store(&dir);
        store.set(&key, b"payload", None).unwrap();
    }
    let store = open_store(&dir);
    assert_eq!(store.get(&key).unwrap(), Some(b"payload".to_vec()));
}

/// Remove returns the value exactly once.
#[test]
fn remove_is_a_take() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    let key = KeyPath::from_segments(&["codes", "c1"]);
    store.set(&key, b"grant", None).unwrap();
    assert_eq!(store.remove(&key).unwrap(), Some(b"grant".to_vec()));
    assert_eq!(store.remove(&key).unwrap(), None);
}

/// Prefix scans match whole segments and skip expired rows.
#[test]
fn scan_respects_segments_and_expiry() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.set(&KeyPath::from_segments(&["sessions", "a"]), b"1", None).unwrap();
    store.set(&KeyPath::from_segments(&["sessions", "b"]), b"2", Some(1)).unwrap();
    store.set(&KeyPath::from_segments(&["sessions_archive", "c"]), b"3", None).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let scanned = store.scan(&KeyPath::from_segments(&["sessions"])).unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(scanned[0].0.segments(), ["sessions", "a"]);
}

/// Expired rows vanish from reads and the purge sweep deletes them.
#[test]
fn ttl_expiry_and_purge() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    let key = KeyPath::from_segments(&["codes", "c1"]);
    store.set(&key, b"grant", Some(1)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert!(store.get(&key).unwrap().is_none());
    store.set(&KeyPath::from_segments(&["codes", "c2"]), b"x", Some(1)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let purged = store.purge_expired().unwrap();
    assert!(purged >= 1);
}

/// Maintenance helpers reject identifiers outside the allowlist.
#[test]
fn table_allowlist_blocks_identifier_injection() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    assert!(store.table_len("kv").is_ok());
    assert!(matches!(
        store.table_len("kv; DROP TABLE kv"),
        Err(StoreError::Syntax(_))
    ));
}

// ============================================================================
// SECTION: Replication Outbox
// ============================================================================

/// The outbox drains messages once, in enqueue order, and applies them.
#[test]
fn outbox_drains_once_in_order() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(open_store(&dir));
    let outbox = Arc::new(SqliteSyncOutbox::new(Arc::clone(&store)));
    let registry = ClientRegistry::with_tuning(
        Arc::new(signet_core::MemoryStore::new()),
        signet_core::CircuitBreakerConfig::default(),
        signet_core::RetryPolicy::default(),
        Arc::clone(&outbox) as Arc<dyn signet_core::ReplicationQueue>,
    );
    let tenant = TenantId::new("acme");
    let created = registry
        .create(
            &tenant,
            NewClient {
                id: None,
                name: "Synced".to_string(),
                grant_types: vec![GrantType::AuthorizationCode],
                scopes: vec![],
                redirect_uris: vec!["https://app.example.com/cb".to_string()],
                metadata: ClientMetadata::default(),
                confidential: true,
            },
        )
        .unwrap();
    registry
        .update(
            &created.client.id,
            &tenant,
            signet_core::ClientUpdate {
                enabled: Some(false),
                ..signet_core::ClientUpdate::default()
            },
        )
        .unwrap();

    let replica = ClientRegistry::new(Arc::new(signet_core::MemoryStore::new()));
    let applied = outbox.apply_to(&replica).unwrap();
    assert_eq!(applied, 2);
    let synced = replica.get(&created.client.id, &tenant).unwrap();
    assert!(!synced.enabled);
    // A second drain finds nothing.
    assert_eq!(outbox.apply_to(&replica).unwrap(), 0);
}
