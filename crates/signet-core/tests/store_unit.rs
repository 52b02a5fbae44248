// crates/signet-core/tests/store_unit.rs
// ============================================================================
// Module: Storage Contract Unit Tests
// Description: Key encoding, TTL expiry, atomic take, and scan tests.
// Purpose: Validate the in-memory reference adapter and key wire form.
// ============================================================================

//! Unit tests for the storage layer: wire-encoding round trips with escaped
//! separators, lazy TTL expiry, atomic remove-as-take, and whole-segment
//! prefix scans.

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

use signet_core::KeyPath;
use signet_core::KeyValueStore;
use signet_core::MemoryStore;

// ============================================================================
// SECTION: Key Paths
// ============================================================================

/// Wire encoding round-trips segments containing the separator.
#[test]
fn key_path_wire_round_trip() {
    let path = KeyPath::from_segments(&["users", "emails", "a/b%c@example.com"]);
    let decoded = KeyPath::from_wire(&path.to_wire());
    assert_eq!(decoded, path);
}

/// Prefix scans match whole segments only, never raw string prefixes.
#[test]
fn scan_matches_whole_segments() {
    let store = MemoryStore::new();
    store.set(&KeyPath::from_segments(&["tenants", "a"]), b"1", None).unwrap();
    store.set(&KeyPath::from_segments(&["tenants_backup", "a"]), b"2", None).unwrap();
    let scanned = store.scan(&KeyPath::from_segments(&["tenants"])).unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(scanned[0].0.segments(), ["tenants", "a"]);
}

/// Stripping a prefix recovers the relative path.
#[test]
fn key_path_prefix_stripping() {
    let prefix = KeyPath::from_segments(&["t", "acme"]);
    let full = KeyPath::from_segments(&["sessions", "s1"]).prefixed_with(&prefix);
    assert_eq!(
        full.strip_prefix(&prefix),
        Some(KeyPath::from_segments(&["sessions", "s1"]))
    );
    assert!(full.strip_prefix(&KeyPath::from_segments(&["t", "beta"])).is_none());
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// Values expire lazily after their TTL.
#[test]
fn ttl_expiry_hides_values() {
    let store = MemoryStore::new();
    let key = KeyPath::from_segments(&["codes", "c1"]);
    store.set(&key, b"grant", Some(1)).unwrap();
    assert!(store.get(&key).unwrap().is_some());
    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert!(store.get(&key).unwrap().is_none());
    assert!(store.remove(&key).unwrap().is_none());
}

/// Remove is an atomic take: exactly one caller receives the value.
#[test]
fn remove_is_atomic_take() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let key = KeyPath::from_segments(&["codes", "c1"]);
    store.set(&key, b"grant", None).unwrap();
    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                let key = key.clone();
                scope.spawn(move || usize::from(store.remove(&key).unwrap().is_some()))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).sum()
    });
    assert_eq!(winners, 1);
}
