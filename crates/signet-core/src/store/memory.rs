// crates/signet-core/src/store/memory.rs
// ============================================================================
// Module: In-Memory Store
// Description: BTreeMap-backed storage adapter for tests and single-node use.
// Purpose: Provide a correct reference implementation of the adapter contract.
// Dependencies: none beyond the standard library
// ============================================================================

//! ## Overview
//! The in-memory store keeps wire-encoded keys in a [`BTreeMap`] guarded by a
//! mutex, which makes `remove` an atomic take and prefix scans a range walk.
//! Expiry is evaluated lazily: expired entries are invisible to reads and
//! dropped when touched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use crate::core::time::Timestamp;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Store
// ============================================================================

/// One stored value with its optional expiry.
#[derive(Debug, Clone)]
struct StoredValue {
    /// Opaque payload bytes.
    bytes: Vec<u8>,
    /// Absolute expiry, when a TTL was supplied.
    expires_at: Option<Timestamp>,
}

impl StoredValue {
    /// Returns true when the value has expired at `now`.
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expiry| !now.is_before(expiry))
    }
}

/// In-memory storage adapter.
///
/// # Invariants
/// - All operations lock the map; `remove` is an atomic take.
/// - Expired entries never escape a read and are pruned on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Wire-encoded keys mapped to stored values.
    entries: Mutex<BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries (expired entries excluded).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unknown`] when the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = Timestamp::now();
        let entries =
            self.entries.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        Ok(entries.values().filter(|value| !value.is_expired(now)).count())
    }

    /// Returns true when no live entries exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unknown`] when the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Timestamp::now();
        let wire = key.to_wire();
        let mut entries =
            self.entries.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        match entries.get(&wire) {
            Some(value) if value.is_expired(now) => {
                entries.remove(&wire);
                Ok(None)
            }
            Some(value) => Ok(Some(value.bytes.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &KeyPath, value: &[u8], ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let expires_at = ttl_secs.map(|ttl| Timestamp::now().plus_secs(ttl));
        let mut entries =
            self.entries.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        entries.insert(
            key.to_wire(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Timestamp::now();
        let mut entries =
            self.entries.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        match entries.remove(&key.to_wire()) {
            Some(value) if value.is_expired(now) => Ok(None),
            Some(value) => Ok(Some(value.bytes)),
            None => Ok(None),
        }
    }

    fn scan(&self, prefix: &KeyPath) -> Result<Vec<(KeyPath, Vec<u8>)>, StoreError> {
        let now = Timestamp::now();
        let wire_prefix = prefix.wire_prefix();
        let entries =
            self.entries.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        let mut results = Vec::new();
        let range =
            entries.range::<String, _>((Bound::Included(wire_prefix.clone()), Bound::Unbounded));
        for (wire, value) in range {
            if !wire.starts_with(&wire_prefix) {
                break;
            }
            if value.is_expired(now) {
                continue;
            }
            results.push((KeyPath::from_wire(wire), value.bytes.clone()));
        }
        Ok(results)
    }
}
