// crates/signet-core/src/store/scoped.rs
// ============================================================================
// Module: Tenant-Scoped Storage
// Description: Transparent per-tenant key prefixing over the adapter contract.
// Purpose: Guarantee tenant isolation for every downstream component.
// Dependencies: none beyond the storage contract
// ============================================================================

//! ## Overview
//! The scoped store prepends `["t", tenant_id]` to every key so no component
//! operating through it can reach another tenant's state. All mutating
//! operations of downstream components go through this wrapper; direct
//! adapter access is reserved for global state (the tenant registry itself,
//! audit regions, and signing keys).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::identifiers::TenantId;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Scoped Store
// ============================================================================

/// Storage handle confined to one tenant's key space.
///
/// # Invariants
/// - Every key is prefixed with `["t", tenant_id]` before reaching the
///   adapter; scan results are returned with the prefix stripped.
#[derive(Clone)]
pub struct TenantScopedStore {
    /// Underlying adapter.
    inner: Arc<dyn KeyValueStore>,
    /// Prefix applied to every key.
    prefix: KeyPath,
    /// Tenant this handle is confined to.
    tenant_id: TenantId,
}

impl TenantScopedStore {
    /// Creates a scoped handle for `tenant_id` over `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, tenant_id: TenantId) -> Self {
        let prefix = KeyPath::from_segments(&["t", tenant_id.as_str()]);
        Self {
            inner,
            prefix,
            tenant_id,
        }
    }

    /// Returns the tenant this handle is confined to.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl KeyValueStore for TenantScopedStore {
    fn get(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(&key.prefixed_with(&self.prefix))
    }

    fn set(&self, key: &KeyPath, value: &[u8], ttl_secs: Option<u64>) -> Result<(), StoreError> {
        self.inner.set(&key.prefixed_with(&self.prefix), value, ttl_secs)
    }

    fn remove(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.remove(&key.prefixed_with(&self.prefix))
    }

    fn scan(&self, prefix: &KeyPath) -> Result<Vec<(KeyPath, Vec<u8>)>, StoreError> {
        let scoped_prefix = prefix.prefixed_with(&self.prefix);
        let entries = self.inner.scan(&scoped_prefix)?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix).map(|stripped| (stripped, value))
            })
            .collect())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}
