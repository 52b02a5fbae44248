// crates/signet-store-sqlite/src/sync.rs
// ============================================================================
// Module: Replication Outbox
// Description: Durable sync-log queue for client replication messages.
// Purpose: Persist outbound writes until the LWW consumer applies them.
// Dependencies: signet-core, crate::store
// ============================================================================

//! ## Overview
//! The outbox persists every client replication message into the `sync_log`
//! table so a crash between the local write and remote apply loses nothing.
//! The consumer drains messages in enqueue order and applies them through
//! the client registry's idempotent last-write-wins path. Enqueue failures
//! are logged and dropped; replication is eventually consistent by design
//! and reads are always local.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use signet_core::ClientRegistry;
use signet_core::ClientRegistryError;
use signet_core::ReplicationQueue;
use signet_core::SyncMessage;

use crate::store::SqliteStore;

// ============================================================================
// SECTION: Outbox
// ============================================================================

/// Durable replication outbox over the `sync_log` table.
///
/// # Invariants
/// - Messages are drained in enqueue order.
/// - Enqueue never blocks or fails the local write path.
pub struct SqliteSyncOutbox {
    /// Backing store holding the `sync_log` table.
    store: Arc<SqliteStore>,
}

impl SqliteSyncOutbox {
    /// Creates an outbox over the given store.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Drains all pending messages in enqueue order.
    ///
    /// Undecodable payloads are logged and skipped.
    #[must_use]
    pub fn drain(&self) -> Vec<SyncMessage> {
        match self.store.drain_sync_payloads() {
            Ok(payloads) => payloads
                .into_iter()
                .filter_map(|payload| match serde_json::from_slice(&payload) {
                    Ok(message) => Some(message),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping undecodable sync payload");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "sync log drain failed");
                Vec::new()
            }
        }
    }

    /// Drains the outbox and applies every message to a replica registry.
    ///
    /// Returns the number of applied messages.
    ///
    /// # Errors
    ///
    /// Returns [`ClientRegistryError`] when an apply fails; already-drained
    /// messages before the failure stay applied (the path is idempotent, so
    /// re-applying on retry is safe).
    pub fn apply_to(&self, replica: &ClientRegistry) -> Result<usize, ClientRegistryError> {
        let messages = self.drain();
        let mut applied = 0usize;
        for message in &messages {
            replica.apply_sync_message(message)?;
            applied += 1;
        }
        Ok(applied)
    }
}

impl ReplicationQueue for SqliteSyncOutbox {
    fn enqueue(&self, message: SyncMessage) {
        match serde_json::to_vec(&message) {
            Ok(payload) => {
                if let Err(err) = self.store.append_sync_payload(&payload) {
                    tracing::warn!(error = %err, "sync log append failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sync message serialization failed");
            }
        }
    }
}
