// crates/signet-store-sqlite/src/lib.rs
// ============================================================================
// Module: Signet SQLite Store
// Description: Durable storage adapter and replication outbox over SQLite.
// Purpose: Persist issuer state with WAL, TTLs, and parameterized access.
// Dependencies: signet-core, rusqlite
// ============================================================================

//! ## Overview
//! The SQLite store implements the key-addressed adapter contract with a WAL
//! journal, lazy TTL expiry, and an atomic remove-as-take inside a
//! transaction. The sync outbox persists client replication messages for the
//! last-write-wins consumer. Every statement is parameterized; the few
//! places that interpolate identifiers validate them against an allowlist.
//!
//! Security posture: database contents are untrusted on read; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;
mod sync;

pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
pub use sync::SqliteSyncOutbox;
