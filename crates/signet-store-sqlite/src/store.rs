// crates/signet-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Key-Value Store
// Description: Durable KeyValueStore backed by SQLite WAL.
// Purpose: Persist key-addressed issuer state with TTLs and atomic takes.
// Dependencies: signet-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Keys are stored in their canonical wire encoding with an optional
//! absolute expiry. Reads filter expired rows; touched expired rows are
//! deleted lazily. `remove` runs SELECT + DELETE inside one transaction so
//! single-use handles (authorization codes, refresh consumption) observe an
//! atomic take. Path inputs are validated before the database is opened and
//! fail closed on traversal or length violations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use signet_core::Timestamp;
use signet_core::store::KeyPath;
use signet_core::store::KeyValueStore;
use signet_core::store::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version recorded in `user_version`.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper-bound sentinel appended to prefixes for range scans.
const RANGE_SENTINEL: char = '\u{10FFFF}';
/// Tables that maintenance helpers may name.
const ALLOWED_TABLES: &[&str] = &["kv", "sync_log"];

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store initialization errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database path failed validation.
    #[error("invalid sqlite path: {0}")]
    InvalidPath(String),
    /// Stored schema version is newer than this binary supports.
    #[error("unsupported sqlite schema version: {0}")]
    SchemaVersion(i64),
    /// Underlying `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable `SQLite`-backed key-value store.
///
/// # Invariants
/// - All access serializes through one connection behind a mutex; `remove`
///   runs in a transaction and is an atomic take.
pub struct SqliteStore {
    /// Guarded connection.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and migrates) a store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] for invalid paths, schema mismatches, or
    /// `SQLite` failures.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_path(&config.path)?;
        let conn = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        // Pragma values come from closed enums; execute_batch discards the
        // row journal_mode reports back.
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};\nPRAGMA synchronous = {};",
            config.journal_mode.pragma_value(),
            config.sync_mode.pragma_value()
        ))
        .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        if version > SCHEMA_VERSION {
            return Err(SqliteStoreError::SchemaVersion(version));
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload BLOB NOT NULL,
                enqueued_at INTEGER NOT NULL
            );",
        )
        .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|err| SqliteStoreError::Sqlite(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deletes every expired row; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![Timestamp::now().as_unix()],
            )
            .map_err(map_sqlite_error)?;
        Ok(removed)
    }

    /// Returns the row count of an allowlisted table.
    ///
    /// The identifier is validated against the allowlist before it is
    /// interpolated; values are always bound as parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Syntax`] for identifiers outside the allowlist.
    pub fn table_len(&self, table: &str) -> Result<u64, StoreError> {
        if !ALLOWED_TABLES.contains(&table) {
            return Err(StoreError::Syntax(format!("table not allowlisted: {table}")));
        }
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(map_sqlite_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Acquires the connection lock.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|err| StoreError::Unknown(err.to_string()))
    }

    /// Appends a payload to the sync log; used by the replication outbox.
    pub(crate) fn append_sync_payload(&self, payload: &[u8]) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_log (payload, enqueued_at) VALUES (?1, ?2)",
            params![payload, Timestamp::now().as_unix()],
        )
        .map_err(map_sqlite_error)?;
        Ok(())
    }

    /// Drains sync payloads in enqueue order.
    pub(crate) fn drain_sync_payloads(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        let payloads = {
            let mut stmt = tx
                .prepare("SELECT id, payload FROM sync_log ORDER BY id ASC")
                .map_err(map_sqlite_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(map_sqlite_error)?;
            let mut payloads = Vec::new();
            for row in rows {
                payloads.push(row.map_err(map_sqlite_error)?);
            }
            payloads
        };
        for (id, _) in &payloads {
            tx.execute("DELETE FROM sync_log WHERE id = ?1", params![id])
                .map_err(map_sqlite_error)?;
        }
        tx.commit().map_err(map_sqlite_error)?;
        Ok(payloads.into_iter().map(|(_, payload)| payload).collect())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Timestamp::now().as_unix();
        let conn = self.lock()?;
        let row: Option<(Vec<u8>, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key.to_wire()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(map_sqlite_error)?;
        match row {
            Some((_, Some(expires_at))) if expires_at <= now => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key.to_wire()])
                    .map_err(map_sqlite_error)?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &KeyPath, value: &[u8], ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let expires_at = ttl_secs.map(|ttl| Timestamp::now().plus_secs(ttl).as_unix());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key.to_wire(), value, expires_at],
        )
        .map_err(map_sqlite_error)?;
        Ok(())
    }

    fn remove(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Timestamp::now().as_unix();
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        let row: Option<(Vec<u8>, Option<i64>)> = tx
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key.to_wire()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(map_sqlite_error)?;
        tx.execute("DELETE FROM kv WHERE key = ?1", params![key.to_wire()])
            .map_err(map_sqlite_error)?;
        tx.commit().map_err(map_sqlite_error)?;
        Ok(match row {
            Some((_, Some(expires_at))) if expires_at <= now => None,
            Some((value, _)) => Some(value),
            None => None,
        })
    }

    fn scan(&self, prefix: &KeyPath) -> Result<Vec<(KeyPath, Vec<u8>)>, StoreError> {
        let now = Timestamp::now().as_unix();
        let lower = prefix.wire_prefix();
        let mut upper = lower.clone();
        upper.push(RANGE_SENTINEL);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM kv
                 WHERE key >= ?1 AND key < ?2
                   AND (expires_at IS NULL OR expires_at > ?3)
                 ORDER BY key ASC",
            )
            .map_err(map_sqlite_error)?;
        let rows = stmt
            .query_map(params![lower, upper, now], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(map_sqlite_error)?;
        let mut results = Vec::new();
        for row in rows {
            let (wire, value) = row.map_err(map_sqlite_error)?;
            results.push((KeyPath::from_wire(&wire), value));
        }
        Ok(results)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(map_sqlite_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps `rusqlite` errors onto the adapter error taxonomy.
fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                StoreError::Timeout(err.to_string())
            }
            ErrorCode::ConstraintViolation => StoreError::Constraint(err.to_string()),
            ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
                StoreError::Connection(err.to_string())
            }
            _ => StoreError::Unknown(err.to_string()),
        },
        rusqlite::Error::InvalidQuery => StoreError::Syntax(err.to_string()),
        _ => StoreError::Unknown(err.to_string()),
    }
}

/// Validates the database path against traversal and length limits.
fn validate_path(path: &Path) -> Result<(), SqliteStoreError> {
    let rendered = path.to_string_lossy();
    if rendered.is_empty() {
        return Err(SqliteStoreError::InvalidPath("empty path".to_string()));
    }
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::InvalidPath("path too long".to_string()));
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(SqliteStoreError::InvalidPath(
                    "parent traversal is not permitted".to_string(),
                ));
            }
            Component::Normal(part) => {
                if part.to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
                    return Err(SqliteStoreError::InvalidPath(
                        "path component too long".to_string(),
                    ));
                }
            }
            _ => {}
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::InvalidPath("path is a directory".to_string()));
    }
    Ok(())
}
