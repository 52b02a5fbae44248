// crates/signet-core/src/store/mod.rs
// ============================================================================
// Module: Storage Contract
// Description: Key-addressed storage adapter contract with TTL support.
// Purpose: Define the backend seam every persisted subsystem builds on.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Storage is a key-addressed adapter: ordered tuples of short strings map to
//! opaque JSON byte payloads, optionally with a TTL. No transactions exist;
//! services implement optimistic concurrency themselves. [`KeyValueStore::remove`]
//! returns the removed value, which is the atomic take used for single-use
//! authorization codes and refresh token consumption.
//!
//! Security posture: stored bytes are untrusted on read; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod memory;
mod scoped;

pub use memory::MemoryStore;
pub use scoped::TenantScopedStore;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Key Path
// ============================================================================

/// Separator used in the wire encoding of key paths.
const WIRE_SEPARATOR: char = '/';

/// Ordered tuple of short strings addressing one stored value.
///
/// # Invariants
/// - Segments are non-empty UTF-8; the wire form escapes the separator so
///   prefix scans match whole segments only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Creates a key path from owned segments.
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Creates a key path from string slices.
    #[must_use]
    pub fn from_segments(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| (*s).to_string()).collect())
    }

    /// Returns the segments of this path.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns a new path with `prefix` segments prepended.
    #[must_use]
    pub fn prefixed_with(&self, prefix: &Self) -> Self {
        let mut segments = prefix.0.clone();
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// Returns the path with `prefix` removed, or `None` when it does not apply.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        if self.0.len() < prefix.0.len() || self.0[..prefix.0.len()] != prefix.0[..] {
            return None;
        }
        Some(Self(self.0[prefix.0.len()..].to_vec()))
    }

    /// Returns the canonical wire encoding (escaped segments joined by `/`).
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                out.push(WIRE_SEPARATOR);
            }
            for c in segment.chars() {
                match c {
                    WIRE_SEPARATOR => out.push_str("%2F"),
                    '%' => out.push_str("%25"),
                    other => out.push(other),
                }
            }
        }
        out
    }

    /// Parses a wire encoding back into a key path.
    #[must_use]
    pub fn from_wire(wire: &str) -> Self {
        let segments = wire
            .split(WIRE_SEPARATOR)
            .map(|segment| segment.replace("%2F", "/").replace("%25", "%"))
            .collect();
        Self(segments)
    }

    /// Returns the wire encoding used to scan everything below this path.
    #[must_use]
    pub fn wire_prefix(&self) -> String {
        let mut wire = self.to_wire();
        wire.push(WIRE_SEPARATOR);
        wire
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage adapter errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; transiency drives the
///   retry policy at component edges.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation timed out.
    #[error("store timeout: {0}")]
    Timeout(String),
    /// Connection to the backend failed.
    #[error("store connection error: {0}")]
    Connection(String),
    /// Backend throttled the request.
    #[error("store rate limited: {0}")]
    RateLimited(String),
    /// Uniqueness or constraint violation.
    #[error("store constraint violation: {0}")]
    Constraint(String),
    /// Malformed statement or identifier.
    #[error("store syntax error: {0}")]
    Syntax(String),
    /// Payload failed to serialize or deserialize.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Addressed entity does not exist.
    #[error("store not found: {0}")]
    NotFound(String),
    /// Backend reported an uncategorized error.
    #[error("store error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Returns true when the error class is worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited(_) | Self::Unknown(_)
        )
    }
}

// ============================================================================
// SECTION: Adapter Contract
// ============================================================================

/// Key-addressed storage adapter.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value at `key`, when present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn get(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` at `key`, optionally expiring after `ttl_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn set(&self, key: &KeyPath, value: &[u8], ttl_secs: Option<u64>) -> Result<(), StoreError>;

    /// Removes and returns the value at `key`, when present and unexpired.
    ///
    /// The take is atomic with respect to other removers; single-use handles
    /// rely on exactly one caller receiving the value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn remove(&self, key: &KeyPath) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns all unexpired entries strictly below `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn scan(&self, prefix: &KeyPath) -> Result<Vec<(KeyPath, Vec<u8>)>, StoreError>;

    /// Reports adapter readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the adapter is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: JSON Helpers
// ============================================================================

/// Reads and deserializes the JSON value at `key`.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the payload fails to deserialize.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &KeyPath,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Serializes `value` as JSON and stores it at `key`.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the payload fails to serialize.
pub fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &KeyPath,
    value: &T,
    ttl_secs: Option<u64>,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|err| StoreError::Invalid(err.to_string()))?;
    store.set(key, &bytes, ttl_secs)
}

/// Removes the value at `key` and deserializes it when present.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the payload fails to deserialize.
pub fn take_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &KeyPath,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = store.remove(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|err| StoreError::Invalid(err.to_string()))
}
