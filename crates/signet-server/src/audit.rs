// crates/signet-server/src/audit.rs
// ============================================================================
// Module: Audit Sinks
// Description: File-backed audit region store emitting JSON lines.
// Purpose: Route token usage events to the deployment's logging pipeline.
// Dependencies: signet-core, serde_json
// ============================================================================

//! ## Overview
//! The file store appends one JSON object per line so deployments can tail
//! the log into their preferred pipeline without redesign. Queries re-read
//! the file; this is intentionally simple because heavy query traffic
//! belongs on a real regional store behind the same trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use signet_core::AuditQuery;
use signet_core::AuditStore;
use signet_core::TokenUsageEvent;
use signet_core::store::StoreError;

// ============================================================================
// SECTION: File Store
// ============================================================================

/// Append-only JSON-line audit store.
///
/// # Invariants
/// - One event per line; undecodable lines are skipped on read.
pub struct FileAuditStore {
    /// Append handle guarded for concurrent writers.
    file: Mutex<File>,
    /// Path re-opened for queries.
    path: PathBuf,
}

impl FileAuditStore {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }
}

impl AuditStore for FileAuditStore {
    fn append(&self, event: &TokenUsageEvent) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(event).map_err(|err| StoreError::Invalid(err.to_string()))?;
        let mut file = self.file.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        writeln!(file, "{payload}").map_err(|err| StoreError::Connection(err.to_string()))?;
        file.flush().map_err(|err| StoreError::Connection(err.to_string()))?;
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<TokenUsageEvent>, StoreError> {
        let file =
            File::open(&self.path).map_err(|err| StoreError::Connection(err.to_string()))?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|err| StoreError::Connection(err.to_string()))?;
            let Ok(event) = serde_json::from_str::<TokenUsageEvent>(&line) else {
                continue;
            };
            if query.matches(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }
}
