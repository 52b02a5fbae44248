// crates/signet-core/src/runtime/audit.rs
// ============================================================================
// Module: Audit Pipeline
// Description: Fire-and-forget per-region append with multi-region queries.
// Purpose: Record token lifecycle events without impacting OAuth responses.
// Dependencies: crate::core, crate::store, tracing
// ============================================================================

//! ## Overview
//! The recorder appends events to the local region's store on a
//! fire-and-forget path: failures are counted, never propagated. When the
//! failure rate exceeds ten percent over at least one hundred operations a
//! warning is logged. The query side filters locally and, in the
//! multi-region variant, fans out to every region in parallel with
//! per-region failure tolerance, tags events with their region, and merges
//! newest-first (oldest-first for token-family histories).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::audit::AuditQuery;
use crate::core::audit::TokenUsageEvent;
use crate::core::time::now_unix_millis;
use crate::store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Failure rate above which a warning is logged.
const WARN_FAILURE_RATE: f64 = 0.10;
/// Minimum operations before the failure rate is evaluated.
const WARN_MINIMUM_OPERATIONS: u64 = 100;

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Append-only audit store for one region.
pub trait AuditStore: Send + Sync {
    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append(&self, event: &TokenUsageEvent) -> Result<(), StoreError>;

    /// Returns events matching the query, unsorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query(&self, query: &AuditQuery) -> Result<Vec<TokenUsageEvent>, StoreError>;
}

/// In-memory audit store.
#[derive(Default)]
pub struct InMemoryAuditStore {
    /// Appended events in arrival order.
    events: Mutex<Vec<TokenUsageEvent>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, event: &TokenUsageEvent) -> Result<(), StoreError> {
        let mut events =
            self.events.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        events.push(event.clone());
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<TokenUsageEvent>, StoreError> {
        let events =
            self.events.lock().map_err(|err| StoreError::Unknown(err.to_string()))?;
        Ok(events.iter().filter(|event| query.matches(event)).cloned().collect())
    }
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Recorder metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditMetrics {
    /// Successful appends.
    pub success_count: u64,
    /// Failed appends.
    pub failure_count: u64,
    /// Failure rate over all appends.
    pub failure_rate: f64,
    /// Unix milliseconds of the last failure, when any.
    pub last_failure_ms: Option<i64>,
}

/// Fire-and-forget audit recorder for the local region.
///
/// # Invariants
/// - `record` never propagates failures to the caller.
pub struct AuditRecorder {
    /// Local region store.
    store: Arc<dyn AuditStore>,
    /// Successful append counter.
    success: AtomicU64,
    /// Failed append counter.
    failure: AtomicU64,
    /// Unix milliseconds of the last failure (zero when none).
    last_failure_ms: AtomicI64,
}

impl AuditRecorder {
    /// Creates a recorder over the local region store.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            last_failure_ms: AtomicI64::new(0),
        }
    }

    /// Appends an event, swallowing and counting failures.
    pub fn record(&self, event: TokenUsageEvent) {
        match self.store.append(&event) {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failure.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms.store(now_unix_millis(), Ordering::Relaxed);
                let metrics = self.metrics();
                if metrics.success_count + metrics.failure_count >= WARN_MINIMUM_OPERATIONS
                    && metrics.failure_rate > WARN_FAILURE_RATE
                {
                    tracing::warn!(
                        failure_rate = metrics.failure_rate,
                        failures = metrics.failure_count,
                        error = %err,
                        "audit append failure rate above threshold"
                    );
                } else {
                    tracing::debug!(error = %err, "audit append failed");
                }
            }
        }
    }

    /// Queries the local region.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<TokenUsageEvent>, StoreError> {
        let mut events = self.store.query(query)?;
        events.sort_by_key(|event| std::cmp::Reverse(event.timestamp_ms));
        Ok(paginate(events, query))
    }

    /// Returns the current metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> AuditMetrics {
        let success = self.success.load(Ordering::Relaxed);
        let failure = self.failure.load(Ordering::Relaxed);
        let total = success + failure;
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);
        AuditMetrics {
            success_count: success,
            failure_count: failure,
            failure_rate: if total == 0 { 0.0 } else { failure as f64 / total as f64 },
            last_failure_ms: if last_failure == 0 { None } else { Some(last_failure) },
        }
    }
}

// ============================================================================
// SECTION: Multi-Region Query
// ============================================================================

/// Multi-region audit query over named region stores.
///
/// # Invariants
/// - Region failures never fail the merged query; failed regions are skipped.
pub struct MultiRegionAuditQuery {
    /// Region stores keyed by region name.
    regions: BTreeMap<String, Arc<dyn AuditStore>>,
}

impl MultiRegionAuditQuery {
    /// Creates a fan-out query over the given regions.
    #[must_use]
    pub const fn new(regions: BTreeMap<String, Arc<dyn AuditStore>>) -> Self {
        Self { regions }
    }

    /// Queries every region in parallel and merges newest-first.
    ///
    /// Events are tagged with their region name.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<TokenUsageEvent> {
        let mut merged = self.fan_out(query);
        merged.sort_by_key(|event| std::cmp::Reverse(event.timestamp_ms));
        paginate(merged, query)
    }

    /// Queries every region and merges oldest-first for family histories.
    #[must_use]
    pub fn family_history(&self, query: &AuditQuery) -> Vec<TokenUsageEvent> {
        let mut merged = self.fan_out(query);
        merged.sort_by_key(|event| event.timestamp_ms);
        paginate(merged, query)
    }

    /// Fans the query out to all regions, tolerating per-region failures.
    fn fan_out(&self, query: &AuditQuery) -> Vec<TokenUsageEvent> {
        let mut merged = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .regions
                .iter()
                .map(|(name, store)| {
                    let store = Arc::clone(store);
                    scope.spawn(move || (name.clone(), store.query(query)))
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok((region, Ok(events))) => {
                        merged.extend(events.into_iter().map(|mut event| {
                            event.region = Some(region.clone());
                            event
                        }));
                    }
                    Ok((region, Err(err))) => {
                        tracing::warn!(region = %region, error = %err, "audit region query failed");
                    }
                    Err(_) => {
                        tracing::warn!("audit region query panicked");
                    }
                }
            }
        });
        merged
    }
}

/// Applies offset and limit after sorting.
fn paginate(events: Vec<TokenUsageEvent>, query: &AuditQuery) -> Vec<TokenUsageEvent> {
    events
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect()
}
