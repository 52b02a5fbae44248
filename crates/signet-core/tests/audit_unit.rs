// crates/signet-core/tests/audit_unit.rs
// ============================================================================
// Module: Audit Pipeline Unit Tests
// Description: Recorder metrics and multi-region merge tests.
// Purpose: Validate fire-and-forget semantics and region-tagged merging.
// ============================================================================

//! Unit tests for the audit pipeline: swallowed failures with counters,
//! filter queries, and tolerant multi-region fan-out with region tags.

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

use std::collections::BTreeMap;
use std::sync::Arc;

use signet_core::AuditQuery;
use signet_core::AuditRecorder;
use signet_core::AuditStore;
use signet_core::InMemoryAuditStore;
use signet_core::MultiRegionAuditQuery;
use signet_core::TokenEventType;
use signet_core::TokenId;
use signet_core::TokenUsageEvent;
use signet_core::store::StoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn event(subject: &str, event_type: TokenEventType, timestamp_ms: i64) -> TokenUsageEvent {
    TokenUsageEvent {
        token_id: TokenId::new(format!("tok-{subject}-{timestamp_ms}")),
        subject: subject.to_string(),
        event_type,
        client_id: None,
        ip_address: None,
        user_agent: None,
        timestamp_ms,
        metadata: None,
        region: None,
    }
}

/// Audit store that always fails, for failure accounting tests.
struct FailingStore;

impl AuditStore for FailingStore {
    fn append(&self, _event: &TokenUsageEvent) -> Result<(), StoreError> {
        Err(StoreError::Connection("region down".to_string()))
    }

    fn query(&self, _query: &AuditQuery) -> Result<Vec<TokenUsageEvent>, StoreError> {
        Err(StoreError::Connection("region down".to_string()))
    }
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Append failures are swallowed and counted, never propagated.
#[test]
fn recorder_swallows_failures() {
    let recorder = AuditRecorder::new(Arc::new(FailingStore));
    for index in 0..5 {
        recorder.record(event("alice", TokenEventType::Generated, index));
    }
    let metrics = recorder.metrics();
    assert_eq!(metrics.failure_count, 5);
    assert_eq!(metrics.success_count, 0);
    assert!((metrics.failure_rate - 1.0).abs() < f64::EPSILON);
    assert!(metrics.last_failure_ms.is_some());
}

/// Successful appends keep the failure rate at zero.
#[test]
fn recorder_counts_successes() {
    let recorder = AuditRecorder::new(Arc::new(InMemoryAuditStore::new()));
    recorder.record(event("alice", TokenEventType::Generated, 1));
    recorder.record(event("alice", TokenEventType::Refreshed, 2));
    let metrics = recorder.metrics();
    assert_eq!(metrics.success_count, 2);
    assert!(metrics.failure_rate.abs() < f64::EPSILON);
}

/// Queries filter by subject and event type and sort newest-first.
#[test]
fn recorder_query_filters_and_sorts() {
    let recorder = AuditRecorder::new(Arc::new(InMemoryAuditStore::new()));
    recorder.record(event("alice", TokenEventType::Generated, 10));
    recorder.record(event("alice", TokenEventType::Refreshed, 30));
    recorder.record(event("bob", TokenEventType::Generated, 20));
    let events = recorder
        .query(&AuditQuery {
            subject: Some("alice".to_string()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp_ms, 30);
    assert_eq!(events[1].timestamp_ms, 10);
}

// ============================================================================
// SECTION: Multi-Region
// ============================================================================

/// Fan-out merges regions newest-first, tags regions, tolerates failures.
#[test]
fn multi_region_merge_is_tolerant() {
    let east = Arc::new(InMemoryAuditStore::new());
    let west = Arc::new(InMemoryAuditStore::new());
    east.append(&event("alice", TokenEventType::Generated, 100)).unwrap();
    west.append(&event("alice", TokenEventType::Refreshed, 200)).unwrap();

    let mut regions: BTreeMap<String, Arc<dyn AuditStore>> = BTreeMap::new();
    regions.insert("east".to_string(), east);
    regions.insert("west".to_string(), west);
    regions.insert("down".to_string(), Arc::new(FailingStore));

    let query = MultiRegionAuditQuery::new(regions);
    let merged = query.query(&AuditQuery::default());
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].timestamp_ms, 200);
    assert_eq!(merged[0].region.as_deref(), Some("west"));
    assert_eq!(merged[1].region.as_deref(), Some("east"));

    // Family histories merge oldest-first.
    let history = query.family_history(&AuditQuery::default());
    assert_eq!(history[0].timestamp_ms, 100);
}

/// Limit and offset apply after the merge sort.
#[test]
fn multi_region_pagination() {
    let east = Arc::new(InMemoryAuditStore::new());
    for index in 0..10 {
        east.append(&event("alice", TokenEventType::Generated, index)).unwrap();
    }
    let mut regions: BTreeMap<String, Arc<dyn AuditStore>> = BTreeMap::new();
    regions.insert("east".to_string(), east);
    let query = MultiRegionAuditQuery::new(regions);
    let page = query.query(&AuditQuery {
        limit: Some(3),
        offset: 2,
        ..AuditQuery::default()
    });
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].timestamp_ms, 7);
}
