// crates/signet-core/src/core/audit.rs
// ============================================================================
// Module: Audit Records
// Description: Token usage events and query filters.
// Purpose: Define the append-only audit shapes recorded per region.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every token lifecycle transition appends a [`TokenUsageEvent`] to the
//! local region's audit store. Events are append-only and unordered across
//! regions; query merging and region tagging live in the audit runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::TokenId;

// ============================================================================
// SECTION: Event
// ============================================================================

/// Token lifecycle event categories.
///
/// # Invariants
/// - Variants are stable wire labels used in audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEventType {
    /// Token family created.
    Generated,
    /// Token rotated within its family.
    Refreshed,
    /// Token (and family) explicitly revoked.
    Revoked,
    /// Consumed token replayed; family revoked.
    Reused,
}

impl TokenEventType {
    /// Returns the stable wire label for this event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Refreshed => "refreshed",
            Self::Revoked => "revoked",
            Self::Reused => "reused",
        }
    }
}

/// Append-only token usage event.
///
/// # Invariants
/// - `timestamp_ms` is assigned by the recording region; no global order is
///   guaranteed across regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageEvent {
    /// Token the event refers to.
    pub token_id: TokenId,
    /// Subject key the token belongs to.
    pub subject: String,
    /// Lifecycle transition.
    pub event_type: TokenEventType,
    /// Client involved, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Caller IP, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Caller user agent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Event time in unix milliseconds.
    pub timestamp_ms: i64,
    /// Optional free-form context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Region tag added by multi-region queries; absent on local reads.
    #[serde(default, rename = "_region", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Filter for audit queries.
///
/// # Invariants
/// - All filters are conjunctive; `limit`/`offset` apply after sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Filter by subject key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Filter by event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<TokenEventType>,
    /// Filter by client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Inclusive lower bound in unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ms: Option<i64>,
    /// Exclusive upper bound in unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_ms: Option<i64>,
    /// Maximum events returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Events skipped after sorting.
    #[serde(default)]
    pub offset: usize,
}

impl AuditQuery {
    /// Returns true when `event` satisfies every filter.
    #[must_use]
    pub fn matches(&self, event: &TokenUsageEvent) -> bool {
        if let Some(subject) = &self.subject
            && &event.subject != subject
        {
            return false;
        }
        if let Some(event_type) = self.event_type
            && event.event_type != event_type
        {
            return false;
        }
        if let Some(client_id) = &self.client_id
            && event.client_id.as_ref() != Some(client_id)
        {
            return false;
        }
        if let Some(from) = self.from_ms
            && event.timestamp_ms < from
        {
            return false;
        }
        if let Some(until) = self.until_ms
            && event.timestamp_ms >= until
        {
            return false;
        }
        true
    }
}
