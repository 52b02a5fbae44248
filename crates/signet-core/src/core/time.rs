// crates/signet-core/src/core/time.rs
// ============================================================================
// Module: Signet Time Model
// Description: Canonical timestamp representation for issuer records.
// Purpose: Provide a single unix-seconds timestamp type with clock helpers.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Signet records carry explicit unix-second timestamps. Engines read the
//! wall clock through [`Timestamp::now`] only; tests construct fixed values
//! directly, which keeps expiry and sliding-window logic deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch timestamp in whole seconds.
///
/// # Invariants
/// - Values are non-negative in practice; arithmetic saturates rather than wraps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from raw unix seconds.
    #[must_use]
    pub const fn from_unix(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(seconds)
    }

    /// Returns the raw unix-second value.
    #[must_use]
    pub const fn as_unix(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by `seconds`, saturating on overflow.
    #[must_use]
    pub const fn plus_secs(self, seconds: u64) -> Self {
        let delta = if seconds > i64::MAX as u64 { i64::MAX } else { seconds as i64 };
        Self(self.0.saturating_add(delta))
    }

    /// Returns this timestamp moved back by `seconds`, saturating on underflow.
    #[must_use]
    pub const fn minus_secs(self, seconds: u64) -> Self {
        let delta = if seconds > i64::MAX as u64 { i64::MAX } else { seconds as i64 };
        Self(self.0.saturating_sub(delta))
    }

    /// Returns the whole seconds elapsed from `earlier` to `self` (zero when negative).
    #[must_use]
    pub const fn seconds_since(self, earlier: Self) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta as u64 }
    }

    /// Returns true when this timestamp is strictly before `other`.
    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Formats the timestamp as an RFC 3339 string for API responses.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp(self.0)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

/// Returns the current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
