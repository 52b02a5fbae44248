// crates/signet-server/src/ratelimit.rs
// ============================================================================
// Module: Rate Limiting
// Description: Sliding-window request counters keyed by caller identity.
// Purpose: Bound request rates per subject, client, or IP with 429 replies.
// Dependencies: none beyond the standard library
// ============================================================================

//! ## Overview
//! The limiter keeps one sliding window of request instants per key
//! (subject, client id, or IP). A request is admitted when fewer than
//! `max_requests` instants remain inside the window; rejected requests learn
//! the `Retry-After` delay from the oldest tracked instant. The in-memory
//! backend satisfies the pluggable store seam; per-endpoint overrides wrap
//! the same limiter with different tuning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tracked keys before the limiter evicts stale entries.
const MAX_TRACKED_KEYS: usize = 65_536;

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted.
    Allowed,
    /// Request rejected; retry after the given whole seconds.
    Limited {
        /// Seconds until the oldest tracked request leaves the window.
        retry_after_secs: u64,
    },
}

// ============================================================================
// SECTION: Store Seam
// ============================================================================

/// Pluggable backend for rate limit windows.
pub trait RateLimitStore: Send + Sync {
    /// Records a request for `key` and returns the admission decision.
    fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateDecision;
}

/// In-memory sliding-window backend.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    /// Request instants per key, oldest first.
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl MemoryRateLimitStore {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return RateDecision::Allowed;
        };
        if windows.len() >= MAX_TRACKED_KEYS && !windows.contains_key(key) {
            windows.retain(|_, instants| {
                instants.back().is_some_and(|last| now.duration_since(*last) < window)
            });
        }
        let instants = windows.entry(key.to_string()).or_default();
        while instants.front().is_some_and(|first| now.duration_since(*first) >= window) {
            instants.pop_front();
        }
        if instants.len() >= max_requests as usize {
            let retry_after = instants
                .front()
                .map(|first| window.saturating_sub(now.duration_since(*first)))
                .unwrap_or(window);
            return RateDecision::Limited {
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }
        instants.push_back(now);
        RateDecision::Allowed
    }
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Rate limiter with default tuning and per-endpoint overrides.
pub struct SlidingWindowLimiter {
    /// Backend store.
    store: Box<dyn RateLimitStore>,
    /// Default maximum requests per window.
    max_requests: u32,
    /// Default window length.
    window: Duration,
    /// Whether the limiter is enforced at all.
    enabled: bool,
    /// Per-endpoint overrides keyed by route label.
    overrides: HashMap<String, (u32, Duration)>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter over the in-memory backend.
    #[must_use]
    pub fn new(enabled: bool, max_requests: u32, window: Duration) -> Self {
        Self {
            store: Box::new(MemoryRateLimitStore::new()),
            max_requests,
            window,
            enabled,
            overrides: HashMap::new(),
        }
    }

    /// Registers a per-endpoint override.
    pub fn set_override(&mut self, route: impl Into<String>, max_requests: u32, window: Duration) {
        self.overrides.insert(route.into(), (max_requests, window));
    }

    /// Checks one request keyed by caller identity and route.
    #[must_use]
    pub fn check(&self, route: &str, caller_key: &str) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }
        let (max_requests, window) =
            self.overrides.get(route).copied().unwrap_or((self.max_requests, self.window));
        self.store.check(&format!("{route}:{caller_key}"), max_requests, window)
    }
}
