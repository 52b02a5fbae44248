// crates/signet-core/src/runtime/breaker.rs
// ============================================================================
// Module: Circuit Breaker + Retry
// Description: Failure-counting state machine and exponential backoff policy.
// Purpose: Short-circuit calls into a failing storage dependency.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The breaker tracks call outcomes over a sliding window. In `closed`, once
//! the window holds at least `minimum_requests` results and the failure rate
//! exceeds `failure_threshold`, the breaker opens and rejects fast for the
//! cooldown period. After the cooldown it admits limited traffic
//! (`half-open`); `success_threshold` consecutive successes reclose it, any
//! failure reopens it. Cancelled attempts record neither success nor failure.
//!
//! The retry policy pairs with the breaker at component edges: transient
//! errors back off exponentially, permanent and domain errors never retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Circuit breaker tuning.
///
/// # Invariants
/// - `failure_threshold` is a rate in `(0, 1]`.
/// - `window_size` >= `minimum_requests` >= 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure rate that opens the circuit.
    pub failure_threshold: f64,
    /// Minimum window occupancy before the rate is evaluated.
    pub minimum_requests: usize,
    /// Sliding window size in call outcomes.
    pub window_size: usize,
    /// Time spent open before admitting half-open probes.
    pub cooldown_period: Duration,
    /// Consecutive half-open successes required to reclose.
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            minimum_requests: 3,
            window_size: 10,
            cooldown_period: Duration::from_secs(1),
            success_threshold: 2,
        }
    }
}

/// Retry tuning for transient storage errors.
///
/// # Invariants
/// - Delay grows by `backoff_multiplier` per attempt, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(if millis.is_finite() && millis > 0.0 { millis as u64 } else { 0 })
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow; outcomes are recorded into the window.
    Closed,
    /// Calls are rejected fast until the cooldown elapses.
    Open,
    /// Limited probe traffic is admitted.
    HalfOpen,
}

/// Fast rejection emitted while the circuit is open.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("circuit breaker open")]
pub struct CircuitBreakerError;

/// Interior breaker state behind the lock.
#[derive(Debug)]
struct BreakerInner {
    /// Current state.
    state: CircuitState,
    /// Sliding window of outcomes (`true` = success).
    window: VecDeque<bool>,
    /// Instant the circuit last opened.
    opened_at: Option<Instant>,
    /// Consecutive successes while half-open.
    half_open_successes: usize,
}

/// Circuit breaker protecting one dependency.
///
/// # Invariants
/// - State transitions occur only under the lock; callers observe a
///   consistent state per call.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Guarded state machine.
    inner: Mutex<BreakerInner>,
    /// Tuning parameters.
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_successes: 0,
            }),
            config,
        }
    }

    /// Returns the current state, applying the open-to-half-open transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let Ok(mut inner) = self.inner.lock() else {
            return CircuitState::Open;
        };
        self.advance(&mut inner);
        inner.state
    }

    /// Admits or rejects a call under the current state.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError`] while the circuit is open.
    pub fn try_acquire(&self) -> Result<(), CircuitBreakerError> {
        let Ok(mut inner) = self.inner.lock() else {
            return Err(CircuitBreakerError);
        };
        self.advance(&mut inner);
        match inner.state {
            CircuitState::Open => Err(CircuitBreakerError),
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.window.clear();
                        inner.opened_at = None;
                        inner.half_open_successes = 0;
                    }
                }
                CircuitState::Closed => self.push_outcome(&mut inner, true),
                CircuitState::Open => {}
            }
        }
    }

    /// Records a failed call outcome.
    pub fn record_failure(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            match inner.state {
                CircuitState::HalfOpen => self.trip(&mut inner),
                CircuitState::Closed => {
                    self.push_outcome(&mut inner, false);
                    if self.should_trip(&inner) {
                        self.trip(&mut inner);
                    }
                }
                CircuitState::Open => {}
            }
        }
    }

    /// Pushes an outcome into the sliding window.
    fn push_outcome(&self, inner: &mut BreakerInner, success: bool) {
        if inner.window.len() >= self.config.window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(success);
    }

    /// Returns true when the window justifies opening the circuit.
    fn should_trip(&self, inner: &BreakerInner) -> bool {
        if inner.window.len() < self.config.minimum_requests {
            return false;
        }
        let failures = inner.window.iter().filter(|success| !**success).count();
        let rate = failures as f64 / inner.window.len() as f64;
        rate > self.config.failure_threshold
    }

    /// Opens the circuit and stamps the cooldown start.
    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_successes = 0;
    }

    /// Applies the open-to-half-open transition once the cooldown elapses.
    fn advance(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|opened| opened.elapsed() >= self.config.cooldown_period)
        {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            inner.window.clear();
        }
    }
}
