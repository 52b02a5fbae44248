// crates/signet-core/tests/breaker_unit.rs
// ============================================================================
// Module: Circuit Breaker Unit Tests
// Description: State machine transition tests for the storage breaker.
// Purpose: Validate open/half-open/closed transitions and retry backoff.
// ============================================================================

//! Unit tests for breaker transitions: failure-rate trip, cooldown probe,
//! reclose on consecutive successes, and reopen on a half-open failure.

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

use std::time::Duration;

use signet_core::CircuitBreaker;
use signet_core::CircuitBreakerConfig;
use signet_core::CircuitState;
use signet_core::RetryPolicy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn fast_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 0.5,
        minimum_requests: 3,
        window_size: 10,
        cooldown_period: Duration::from_millis(20),
        success_threshold: 2,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Failures below the minimum request count never trip the breaker.
#[test]
fn breaker_stays_closed_below_minimum_requests() {
    let breaker = CircuitBreaker::new(fast_config());
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Exceeding the failure threshold over the window opens the circuit.
#[test]
fn breaker_opens_on_failure_rate() {
    let breaker = CircuitBreaker::new(fast_config());
    breaker.record_success();
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.try_acquire().is_err());
}

/// After the cooldown the breaker admits half-open probes.
#[test]
fn breaker_half_opens_after_cooldown() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..3 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(breaker.try_acquire().is_ok());
}

/// Consecutive half-open successes reclose the circuit.
#[test]
fn breaker_recloses_after_success_threshold() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..3 {
        breaker.record_failure();
    }
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.try_acquire().is_ok());
}

/// Any half-open failure reopens the circuit immediately.
#[test]
fn breaker_reopens_on_half_open_failure() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..3 {
        breaker.record_failure();
    }
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Backoff doubles from the initial delay and saturates at the cap.
#[test]
fn retry_policy_backs_off_exponentially() {
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        backoff_multiplier: 2.0,
    };
    assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    assert_eq!(policy.delay_for(1), Duration::from_millis(200));
    assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    assert_eq!(policy.delay_for(10), Duration::from_secs(2));
}
