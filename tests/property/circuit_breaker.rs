//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - Failure count stays within `0..=failure_threshold` while closed
//! - An open breaker refuses every call until the recovery timeout
//! - Each state change is counted exactly once

use proptest::prelude::*;
use qbt_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use qbt_resilience_core::MockClock;
use std::time::Duration;

fn breaker(clock: &MockClock, threshold: u32, recovery: Duration) -> CircuitBreaker {
    CircuitBreaker::with_clock(
        CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .success_threshold(1)
            .recovery_timeout(recovery)
            .build(),
        clock.shared(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: while closed, the failure count never exceeds the threshold
    #[test]
    fn failure_count_stays_bounded(
        threshold in 1u32..=10,
        outcomes in prop::collection::vec(any::<bool>(), 0..100),
    ) {
        let clock = MockClock::new();
        let cb = breaker(&clock, threshold, Duration::from_secs(3600));

        for ok in outcomes {
            if !cb.allow() {
                prop_assert_eq!(cb.state(), CircuitState::Open);
                break;
            }
            if ok {
                cb.record_success();
            } else {
                cb.record_failure();
            }
            let snapshot = cb.snapshot();
            if snapshot.state == CircuitState::Closed {
                prop_assert!(snapshot.failure_count < threshold);
            }
        }
    }

    /// Property: `threshold` consecutive failures always open the breaker
    #[test]
    fn consecutive_failures_open(threshold in 1u32..=20) {
        let clock = MockClock::new();
        let cb = breaker(&clock, threshold, Duration::from_secs(60));

        for i in 0..threshold {
            prop_assert_eq!(cb.state(), CircuitState::Closed, "opened early at {}", i);
            prop_assert!(cb.allow());
            cb.record_failure();
        }
        prop_assert_eq!(cb.state(), CircuitState::Open);
        prop_assert_eq!(cb.snapshot().stats.state_changes, 1);
    }

    /// Property: an open breaker refuses calls strictly before the recovery timeout
    #[test]
    fn open_breaker_waits_for_recovery(
        recovery_ms in 1u64..=120_000,
        probe_ms in 0u64..=240_000,
    ) {
        let clock = MockClock::new();
        let recovery = Duration::from_millis(recovery_ms);
        let cb = breaker(&clock, 1, recovery);

        cb.record_failure();
        clock.advance(Duration::from_millis(probe_ms));

        let allowed = cb.allow();
        prop_assert_eq!(allowed, probe_ms >= recovery_ms);
        if allowed {
            prop_assert_eq!(cb.state(), CircuitState::HalfOpen);
        } else {
            prop_assert_eq!(cb.snapshot().stats.rejected, 1);
        }
    }
}
