//! Property tests for the rate limiter.
//!
//! Invariants tested:
//! - Admitted tokens never exceed capacity plus what was replenished
//! - Available tokens stay within `0..=capacity`
//! - Waiting for the hint is enough to be admitted
//! - No window-length span of a sliding window holds more than capacity

use proptest::prelude::*;
use qbt_resilience_core::MockClock;
use qbt_resilience_ratelimiter::{RateLimiter, RateLimiterConfig, Strategy as Algorithm};
use std::time::Duration;

fn algorithms() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::TokenBucket),
        Just(Algorithm::LeakyBucket),
        Just(Algorithm::FixedWindow),
        Just(Algorithm::SlidingWindow),
    ]
}

fn limiter(clock: &MockClock, algorithm: Algorithm, rate: f64, capacity: f64) -> RateLimiter {
    RateLimiter::with_clock(
        RateLimiterConfig::builder()
            .strategy(algorithm)
            .rate(rate)
            .capacity(capacity)
            .window(Duration::from_secs(1))
            .build(),
        clock.shared(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the limiter never grants more than its budget allows
    #[test]
    fn admitted_tokens_are_bounded(
        algorithm in algorithms(),
        rate in 1.0f64..=50.0,
        capacity in 1.0f64..=50.0,
        steps in prop::collection::vec((0u64..=200, 0.5f64..=5.0), 1..80),
    ) {
        let clock = MockClock::new();
        let rl = limiter(&clock, algorithm, rate, capacity);

        let mut admitted = 0.0;
        for (advance_ms, tokens) in &steps {
            clock.advance(Duration::from_millis(*advance_ms));
            if rl.try_acquire(*tokens).is_admitted() {
                admitted += tokens;
            }
        }

        let elapsed = clock.elapsed().as_secs_f64();
        let budget = match algorithm {
            Algorithm::TokenBucket | Algorithm::LeakyBucket => capacity + rate * elapsed,
            // one full window per elapsed second, the first included
            Algorithm::FixedWindow | Algorithm::SlidingWindow => capacity * (elapsed.floor() + 2.0),
        };
        prop_assert!(admitted <= budget + 1e-6, "admitted {} > budget {}", admitted, budget);
    }

    /// Property: every closed span of one window, measured from any
    /// admission, holds at most `capacity` admitted tokens
    #[test]
    fn sliding_window_never_overfills_a_span(
        capacity in 1.0f64..=10.0,
        steps in prop::collection::vec(
            (
                prop_oneof![3 => 0u64..=400, 1 => Just(1_000u64)],
                prop_oneof![1 => Just(0.0f64), 4 => 0.5f64..=3.0],
            ),
            1..120,
        ),
    ) {
        let clock = MockClock::new();
        let rl = limiter(&clock, Algorithm::SlidingWindow, 5.0, capacity);
        let window = Duration::from_secs(1);

        let mut admitted: Vec<(Duration, f64)> = Vec::new();
        for (advance_ms, tokens) in &steps {
            clock.advance(Duration::from_millis(*advance_ms));
            if rl.try_acquire(*tokens).is_admitted() {
                admitted.push((clock.elapsed(), *tokens));
            }
        }

        for &(start, _) in &admitted {
            let in_span: f64 = admitted
                .iter()
                .filter(|(at, _)| *at >= start && *at <= start + window)
                .map(|(_, tokens)| tokens)
                .sum();
            prop_assert!(
                in_span <= capacity + 1e-6,
                "{} tokens admitted in [{:?}, {:?}]",
                in_span,
                start,
                start + window
            );
        }
    }

    /// Property: availability is always between zero and capacity
    #[test]
    fn availability_is_clamped(
        algorithm in algorithms(),
        capacity in 1.0f64..=20.0,
        steps in prop::collection::vec((0u64..=2_000, 0.1f64..=25.0), 1..40),
    ) {
        let clock = MockClock::new();
        let rl = limiter(&clock, algorithm, 5.0, capacity);

        for (advance_ms, tokens) in steps {
            clock.advance(Duration::from_millis(advance_ms));
            rl.try_acquire(tokens);
            let available = rl.available();
            prop_assert!((0.0..=capacity).contains(&available));
        }
    }

    /// Property: a denied request that fits succeeds after waiting its hint
    #[test]
    fn wait_hint_is_sufficient(
        algorithm in algorithms(),
        rate in 1.0f64..=20.0,
        capacity in 1.0f64..=20.0,
        fraction in 0.05f64..=1.0,
    ) {
        let clock = MockClock::new();
        let rl = limiter(&clock, algorithm, rate, capacity);
        let tokens = capacity * fraction;

        while rl.try_acquire(tokens).is_admitted() {}
        let hint = rl.try_acquire(tokens).wait_hint();
        prop_assert!(hint.is_some());

        // round up past float truncation in the hint
        clock.advance(hint.unwrap_or_default() + Duration::from_micros(1));
        prop_assert!(rl.try_acquire(tokens).is_admitted());
    }
}
