use super::Harness;
use qbt_resilience::circuitbreaker::{CircuitBreakerConfig, CircuitState};
use qbt_resilience::ratelimiter::{RateLimiterConfig, Strategy};
use qbt_resilience::retry::RetryPolicy;
use qbt_resilience::{CallOptions, TrafficError};
use qbt_resilience_core::{Classify, ErrorKind, Failure};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fail(kind: ErrorKind) -> Failure {
    Failure::new(kind, "upstream")
}

#[tokio::test]
async fn plain_call_passes_value_through() {
    let h = Harness::new();
    let value = h
        .controller
        .call(&CallOptions::new(), || async { Ok::<_, Failure>(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!(h.metrics.counter("traffic_calls_total"), 1);
    assert!(h.clock.sleeps().is_empty());
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let h = Harness::new();
    let calls = AtomicU32::new(0);

    let err = h
        .controller
        .call(&CallOptions::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<(), _>(Failure::new(ErrorKind::Timeout, format!("attempt {n}"))) }
        })
        .await
        .unwrap_err();

    match err {
        TrafficError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.message(), "attempt 3");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(h.metrics.counter("traffic_attempt_failures_total"), 3);
    assert_eq!(
        h.metrics
            .counter_with("traffic_calls_total", &[("outcome", "exhausted".into())]),
        1
    );
}

#[tokio::test]
async fn non_retryable_error_is_returned_after_one_attempt() {
    let h = Harness::new();
    let breaker = h
        .controller
        .register_breaker("qbt", CircuitBreakerConfig::standard());
    let calls = AtomicU32::new(0);

    let err = h
        .controller
        .call(&CallOptions::new().breaker("qbt"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(fail(ErrorKind::Auth)) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TrafficError::Operation(ref e) if e.kind() == ErrorKind::Auth));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.snapshot().stats.failures, 1);
}

#[tokio::test]
async fn disabled_retry_exhausts_after_one_attempt() {
    let h = Harness::new();
    let err = h
        .controller
        .call(&CallOptions::new().no_retry(), || async {
            Err::<(), _>(fail(ErrorKind::Network))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TrafficError::RetriesExhausted { attempts: 1, .. }));
    assert!(h.clock.sleeps().is_empty());
}

#[tokio::test]
async fn disabled_retry_still_surfaces_non_retryable_errors() {
    let h = Harness::new();
    let err = h
        .controller
        .call(&CallOptions::new().no_retry(), || async {
            Err::<(), _>(fail(ErrorKind::Auth))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TrafficError::Operation(ref e) if e.kind() == ErrorKind::Auth));
    assert_eq!(
        h.metrics
            .counter_with("traffic_calls_total", &[("outcome", "failed".into())]),
        1
    );
}

#[tokio::test]
async fn non_retryable_error_on_last_attempt_is_not_exhaustion() {
    let h = Harness::new();
    let calls = AtomicU32::new(0);

    let err = h
        .controller
        .call(&CallOptions::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let kind = if n < 3 { ErrorKind::Network } else { ErrorKind::Auth };
            async move { Err::<(), _>(fail(kind)) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TrafficError::Operation(ref e) if e.kind() == ErrorKind::Auth));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn per_call_policy_overrides_default() {
    let h = Harness::new();
    let calls = AtomicU32::new(0);
    let opts = CallOptions::new().retry(
        RetryPolicy::builder()
            .max_attempts(5)
            .fixed_delay(Duration::from_millis(100))
            .build(),
    );

    let _ = h
        .controller
        .call(&opts, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(fail(ErrorKind::Server)) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(100); 4]);
}

#[tokio::test]
async fn rate_limited_calls_never_touch_the_breaker() {
    let h = Harness::new();
    let breaker = h
        .controller
        .register_breaker("qbt", CircuitBreakerConfig::strict());
    h.controller.register_limiter(
        "qbt",
        RateLimiterConfig::builder()
            .rate(1.0)
            .capacity(1.0)
            .timeout(Duration::ZERO),
    );
    let opts = CallOptions::new().breaker("qbt").limiter("qbt");

    h.controller
        .call(&opts, || async { Ok::<_, Failure>(()) })
        .await
        .unwrap();
    for _ in 0..5 {
        let err = h
            .controller
            .call(&opts, || async { Ok::<_, Failure>(()) })
            .await
            .unwrap_err();
        match err {
            TrafficError::RateLimited { limiter, wait_hint } => {
                assert_eq!(limiter, "qbt");
                assert_eq!(wait_hint, Some(Duration::from_secs(1)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    let stats = breaker.snapshot().stats;
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.rejected, 0);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn limiter_wait_goes_through_the_clock() {
    let h = Harness::new();
    h.controller.register_limiter(
        "tracker",
        RateLimiterConfig::builder().rate(2.0).capacity(1.0),
    );
    let opts = CallOptions::new().limiter("tracker");

    for _ in 0..3 {
        h.controller
            .call(&opts, || async { Ok::<_, Failure>(()) })
            .await
            .unwrap();
    }

    assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(500); 2]);
    let latencies = h.metrics.latencies("traffic_call_duration_seconds");
    assert_eq!(
        latencies,
        vec![
            Duration::ZERO,
            Duration::from_millis(500),
            Duration::from_millis(500)
        ]
    );
}

#[tokio::test]
async fn expensive_calls_spend_more_tokens() {
    let h = Harness::new();
    let limiter = h.controller.register_limiter(
        "ai",
        RateLimiterConfig::builder()
            .rate(1.0)
            .capacity(10.0)
            .timeout(Duration::ZERO),
    );
    let opts = CallOptions::new().limiter("ai").tokens(4.0);

    for _ in 0..2 {
        h.controller
            .call(&opts, || async { Ok::<_, Failure>(()) })
            .await
            .unwrap();
    }
    assert_eq!(limiter.available(), 2.0);
    assert!(h
        .controller
        .call(&opts, || async { Ok::<_, Failure>(()) })
        .await
        .unwrap_err()
        .is_rate_limited());
}

#[tokio::test]
async fn open_breaker_recovers_through_half_open() {
    let h = Harness::new();
    let breaker = h.controller.register_breaker(
        "qbt",
        CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .success_threshold(2)
            .recovery_timeout(Duration::from_secs(30)),
    );
    let opts = CallOptions::new().breaker("qbt").no_retry();

    for _ in 0..2 {
        let _ = h
            .controller
            .call(&opts, || async { Err::<(), _>(fail(ErrorKind::Server)) })
            .await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let invoked = AtomicU32::new(0);
    let refused = h
        .controller
        .call(&opts, || {
            invoked.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(()) }
        })
        .await;
    assert!(refused.unwrap_err().is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    h.clock.advance(Duration::from_secs(30));
    h.controller
        .call(&opts, || async { Ok::<_, Failure>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    h.controller
        .call(&opts, || async { Ok::<_, Failure>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let closed = [
        ("breaker", "qbt".to_string()),
        ("from", "half_open".to_string()),
        ("to", "closed".to_string()),
    ];
    assert_eq!(
        h.metrics.counter_with("breaker_state_changes_total", &closed),
        1
    );
    assert_eq!(h.metrics.counter("breaker_state_changes_total"), 3);
}

#[tokio::test]
async fn fallback_sees_why_the_call_failed() {
    let h = Harness::new();
    h.controller
        .register_breaker("ai", CircuitBreakerConfig::standard())
        .force_open();

    let value = h
        .controller
        .call_with_fallback(
            &CallOptions::new().breaker("ai"),
            || async { Ok::<_, Failure>("classified".to_string()) },
            |err| async move {
                match err {
                    TrafficError::CircuitOpen { breaker } => Ok(format!("skipped {breaker}")),
                    other => panic!("unexpected error: {other:?}"),
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "skipped ai");
    assert_eq!(
        h.metrics.counter_with(
            "traffic_fallbacks_total",
            &[
                ("breaker", "ai".into()),
                ("reason", "circuit_open".into())
            ]
        ),
        1
    );
}

#[tokio::test]
async fn fallback_is_not_used_on_success_or_missing_registration() {
    let h = Harness::new();
    let fallbacks = AtomicU32::new(0);

    let ok = h
        .controller
        .call_with_fallback(
            &CallOptions::new(),
            || async { Ok::<_, Failure>(1) },
            |_| {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                async { Ok(2) }
            },
        )
        .await;
    assert_eq!(ok.unwrap(), 1);

    let missing = h
        .controller
        .call_with_fallback(
            &CallOptions::new().breaker("nope"),
            || async { Ok::<_, Failure>(1) },
            |_| {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                async { Ok(2) }
            },
        )
        .await;
    assert!(matches!(
        missing,
        Err(TrafficError::NotRegistered { kind: "breaker", ref name }) if name == "nope"
    ));
    assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_capacity_limiter_always_falls_back() {
    let h = Harness::new();
    let ops = AtomicU32::new(0);

    for (name, strategy) in [
        ("token", Strategy::TokenBucket),
        ("leaky", Strategy::LeakyBucket),
        ("fixed", Strategy::FixedWindow),
        ("sliding", Strategy::SlidingWindow),
    ] {
        h.controller.register_limiter(
            name,
            RateLimiterConfig::builder()
                .strategy(strategy)
                .rate(10.0)
                .capacity(0.0),
        );
        for tokens in [0.0, 1.0] {
            let value = h
                .controller
                .call_with_fallback(
                    &CallOptions::new().limiter(name).tokens(tokens),
                    || {
                        ops.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<_, Failure>("op") }
                    },
                    |err| async move {
                        assert!(err.is_rate_limited());
                        Ok("fallback")
                    },
                )
                .await
                .unwrap();
            assert_eq!(value, "fallback", "{name} with {tokens} tokens");
        }
    }

    assert_eq!(ops.load(Ordering::SeqCst), 0);
    assert!(h.clock.sleeps().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clones_share_registries_across_tasks() {
    let h = Harness::new();
    let breaker = h.controller.register_breaker(
        "qbt",
        CircuitBreakerConfig::builder().failure_threshold(1000),
    );

    let mut handles = Vec::new();
    for task in 0..8u32 {
        let controller = h.controller.clone();
        handles.push(tokio::spawn(async move {
            let opts = CallOptions::new().breaker("qbt").no_retry();
            for i in 0..25u32 {
                let ok = (task + i) % 2 == 0;
                let _ = controller
                    .call(&opts, || async move {
                        if ok {
                            Ok(())
                        } else {
                            Err(Failure::new(ErrorKind::Auth, "denied"))
                        }
                    })
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = breaker.snapshot().stats;
    assert_eq!(stats.total_calls, 200);
    assert_eq!(stats.successes + stats.failures, 200);
    assert_eq!(h.metrics.counter("traffic_calls_total"), 200);
}
