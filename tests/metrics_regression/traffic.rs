//! Traffic controller metrics regression tests

use super::helpers::*;
use qbt_resilience::circuitbreaker::CircuitBreakerConfig;
use qbt_resilience::ratelimiter::RateLimiterConfig;
use qbt_resilience::retry::RetryPolicy;
use qbt_resilience::{CallOptions, TrafficController};
use qbt_resilience_core::{ErrorKind, Failure, MetricsRecorderSink, MockClock};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn traffic_metrics_exist() {
    init_recorder();

    let clock = MockClock::new();
    let controller = TrafficController::builder()
        .clock(clock.shared())
        .retry_policy(RetryPolicy::builder().max_attempts(2).build())
        .metrics(Arc::new(MetricsRecorderSink))
        .build();
    controller.register_breaker(
        "metrics_breaker",
        CircuitBreakerConfig::builder().failure_threshold(2),
    );
    controller.register_limiter(
        "metrics_limiter",
        RateLimiterConfig::builder().rate(100.0).timeout(Duration::ZERO),
    );
    let opts = CallOptions::new()
        .breaker("metrics_breaker")
        .limiter("metrics_limiter");

    let _ = controller.call(&opts, || async { Ok::<_, Failure>(()) }).await;
    let _ = controller
        .call_with_fallback(
            &opts,
            || async { Err::<(), _>(Failure::new(ErrorKind::Server, "502")) },
            |_| async { Ok(()) },
        )
        .await;

    assert_counter_exists("traffic_calls_total");
    assert_metric_has_label("traffic_calls_total", "breaker", "metrics_breaker");
    assert_metric_has_label("traffic_calls_total", "limiter", "metrics_limiter");
    assert_metric_has_label("traffic_calls_total", "outcome", "success");

    assert_counter_exists("traffic_attempt_failures_total");
    assert_metric_has_label("traffic_attempt_failures_total", "kind", "server");

    assert_counter_exists("traffic_retries_total");

    assert_counter_exists("traffic_fallbacks_total");
    assert_metric_has_label("traffic_fallbacks_total", "reason", "exhausted");

    assert_counter_exists("breaker_state_changes_total");
    assert_metric_has_label("breaker_state_changes_total", "to", "open");

    assert_histogram_exists("traffic_call_duration_seconds");
}
