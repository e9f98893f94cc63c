use qbt_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use qbt_resilience_core::MockClock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_open_exactly_once() {
    let clock = MockClock::new();
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    let cb = CircuitBreaker::with_clock(
        CircuitBreakerConfig::builder()
            .failure_threshold(10)
            .on_state_transition(move |_, to| {
                if to == CircuitState::Open {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build(),
        clock.shared(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cb = cb.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                cb.record_failure();
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(cb.snapshot().stats.failures, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_share_state() {
    let cb = CircuitBreaker::new(CircuitBreakerConfig::builder().failure_threshold(1000).build());

    let mut handles = Vec::new();
    for i in 0..50 {
        let cb = cb.clone();
        handles.push(tokio::spawn(async move {
            cb.call(|| async move {
                if i % 2 == 0 {
                    Ok(i)
                } else {
                    Err("odd")
                }
            })
            .await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }

    assert_eq!(ok, 25);
    let stats = cb.snapshot().stats;
    assert_eq!(stats.successes, 25);
    assert_eq!(stats.failures, 25);
    assert_eq!(cb.state(), CircuitState::Closed);
}
