use qbt_resilience_core::MockClock;
use qbt_resilience_ratelimiter::{
    Admission, RateLimiter, RateLimiterConfig, RateLimiterError, Strategy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn one_per_second() -> RateLimiterConfig {
    RateLimiterConfig::builder()
        .strategy(Strategy::TokenBucket)
        .rate(1.0)
        .capacity(1.0)
        .name("blocking")
        .build()
}

#[tokio::test]
async fn acquire_sleeps_until_admitted() {
    let clock = MockClock::new();
    let rl = RateLimiter::with_clock(one_per_second(), clock.shared());

    assert!(rl.try_acquire(1.0).is_admitted());
    assert_eq!(rl.acquire(1.0).await, Admission::Admitted);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);

    let stats = rl.snapshot().stats;
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.total_wait, Duration::from_secs(1));
}

#[tokio::test]
async fn long_waits_are_sliced() {
    let clock = MockClock::new();
    let config = RateLimiterConfig::builder()
        .rate(1.0)
        .capacity(1.0)
        .max_wait_slice(Duration::from_millis(250))
        .build();
    let rl = RateLimiter::with_clock(config, clock.shared());

    rl.try_acquire(1.0);
    assert!(rl.acquire(1.0).await.is_admitted());
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(250); 4]);
}

#[tokio::test]
async fn timeout_denies_before_oversleeping() {
    let clock = MockClock::new();
    let config = RateLimiterConfig::builder()
        .rate(1.0)
        .capacity(1.0)
        .timeout(Duration::from_millis(500))
        .build();
    let rl = RateLimiter::with_clock(config, clock.shared());

    rl.try_acquire(1.0);
    let admission = rl.acquire(1.0).await;
    assert!(!admission.is_admitted());
    assert_eq!(admission.wait_hint(), Some(Duration::from_secs(1)));
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn impossible_requests_return_without_sleeping() {
    let clock = MockClock::new();
    let rl = RateLimiter::with_clock(one_per_second(), clock.shared());

    assert_eq!(
        rl.acquire(2.0).await,
        Admission::Denied { wait_hint: None }
    );
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn call_runs_operation_or_reports_limit() {
    let clock = MockClock::new();
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&rejected);
    let config = RateLimiterConfig::builder()
        .rate(1.0)
        .capacity(1.0)
        .timeout(Duration::ZERO)
        .name("qbittorrent_api")
        .on_rejected(move |tokens, hint| r.lock().unwrap().push((tokens, hint)))
        .build();
    let rl = RateLimiter::with_clock(config, clock.shared());

    let ok: Result<u32, RateLimiterError<std::io::Error>> = rl.call(1.0, || async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    let calls = AtomicUsize::new(0);
    let err = rl
        .call(1.0, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match err {
        RateLimiterError::RateLimited { name, wait_hint } => {
            assert_eq!(name, "qbittorrent_api");
            assert_eq!(wait_hint, Some(Duration::from_secs(1)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        *rejected.lock().unwrap(),
        vec![(1.0, Some(Duration::from_secs(1)))]
    );
}

#[tokio::test]
async fn admitted_listener_reports_wait() {
    let clock = MockClock::new();
    let waits = Arc::new(Mutex::new(Vec::new()));
    let w = Arc::clone(&waits);
    let config = RateLimiterConfig::builder()
        .strategy(Strategy::LeakyBucket)
        .rate(2.0)
        .capacity(1.0)
        .on_admitted(move |_, waited| w.lock().unwrap().push(waited))
        .build();
    let rl = RateLimiter::with_clock(config, clock.shared());

    rl.acquire(1.0).await;
    rl.acquire(1.0).await;
    assert_eq!(
        *waits.lock().unwrap(),
        vec![Duration::ZERO, Duration::from_millis(500)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_exceed_capacity() {
    let clock = MockClock::new();
    let config = RateLimiterConfig::builder()
        .strategy(Strategy::FixedWindow)
        .rate(10.0)
        .capacity(10.0)
        .window(Duration::from_secs(1))
        .build();
    let rl = RateLimiter::with_clock(config, clock.shared());

    let mut handles = Vec::new();
    for _ in 0..50 {
        let rl = rl.clone();
        handles.push(tokio::spawn(async move { rl.try_acquire(1.0).is_admitted() }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
    assert_eq!(rl.snapshot().stats.rejected, 40);
}
