use super::Harness;
use qbt_resilience::circuitbreaker::CircuitBreakerConfig;
use qbt_resilience::ratelimiter::RateLimiterConfig;
use qbt_resilience::{CallOptions, TrafficError, TrafficLayer};
use qbt_resilience_core::{ErrorKind, Failure};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn layer_retries_with_cloned_requests() {
    init_tracing();
    let h = Harness::new();
    h.controller
        .register_breaker("qbt_api", CircuitBreakerConfig::standard());
    let seen = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&seen);
    let flaky = tower::service_fn(move |hash: String| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(Failure::new(ErrorKind::Network, "connection reset"))
            } else {
                Ok(format!("paused {hash}"))
            }
        }
    });

    let service = TrafficLayer::new(h.controller.clone(), CallOptions::new().breaker("qbt_api"))
        .layer(flaky);
    let response = service.oneshot("abc123".to_string()).await.unwrap();

    assert_eq!(response, "paused abc123");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn layer_maps_refusals_into_traffic_errors() {
    let h = Harness::new();
    h.controller.register_limiter(
        "crawler",
        RateLimiterConfig::builder()
            .rate(1.0)
            .capacity(1.0)
            .timeout(Duration::ZERO),
    );

    let service = ServiceBuilder::new()
        .layer(TrafficLayer::new(
            h.controller.clone(),
            CallOptions::new().limiter("crawler"),
        ))
        .service_fn(|url: &'static str| async move { Ok::<_, Failure>(url.len()) });

    assert_eq!(service.clone().oneshot("https://a").await.unwrap(), 9);
    let err = service.oneshot("https://b").await.unwrap_err();
    assert!(matches!(err, TrafficError::RateLimited { ref limiter, .. } if limiter == "crawler"));
}

#[tokio::test]
async fn layer_surfaces_non_retryable_errors() {
    let h = Harness::new();
    let service = TrafficLayer::new(h.controller.clone(), CallOptions::new()).layer(
        tower::service_fn(|_: ()| async { Err::<(), _>(Failure::new(ErrorKind::Auth, "login")) }),
    );

    let err = service.oneshot(()).await.unwrap_err();
    assert_eq!(err.to_string(), "operation failed: auth error: login");
    assert_eq!(err.into_inner().unwrap().message(), "login");
    assert!(h.clock.sleeps().is_empty());
}

/// Accepts a call only after `poll_ready` on the same instance.
struct ReadyGated {
    ready: bool,
    calls: Arc<AtomicU32>,
}

impl Clone for ReadyGated {
    fn clone(&self) -> Self {
        Self {
            ready: false,
            calls: Arc::clone(&self.calls),
        }
    }
}

impl Service<u32> for ReadyGated {
    type Response = u32;
    type Error = Failure;
    type Future = futures::future::Ready<Result<u32, Failure>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.ready = true;
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: u32) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if std::mem::take(&mut self.ready) {
            Ok(req * 2)
        } else {
            Err(Failure::new(ErrorKind::Config, "called before poll_ready"))
        };
        futures::future::ready(result)
    }
}

#[tokio::test]
async fn layer_calls_the_service_it_polled_ready() {
    let h = Harness::new();
    let calls = Arc::new(AtomicU32::new(0));
    let mut service = TrafficLayer::new(h.controller.clone(), CallOptions::new()).layer(ReadyGated {
        ready: false,
        calls: Arc::clone(&calls),
    });

    let response = service.ready().await.unwrap().call(21).await.unwrap();
    assert_eq!(response, 42);

    let response = service.ready().await.unwrap().call(5).await.unwrap();
    assert_eq!(response, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
