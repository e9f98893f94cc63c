//! Tower integration.
//!
//! [`TrafficLayer`] wraps any `tower::Service` so each request goes through
//! [`TrafficController::call`] with a fixed set of [`CallOptions`]. The first
//! attempt goes to the service that was polled ready; retries re-issue a clone
//! of the request to a fresh clone of the inner service.

use crate::{CallOptions, TrafficController, TrafficError};
use futures::future::BoxFuture;
use qbt_resilience_core::Classify;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

/// Applies a [`TrafficController`] to a service.
///
/// ```
/// use qbt_resilience::{CallOptions, TrafficController, TrafficLayer};
/// use qbt_resilience::circuitbreaker::CircuitBreakerConfig;
/// use qbt_resilience_core::{ErrorKind, Failure};
/// use tower::{Layer, ServiceExt};
///
/// # async fn example() {
/// let controller = TrafficController::new();
/// controller.register_breaker("qbt_api", CircuitBreakerConfig::standard());
///
/// let add_torrent = tower::service_fn(|magnet: String| async move {
///     if magnet.starts_with("magnet:") {
///         Ok(magnet.len())
///     } else {
///         Err(Failure::new(ErrorKind::Config, "not a magnet link"))
///     }
/// });
///
/// let service = TrafficLayer::new(controller, CallOptions::new().breaker("qbt_api"))
///     .layer(add_torrent);
/// let len = service.oneshot("magnet:?xt=urn:btih:abc".to_string()).await.unwrap();
/// assert_eq!(len, 23);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TrafficLayer {
    controller: TrafficController,
    options: Arc<CallOptions>,
}

impl TrafficLayer {
    /// Routes every request through `controller` using `options`.
    pub fn new(controller: TrafficController, options: CallOptions) -> Self {
        Self {
            controller,
            options: Arc::new(options),
        }
    }
}

impl<S> Layer<S> for TrafficLayer {
    type Service = TrafficService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TrafficService {
            inner: service,
            controller: self.controller.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

/// Service produced by [`TrafficLayer`].
#[derive(Clone, Debug)]
pub struct TrafficService<S> {
    inner: S,
    controller: TrafficController,
    options: Arc<CallOptions>,
}

impl<S, Req> Service<Req> for TrafficService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Classify + Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = TrafficError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(TrafficError::Operation)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        // the service driven by poll_ready serves the first attempt
        let ready = std::mem::replace(&mut self.inner, clone);
        let spare = ready.clone();
        let controller = self.controller.clone();
        let options = Arc::clone(&self.options);

        Box::pin(async move {
            let mut ready = Some(ready);
            controller
                .call(&options, move || {
                    let first = ready.take();
                    let spare = spare.clone();
                    let req = req.clone();
                    async move {
                        match first {
                            Some(mut service) => service.call(req).await,
                            None => spare.oneshot(req).await,
                        }
                    }
                })
                .await
        })
    }
}
