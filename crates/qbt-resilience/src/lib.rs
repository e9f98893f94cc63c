//! Traffic control for the monitor's outbound clients.
//!
//! A [`TrafficController`] owns named circuit breakers and rate limiters and
//! composes them, together with a retry policy and an optional fallback,
//! around any async operation:
//!
//! ```text
//! limiter.acquire ──► breaker.allow ──► op ──► record on breaker
//!        │                  │            │
//!     refused            refused      failed ──► retry? ──► sleep, back to breaker.allow
//!        ▼                  ▼            ▼
//!                     fallback / TrafficError
//! ```
//!
//! # Example
//!
//! ```
//! use qbt_resilience::{CallOptions, TrafficController, TrafficError};
//! use qbt_resilience::circuitbreaker::CircuitBreakerConfig;
//! use qbt_resilience::ratelimiter::RateLimiterConfig;
//! use qbt_resilience_core::{ErrorKind, Failure, MockClock};
//!
//! # async fn example() {
//! let clock = MockClock::new();
//! let controller = TrafficController::builder().clock(clock.shared()).build();
//! controller.register_breaker("qbt_api", CircuitBreakerConfig::strict());
//! controller.register_limiter("qbt_api", RateLimiterConfig::normal());
//!
//! let opts = CallOptions::new().breaker("qbt_api").limiter("qbt_api");
//!
//! let added = controller
//!     .call(&opts, || async { Ok::<_, Failure>("added") })
//!     .await;
//! assert_eq!(added.unwrap(), "added");
//!
//! let fallback = controller
//!     .call_with_fallback(
//!         &opts,
//!         || async { Err::<&str, _>(Failure::new(ErrorKind::Auth, "bad cookie")) },
//!         |_err: TrafficError<Failure>| async { Ok("queued for later") },
//!     )
//!     .await;
//! assert_eq!(fallback.unwrap(), "queued for later");
//! # }
//! ```
//!
//! # Metrics
//!
//! Every call reports to the controller's [`MetricsSink`](qbt_resilience_core::MetricsSink):
//!
//! | Name | Kind | Labels |
//! |---|---|---|
//! | `traffic_calls_total` | counter | breaker, limiter, outcome |
//! | `traffic_call_duration_seconds` | latency | breaker, limiter, outcome |
//! | `traffic_attempt_failures_total` | counter | breaker, limiter, kind |
//! | `traffic_retries_total` | counter | breaker, limiter |
//! | `traffic_fallbacks_total` | counter | breaker, limiter, reason |
//! | `breaker_state_changes_total` | counter | breaker, from, to |
//!
//! With the `metrics` feature, `MetricsRecorderSink` forwards these to the
//! `metrics` facade and each primitive also reports its own series.

pub use qbt_resilience_cache as cache;
pub use qbt_resilience_circuitbreaker as circuitbreaker;
pub use qbt_resilience_core as core;
pub use qbt_resilience_ratelimiter as ratelimiter;
pub use qbt_resilience_retry as retry;

pub use controller::{TrafficController, TrafficControllerBuilder};
pub use error::TrafficError;
pub use layer::{TrafficLayer, TrafficService};
pub use options::CallOptions;
pub use snapshot::TrafficSnapshot;

mod controller;
mod error;
mod layer;
mod options;
mod snapshot;
