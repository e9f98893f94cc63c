//! Rate limiting for outbound clients.
//!
//! Four strategies share one contract:
//!
//! | Strategy | Admits when | Replenished by |
//! |---|---|---|
//! | [`Strategy::TokenBucket`] | `tokens >= requested` | refill at `rate` up to `capacity` |
//! | [`Strategy::LeakyBucket`] | `level + requested <= capacity` | drain at `rate` |
//! | [`Strategy::FixedWindow`] | `count + requested <= capacity` | counter reset at each window boundary |
//! | [`Strategy::SlidingWindow`] | `sum(last window) + requested <= capacity` | entries age out of the window |
//!
//! State is recomputed lazily on each call from the injected clock; there
//! is no background task.
//!
//! [`RateLimiter::try_acquire`] answers immediately.
//! [`RateLimiter::acquire`] waits: it sleeps in slices of at most
//! `max_wait_slice` (never holding the limiter's lock while asleep) and
//! re-checks, until admitted, until the request turns out to be impossible,
//! or until the optional timeout would be exceeded. Nothing is reserved
//! while waiting, so concurrent waiters may race for the same tokens.
//!
//! ```
//! use qbt_resilience_ratelimiter::{RateLimiter, RateLimiterConfig, Strategy};
//! use qbt_resilience_core::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! let limiter = RateLimiter::with_clock(
//!     RateLimiterConfig::builder()
//!         .strategy(Strategy::TokenBucket)
//!         .rate(2.0)
//!         .capacity(2.0)
//!         .name("tracker_search")
//!         .build(),
//!     clock.shared(),
//! );
//!
//! assert!(limiter.try_acquire(2.0).is_admitted());
//! let denied = limiter.try_acquire(1.0);
//! assert_eq!(denied.wait_hint(), Some(Duration::from_millis(500)));
//!
//! clock.advance(Duration::from_millis(500));
//! assert!(limiter.try_acquire(1.0).is_admitted());
//! ```

use crate::strategy::Bucket;
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};
use qbt_resilience_core::{SharedClock, SystemClock};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder, Strategy};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;
pub use strategy::Admission;

mod config;
mod error;
mod events;
mod strategy;

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

// keeps a blocked acquire from spinning on sub-nanosecond hints
const MIN_WAIT_SLICE: Duration = Duration::from_millis(1);

/// Lifetime counters for a limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimiterStats {
    /// Completed `try_acquire`/`acquire` calls.
    pub total_requests: u64,
    /// Requests that were granted.
    pub admitted: u64,
    /// Requests that were refused.
    pub rejected: u64,
    /// Time spent sleeping inside `acquire`.
    pub total_wait: Duration,
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimiterSnapshot {
    /// Limiter name.
    pub name: String,
    /// Algorithm in use.
    pub strategy: Strategy,
    /// Tokens per second.
    pub rate: f64,
    /// Maximum burst or tokens per window.
    pub capacity: f64,
    /// Tokens that could be granted right now.
    pub available: f64,
    /// Lifetime counters.
    pub stats: LimiterStats,
}

struct LimiterState {
    bucket: Bucket,
    stats: LimiterStats,
}

/// A named rate limiter.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<LimiterState>>,
    config: Arc<RateLimiterConfig>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Creates a limiter that reads the system clock.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a limiter that reads time from, and sleeps through, `clock`.
    pub fn with_clock(config: RateLimiterConfig, clock: SharedClock) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "ratelimiter_calls_total",
                "Rate limiter decisions by outcome"
            );
            describe_histogram!(
                "ratelimiter_wait_duration_seconds",
                "Time spent waiting for admission"
            );
        });

        let bucket = Bucket::new(&config, clock.now());
        Self {
            state: Arc::new(Mutex::new(LimiterState {
                bucket,
                stats: LimiterStats::default(),
            })),
            config: Arc::new(config),
            clock,
        }
    }

    /// Name given at configuration time.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Checks admission once without waiting.
    pub fn try_acquire(&self, tokens: f64) -> Admission {
        let admission = self.attempt(tokens);
        self.finish(tokens, admission, Duration::ZERO);
        admission
    }

    /// Waits until `tokens` are granted, or until waiting cannot help.
    ///
    /// Returns [`Admission::Denied`] without sleeping when the request can
    /// never succeed, and after sleeping when the configured timeout would
    /// be exceeded by the next slice.
    pub async fn acquire(&self, tokens: f64) -> Admission {
        let mut waited = Duration::ZERO;
        loop {
            let admission = self.attempt(tokens);
            let hint = match admission {
                Admission::Admitted | Admission::Denied { wait_hint: None } => {
                    self.finish(tokens, admission, waited);
                    return admission;
                }
                Admission::Denied {
                    wait_hint: Some(hint),
                } => hint,
            };

            let slice = hint.min(self.config.max_wait_slice).max(MIN_WAIT_SLICE);
            if let Some(timeout) = self.config.timeout {
                if waited + slice > timeout {
                    self.finish(tokens, admission, waited);
                    return admission;
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                limiter = %self.config.name,
                tokens,
                wait_ms = slice.as_millis() as u64,
                "waiting for rate limiter"
            );

            self.clock.sleep(slice).await;
            waited += slice;
        }
    }

    /// Runs `f` once `tokens` have been acquired through [`acquire`](Self::acquire).
    pub async fn call<F, Fut, T, E>(&self, tokens: f64, f: F) -> Result<T, RateLimiterError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.acquire(tokens).await {
            Admission::Admitted => f().await.map_err(RateLimiterError::Inner),
            Admission::Denied { wait_hint } => Err(RateLimiterError::RateLimited {
                name: self.config.name.clone(),
                wait_hint,
            }),
        }
    }

    /// Tokens that could be granted right now.
    pub fn available(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.lock();
        state.bucket.available(&self.config, now)
    }

    /// Consistent view of configuration, availability and counters.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let now = self.clock.now();
        let mut state = self.lock();
        LimiterSnapshot {
            name: self.config.name.clone(),
            strategy: self.config.strategy,
            rate: self.config.rate,
            capacity: self.config.capacity,
            available: state.bucket.available(&self.config, now),
            stats: state.stats,
        }
    }

    /// Restores the initial state and clears counters.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.bucket = Bucket::new(&self.config, now);
        state.stats = LimiterStats::default();
    }

    fn attempt(&self, tokens: f64) -> Admission {
        let now = self.clock.now();
        let mut state = self.lock();
        state.bucket.try_acquire(&self.config, tokens, now)
    }

    fn finish(&self, tokens: f64, admission: Admission, waited: Duration) {
        {
            let mut state = self.lock();
            state.stats.total_requests += 1;
            state.stats.total_wait += waited;
            if admission.is_admitted() {
                state.stats.admitted += 1;
            } else {
                state.stats.rejected += 1;
            }
        }

        let timestamp = self.clock.now();
        match admission {
            Admission::Admitted => {
                self.config.event_listeners.emit(&RateLimiterEvent::Admitted {
                    pattern_name: self.config.name.clone(),
                    timestamp,
                    tokens,
                    waited,
                });

                #[cfg(feature = "metrics")]
                {
                    counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "outcome" => "admitted").increment(1);
                    histogram!("ratelimiter_wait_duration_seconds", "ratelimiter" => self.config.name.clone())
                        .record(waited.as_secs_f64());
                }
            }
            Admission::Denied { wait_hint } => {
                self.config.event_listeners.emit(&RateLimiterEvent::Rejected {
                    pattern_name: self.config.name.clone(),
                    timestamp,
                    tokens,
                    wait_hint,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    limiter = %self.config.name,
                    tokens,
                    ?wait_hint,
                    "rate limiter refused request"
                );

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "outcome" => "rejected").increment(1);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.config.name)
            .field("strategy", &self.config.strategy)
            .field("rate", &self.config.rate)
            .field("capacity", &self.config.capacity)
            .finish()
    }
}
