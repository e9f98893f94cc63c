//! Retry with exponential backoff, jitter and error classification.
//!
//! A [`RetryPolicy`] answers two questions about a failed attempt:
//!
//! - [`should_retry`](RetryPolicy::should_retry): is this error worth another
//!   attempt, given how many attempts and how much time have been spent?
//! - [`next_delay`](RetryPolicy::next_delay): how long to wait first?
//!
//! Decisions are made on the error's [`ErrorKind`], never on its concrete
//! type. Unknown errors are not retried unless the caller opts in with
//! [`RetryConfigBuilder::retry_on`].
//!
//! The policy never touches breakers or limiters. [`RetryPolicy::run`] is a
//! self-contained loop for clients that only need retries; composed call
//! paths drive a [`RetryState`] themselves.
//!
//! ```
//! use qbt_resilience_retry::RetryPolicy;
//! use qbt_resilience_core::{ErrorKind, Failure, MockClock};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let clock = MockClock::new();
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .jitter_fraction(0.0)
//!     .build();
//!
//! let mut calls = 0;
//! let result = policy
//!     .run(&clock, || {
//!         calls += 1;
//!         let outcome = if calls < 3 {
//!             Err(Failure::new(ErrorKind::Network, "connection reset"))
//!         } else {
//!             Ok("magnet added")
//!         };
//!         async move { outcome }
//!     })
//!     .await;
//!
//! assert_eq!(result.unwrap(), "magnet added");
//! assert_eq!(clock.sleeps(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
//! # }
//! ```

use qbt_resilience_core::{Classify, Clock, ErrorKind};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use config::{RetryConfig, RetryConfigBuilder, RetryPredicate};
pub use error::RetryError;
pub use events::RetryEvent;

mod backoff;
mod config;
mod error;
mod events;

/// Lifetime counters for a policy, shared by all of its clones.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryStats {
    /// Attempts made, first attempts included.
    pub total_attempts: u64,
    /// Attempts that succeeded.
    pub successful_attempts: u64,
    /// Attempts that failed.
    pub failed_attempts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Sum of all scheduled delays.
    pub total_retry_delay: Duration,
}

impl RetryStats {
    /// Fraction of attempts that succeeded, or 0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_attempts as f64 / self.total_attempts as f64
        }
    }

    /// Mean scheduled delay, or zero before any retry.
    pub fn average_retry_delay(&self) -> Duration {
        if self.retries == 0 {
            Duration::ZERO
        } else {
            self.total_retry_delay / self.retries as u32
        }
    }
}

/// Why a [`RetryState`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The error was retryable but attempts or the total delay budget ran out.
    Exhausted,
    /// The error was not eligible for retry.
    NotRetryable,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Sleep for `delay`, then make another attempt.
    Retry { delay: Duration },
    /// Stop and surface the error.
    Stop(StopReason),
}

/// A retry policy. Cloning is cheap; clones share configuration and stats.
#[derive(Clone)]
pub struct RetryPolicy {
    config: Arc<RetryConfig>,
    stats: Arc<Mutex<RetryStats>>,
}

impl RetryPolicy {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self::builder().max_attempts(1).name("no_retry").build()
    }

    /// Preset for flaky network paths: 5 attempts, 2 s base delay, 30 s cap.
    pub fn network() -> RetryConfigBuilder {
        Self::builder()
            .max_attempts(5)
            .base_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(30))
            .exponential_base(2.0)
            .retryable_kinds([ErrorKind::Network, ErrorKind::Timeout])
    }

    /// Preset for the qBittorrent Web API: 3 attempts, 2 s base delay,
    /// throttling and network errors only.
    pub fn qbittorrent() -> RetryConfigBuilder {
        Self::builder()
            .max_attempts(3)
            .base_delay(Duration::from_secs(2))
            .retryable_kinds([ErrorKind::RateLimited, ErrorKind::Network])
            .respect_retry_after(true)
    }

    /// Preset that tries hard: 10 attempts, 0.5 s base delay, 1.5 growth, 10 s cap.
    pub fn aggressive() -> RetryConfigBuilder {
        Self::builder()
            .max_attempts(10)
            .base_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(10))
            .exponential_base(1.5)
    }

    /// Preset that backs off early: 2 attempts, 5 s base delay, 1.5 growth.
    pub fn conservative() -> RetryConfigBuilder {
        Self::builder()
            .max_attempts(2)
            .base_delay(Duration::from_secs(5))
            .max_delay(Duration::from_secs(60))
            .exponential_base(1.5)
    }

    pub(crate) fn from_config(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(Mutex::new(RetryStats::default())),
        }
    }

    /// The configuration behind this policy.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Name given at configuration time.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Decides whether `err`, raised by attempt number `attempt` (1-based)
    /// after `elapsed` time, deserves another attempt.
    ///
    /// The error is classified first: non-retryable kinds, the caller
    /// predicate, a server retry hint, retryable kinds. Anything that falls
    /// through is not retried. A retryable error is then checked against the
    /// attempt and time budget.
    pub fn should_retry<E: Classify>(&self, err: &E, attempt: u32, elapsed: Duration) -> bool {
        self.evaluate(err, attempt, elapsed).is_ok()
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// An error's own retry hint is returned verbatim when hints are
    /// respected. Otherwise the fixed delay, if configured, or
    /// `min(max_delay, base_delay * exponential_base^(attempt - 1))` with
    /// symmetric jitter, clamped at zero.
    pub fn next_delay<E: Classify>(&self, attempt: u32, err: &E) -> Duration {
        if self.config.respect_retry_after {
            if let Some(hint) = err.retry_after() {
                return hint;
            }
        }
        if let Some(fixed) = self.config.fixed_delay {
            return fixed;
        }
        let delay = backoff::exponential(
            self.config.base_delay,
            self.config.exponential_base,
            self.config.max_delay,
            attempt,
        );
        backoff::jitter(delay, self.config.jitter_fraction)
    }

    /// Starts tracking one logical call that began at `started`.
    pub fn begin(&self, started: Instant) -> RetryState {
        RetryState {
            policy: self.clone(),
            started,
            attempts: 0,
            scheduled: Duration::ZERO,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt or time budget runs out. Backoff sleeps go through `clock`.
    pub async fn run<C, F, Fut, T, E>(&self, clock: &C, mut op: F) -> Result<T, RetryError<E>>
    where
        C: Clock + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let mut state = self.begin(clock.now());
        loop {
            state.start_attempt();
            match op().await {
                Ok(value) => {
                    state.succeeded(clock.now());
                    return Ok(value);
                }
                Err(err) => match state.failed(&err, clock.now()) {
                    RetryStep::Retry { delay } => clock.sleep(delay).await,
                    RetryStep::Stop(StopReason::Exhausted) => {
                        return Err(RetryError::Exhausted {
                            attempts: state.attempts(),
                            last: err,
                        })
                    }
                    RetryStep::Stop(StopReason::NotRetryable) => {
                        return Err(RetryError::Rejected(err))
                    }
                },
            }
        }
    }

    /// Snapshot of lifetime counters.
    pub fn stats(&self) -> RetryStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evaluate<E: Classify>(&self, err: &E, attempt: u32, elapsed: Duration) -> Result<(), StopReason> {
        if !self.is_retryable(err, attempt) {
            return Err(StopReason::NotRetryable);
        }
        if attempt >= self.config.max_attempts || elapsed > self.config.max_total_delay {
            return Err(StopReason::Exhausted);
        }
        Ok(())
    }

    // Kind, predicate and hint only; attempt and time budgets are separate.
    fn is_retryable<E: Classify>(&self, err: &E, attempt: u32) -> bool {
        let config = &self.config;
        let kind = err.kind();
        if config.non_retryable.contains(&kind) {
            return false;
        }
        if let Some(predicate) = &config.predicate {
            if !predicate(err as &dyn Classify, attempt) {
                return false;
            }
        }
        if config.respect_retry_after && err.retry_after().is_some() {
            return true;
        }
        config.retryable.contains(&kind)
    }

    fn update_stats(&self, f: impl FnOnce(&mut RetryStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish()
    }
}

/// Progress of one logical call through a [`RetryPolicy`].
///
/// Call [`start_attempt`](Self::start_attempt) before each attempt, then
/// report the outcome with [`succeeded`](Self::succeeded) or
/// [`failed`](Self::failed). The state keeps attempt counts, enforces the
/// total delay budget, updates the policy's stats and emits its events.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    started: Instant,
    attempts: u32,
    scheduled: Duration,
}

impl RetryState {
    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Marks the start of the next attempt and returns its 1-based number.
    pub fn start_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Records a successful attempt.
    pub fn succeeded(&mut self, now: Instant) {
        self.policy.update_stats(|s| {
            s.total_attempts += 1;
            s.successful_attempts += 1;
        });
        self.policy.config.event_listeners.emit(&RetryEvent::Success {
            pattern_name: self.policy.config.name.clone(),
            timestamp: now,
            attempts: self.attempts,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("retry_calls_total", "retry" => self.policy.config.name.clone(), "outcome" => "success").increment(1);
    }

    /// Records a failed attempt and decides what happens next.
    ///
    /// A retry is only scheduled if the time already spent plus the delay
    /// stays within `max_total_delay`.
    pub fn failed<E: Classify>(&mut self, err: &E, now: Instant) -> RetryStep {
        self.policy.update_stats(|s| {
            s.total_attempts += 1;
            s.failed_attempts += 1;
        });

        let config = &self.policy.config;
        let elapsed = now.saturating_duration_since(self.started).max(self.scheduled);
        let kind = err.kind();

        let step = match self.policy.evaluate(err, self.attempts, elapsed) {
            Err(reason) => RetryStep::Stop(reason),
            Ok(()) => {
                let delay = self.policy.next_delay(self.attempts, err);
                if elapsed + delay > config.max_total_delay {
                    RetryStep::Stop(StopReason::Exhausted)
                } else {
                    RetryStep::Retry { delay }
                }
            }
        };

        match step {
            RetryStep::Retry { delay } => {
                self.scheduled += delay;
                self.policy.update_stats(|s| {
                    s.retries += 1;
                    s.total_retry_delay += delay;
                });
                config.event_listeners.emit(&RetryEvent::Retry {
                    pattern_name: config.name.clone(),
                    timestamp: now,
                    attempt: self.attempts,
                    kind,
                    delay,
                });

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    retry = %config.name,
                    attempt = self.attempts,
                    max_attempts = config.max_attempts,
                    %kind,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );

                #[cfg(feature = "metrics")]
                metrics::histogram!("retry_backoff_seconds", "retry" => config.name.clone())
                    .record(delay.as_secs_f64());
            }
            RetryStep::Stop(StopReason::Exhausted) => {
                config.event_listeners.emit(&RetryEvent::Exhausted {
                    pattern_name: config.name.clone(),
                    timestamp: now,
                    attempts: self.attempts,
                    kind,
                });

                #[cfg(feature = "tracing")]
                tracing::error!(
                    retry = %config.name,
                    attempts = self.attempts,
                    %kind,
                    "retries exhausted"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "exhausted").increment(1);
            }
            RetryStep::Stop(StopReason::NotRetryable) => {
                config.event_listeners.emit(&RetryEvent::IgnoredError {
                    pattern_name: config.name.clone(),
                    timestamp: now,
                    attempts: self.attempts,
                    kind,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(retry = %config.name, %kind, "error not retryable");

                #[cfg(feature = "metrics")]
                metrics::counter!("retry_calls_total", "retry" => config.name.clone(), "outcome" => "not_retryable").increment(1);
            }
        }

        step
    }
}
