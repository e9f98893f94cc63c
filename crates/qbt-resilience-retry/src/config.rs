use crate::events::RetryEvent;
use crate::RetryPolicy;
use qbt_resilience_core::{Classify, ErrorKind, EventListeners, FnListener};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied veto, called with the error and the attempt number.
pub type RetryPredicate = Arc<dyn Fn(&dyn Classify, u32) -> bool + Send + Sync>;

/// Settings behind a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) max_attempts: u32,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) exponential_base: f64,
    pub(crate) jitter_fraction: f64,
    pub(crate) max_total_delay: Duration,
    pub(crate) fixed_delay: Option<Duration>,
    pub(crate) respect_retry_after: bool,
    pub(crate) retryable: HashSet<ErrorKind>,
    pub(crate) non_retryable: HashSet<ErrorKind>,
    pub(crate) predicate: Option<RetryPredicate>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Maximum number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound on the time spent across all attempts and delays.
    pub fn max_total_delay(&self) -> Duration {
        self.max_total_delay
    }

    /// Name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("exponential_base", &self.exponential_base)
            .field("jitter_fraction", &self.jitter_fraction)
            .field("max_total_delay", &self.max_total_delay)
            .field("fixed_delay", &self.fixed_delay)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Builder for a [`RetryPolicy`].
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - base_delay: 1 second
    /// - max_delay: 60 seconds
    /// - exponential_base: 2.0
    /// - jitter_fraction: 0.2
    /// - max_total_delay: 300 seconds
    /// - retryable kinds: network, timeout, server, rate limited
    /// - non-retryable kinds: auth, permission, config, resource exhausted, circuit open
    /// - server retry hints honoured
    pub fn new() -> Self {
        Self {
            config: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                exponential_base: 2.0,
                jitter_fraction: 0.2,
                max_total_delay: Duration::from_secs(300),
                fixed_delay: None,
                respect_retry_after: true,
                retryable: ErrorKind::default_retryable().iter().copied().collect(),
                non_retryable: ErrorKind::default_non_retryable().iter().copied().collect(),
                predicate: None,
                event_listeners: EventListeners::new(),
                name: String::from("<unnamed>"),
            },
        }
    }

    /// Sets the maximum number of attempts, the first one included.
    ///
    /// Values below 1 are treated as 1.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    /// Sets the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Caps each computed backoff delay. Server hints are not capped.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Sets the growth factor between consecutive delays.
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.config.exponential_base = base;
        self
    }

    /// Sets the symmetric jitter as a fraction of the delay, clamped to `0.0..=1.0`.
    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.config.jitter_fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Bounds the total elapsed time across all attempts.
    pub fn max_total_delay(mut self, delay: Duration) -> Self {
        self.config.max_total_delay = delay;
        self
    }

    /// Uses the same delay before every retry instead of exponential backoff.
    pub fn fixed_delay(mut self, delay: Duration) -> Self {
        self.config.fixed_delay = Some(delay);
        self
    }

    /// Whether an error's own retry hint overrides the computed delay.
    ///
    /// Default: true
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.config.respect_retry_after = respect;
        self
    }

    /// Marks `kind` as retryable, removing it from the non-retryable set.
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.config.non_retryable.remove(&kind);
        self.config.retryable.insert(kind);
        self
    }

    /// Marks `kind` as never retryable, removing it from the retryable set.
    pub fn never_retry(mut self, kind: ErrorKind) -> Self {
        self.config.retryable.remove(&kind);
        self.config.non_retryable.insert(kind);
        self
    }

    /// Replaces the retryable set.
    pub fn retryable_kinds<I: IntoIterator<Item = ErrorKind>>(mut self, kinds: I) -> Self {
        self.config.retryable = kinds.into_iter().collect();
        self
    }

    /// Replaces the non-retryable set.
    pub fn non_retryable_kinds<I: IntoIterator<Item = ErrorKind>>(mut self, kinds: I) -> Self {
        self.config.non_retryable = kinds.into_iter().collect();
        self
    }

    /// Adds a veto consulted after the non-retryable check.
    ///
    /// Returning `false` stops retrying even for retryable kinds.
    ///
    /// # Example
    /// ```
    /// use qbt_resilience_retry::RetryPolicy;
    /// use qbt_resilience_core::{ErrorKind, Failure};
    ///
    /// let policy = RetryPolicy::builder()
    ///     .max_attempts(5)
    ///     .retry_if(|err, attempt| err.kind() != ErrorKind::Timeout || attempt < 2)
    ///     .build();
    ///
    /// let timeout = Failure::new(ErrorKind::Timeout, "tracker slow");
    /// assert!(policy.should_retry(&timeout, 1, Default::default()));
    /// assert!(!policy.should_retry(&timeout, 2, Default::default()));
    /// ```
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Classify, u32) -> bool + Send + Sync + 'static,
    {
        self.config.predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the name for this policy (used in events, logs and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Registers a callback invoked with `(attempt, delay)` before each retry.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Retry { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Registers a callback invoked with the attempt count on success.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Success { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Registers a callback invoked with the attempt count when retries run out.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Exhausted { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Registers a callback invoked with the error kind of a non-retryable failure.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ErrorKind) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::IgnoredError { kind, .. } = event {
                    f(*kind);
                }
            }));
        self
    }

    /// Builds the policy.
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::from_config(self.config)
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
