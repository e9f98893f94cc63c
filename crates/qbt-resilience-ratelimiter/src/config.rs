use crate::events::RateLimiterEvent;
use qbt_resilience_core::{EventListeners, FnListener};
use std::time::Duration;

/// Admission algorithm used by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Strategy {
    /// Bucket refilled at `rate`, drained by each request. Allows bursts up
    /// to `capacity`.
    #[default]
    TokenBucket,
    /// Bucket filled by each request and drained at `rate`. Smooths bursts.
    LeakyBucket,
    /// At most `capacity` tokens per aligned window of length `window`.
    FixedWindow,
    /// At most `capacity` tokens in any trailing interval of length `window`.
    SlidingWindow,
}

impl Strategy {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TokenBucket => "token_bucket",
            Strategy::LeakyBucket => "leaky_bucket",
            Strategy::FixedWindow => "fixed_window",
            Strategy::SlidingWindow => "sliding_window",
        }
    }
}

/// Configuration for a rate limiter.
#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    pub(crate) strategy: Strategy,
    pub(crate) rate: f64,
    pub(crate) capacity: f64,
    pub(crate) window: Duration,
    pub(crate) max_wait_slice: Duration,
    pub(crate) timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Preset: one request per second, bursts of two.
    pub fn slow() -> RateLimiterConfigBuilder {
        Self::builder().strategy(Strategy::TokenBucket).rate(1.0)
    }

    /// Preset: ten requests per second, bursts of twenty.
    pub fn normal() -> RateLimiterConfigBuilder {
        Self::builder().strategy(Strategy::TokenBucket).rate(10.0)
    }

    /// Preset: a hundred requests per second, bursts of two hundred.
    pub fn fast() -> RateLimiterConfigBuilder {
        Self::builder().strategy(Strategy::TokenBucket).rate(100.0)
    }

    /// Name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selected algorithm.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum burst, or maximum tokens per window.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Window length for the window strategies.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfigBuilder::new().build()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    strategy: Strategy,
    rate: f64,
    capacity: Option<f64>,
    burst_factor: f64,
    window: Duration,
    max_wait_slice: Duration,
    timeout: Option<Duration>,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - strategy: token bucket
    /// - rate: 10 per second
    /// - capacity: derived, see [`capacity`](Self::capacity)
    /// - burst_factor: 2.0
    /// - window: 1 second
    /// - max_wait_slice: 1 second
    /// - timeout: none
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            strategy: Strategy::TokenBucket,
            rate: 10.0,
            capacity: None,
            burst_factor: 2.0,
            window: Duration::from_secs(1),
            max_wait_slice: Duration::from_secs(1),
            timeout: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the admission algorithm.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the refill (token bucket) or drain (leaky bucket) rate in tokens
    /// per second. Negative values are treated as zero.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the capacity explicitly.
    ///
    /// When unset, the bucket strategies use `rate * burst_factor` and the
    /// window strategies use `rate * window`.
    pub fn capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the multiplier used to derive a bucket's capacity from its rate.
    ///
    /// Default: 2.0
    pub fn burst_factor(mut self, factor: f64) -> Self {
        self.burst_factor = factor;
        self
    }

    /// Sets the window length for the fixed and sliding window strategies.
    ///
    /// Default: 1 second
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the longest single sleep taken by a blocking acquire before it
    /// re-checks admission.
    ///
    /// Default: 1 second
    pub fn max_wait_slice(mut self, slice: Duration) -> Self {
        self.max_wait_slice = slice;
        self
    }

    /// Bounds the total time a blocking acquire may wait.
    ///
    /// Default: unbounded
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the name for this limiter (used in events, logs and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked with `(tokens, waited)` on each admission.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if let RateLimiterEvent::Admitted { tokens, waited, .. } = event {
                    f(*tokens, *waited);
                }
            }));
        self
    }

    /// Registers a callback invoked with `(tokens, wait_hint)` on each refusal.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, Option<Duration>) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if let RateLimiterEvent::Rejected {
                    tokens, wait_hint, ..
                } = event
                {
                    f(*tokens, *wait_hint);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RateLimiterConfig {
        let rate = if self.rate.is_finite() {
            self.rate.max(0.0)
        } else {
            0.0
        };
        let capacity = match self.capacity {
            Some(capacity) => capacity,
            None => match self.strategy {
                Strategy::TokenBucket | Strategy::LeakyBucket => rate * self.burst_factor,
                Strategy::FixedWindow | Strategy::SlidingWindow => {
                    rate * self.window.as_secs_f64()
                }
            },
        };
        let capacity = if capacity.is_finite() {
            capacity.max(0.0)
        } else {
            0.0
        };

        RateLimiterConfig {
            strategy: self.strategy,
            rate,
            capacity,
            window: self.window,
            max_wait_slice: self.max_wait_slice,
            timeout: self.timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
