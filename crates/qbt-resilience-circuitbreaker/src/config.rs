use crate::events::CircuitBreakerEvent;
use crate::CircuitState;
use qbt_resilience_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) success_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Preset: the defaults used by most outbound clients.
    ///
    /// - 5 consecutive failures open the breaker
    /// - 3 successful probes close it again
    /// - 60 second recovery timeout
    pub fn standard() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_threshold(5)
            .success_threshold(3)
            .recovery_timeout(Duration::from_secs(60))
    }

    /// Preset: opens early and probes sooner.
    ///
    /// - 3 consecutive failures open the breaker
    /// - 2 successful probes close it again
    /// - 30 second recovery timeout
    ///
    /// Suited to interactive paths such as the qBittorrent Web API where a
    /// stalled call is worse than a fast refusal.
    pub fn strict() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_threshold(3)
            .success_threshold(2)
            .recovery_timeout(Duration::from_secs(30))
    }

    /// Preset: tolerates bursts of failures from flaky upstreams.
    ///
    /// - 10 consecutive failures open the breaker
    /// - 5 successful probes close it again
    /// - 120 second recovery timeout
    pub fn relaxed() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_threshold(10)
            .success_threshold(5)
            .recovery_timeout(Duration::from_secs(120))
    }

    /// Name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failures that open a closed breaker.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Successes that close a half-open breaker.
    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    /// Time an open breaker waits before admitting a probe.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfigBuilder::new().build()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the number of failures that moves a closed breaker to open.
    ///
    /// Values below 1 are treated as 1.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Sets the number of successes that moves a half-open breaker to closed.
    ///
    /// Values below 1 are treated as 1.
    ///
    /// Default: 3
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Sets how long an open breaker refuses calls before admitting a probe.
    ///
    /// Default: 60 seconds
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Give this breaker a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for state transitions, called with `(from, to)`.
    ///
    /// # Example
    /// ```
    /// use qbt_resilience_circuitbreaker::{CircuitBreakerConfig, CircuitState};
    ///
    /// let config = CircuitBreakerConfig::builder()
    ///     .name("qbt_client")
    ///     .on_state_transition(|from, to| {
    ///         if to == CircuitState::Open {
    ///             eprintln!("qbt_client degraded ({from:?} -> {to:?})");
    ///         }
    ///     })
    ///     .build();
    /// assert_eq!(config.name(), "qbt_client");
    /// ```
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback invoked each time `allow()` admits a call.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallPermitted { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback invoked each time `allow()` refuses a call.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Registers a callback for recorded successes, with the state at record time.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback for recorded failures, with the state at record time.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            success_threshold: self.success_threshold.max(1),
            recovery_timeout: self.recovery_timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
