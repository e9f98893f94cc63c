use crate::error::TrafficError;
use crate::options::{CallOptions, RetryMode};
use crate::snapshot::TrafficSnapshot;
use qbt_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfigBuilder};
use qbt_resilience_core::{Classify, Clock, NoopMetrics, SharedClock, SharedMetrics, SystemClock};
use qbt_resilience_ratelimiter::{Admission, RateLimiter, RateLimiterConfigBuilder};
use qbt_resilience_retry::{RetryPolicy, RetryStep, StopReason};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

type Labels = Vec<(&'static str, String)>;

/// Composes rate limiting, circuit breaking, retry and fallback around
/// arbitrary async operations.
///
/// Breakers and limiters live in named registries for the lifetime of the
/// controller. Cloning is cheap and every clone shares the registries, the
/// clock, the default retry policy and the metrics sink.
#[derive(Clone)]
pub struct TrafficController {
    inner: Arc<Inner>,
}

struct Inner {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    limiters: RwLock<HashMap<String, RateLimiter>>,
    retry: RetryPolicy,
    no_retry: RetryPolicy,
    clock: SharedClock,
    metrics: SharedMetrics,
}

impl TrafficController {
    /// Controller on the system clock, the default retry policy and no metrics.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a controller with a custom clock, retry policy or
    /// metrics sink.
    pub fn builder() -> TrafficControllerBuilder {
        TrafficControllerBuilder::new()
    }

    /// Clock shared by every registered breaker and limiter.
    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// Sink receiving call, retry and fallback counters.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.inner.metrics
    }

    /// Policy used by calls that do not override it.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Registers a breaker under `name`, or returns the one already there.
    ///
    /// The name given here replaces any name set on `config`. State
    /// transitions are counted in the controller's metrics sink as
    /// `breaker_state_changes_total`.
    pub fn register_breaker(
        &self,
        name: impl Into<String>,
        config: CircuitBreakerConfigBuilder,
    ) -> CircuitBreaker {
        let name = name.into();
        let mut breakers = self
            .inner
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = breakers.get(&name) {
            return existing.clone();
        }

        let metrics = Arc::clone(&self.inner.metrics);
        let label = name.clone();
        let config = config
            .name(name.clone())
            .on_state_transition(move |from, to| {
                metrics.inc_counter(
                    "breaker_state_changes_total",
                    &[
                        ("breaker", label.clone()),
                        ("from", from.as_str().to_string()),
                        ("to", to.as_str().to_string()),
                    ],
                    1,
                );
            })
            .build();
        let breaker = CircuitBreaker::with_clock(config, Arc::clone(&self.inner.clock));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            breaker = %name,
            failure_threshold = breaker.config().failure_threshold(),
            recovery_timeout_ms = breaker.config().recovery_timeout().as_millis() as u64,
            "registered circuit breaker"
        );

        breakers.insert(name, breaker.clone());
        breaker
    }

    /// Registers a limiter under `name`, or returns the one already there.
    ///
    /// The name given here replaces any name set on `config`.
    pub fn register_limiter(
        &self,
        name: impl Into<String>,
        config: RateLimiterConfigBuilder,
    ) -> RateLimiter {
        let name = name.into();
        let mut limiters = self
            .inner
            .limiters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = limiters.get(&name) {
            return existing.clone();
        }

        let limiter =
            RateLimiter::with_clock(config.name(name.clone()).build(), Arc::clone(&self.inner.clock));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            limiter = %name,
            strategy = limiter.config().strategy().as_str(),
            rate = limiter.config().rate(),
            "registered rate limiter"
        );

        limiters.insert(name, limiter.clone());
        limiter
    }

    /// The breaker registered under `name`.
    pub fn breaker(&self, name: &str) -> Option<CircuitBreaker> {
        self.inner
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The limiter registered under `name`.
    pub fn limiter(&self, name: &str) -> Option<RateLimiter> {
        self.inner
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Runs `op` under the protections named in `opts`.
    ///
    /// 1. The limiter, if any, must admit `opts.tokens`; a refusal returns
    ///    [`TrafficError::RateLimited`] without running `op`.
    /// 2. The breaker, if any, is consulted before every attempt; a refusal
    ///    returns [`TrafficError::CircuitOpen`].
    /// 3. Every attempt's outcome is recorded on the breaker. Failed attempts
    ///    are retried while the retry policy allows, sleeping through the
    ///    controller's clock between attempts.
    ///
    /// A retryable error that outlasts the policy is returned as
    /// [`TrafficError::RetriesExhausted`]. An error the policy classifies as
    /// not retryable is returned as [`TrafficError::Operation`], even on the
    /// last attempt.
    pub async fn call<F, Fut, T, E>(&self, opts: &CallOptions, op: F) -> Result<T, TrafficError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let labels = opts.labels();
        let started = self.inner.clock.now();
        let result = self.execute(opts, op).await;
        self.finish(&labels, started, outcome(&result));
        result
    }

    /// Like [`call`](Self::call), but any refusal or failure is handed to
    /// `fallback`, whose result becomes the result of the call.
    ///
    /// A failing fallback surfaces as [`TrafficError::Fallback`]. Calls that
    /// name an unregistered breaker or limiter fail with
    /// [`TrafficError::NotRegistered`] without reaching the fallback.
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        opts: &CallOptions,
        op: F,
        fallback: G,
    ) -> Result<T, TrafficError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(TrafficError<E>) -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let labels = opts.labels();
        let started = self.inner.clock.now();
        let result = match self.execute(opts, op).await {
            Ok(value) => Ok(value),
            Err(err @ TrafficError::NotRegistered { .. }) => Err(err),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    breaker = opts.breaker_name().unwrap_or("-"),
                    limiter = opts.limiter_name().unwrap_or("-"),
                    reason = err.outcome_label(),
                    "using fallback"
                );

                let mut fallback_labels = labels.clone();
                fallback_labels.push(("reason", err.outcome_label().to_string()));
                self.inner
                    .metrics
                    .inc_counter("traffic_fallbacks_total", &fallback_labels, 1);
                fallback(err).await.map_err(TrafficError::Fallback)
            }
        };
        self.finish(&labels, started, outcome(&result));
        result
    }

    /// Consistent view of every registered breaker and limiter.
    pub fn snapshot(&self) -> TrafficSnapshot {
        let breakers = self
            .inner
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect();
        let limiters = self
            .inner
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.snapshot()))
            .collect();
        TrafficSnapshot { breakers, limiters }
    }

    async fn execute<F, Fut, T, E>(&self, opts: &CallOptions, mut op: F) -> Result<T, TrafficError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let breaker = self.resolve_breaker(opts)?;
        let limiter = self.resolve_limiter(opts)?;
        let clock = &self.inner.clock;
        let labels = opts.labels();

        if let Some(limiter) = &limiter {
            if let Admission::Denied { wait_hint } = limiter.acquire(opts.tokens).await {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    limiter = limiter.name(),
                    tokens = opts.tokens,
                    "rate limited"
                );

                return Err(TrafficError::RateLimited {
                    limiter: limiter.name().to_string(),
                    wait_hint,
                });
            }
        }

        let policy = match &opts.retry {
            RetryMode::ControllerDefault => &self.inner.retry,
            RetryMode::Override(policy) => policy,
            RetryMode::Disabled => &self.inner.no_retry,
        };
        let mut retry = policy.begin(clock.now());

        loop {
            if let Some(breaker) = &breaker {
                if !breaker.allow() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        breaker = breaker.name(),
                        attempts = retry.attempts(),
                        "circuit open, call refused"
                    );

                    return Err(TrafficError::CircuitOpen {
                        breaker: breaker.name().to_string(),
                    });
                }
            }

            retry.start_attempt();
            match op().await {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    retry.succeeded(clock.now());
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    let mut failure_labels = labels.clone();
                    failure_labels.push(("kind", err.kind().as_str().to_string()));
                    self.inner
                        .metrics
                        .inc_counter("traffic_attempt_failures_total", &failure_labels, 1);

                    match retry.failed(&err, clock.now()) {
                        RetryStep::Retry { delay } => {
                            self.inner.metrics.inc_counter("traffic_retries_total", &labels, 1);
                            clock.sleep(delay).await;
                        }
                        RetryStep::Stop(StopReason::Exhausted) => {
                            return Err(TrafficError::RetriesExhausted {
                                attempts: retry.attempts(),
                                last: err,
                            });
                        }
                        RetryStep::Stop(StopReason::NotRetryable) => {
                            return Err(TrafficError::Operation(err));
                        }
                    }
                }
            }
        }
    }

    fn resolve_breaker<E>(&self, opts: &CallOptions) -> Result<Option<CircuitBreaker>, TrafficError<E>> {
        match &opts.breaker {
            None => Ok(None),
            Some(name) => self.breaker(name).map(Some).ok_or_else(|| TrafficError::NotRegistered {
                kind: "breaker",
                name: name.clone(),
            }),
        }
    }

    fn resolve_limiter<E>(&self, opts: &CallOptions) -> Result<Option<RateLimiter>, TrafficError<E>> {
        match &opts.limiter {
            None => Ok(None),
            Some(name) => self.limiter(name).map(Some).ok_or_else(|| TrafficError::NotRegistered {
                kind: "limiter",
                name: name.clone(),
            }),
        }
    }

    fn finish(&self, labels: &Labels, started: Instant, outcome: &'static str) {
        let latency = self.inner.clock.now().saturating_duration_since(started);
        let mut labels = labels.clone();
        labels.push(("outcome", outcome.to_string()));
        self.inner.metrics.inc_counter("traffic_calls_total", &labels, 1);
        self.inner
            .metrics
            .observe_latency("traffic_call_duration_seconds", &labels, latency);
    }
}

fn outcome<T, E>(result: &Result<T, TrafficError<E>>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) => err.outcome_label(),
    }
}

impl Default for TrafficController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrafficController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let breakers: Vec<String> = self
            .inner
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let limiters: Vec<String> = self
            .inner
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("TrafficController")
            .field("breakers", &breakers)
            .field("limiters", &limiters)
            .field("retry", &self.inner.retry.name())
            .finish()
    }
}

/// Builder for [`TrafficController`].
pub struct TrafficControllerBuilder {
    clock: Option<SharedClock>,
    retry: Option<RetryPolicy>,
    metrics: Option<SharedMetrics>,
}

impl TrafficControllerBuilder {
    /// Creates a builder with defaults.
    ///
    /// Defaults:
    /// - clock: [`SystemClock`]
    /// - retry policy: [`RetryPolicy::default`] (3 attempts, 1 s base delay)
    /// - metrics: [`NoopMetrics`]
    pub fn new() -> Self {
        Self {
            clock: None,
            retry: None,
            metrics: None,
        }
    }

    /// Time source for every breaker and limiter the controller creates,
    /// and for retry backoff.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Retry policy used by calls that do not override it.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sink for call counters and latencies.
    pub fn metrics(mut self, sink: SharedMetrics) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Builds the controller with empty registries.
    pub fn build(self) -> TrafficController {
        TrafficController {
            inner: Arc::new(Inner {
                breakers: RwLock::new(HashMap::new()),
                limiters: RwLock::new(HashMap::new()),
                retry: self.retry.unwrap_or_default(),
                no_retry: RetryPolicy::none(),
                clock: self.clock.unwrap_or_else(SystemClock::shared),
                metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            }),
        }
    }
}

impl Default for TrafficControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
