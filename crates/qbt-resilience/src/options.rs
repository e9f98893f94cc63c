use qbt_resilience_retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub(crate) enum RetryMode {
    #[default]
    ControllerDefault,
    Override(RetryPolicy),
    Disabled,
}

/// Which protections a single call goes through.
///
/// Breaker and limiter are referenced by the name they were registered
/// under. Without either, a call is only retried.
///
/// ```
/// use qbt_resilience::CallOptions;
///
/// let opts = CallOptions::new()
///     .breaker("qbt_api")
///     .limiter("qbt_api")
///     .tokens(2.0);
/// assert_eq!(opts.breaker_name(), Some("qbt_api"));
/// assert_eq!(opts.token_cost(), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub(crate) breaker: Option<String>,
    pub(crate) limiter: Option<String>,
    pub(crate) tokens: f64,
    pub(crate) retry: RetryMode,
}

impl CallOptions {
    /// No breaker, no limiter, one token, the controller's retry policy.
    pub fn new() -> Self {
        Self {
            breaker: None,
            limiter: None,
            tokens: 1.0,
            retry: RetryMode::ControllerDefault,
        }
    }

    /// Guards the call with the breaker registered as `name`.
    pub fn breaker(mut self, name: impl Into<String>) -> Self {
        self.breaker = Some(name.into());
        self
    }

    /// Admits the call through the limiter registered as `name`.
    pub fn limiter(mut self, name: impl Into<String>) -> Self {
        self.limiter = Some(name.into());
        self
    }

    /// Token cost charged to the limiter.
    ///
    /// Default: 1.0
    pub fn tokens(mut self, tokens: f64) -> Self {
        self.tokens = tokens;
        self
    }

    /// Uses `policy` instead of the controller's default.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryMode::Override(policy);
        self
    }

    /// Makes exactly one attempt.
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryMode::Disabled;
        self
    }

    /// Breaker consulted before each attempt, if any.
    pub fn breaker_name(&self) -> Option<&str> {
        self.breaker.as_deref()
    }

    /// Limiter charged once per call, if any.
    pub fn limiter_name(&self) -> Option<&str> {
        self.limiter.as_deref()
    }

    /// Tokens charged to the limiter.
    pub fn token_cost(&self) -> f64 {
        self.tokens
    }

    /// Metric labels identifying this call's breaker and limiter.
    pub(crate) fn labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = Vec::with_capacity(2);
        if let Some(breaker) = &self.breaker {
            labels.push(("breaker", breaker.clone()));
        }
        if let Some(limiter) = &self.limiter {
            labels.push(("limiter", limiter.clone()));
        }
        labels
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new()
    }
}
