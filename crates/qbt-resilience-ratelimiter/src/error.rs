use qbt_resilience_core::{Classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`RateLimiter::call`](crate::RateLimiter::call).
#[derive(Debug, Error)]
pub enum RateLimiterError<E> {
    /// No tokens could be acquired.
    #[error("rate limiter '{name}' refused the request")]
    RateLimited {
        name: String,
        wait_hint: Option<Duration>,
    },

    /// The protected operation failed.
    #[error("operation failed: {0}")]
    Inner(E),
}

impl<E> RateLimiterError<E> {
    /// True if the limiter refused the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RateLimiterError::RateLimited { .. })
    }

    /// The operation's error, if the call got that far.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimiterError::Inner(e) => Some(e),
            RateLimiterError::RateLimited { .. } => None,
        }
    }
}

impl<E: Classify> Classify for RateLimiterError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            RateLimiterError::RateLimited { .. } => ErrorKind::RateLimited,
            RateLimiterError::Inner(e) => e.kind(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimiterError::RateLimited { wait_hint, .. } => *wait_hint,
            RateLimiterError::Inner(e) => e.retry_after(),
        }
    }
}
