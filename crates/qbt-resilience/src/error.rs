use qbt_resilience_core::{Classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Outcome of a protected call that did not produce a value.
///
/// Variants that carry an operation error always carry the last one
/// observed, never an aggregate of earlier attempts.
#[derive(Debug, Error)]
pub enum TrafficError<E> {
    /// The rate limiter refused the call; the operation never ran.
    #[error("rate limiter '{limiter}' refused the request")]
    RateLimited {
        limiter: String,
        /// How long until the request could have been admitted, if ever.
        wait_hint: Option<Duration>,
    },

    /// The circuit breaker refused an attempt.
    #[error("circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },

    /// A retryable error persisted until attempts or the time budget ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: E },

    /// The operation failed with an error that is not retried.
    #[error("operation failed: {0}")]
    Operation(E),

    /// The primary path failed and so did the fallback.
    #[error("fallback failed: {0}")]
    Fallback(E),

    /// The call named a breaker or limiter that was never registered.
    #[error("no {kind} registered under '{name}'")]
    NotRegistered { kind: &'static str, name: String },
}

impl<E> TrafficError<E> {
    /// True if the limiter refused the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TrafficError::RateLimited { .. })
    }

    /// True if an open breaker refused the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, TrafficError::CircuitOpen { .. })
    }

    /// True if a retryable error outlasted the retry policy.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TrafficError::RetriesExhausted { .. })
    }

    /// Short label used in metrics and logs.
    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            TrafficError::RateLimited { .. } => "rate_limited",
            TrafficError::CircuitOpen { .. } => "circuit_open",
            TrafficError::RetriesExhausted { .. } => "exhausted",
            TrafficError::Operation(_) => "failed",
            TrafficError::Fallback(_) => "fallback_failed",
            TrafficError::NotRegistered { .. } => "not_registered",
        }
    }

    /// Borrow of the operation or fallback error, if there is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            TrafficError::RetriesExhausted { last, .. } => Some(last),
            TrafficError::Operation(e) | TrafficError::Fallback(e) => Some(e),
            _ => None,
        }
    }

    /// The operation or fallback error, if there is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            TrafficError::RetriesExhausted { last, .. } => Some(last),
            TrafficError::Operation(e) | TrafficError::Fallback(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Classify> Classify for TrafficError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            TrafficError::RateLimited { .. } => ErrorKind::RateLimited,
            TrafficError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            TrafficError::NotRegistered { .. } => ErrorKind::Config,
            TrafficError::RetriesExhausted { last: e, .. }
            | TrafficError::Operation(e)
            | TrafficError::Fallback(e) => e.kind(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TrafficError::RateLimited { wait_hint, .. } => *wait_hint,
            TrafficError::CircuitOpen { .. } | TrafficError::NotRegistered { .. } => None,
            TrafficError::RetriesExhausted { last: e, .. }
            | TrafficError::Operation(e)
            | TrafficError::Fallback(e) => e.retry_after(),
        }
    }
}
