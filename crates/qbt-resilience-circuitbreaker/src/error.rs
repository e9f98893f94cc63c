use qbt_resilience_core::{Classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker refused admission.
    #[error("circuit breaker '{name}' is open; call not permitted")]
    OpenCircuit { name: String },

    /// The protected operation failed.
    #[error("operation failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// True if the breaker refused the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit { .. })
    }

    /// The operation's error, if the call got that far.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::OpenCircuit { .. } => None,
        }
    }
}

impl<E: Classify> Classify for CircuitBreakerError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            CircuitBreakerError::OpenCircuit { .. } => ErrorKind::CircuitOpen,
            CircuitBreakerError::Inner(e) => e.kind(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CircuitBreakerError::OpenCircuit { .. } => None,
            CircuitBreakerError::Inner(e) => e.retry_after(),
        }
    }
}
