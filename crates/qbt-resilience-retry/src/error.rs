use qbt_resilience_core::{Classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Final error of [`RetryPolicy::run`](crate::RetryPolicy::run).
///
/// Both variants carry the last error observed, never an aggregate.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was retryable but attempts or total delay ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The error was not eligible for retry.
    #[error("not retried: {0}")]
    Rejected(E),
}

impl<E> RetryError<E> {
    /// The last error observed.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected(e) => e,
        }
    }

    /// Borrow of the last error observed.
    pub fn last(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected(e) => e,
        }
    }

    /// True when retries ran out rather than being refused.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: Classify> Classify for RetryError<E> {
    fn kind(&self) -> ErrorKind {
        self.last().kind()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.last().retry_after()
    }
}
