use qbt_resilience_core::{ErrorKind, ResilienceEvent};
use std::time::{Duration, Instant};

/// Events emitted by a retry policy.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A failed attempt will be retried after `delay`.
    Retry {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
        kind: ErrorKind,
        delay: Duration,
    },
    /// The operation succeeded after `attempts` attempts.
    Success {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// Retrying stopped because attempts or total delay ran out.
    Exhausted {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
        kind: ErrorKind,
    },
    /// The error was not eligible for retry.
    IgnoredError {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
        kind: ErrorKind,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::Exhausted { pattern_name, .. }
            | RetryEvent::IgnoredError { pattern_name, .. } => pattern_name,
        }
    }
}
