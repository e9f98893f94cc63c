use qbt_resilience_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// Tokens were granted, possibly after waiting.
    Admitted {
        pattern_name: String,
        timestamp: Instant,
        tokens: f64,
        waited: Duration,
    },
    /// The request was refused.
    ///
    /// `wait_hint` is `None` when the request can never be admitted.
    Rejected {
        pattern_name: String,
        timestamp: Instant,
        tokens: f64,
        wait_hint: Option<Duration>,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Admitted { .. } => "admitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Admitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::Admitted { pattern_name, .. }
            | RateLimiterEvent::Rejected { pattern_name, .. } => pattern_name,
        }
    }
}
