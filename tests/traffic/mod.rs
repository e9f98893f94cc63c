//! Tests for the traffic controller.
//!
//! - composition.rs: limiter, breaker, retry and fallback working together
//! - layer.rs: the tower layer

mod composition;
mod layer;

use qbt_resilience::retry::RetryPolicy;
use qbt_resilience::TrafficController;
use qbt_resilience_core::{InMemoryMetrics, MockClock};
use std::sync::Arc;

pub(crate) struct Harness {
    pub clock: MockClock,
    pub metrics: Arc<InMemoryMetrics>,
    pub controller: TrafficController,
}

impl Harness {
    pub fn new() -> Self {
        let clock = MockClock::new();
        let metrics = Arc::new(InMemoryMetrics::new());
        let controller = TrafficController::builder()
            .clock(clock.shared())
            .retry_policy(
                RetryPolicy::builder()
                    .max_attempts(3)
                    .jitter_fraction(0.0)
                    .build(),
            )
            .metrics(metrics.clone())
            .build();
        Self {
            clock,
            metrics,
            controller,
        }
    }
}
