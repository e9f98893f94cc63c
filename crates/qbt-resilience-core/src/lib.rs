//! Shared building blocks for the qbt-resilience primitives.
//!
//! - [`clock`]: the injectable time source and the only suspension point
//! - [`events`]: typed event listeners used by every primitive
//! - [`error`]: the [`ErrorKind`] taxonomy and the [`Classify`] trait
//! - [`metrics`]: the [`MetricsSink`] seam for counters and latencies

pub mod clock;
pub mod error;
pub mod events;
pub mod metrics;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use error::{Classify, ErrorKind, Failure};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics, SharedMetrics};

#[cfg(feature = "metrics")]
pub use metrics::MetricsRecorderSink;
