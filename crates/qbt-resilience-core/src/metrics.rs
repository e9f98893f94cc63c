//! Outbound observability seam.
//!
//! The core never formats or transports metrics. It pushes counts and
//! latencies into a [`MetricsSink`] chosen by whoever composes the system.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A `(label, value)` pair attached to a metric sample.
pub type Label = (&'static str, String);

/// Receiver for counters and latency observations.
pub trait MetricsSink: Send + Sync {
    /// Adds `value` to the counter `name`.
    fn inc_counter(&self, name: &'static str, labels: &[Label], value: u64);

    /// Records one latency observation for `name`.
    fn observe_latency(&self, name: &'static str, labels: &[Label], latency: Duration);
}

/// Sink shared across a controller and its clients.
pub type SharedMetrics = Arc<dyn MetricsSink>;

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_counter(&self, _name: &'static str, _labels: &[Label], _value: u64) {}

    fn observe_latency(&self, _name: &'static str, _labels: &[Label], _latency: Duration) {}
}

/// Keeps every sample in memory, keyed by metric name.
///
/// Labels are folded into the key as `name{k=v,...}` in addition to the bare
/// name, so callers can query either totals or a single labelled series.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    latencies: Mutex<HashMap<String, Vec<Duration>>>,
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total of counter `name` across all label sets.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Value of counter `name` for one exact label set.
    pub fn counter_with(&self, name: &str, labels: &[Label]) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&series_key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// All latency observations recorded for `name`.
    pub fn latencies(&self, name: &str) -> Vec<Duration> {
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

fn series_key(name: &str, labels: &[Label]) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", pairs.join(","))
}

impl MetricsSink for InMemoryMetrics {
    fn inc_counter(&self, name: &'static str, labels: &[Label], value: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(name.to_string()).or_insert(0) += value;
        if !labels.is_empty() {
            *counters.entry(series_key(name, labels)).or_insert(0) += value;
        }
    }

    fn observe_latency(&self, name: &'static str, _labels: &[Label], latency: Duration) {
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(latency);
    }
}

/// Forwards samples to the global `metrics` recorder.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorderSink;

#[cfg(feature = "metrics")]
impl MetricsSink for MetricsRecorderSink {
    fn inc_counter(&self, name: &'static str, labels: &[Label], value: u64) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(k, v)| metrics::Label::new(*k, v.clone()))
            .collect();
        metrics::counter!(name, labels).increment(value);
    }

    fn observe_latency(&self, name: &'static str, labels: &[Label], latency: Duration) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(k, v)| metrics::Label::new(*k, v.clone()))
            .collect();
        metrics::histogram!(name, labels).record(latency.as_secs_f64());
    }
}
