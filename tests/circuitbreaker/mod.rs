//! Tests for the circuit breaker.
//!
//! - transitions.rs: the state table, thresholds and recovery timeout
//! - events.rs: listeners and lifetime stats
//! - concurrency.rs: shared breakers across tasks

mod concurrency;
