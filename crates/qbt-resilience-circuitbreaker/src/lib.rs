//! Consecutive-failure circuit breaker.
//!
//! A breaker watches the outcomes of calls to one dependency (the qBittorrent
//! Web API, the AI classifier, a tracker site) and refuses further calls once
//! that dependency looks down, so callers fail fast instead of piling up.
//!
//! ## States
//! - **Closed**: calls pass; each failure counts toward `failure_threshold`,
//!   each success takes one failure back off the count
//! - **Open**: calls are refused until `recovery_timeout` has elapsed
//! - **Half-Open**: probe calls pass; `success_threshold` successes close the
//!   breaker, a single failure re-opens it
//!
//! The Open to Half-Open move happens inside [`CircuitBreaker::allow`]: there
//! is no background timer.
//!
//! ## Usage
//!
//! ```
//! use qbt_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use qbt_resilience_core::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! let breaker = CircuitBreaker::with_clock(
//!     CircuitBreakerConfig::strict().name("qbt_client").build(),
//!     clock.shared(),
//! );
//!
//! for _ in 0..3 {
//!     assert!(breaker.allow());
//!     breaker.record_failure();
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.allow());
//!
//! clock.advance(Duration::from_secs(30));
//! assert!(breaker.allow());
//! assert_eq!(breaker.state(), CircuitState::HalfOpen);
//! ```
//!
//! ## Wrapping an async call
//!
//! ```
//! use qbt_resilience_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
//! let result = breaker
//!     .call(|| async { Ok::<_, std::io::Error>("torrent added") })
//!     .await;
//! assert!(result.is_ok());
//! # }
//! ```

use crate::circuit::Circuit;
#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
use qbt_resilience_core::{SharedClock, SystemClock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub use circuit::{CircuitSnapshot, CircuitState, CircuitStats};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;

mod circuit;
mod config;
mod error;
mod events;

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

/// A named circuit breaker.
///
/// Cloning is cheap and every clone shares the same state. All operations are
/// synchronous and linearised by the breaker's own mutex.
#[derive(Clone)]
pub struct CircuitBreaker {
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig>,
    clock: SharedClock,
}

impl CircuitBreaker {
    /// Creates a breaker that reads the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a breaker that reads time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Outcomes recorded by the circuit breaker"
            );
            describe_counter!(
                "circuitbreaker_rejected_total",
                "Calls refused while the circuit breaker was open"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Circuit breaker state transitions"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Current state (0 closed, 1 open, 2 half-open)"
            );
        });

        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        let circuit = Circuit::new(Arc::clone(&state_atomic), clock.now());
        Self {
            circuit: Arc::new(Mutex::new(circuit)),
            state_atomic,
            config: Arc::new(config),
            clock,
        }
    }

    /// Name given at configuration time.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Asks for admission of one call.
    ///
    /// Closed and Half-Open admit. Open admits only once the recovery timeout
    /// has elapsed, and that admission moves the breaker to Half-Open.
    pub fn allow(&self) -> bool {
        let permitted = self.with_circuit(|circuit, config, now| circuit.allow(config, now));

        #[cfg(feature = "tracing")]
        if !permitted {
            tracing::debug!(breaker = %self.config.name, "call rejected by open circuit");
        }

        permitted
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        self.with_circuit(|circuit, config, now| circuit.record_success(config, now));
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        self.with_circuit(|circuit, config, now| circuit.record_failure(config, now));
    }

    /// Current state, read without taking the lock.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Convenience for `state() == CircuitState::Open`.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Consistent view of state, counters and lifetime stats.
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.with_circuit(|circuit, config, now| circuit.snapshot(config, now))
    }

    /// Forces the breaker open, as if the failure threshold had been reached.
    pub fn force_open(&self) {
        self.with_circuit(|circuit, config, now| circuit.force_open(config, now));
    }

    /// Forces the breaker closed.
    pub fn force_closed(&self) {
        self.with_circuit(|circuit, config, now| circuit.force_closed(config, now));
    }

    /// Closes the breaker and clears every counter, lifetime stats included.
    pub fn reset(&self) {
        self.with_circuit(|circuit, config, now| circuit.reset(config, now));
    }

    /// Runs `f` behind the breaker and records its outcome.
    ///
    /// Every `Err` counts as a failure. Use `allow`/`record_*` directly when
    /// only some errors should trip the breaker.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            return Err(CircuitBreakerError::OpenCircuit {
                name: self.config.name.clone(),
            });
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn with_circuit<R>(
        &self,
        f: impl FnOnce(&mut Circuit, &CircuitBreakerConfig, Instant) -> R,
    ) -> R {
        let now = self.clock.now();
        let (result, events) = {
            let mut circuit = self.circuit.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut circuit, &self.config, now);
            (result, circuit.take_events())
        };
        for event in &events {
            self.config.event_listeners.emit(event);
        }
        result
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}
