use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed = 0,
    /// Calls are refused until the recovery timeout elapses.
    Open = 1,
    /// Probing calls are admitted to test recovery.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Lifetime counters, never reset by state transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitStats {
    /// Outcomes recorded through `record_success` and `record_failure`.
    pub total_calls: u64,
    /// Recorded successes.
    pub successes: u64,
    /// Recorded failures.
    pub failures: u64,
    /// Calls refused by `allow()`.
    pub rejected: u64,
    /// Number of state transitions.
    pub state_changes: u64,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures counted in the current state.
    pub failure_count: u32,
    /// Successes counted in the current state.
    pub success_count: u32,
    /// Configured failure threshold.
    pub failure_threshold: u32,
    /// Configured success threshold.
    pub success_threshold: u32,
    /// Configured recovery timeout.
    pub recovery_timeout: Duration,
    /// Time since the last state transition.
    pub time_in_state: Duration,
    /// Lifetime counters.
    pub stats: CircuitStats,
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    failure_count: u32,
    success_count: u32,
    // set on every transition; doubles as `openedAt` while open
    last_state_change: Instant,
    stats: CircuitStats,
    pending: Vec<CircuitBreakerEvent>,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>, now: Instant) -> Self {
        state_atomic.store(CircuitState::Closed as u8, Ordering::Release);
        Self {
            state: CircuitState::Closed,
            state_atomic,
            failure_count: 0,
            success_count: 0,
            last_state_change: now,
            stats: CircuitStats::default(),
            pending: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    /// Events produced since the last drain, emitted by the caller once the
    /// lock is released.
    pub(crate) fn take_events(&mut self) -> Vec<CircuitBreakerEvent> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn allow(&mut self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        let permitted = match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if now.saturating_duration_since(self.last_state_change) >= config.recovery_timeout
                {
                    self.transition_to(CircuitState::HalfOpen, config, now);
                    true
                } else {
                    false
                }
            }
        };

        if permitted {
            self.pending.push(CircuitBreakerEvent::CallPermitted {
                pattern_name: config.name.clone(),
                timestamp: now,
                state: self.state,
            });
        } else {
            self.stats.rejected += 1;
            self.pending.push(CircuitBreakerEvent::CallRejected {
                pattern_name: config.name.clone(),
                timestamp: now,
            });

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_rejected_total", "circuitbreaker" => config.name.clone())
                .increment(1);
        }
        permitted
    }

    pub(crate) fn record_success(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.stats.total_calls += 1;
        self.stats.successes += 1;
        self.pending.push(CircuitBreakerEvent::SuccessRecorded {
            pattern_name: config.name.clone(),
            timestamp: now,
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "success").increment(1);

        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.transition_to(CircuitState::Closed, config, now);
                }
            }
            // isolated failures decay instead of accumulating forever
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.stats.total_calls += 1;
        self.stats.failures += 1;
        self.failure_count = self.failure_count.saturating_add(1);
        self.pending.push(CircuitBreakerEvent::FailureRecorded {
            pattern_name: config.name.clone(),
            timestamp: now,
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "failure").increment(1);

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config, now);
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open, config, now);
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn force_open(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.transition_to(CircuitState::Open, config, now);
    }

    pub(crate) fn force_closed(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.transition_to(CircuitState::Closed, config, now);
    }

    /// Returns to a fresh closed breaker, clearing lifetime counters too.
    pub(crate) fn reset(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.transition_to(CircuitState::Closed, config, now);
        self.failure_count = 0;
        self.success_count = 0;
        self.stats = CircuitStats::default();
    }

    pub(crate) fn snapshot(&self, config: &CircuitBreakerConfig, now: Instant) -> CircuitSnapshot {
        CircuitSnapshot {
            name: config.name.clone(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            recovery_timeout: config.recovery_timeout,
            time_in_state: now.saturating_duration_since(self.last_state_change),
            stats: self.stats,
        }
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig, now: Instant) {
        if self.state == state {
            return;
        }

        let from_state = self.state;

        self.pending.push(CircuitBreakerEvent::StateTransition {
            pattern_name: config.name.clone(),
            timestamp: now,
            from_state,
            to_state: state,
        });

        #[cfg(feature = "tracing")]
        tracing::info!(
            breaker = %config.name,
            from = from_state.as_str(),
            to = state.as_str(),
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => config.name.clone(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);

            gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone())
                .set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = now;
        self.failure_count = 0;
        self.success_count = 0;
        self.stats.state_changes += 1;
    }
}
