use qbt_resilience_circuitbreaker::{CircuitSnapshot, CircuitState};
use qbt_resilience_ratelimiter::LimiterSnapshot;
use std::collections::BTreeMap;

/// Point-in-time view of every breaker and limiter a controller owns,
/// keyed by registration name.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficSnapshot {
    pub breakers: BTreeMap<String, CircuitSnapshot>,
    pub limiters: BTreeMap<String, LimiterSnapshot>,
}

impl TrafficSnapshot {
    /// Names of breakers that are currently refusing calls.
    pub fn open_breakers(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|(_, snapshot)| snapshot.state == CircuitState::Open)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
