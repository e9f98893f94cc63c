use qbt_resilience_core::ResilienceEvent;
use std::time::Instant;

/// Why an entry left the cache without being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvictionCause {
    /// The cache was at `max_size`; the least recently used entry went.
    Capacity,
    /// The memory budget was exceeded; the largest entry went.
    Memory,
}

impl EvictionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionCause::Capacity => "capacity",
            EvictionCause::Memory => "memory",
        }
    }
}

/// Events emitted by a cache.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit {
        pattern_name: String,
        timestamp: Instant,
    },
    Miss {
        pattern_name: String,
        timestamp: Instant,
    },
    Eviction {
        pattern_name: String,
        timestamp: Instant,
        cause: EvictionCause,
        size: usize,
    },
    /// `count` entries were dropped for outliving their TTL.
    Expiration {
        pattern_name: String,
        timestamp: Instant,
        count: usize,
    },
}

impl ResilienceEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Eviction { .. } => "eviction",
            CacheEvent::Expiration { .. } => "expiration",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. }
            | CacheEvent::Expiration { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CacheEvent::Hit { pattern_name, .. }
            | CacheEvent::Miss { pattern_name, .. }
            | CacheEvent::Eviction { pattern_name, .. }
            | CacheEvent::Expiration { pattern_name, .. } => pattern_name,
        }
    }
}
