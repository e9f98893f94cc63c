//! Tests for the TTL and LRU cache.
//!
//! - eviction.rs: capacity, memory and TTL eviction order
//! - concurrency.rs: shared handles across tasks


use qbt_resilience_cache::{Cache, CacheConfigBuilder};
use qbt_resilience_core::MockClock;

pub(crate) fn blob_cache(clock: &MockClock, config: CacheConfigBuilder) -> Cache<String, Vec<u8>> {
    Cache::with_clock(config.build(), clock.shared())
}

pub(crate) fn blob(len: usize) -> Vec<u8> {
    vec![0; len]
}
