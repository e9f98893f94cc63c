//! Bounded key/value cache with per-entry TTL, LRU eviction and a memory budget.
//!
//! Used by outbound clients to memoise expensive lookups (classifier answers,
//! crawled pages). Every entry carries a time-to-live; expired entries are
//! dropped lazily on access and whenever a new value is stored. Two limits
//! are enforced synchronously inside [`Cache::set`]:
//!
//! - **entry count**: at `max_size`, the least recently used entry is evicted;
//! - **memory**: while the summed [`SizeEstimate`] of all values exceeds
//!   `max_memory_bytes`, the largest entry is evicted.
//!
//! Handles are cheap to clone and share one store behind a mutex.
//!
//! ```
//! use qbt_resilience_cache::{Cache, CacheConfig};
//! use qbt_resilience_core::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! let cache: Cache<String, String> = Cache::with_clock(
//!     CacheConfig::builder()
//!         .max_size(100)
//!         .ttl(Duration::from_secs(30))
//!         .name("classifier")
//!         .build(),
//!     clock.shared(),
//! );
//!
//! cache.set("ubuntu-24.04.iso".to_string(), "software".to_string());
//! assert_eq!(cache.get("ubuntu-24.04.iso").as_deref(), Some("software"));
//!
//! clock.advance(Duration::from_secs(31));
//! assert_eq!(cache.get("ubuntu-24.04.iso"), None);
//! ```

use qbt_resilience_core::{SharedClock, SystemClock};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use events::{CacheEvent, EvictionCause};
pub use size::{SizeEstimate, OBJECT_SIZE, SCALAR_SIZE};

mod config;
mod events;
mod size;
mod store;

use store::CacheStore;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

/// Lifetime counters plus current occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    pub hits: u64,
    /// Lookups that found nothing live, expired entries included.
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries currently stored.
    pub size: usize,
    /// Summed size estimate of the stored values.
    pub memory_bytes: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// A TTL-aware LRU cache. See the [crate docs](crate).
pub struct Cache<K, V> {
    store: Arc<Mutex<CacheStore<K, V>>>,
    config: Arc<CacheConfig>,
    clock: SharedClock,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + SizeEstimate,
{
    /// Creates a cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a cache that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!("cache_requests_total", "Cache lookups by result (hit or miss)");
            describe_counter!("cache_evictions_total", "Entries evicted by cause");
            describe_counter!("cache_expirations_total", "Entries dropped for outliving their TTL");
            describe_gauge!("cache_size", "Entries currently stored");
            describe_gauge!("cache_memory_bytes", "Estimated size of stored values");
        });

        Self {
            store: Arc::new(Mutex::new(CacheStore::new(config.name.clone()))),
            config: Arc::new(config),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a clone of the value for `key` if it is present and not
    /// older than its TTL. A hit makes the entry most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.with_store(|store| store.get(key, now))
    }

    /// Stores `value` under the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Stores `value` with its own TTL, replacing any previous value.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now();
        let (max_size, max_memory) = (self.config.max_size, self.config.max_memory_bytes);
        self.with_store(|store| store.insert(key, value, ttl, max_size, max_memory, now));

        #[cfg(feature = "metrics")]
        {
            let (size, memory) = self.with_store(|store| (store.len(), store.memory()));
            gauge!("cache_size", "cache" => self.config.name.clone()).set(size as f64);
            gauge!("cache_memory_bytes", "cache" => self.config.name.clone()).set(memory as f64);
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.with_store(|store| store.remove(key))
    }

    /// Removes every entry. Lifetime counters are kept.
    pub fn clear(&self) {
        self.with_store(|store| store.clear());

        #[cfg(feature = "tracing")]
        tracing::debug!(cache = %self.config.name, "cache cleared");
    }

    /// Drops every expired entry now instead of waiting for it to be
    /// touched. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.with_store(|store| store.purge_expired(now))
    }

    /// Access count and time since last access of a live entry. Does not
    /// count as a lookup and does not change recency.
    pub fn access_info<Q>(&self, key: &Q) -> Option<(u64, Duration)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .access_info(key, now)
    }

    /// Number of stored entries, expired ones not yet purged included.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed size estimate of the stored values.
    pub fn memory_usage(&self) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .memory()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }

    /// Runs `f` under the lock, then delivers the events it produced with
    /// the lock released.
    fn with_store<R>(&self, f: impl FnOnce(&mut CacheStore<K, V>) -> R) -> R {
        let (result, events) = {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut store);
            (result, store.take_events())
        };
        for event in &events {
            self.observe(event);
            self.config.event_listeners.emit(event);
        }
        result
    }

    #[cfg_attr(not(any(feature = "metrics", feature = "tracing")), allow(unused_variables))]
    fn observe(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { .. } => {
                #[cfg(feature = "metrics")]
                counter!("cache_requests_total", "cache" => self.config.name.clone(), "result" => "hit")
                    .increment(1);
            }
            CacheEvent::Miss { .. } => {
                #[cfg(feature = "metrics")]
                counter!("cache_requests_total", "cache" => self.config.name.clone(), "result" => "miss")
                    .increment(1);
            }
            CacheEvent::Eviction { cause, size, .. } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    cache = %self.config.name,
                    cause = cause.as_str(),
                    size,
                    "entry evicted"
                );

                #[cfg(feature = "metrics")]
                counter!("cache_evictions_total", "cache" => self.config.name.clone(), "cause" => cause.as_str())
                    .increment(1);
            }
            CacheEvent::Expiration { count, .. } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(cache = %self.config.name, count, "expired entries dropped");

                #[cfg(feature = "metrics")]
                counter!("cache_expirations_total", "cache" => self.config.name.clone())
                    .increment(*count as u64);
            }
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.config.name)
            .field("max_size", &self.config.max_size)
            .field("max_memory_bytes", &self.config.max_memory_bytes)
            .finish()
    }
}
