use crate::events::{CacheEvent, EvictionCause};
use qbt_resilience_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`Cache`](crate::Cache).
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) max_size: usize,
    pub(crate) max_memory_bytes: usize,
    pub(crate) ttl: Duration,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

impl CacheConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_bytes
    }

    /// Default time-to-live for entries stored with `set`.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfigBuilder::new().build()
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field("max_size", &self.max_size)
            .field("max_memory_bytes", &self.max_memory_bytes)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    max_size: usize,
    max_memory_bytes: usize,
    ttl: Duration,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl CacheConfigBuilder {
    /// Creates a new builder with default values.
    ///
    /// Defaults:
    /// - max_size: 1000 entries
    /// - max_memory_bytes: 100 MiB
    /// - ttl: 1 hour
    pub fn new() -> Self {
        Self {
            max_size: 1000,
            max_memory_bytes: 100 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the maximum number of entries. Values below 1 are treated as 1.
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size.max(1);
        self
    }

    /// Sets the memory budget in bytes, as measured by
    /// [`SizeEstimate`](crate::SizeEstimate).
    pub fn max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Convenience for [`max_memory_bytes`](Self::max_memory_bytes) in MiB.
    pub fn max_memory_mb(self, mb: usize) -> Self {
        self.max_memory_bytes(mb.saturating_mul(1024 * 1024))
    }

    /// Sets the default time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the name of this cache instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked on every hit.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Hit { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked on every miss, expired entries included.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Miss { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked with the cause of each eviction.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn(EvictionCause) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Eviction { cause, .. } = event {
                f(*cause);
            }
        }));
        self
    }

    /// Registers a callback invoked with the number of entries dropped for
    /// outliving their TTL.
    pub fn on_expiration<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Expiration { count, .. } = event {
                f(*count);
            }
        }));
        self
    }

    pub fn build(self) -> CacheConfig {
        CacheConfig {
            max_size: self.max_size,
            max_memory_bytes: self.max_memory_bytes,
            ttl: self.ttl,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
