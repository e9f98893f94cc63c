//! Cache storage: recency order, expiry and the two eviction passes.

use crate::events::{CacheEvent, EvictionCause};
use crate::size::SizeEstimate;
use crate::CacheStats;
use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_access: Instant,
    access_count: u64,
    size: usize,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Entries in recency order (front = most recently used) plus running
/// memory total. Callers hold the cache mutex for every method.
pub(crate) struct CacheStore<K, V> {
    entries: LruCache<K, CacheEntry<V>>,
    memory: usize,
    stats: CacheStats,
    name: String,
    pending: Vec<CacheEvent>,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + SizeEstimate,
{
    pub(crate) fn new(name: String) -> Self {
        Self {
            entries: LruCache::unbounded(),
            memory: 0,
            stats: CacheStats::default(),
            name,
            pending: Vec::new(),
        }
    }

    /// Returns a clone of the live value and promotes it to most recently
    /// used. Expired entries are dropped and reported as a miss.
    pub(crate) fn get<Q>(&mut self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.peek(key).map(|entry| entry.is_expired(now)) {
            None => {}
            Some(true) => {
                if let Some(entry) = self.entries.pop(key) {
                    self.memory -= entry.size;
                }
                self.record_expired(1, now);
            }
            Some(false) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.last_access = now;
                    entry.access_count += 1;
                    let value = entry.value.clone();
                    self.stats.hits += 1;
                    self.pending.push(CacheEvent::Hit {
                        pattern_name: self.name.clone(),
                        timestamp: now,
                    });
                    return Some(value);
                }
            }
        }

        self.stats.misses += 1;
        self.pending.push(CacheEvent::Miss {
            pattern_name: self.name.clone(),
            timestamp: now,
        });
        None
    }

    /// Upserts `key`, then enforces the entry limit and the memory budget.
    ///
    /// Expired entries are purged first. At `max_size` the least recently
    /// used entry is evicted to make room. If the running total is still
    /// above `max_memory`, the largest entries go, ties broken towards the
    /// least recently used; the new entry is not exempt.
    pub(crate) fn insert(
        &mut self,
        key: K,
        value: V,
        ttl: Duration,
        max_size: usize,
        max_memory: usize,
        now: Instant,
    ) {
        let size = value.estimated_size();
        if let Some(previous) = self.entries.pop(&key) {
            self.memory -= previous.size;
        }

        self.purge_expired(now);

        while self.entries.len() >= max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.record_evicted(evicted, EvictionCause::Capacity, now),
                None => break,
            }
        }

        self.entries.put(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_access: now,
                access_count: 0,
                size,
                ttl,
            },
        );
        self.memory += size;
        self.stats.sets += 1;

        while self.memory > max_memory {
            let Some(largest) = self.largest_key() else {
                break;
            };
            if let Some(evicted) = self.entries.pop(&largest) {
                self.record_evicted(evicted, EvictionCause::Memory, now);
            }
        }
    }

    pub(crate) fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.pop(key) {
            Some(entry) => {
                self.memory -= entry.size;
                self.stats.deletes += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.memory = 0;
    }

    /// Drops every entry older than its TTL and returns how many went.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = self.entries.pop(key) {
                self.memory -= entry.size;
            }
        }
        if !expired.is_empty() {
            self.record_expired(expired.len(), now);
        }
        expired.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn memory(&self) -> usize {
        self.memory
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            memory_bytes: self.memory,
            ..self.stats
        }
    }

    /// Access count and idle time of a live entry, without promoting it.
    pub(crate) fn access_info<Q>(&self, key: &Q, now: Instant) -> Option<(u64, Duration)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| {
                (
                    entry.access_count,
                    now.saturating_duration_since(entry.last_access),
                )
            })
    }

    pub(crate) fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.pending)
    }

    // `iter().rev()` walks least recently used first, so `>` keeps the
    // oldest of equally large entries.
    fn largest_key(&self) -> Option<K> {
        let mut largest: Option<(&K, usize)> = None;
        for (key, entry) in self.entries.iter().rev() {
            if largest.map_or(true, |(_, size)| entry.size > size) {
                largest = Some((key, entry.size));
            }
        }
        largest.map(|(key, _)| key.clone())
    }

    fn record_evicted(&mut self, evicted: CacheEntry<V>, cause: EvictionCause, now: Instant) {
        self.memory -= evicted.size;
        self.stats.evictions += 1;
        self.pending.push(CacheEvent::Eviction {
            pattern_name: self.name.clone(),
            timestamp: now,
            cause,
            size: evicted.size,
        });
    }

    fn record_expired(&mut self, count: usize, now: Instant) {
        self.stats.expirations += count as u64;
        self.pending.push(CacheEvent::Expiration {
            pattern_name: self.name.clone(),
            timestamp: now,
            count,
        });
    }
}
