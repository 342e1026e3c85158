//! Bounded LRU cache
//!
//! Two independent ceilings: entry count and approximate memory. The memory
//! estimate of an entry is the length of its JSON serialisation plus the key
//! length. Least-recently-used entries are evicted first until both ceilings
//! hold for the incoming entry.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use ontoforge_core::CacheConfig;
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// ============================================================================
// Statistics
// ============================================================================

/// Point-in-time statistics for one cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    /// Hits over total requests, 0.0 before any request
    pub hit_rate: f64,
    pub total_requests: u64,
    /// Estimated size of the live entries in megabytes
    pub total_size_mb: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    writes: u64,
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    size: usize,
    inserted_at: Instant,
    tick: u64,
}

/// Bounded LRU cache keyed by string
///
/// Takes `&mut self` for every operation including reads, since a read
/// refreshes recency and updates counters. Hosts that share an instance wrap
/// it in a lock.
#[derive(Debug)]
pub struct LruCache<V> {
    max_size: usize,
    max_memory_bytes: usize,
    ttl: Option<Duration>,
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency index: tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    tick: u64,
    memory_bytes: usize,
    counters: Counters,
}

impl<V: Clone + Serialize> LruCache<V> {
    /// Create a cache with an entry ceiling, a memory ceiling and an optional TTL
    pub fn new(max_size: usize, max_memory_mb: f64, ttl: Option<Duration>) -> Self {
        let max_memory_bytes = if max_memory_mb.is_finite() && max_memory_mb > 0.0 {
            (max_memory_mb * BYTES_PER_MB) as usize
        } else {
            0
        };

        Self {
            max_size,
            max_memory_bytes,
            ttl,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            memory_bytes: 0,
            counters: Counters::default(),
        }
    }

    /// Create a cache from configuration
    pub fn with_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_size,
            config.max_memory_mb,
            config.ttl_seconds.map(Duration::from_secs),
        )
    }

    /// Look up a value, refreshing its recency
    ///
    /// An expired entry is dropped and counted as a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => self.is_expired(entry),
            None => {
                self.counters.misses += 1;
                return None;
            }
        };

        if expired {
            self.remove(key);
            self.counters.misses += 1;
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.to_string());

        self.counters.hits += 1;
        Some(entry.value.clone())
    }

    /// Store a value, evicting least-recently-used entries as needed
    ///
    /// Returns false when the value alone exceeds the memory ceiling; such a
    /// value is neither written nor does it evict anything.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let size = estimate_size(&key, &value);

        if self.max_size == 0 || size > self.max_memory_bytes {
            tracing::warn!(
                key = %key,
                size,
                max_memory_bytes = self.max_memory_bytes,
                "value exceeds cache ceiling, not cached"
            );
            return false;
        }

        // Replacing a key is not an eviction
        self.remove(&key);

        while !self.entries.is_empty()
            && (self.entries.len() >= self.max_size
                || self.memory_bytes + size > self.max_memory_bytes)
        {
            if !self.evict_oldest() {
                break;
            }
        }

        self.tick += 1;
        self.recency.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                size,
                inserted_at: Instant::now(),
                tick: self.tick,
            },
        );
        self.memory_bytes += size;
        self.counters.writes += 1;
        true
    }

    /// Remove one entry; returns whether it was present
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.remove(key)
    }

    /// Drop every entry; counters are kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.memory_bytes = 0;
    }

    /// Number of stored entries, including any not yet found expired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated size of the stored entries in bytes
    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let total_requests = self.counters.hits + self.counters.misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            self.counters.hits as f64 / total_requests as f64
        };

        CacheStats {
            hits: self.counters.hits,
            misses: self.counters.misses,
            evictions: self.counters.evictions,
            writes: self.counters.writes,
            hit_rate,
            total_requests,
            total_size_mb: self.memory_bytes as f64 / BYTES_PER_MB,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                self.memory_bytes -= entry.size;
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_bytes -= entry.size;
            self.counters.evictions += 1;
            tracing::debug!(key = %key, size = entry.size, "evicted cache entry");
        }
        true
    }
}

/// Approximate footprint of an entry in bytes
fn estimate_size<V: Serialize>(key: &str, value: &V) -> usize {
    let value_size = serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or_else(|_| std::mem::size_of::<V>());
    key.len() + value_size
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize) -> LruCache<String> {
        LruCache::new(max_size, 10.0, None)
    }

    #[test]
    fn test_get_and_set() {
        let mut cache = cache(10);

        assert!(cache.get("a").is_none());
        assert!(cache.set("a", "alpha".to_string()));
        assert_eq!(cache.get("a"), Some("alpha".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_count_ceiling() {
        let mut cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("c", "3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.stats().evictions >= 1);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_least_recently_used_goes_first() {
        let mut cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.get("a");
        cache.set("c", "3".to_string());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_memory_ceiling() {
        // ~100 bytes
        let mut cache: LruCache<String> = LruCache::new(100, 100.0 / BYTES_PER_MB, None);
        let value = "x".repeat(40);

        assert!(cache.set("k1", value.clone()));
        assert!(cache.set("k2", value.clone()));
        assert!(cache.set("k3", value));

        assert!(cache.memory_bytes() <= 100);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_value_rejected() {
        let mut cache: LruCache<String> = LruCache::new(100, 100.0 / BYTES_PER_MB, None);
        cache.set("small", "v".to_string());

        assert!(!cache.set("huge", "x".repeat(500)));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_replace_is_not_eviction() {
        let mut cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("a", "2".to_string());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some("2".to_string()));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().writes, 2);
    }

    #[test]
    fn test_ttl_expiry_counts_as_miss() {
        let mut cache: LruCache<String> = LruCache::new(10, 10.0, Some(Duration::ZERO));
        cache.set("a", "1".to_string());

        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = cache(10);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
        assert_eq!(cache.stats().writes, 2);
    }

    #[test]
    fn test_stats_before_requests() {
        let cache = cache(10);
        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_size_mb, 0.0);
    }

    #[test]
    fn test_with_config() {
        let config = CacheConfig {
            max_size: 1,
            ..Default::default()
        };
        let mut cache: LruCache<u32> = LruCache::with_config(&config);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.len(), 1);
    }
}
