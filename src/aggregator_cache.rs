//! Read-side cache in front of the Snapshot Store's JSON reads (spec §5) —
//! wraps the teacher's [`district_report_tools::lru_cache::LruCache`] with
//! a TTL and hit/miss/eviction counters, since the aggregator only ever
//! needs whole-value caching, not the teacher's fetch-on-miss `Cacher`
//! trait.
//!
//! [`LruCache`] requires a `Copy` key, so entries are keyed by a hash of the
//! cache key string; the original string travels alongside the value so a
//! hash collision degrades to a cache miss rather than a wrong answer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use district_report_tools::lru_cache::LruCache;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct AggregatorCache<V> {
    entries: LruCache<u64, (String, V)>,
    capacity: usize,
    stats: CacheStats,
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<V: Clone> AggregatorCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        AggregatorCache {
            entries: LruCache::with_ttl(capacity, Some(ttl)),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let hash = hash_key(key);
        match self.entries.get_mut(hash) {
            Some((stored_key, value)) if stored_key == key => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: &str, value: V) {
        let hash = hash_key(key);
        let existed = self.entries.get_mut(hash).is_some();
        let was_full = self.entries.len() >= self.capacity;
        self.entries.insert(hash, (key.to_string(), value));
        if !existed && was_full {
            self.stats.evictions += 1;
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_hit_and_miss() {
        let mut cache: AggregatorCache<i32> = AggregatorCache::new(2, Duration::from_secs(60));
        assert_eq!(cache.get("a"), None);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut cache: AggregatorCache<i32> = AggregatorCache::new(1, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache: AggregatorCache<i32> = AggregatorCache::new(4, Duration::from_millis(10));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a"), None);
    }
}
