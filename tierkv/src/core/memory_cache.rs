use ahash::AHashMap;
use std::collections::BTreeMap;
use tracing::debug;

use super::types::UNLIMITED_CAPACITY;

/// Cost-bounded in-memory LRU cache
///
/// Recency is tracked with a monotonically increasing tick: every read or write hit
/// re-stamps the entry, and `recency` maps ticks back to keys so the least recently used
/// entry is always the first one in the map. Ties cannot happen, so insertion order
/// decides between entries that were never touched again.
pub struct MemoryCache<T> {
    /// Cache data
    entries: AHashMap<String, CacheEntry<T>>,

    /// LRU ordering (oldest tick first)
    recency: BTreeMap<u64, String>,

    next_tick: u64,

    /// Sum of `cost` over all entries, wide enough that it cannot overflow
    total_cost: u128,

    /// Maximum total cost, or `UNLIMITED_CAPACITY`
    capacity: u64,
}

/// Cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Cached value
    pub value: T,

    /// Weight charged against capacity
    pub cost: u64,

    /// Whether the value matches the last payload written to or read from disk
    pub persisted: bool,

    tick: u64,
}

/// An entry removed because the cache exceeded its capacity
#[derive(Debug, Clone)]
pub struct Evicted<T> {
    pub key: String,
    pub value: T,
    pub cost: u64,
}

impl<T> MemoryCache<T> {
    /// Create a cache bounded by `capacity`
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: AHashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            total_cost: 0,
            capacity,
        }
    }

    /// Create a cache that never evicts
    pub fn unlimited() -> Self {
        Self::new(UNLIMITED_CAPACITY)
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Get an entry, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry<T>> {
        if !self.entries.contains_key(key) {
            return None;
        }

        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.to_string());

        Some(&*entry)
    }

    /// Get an entry without touching its recency
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Insert or replace an entry, then evict until the cache fits its capacity
    ///
    /// The entry being inserted is never evicted by its own insertion: an entry whose cost
    /// alone exceeds capacity stays resident after everything else has been evicted.
    pub fn insert(&mut self, key: String, value: T, cost: u64) -> Vec<Evicted<T>> {
        self.remove(&key);

        let tick = self.bump();
        self.recency.insert(tick, key.clone());
        self.total_cost += u128::from(cost);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                cost,
                persisted: false,
                tick,
            },
        );

        debug!("Memory cache PUT: {} (cost {})", key, cost);

        self.evict(Some(&key))
    }

    /// Remove an entry if present
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.total_cost -= u128::from(entry.cost);
        Some(entry)
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        self.recency.clear();
        self.total_cost = 0;

        debug!("Memory cache CLEAR ({} entries)", count);
    }

    /// Change the capacity, evicting immediately if the cache no longer fits
    pub fn set_capacity(&mut self, capacity: u64) -> Vec<Evicted<T>> {
        self.capacity = capacity;
        self.evict(None)
    }

    /// Flag a resident entry as matching its disk payload
    pub fn mark_persisted(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.persisted = true;
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.recency.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of resident costs, saturating at `u64::MAX`
    pub fn total_cost(&self) -> u64 {
        u64::try_from(self.total_cost).unwrap_or(u64::MAX)
    }

    fn over_capacity(&self) -> bool {
        self.capacity != UNLIMITED_CAPACITY && self.total_cost > u128::from(self.capacity)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn evict(&mut self, protected: Option<&str>) -> Vec<Evicted<T>> {
        let mut evicted = Vec::new();

        while self.over_capacity() {
            let victim = self
                .recency
                .values()
                .find(|key| Some(key.as_str()) != protected)
                .cloned();

            let Some(key) = victim else {
                break;
            };

            if let Some(entry) = self.remove(&key) {
                debug!("Memory cache EVICT: {} (cost {})", key, entry.cost);
                evicted.push(Evicted {
                    key,
                    value: entry.value,
                    cost: entry.cost,
                });
            }
        }

        evicted
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of<T>(cache: &MemoryCache<T>) -> Vec<String> {
        cache.keys().cloned().collect()
    }

    #[test]
    fn test_cache_put_get() {
        let mut cache = MemoryCache::new(100);

        cache.insert("key1".to_string(), vec![1, 2, 3], 1);

        let entry = cache.get("key1").unwrap();
        assert_eq!(entry.value, vec![1, 2, 3]);
        assert_eq!(entry.cost, 1);
        assert!(!entry.persisted);
        assert_eq!(cache.total_cost(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let mut cache: MemoryCache<u32> = MemoryCache::new(100);

        assert!(cache.get("nonexistent").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_updates_total_cost() {
        let mut cache = MemoryCache::new(100);

        cache.insert("key1".to_string(), "a", 10);
        cache.insert("key1".to_string(), "b", 4);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 4);
        assert_eq!(cache.peek("key1").unwrap().value, "b");
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = MemoryCache::new(3);

        cache.insert("key1".to_string(), 1, 1);
        cache.insert("key2".to_string(), 2, 1);
        cache.insert("key3".to_string(), 3, 1);

        // One more - key1 is the oldest
        let evicted = cache.insert("key4".to_string(), 4, 1);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "key1");
        assert_eq!(evicted[0].value, 1);
        assert_eq!(keys_of(&cache), vec!["key2", "key3", "key4"]);
        assert_eq!(cache.total_cost(), 3);
    }

    #[test]
    fn test_cache_lru_order() {
        let mut cache = MemoryCache::new(3);

        cache.insert("key1".to_string(), 1, 1);
        cache.insert("key2".to_string(), 2, 1);
        cache.insert("key3".to_string(), 3, 1);

        // Reading key1 counts as use
        cache.get("key1");

        let evicted = cache.insert("key4".to_string(), 4, 1);

        assert_eq!(evicted[0].key, "key2");
        assert!(cache.contains_key("key1"), "key1 was accessed, should not be evicted");
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = MemoryCache::new(2);

        cache.insert("a".to_string(), 1, 1);
        cache.insert("b".to_string(), 2, 1);
        cache.peek("a");

        let evicted = cache.insert("c".to_string(), 3, 1);
        assert_eq!(evicted[0].key, "a");
    }

    #[test]
    fn test_eviction_by_cost() {
        let mut cache = MemoryCache::new(10);

        cache.insert("a".to_string(), 'x', 6);
        let evicted = cache.insert("b".to_string(), 'y', 6);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "a");
        assert_eq!(evicted[0].value, 'x');
        assert_eq!(keys_of(&cache), vec!["b"]);
    }

    #[test]
    fn test_multiple_evictions_for_one_insert() {
        let mut cache = MemoryCache::new(10);

        cache.insert("a".to_string(), 1, 3);
        cache.insert("b".to_string(), 2, 3);
        cache.insert("c".to_string(), 3, 3);

        let evicted = cache.insert("d".to_string(), 4, 7);
        let evicted_keys: Vec<_> = evicted.iter().map(|e| e.key.as_str()).collect();

        assert_eq!(evicted_keys, vec!["a", "b"]);
        assert_eq!(cache.total_cost(), 10);
    }

    #[test]
    fn test_oversized_entry_stays_alone() {
        let mut cache = MemoryCache::new(5);

        cache.insert("a".to_string(), 1, 2);
        cache.insert("b".to_string(), 2, 2);

        let evicted = cache.insert("huge".to_string(), 3, 50);

        assert_eq!(evicted.len(), 2);
        assert_eq!(keys_of(&cache), vec!["huge"]);
        assert_eq!(cache.total_cost(), 50);
    }

    #[test]
    fn test_max_cost_entry_keeps_total_exact() {
        let mut cache = MemoryCache::new(100);

        cache.insert("huge".to_string(), 0, u64::MAX);
        let evicted = cache.insert("b".to_string(), 1, 5);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "huge");
        assert_eq!(cache.total_cost(), 5);

        let evicted = cache.insert("c".to_string(), 2, 98);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "b");
        assert_eq!(keys_of(&cache), vec!["c"]);
        assert_eq!(cache.total_cost(), 98);
    }

    #[test]
    fn test_total_cost_saturates_when_reported() {
        let mut cache = MemoryCache::unlimited();

        cache.insert("a".to_string(), 1, u64::MAX);
        cache.insert("b".to_string(), 2, u64::MAX);
        assert_eq!(cache.total_cost(), u64::MAX);

        cache.remove("a");
        assert_eq!(cache.total_cost(), u64::MAX);
        cache.remove("b");
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_shrinking_capacity_evicts() {
        let mut cache = MemoryCache::unlimited();

        for i in 0..5 {
            cache.insert(format!("key{}", i), i, 2);
        }
        assert_eq!(cache.capacity(), UNLIMITED_CAPACITY);

        let evicted = cache.set_capacity(4);

        assert_eq!(evicted.len(), 3);
        assert_eq!(keys_of(&cache), vec!["key3", "key4"]);
        assert_eq!(cache.total_cost(), 4);
    }

    #[test]
    fn test_unlimited_never_evicts() {
        let mut cache = MemoryCache::unlimited();

        for i in 0..1000 {
            let evicted = cache.insert(format!("key{}", i), i, u64::MAX / 2);
            assert!(evicted.is_empty());
        }
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = MemoryCache::new(100);

        cache.insert("key1".to_string(), 1, 5);
        cache.insert("key2".to_string(), 2, 7);

        assert_eq!(cache.remove("key1").map(|e| e.value), Some(1));
        assert!(cache.remove("key1").is_none());
        assert_eq!(cache.total_cost(), 7);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
        assert_eq!(cache.keys().count(), 0);
    }

    #[test]
    fn test_mark_persisted_and_reinsert() {
        let mut cache = MemoryCache::new(100);

        cache.insert("key1".to_string(), 1, 1);
        cache.mark_persisted("key1");
        assert!(cache.peek("key1").unwrap().persisted);

        cache.insert("key1".to_string(), 2, 1);
        assert!(!cache.peek("key1").unwrap().persisted);

        cache.mark_persisted("missing");
        assert!(!cache.contains_key("missing"));
    }
}
