//! Bounded keyed cache for GPU objects.
//!
//! The capability space is finite (it is driven by the emulated hardware's
//! register space) but large enough that "never evict" is a liability, so
//! both object caches run through this map: a hard entry bound with
//! least-recently-used eviction and hit/miss/eviction counters.

use std::collections::VecDeque;
use std::hash::Hash;
use std::rc::Rc;

use hashbrown::HashMap;

/// Deterministic least-recently-used ordering over cache keys.
#[derive(Debug)]
struct Lru<K> {
    order: VecDeque<K>,
    index: HashMap<K, usize>,
}

impl<K> Lru<K>
where
    K: Clone + Eq + Hash,
{
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            index: HashMap::new(),
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(&pos) = self.index.get(key) {
            self.order.remove(pos);
            self.rebuild_index();
        }
        self.order.push_back(key.clone());
        self.rebuild_index();
    }

    fn pop_lru(&mut self) -> Option<K> {
        let key = self.order.pop_front()?;
        self.rebuild_index();
        Some(key)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, k) in self.order.iter().enumerate() {
            self.index.insert(k.clone(), i);
        }
    }
}

/// Snapshot of a cache's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// A bounded map from a hashable descriptor key to a shared GPU object.
pub struct BoundedCache<K, V> {
    map: HashMap<K, Rc<V>>,
    lru: Lru<K>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            map: HashMap::new(),
            lru: Lru::new(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Looks the key up, refreshing its recency on a hit.
    pub fn get(&mut self, key: &K) -> Option<Rc<V>> {
        match self.map.get(key) {
            Some(value) => {
                self.hits += 1;
                self.lru.touch(key);
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a freshly created object, evicting the least-recently-used
    /// entry when the cache is at capacity.
    pub fn insert(&mut self, key: K, value: V) -> Rc<V> {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(evicted) = self.lru.pop_lru() {
                self.map.remove(&evicted);
                self.evictions += 1;
            }
        }
        let value = Rc::new(value);
        self.lru.touch(&key);
        self.map.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.map.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_the_same_object() {
        let mut cache: BoundedCache<u32, String> = BoundedCache::new(4);
        assert!(cache.get(&7).is_none());
        let a = cache.insert(7, "seven".to_owned());
        let b = cache.get(&7).expect("cached");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let mut cache: BoundedCache<u32, u32> = BoundedCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        // Touch 1 so 2 becomes the eviction candidate.
        cache.get(&1);
        cache.insert(3, 30);
        assert!(cache.get(&2).is_none());
        assert_eq!(*cache.get(&1).expect("survives"), 10);
        assert_eq!(*cache.get(&3).expect("inserted"), 30);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn counters_track_hits_and_misses() {
        let mut cache: BoundedCache<u32, u32> = BoundedCache::new(2);
        cache.get(&1);
        cache.insert(1, 1);
        cache.get(&1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn reinserting_an_existing_key_does_not_evict() {
        let mut cache: BoundedCache<u32, u32> = BoundedCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(2, 21);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(*cache.get(&2).expect("updated"), 21);
    }
}
