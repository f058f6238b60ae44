//! Size-capped map with per-entry time-to-live.
//!
//! Eviction on insert of a new key into a full map: expired entries first, then the entry with
//! the oldest write.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    written: Instant,
}

#[derive(Debug, Clone)]
pub struct BoundedTtlMap<K, V> {
    entries: HashMap<K, Entry<V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> BoundedTtlMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_at(key, Instant::now())
    }

    fn get_at<Q>(&self, key: &Q, now: Instant) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .get(key)
            .filter(|e| !self.is_expired(e, now))
            .map(|e| &e.value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now())
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict(now);
        }
        self.entries.insert(key, Entry { value, written: now });
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.written) < ttl);
        before - self.entries.len()
    }

    fn evict(&mut self, now: Instant) {
        if self.purge_expired_at(now) > 0 {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.written)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.written) >= self.ttl
    }

    /// Keys of live entries.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, e)| !self.is_expired(e, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_entries_are_invisible() {
        let start = Instant::now();
        let mut map = BoundedTtlMap::new(4, Duration::from_secs(10));
        map.insert_at("a", 1, start);
        assert_eq!(map.get_at("a", start + Duration::from_secs(5)), Some(&1));
        assert_eq!(map.get_at("a", start + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_evicts_expired_before_oldest() {
        let start = Instant::now();
        let mut map = BoundedTtlMap::new(2, Duration::from_secs(10));
        map.insert_at("old", 1, start);
        map.insert_at("stale", 2, start + Duration::from_secs(1));
        map.insert_at("stale", 3, start + Duration::from_secs(8));
        map.insert_at("new", 4, start + Duration::from_secs(12));

        let now = start + Duration::from_secs(12);
        assert_eq!(map.get_at("old", now), None);
        assert_eq!(map.get_at("stale", now), Some(&3));
        assert_eq!(map.get_at("new", now), Some(&4));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_evicts_oldest_write_when_nothing_expired() {
        let start = Instant::now();
        let mut map = BoundedTtlMap::new(2, Duration::from_secs(60));
        map.insert_at("a", 1, start);
        map.insert_at("b", 2, start + Duration::from_secs(1));
        // rewriting "a" makes "b" the oldest write
        map.insert_at("a", 10, start + Duration::from_secs(2));
        map.insert_at("c", 3, start + Duration::from_secs(3));

        let now = start + Duration::from_secs(4);
        assert_eq!(map.get_at("a", now), Some(&10));
        assert_eq!(map.get_at("b", now), None);
        assert_eq!(map.get_at("c", now), Some(&3));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut map = BoundedTtlMap::new(1, Duration::from_secs(60));
        map.insert("a".to_string(), 1);
        map.insert("a".to_string(), 2);
        assert_eq!(map.get("a"), Some(&2));
        assert_eq!(map.remove("a"), Some(2));
        assert!(map.is_empty());
    }
}
