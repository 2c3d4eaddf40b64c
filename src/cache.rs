// Process-local TTL cache for search results.
//
// Entries are only checked for freshness on read; stale entries stay in
// the map until the next insert under the same key overwrites them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Entry<V> {
    inserted_at: Instant,
    value: Arc<V>,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value if it is still within its TTL.
    /// Hits hand back a clone of the stored Arc, so callers within the
    /// TTL window all observe the same allocation.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(Arc::clone(&entry.value))
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                inserted_at: Instant::now(),
                value: Arc::clone(&value),
            },
        );
        value
    }

    #[cfg(test)]
    fn insert_at(&self, key: K, value: V, inserted_at: Instant) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                inserted_at,
                value: Arc::new(value),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_returns_same_arc() {
        let cache: TtlCache<String, Vec<i64>> = TtlCache::new(Duration::from_secs(30));
        let stored = cache.insert("query".to_string(), vec![1, 2, 3]);

        let hit = cache.get(&"query".to_string()).expect("fresh entry");
        assert!(Arc::ptr_eq(&stored, &hit));

        let second = cache.get(&"query".to_string()).expect("still fresh");
        assert!(Arc::ptr_eq(&hit, &second));
    }

    #[test]
    fn test_expired_entry_is_ignored_not_removed() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(30));
        cache.insert_at("old", 1, Instant::now() - Duration::from_secs(31));

        assert!(cache.get(&"old").is_none());
        // Stale entries linger until overwritten.
        assert_eq!(cache.len(), 1);

        cache.insert("old", 2);
        assert_eq!(*cache.get(&"old").unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(30));
        assert!(cache.get(&"nope").is_none());
    }
}
