use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Process-wide memo of expensive query results.
///
/// Clones share storage. Expiry is checked lazily on lookup; concurrent
/// writers to one key resolve as last-write-wins.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    ttl: Duration,
    entries: Arc<DashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let fresh = {
            let entry = self.entries.get(key)?;
            (now.saturating_duration_since(entry.stored_at) < self.ttl)
                .then(|| entry.value.clone())
        };
        if fresh.is_none() {
            self.entries.remove_if(key, |_, entry| {
                now.saturating_duration_since(entry.stored_at) >= self.ttl
            });
        }
        fresh
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    pub fn put_at(&self, key: K, value: V, stored_at: Instant) {
        self.entries.insert(key, CacheEntry { value, stored_at });
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
