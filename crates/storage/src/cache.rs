//! A small in-process TTL cache for read-mostly reference data (items, courses,
//! lessons). Mirrors the teacher's pack-verification cache shape: a `DashMap`
//! wrapped for internal mutability, invalidated wholesale by writers on publish.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<DashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let (value, inserted_at) = self.entries.get(key).map(|e| e.value().clone())?;
        if inserted_at.elapsed() > self.ttl {
            self.entries.remove(key);
            return None;
        }
        Some(value)
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    /// Drop everything. Called by writers on publish — simpler and safer than
    /// tracking per-key dependents for a cache this small.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
