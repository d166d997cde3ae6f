//! # Cache
//!
//! Short-lived in-memory store for weather readings and provider signing keys.
//!
//! ## Behaviour
//!
//! - One entry per key, absolute expiry fixed when the entry is written
//! - Expired entries read as absent and get overwritten by the next write
//! - No size bound, the city catalog is small and fixed
//! - No manual invalidation
//!
//! ## Concurrency
//!
//! Backed by a `DashMap`, so concurrent readers and writers only contend per shard.
//! Two requests missing the same key at once will both recompute and both write, last write wins.
use std::{hash::Hash, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;

        if Instant::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;

        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Counts stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
