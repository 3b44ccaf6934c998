//! TTL-checking wrapper over an LRU store.

use crate::key::CacheKey;
use lru::LruCache;
use modelmux_core::TokenUsage;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub(crate) struct StoredEntry<V> {
    pub(crate) value: V,
    pub(crate) usage: TokenUsage,
    pub(crate) inserted_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) access_count: u64,
}

impl<V> StoredEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// What happened on a read.
pub(crate) enum Lookup<V> {
    Hit(V, TokenUsage, u64),
    Expired,
    Miss,
}

pub(crate) struct TtlLruStore<V> {
    inner: LruCache<CacheKey, StoredEntry<V>>,
}

impl<V: Clone> TtlLruStore<V> {
    pub(crate) fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// TTL is checked before LRU recency is updated, so an expired entry
    /// never counts as a hit.
    pub(crate) fn get(&mut self, key: &CacheKey, now: Instant) -> Lookup<V> {
        let expired = match self.inner.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => return Lookup::Miss,
        };
        if expired {
            self.inner.pop(key);
            return Lookup::Expired;
        }
        let entry = match self.inner.get_mut(key) {
            Some(entry) => entry,
            None => return Lookup::Miss,
        };
        entry.access_count += 1;
        Lookup::Hit(entry.value.clone(), entry.usage, entry.access_count)
    }

    /// Inserts, returning true if an unexpired entry was evicted under
    /// LRU pressure.
    pub(crate) fn insert(
        &mut self,
        key: CacheKey,
        value: V,
        usage: TokenUsage,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        let at_capacity = self.inner.len() == usize::from(self.inner.cap());
        let replacing = self.inner.contains(&key);
        self.inner.put(
            key,
            StoredEntry {
                value,
                usage,
                inserted_at: now,
                ttl,
                access_count: 0,
            },
        );
        at_capacity && !replacing
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }
}
