//! Bounded Cache Module
//!
//! Capacity-limited cache over an [`ExpiringStore`], using a [`KeyIndex`] to
//! choose which entry to evict when full.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error};

use crate::cache::{
    CacheStats, ExpiringStore, KeyIndex, StatsRecorder, TtlStore, DEFAULT_CAPACITY,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL,
};
use crate::config::{non_zero_or, Config};
use crate::error::CacheError;

// == Bounded Cache ==
/// Capacity-bounded, time-expiring key/value cache.
///
/// Every entry lives for the configured TTL. When the cache already tracks
/// `capacity` keys, a `set` first evicts the lexicographically smallest
/// tracked key. Entries the store expires on its own are dropped from the
/// index through the store's eviction handler.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct BoundedCache<V, S = TtlStore<V>>
where
    S: ExpiringStore<V>,
{
    inner: Arc<Inner<V, S>>,
}

struct Inner<V, S> {
    store: S,
    index: KeyIndex,
    /// Serializes `set`, `delete` and eviction handling
    gate: ReentrantMutex<()>,
    /// Keys dropped from the index after the store had already removed them,
    /// awaiting the store's late eviction notice
    released: Mutex<HashSet<String>>,
    stats: StatsRecorder,
    capacity: usize,
    ttl: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V> BoundedCache<V, TtlStore<V>>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache backed by a [`TtlStore`].
    ///
    /// Zero arguments fall back to the defaults: 1 minute ttl, 2 minute
    /// sweep interval, 200 keys.
    pub fn new(ttl: Duration, sweep_interval: Duration, capacity: usize) -> Self {
        let sweep_interval = non_zero_or(sweep_interval, DEFAULT_SWEEP_INTERVAL);
        Self::with_store(TtlStore::new(sweep_interval), ttl, capacity)
    }

    /// Creates a cache from a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ttl, config.sweep_interval, config.capacity)
    }
}

impl<V, S> BoundedCache<V, S>
where
    V: Send + 'static,
    S: ExpiringStore<V> + 'static,
{
    /// Creates a cache over an existing store and registers the eviction
    /// handler on it, replacing any handler the store already had.
    pub fn with_store(store: S, ttl: Duration, capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        let inner = Arc::new(Inner {
            store,
            index: KeyIndex::new(),
            gate: ReentrantMutex::new(()),
            released: Mutex::new(HashSet::new()),
            stats: StatsRecorder::new(),
            capacity,
            ttl: non_zero_or(ttl, DEFAULT_TTL),
            _value: PhantomData,
        });

        let weak = Arc::downgrade(&inner);
        inner.store.on_evicted(Arc::new(move |key: &str, _value: V| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_eviction(key);
            }
        }));

        debug!(capacity, ttl = ?inner.ttl, "bounded cache created");
        Self { inner }
    }

    // == Set ==
    /// Stores `value` under `key`, resetting its TTL.
    ///
    /// If the cache is at capacity, one key is evicted first: the smallest
    /// tracked key, which may be `key` itself.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let inner = &*self.inner;
        let _gate = inner.gate.lock();

        if inner.index.len() >= inner.capacity {
            let evicted = inner.index.pop();
            if inner.store.delete(&evicted).is_some() {
                inner.stats.record_eviction();
                debug!(key = %evicted, capacity = inner.capacity, "capacity reached, evicted key");
            } else {
                debug!(key = %evicted, "capacity reached, reclaimed slot of swept key");
                inner.released.lock().insert(evicted);
            }
        }

        inner.released.lock().remove(&key);
        inner.index.append(&key);
        inner.store.set(key, value, inner.ttl);
    }

    // == Get ==
    /// Returns the value for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.inner.store.get(key);
        match value {
            Some(_) => self.inner.stats.record_hit(),
            None => self.inner.stats.record_miss(),
        }
        value
    }

    // == Delete ==
    /// Removes `key` from the store and the index.
    ///
    /// Returns whether the key was tracked. Deleting an unknown key is a no-op.
    pub fn delete(&self, key: &str) -> bool {
        let _gate = self.inner.gate.lock();
        let stored = self.inner.store.delete(key).is_some();
        let tracked = self.inner.index.delete_key(key);
        if tracked && !stored {
            self.inner.released.lock().insert(key.to_string());
        }
        tracked
    }

    /// Returns true if `key` holds a live value.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.store.contains(key)
    }

    /// Runs one sweep of the store now, returning the number of entries
    /// it removed. The eviction handler runs for each of them.
    pub fn purge_expired(&self) -> usize {
        self.inner.store.delete_expired()
    }

    // == Length ==
    /// Number of keys the cache tracks.
    pub fn len(&self) -> usize {
        self.inner.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.index.is_empty()
    }

    /// Sorted snapshot of tracked keys. The first one is the next to be
    /// evicted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.index.keys()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.index.len())
    }
}

impl<V, S: ExpiringStore<V>> Inner<V, S> {
    /// Eviction handler body: the store removed `key` on its own.
    ///
    /// Stores notify after releasing their own lock, so a `delete` or a
    /// capacity eviction can drop `key` from the index between the removal
    /// and this call. Such keys sit in `released` and are settled here
    /// instead of being reported as inconsistent.
    fn handle_eviction(&self, key: &str) {
        let _gate = self.gate.lock();

        // Set again between the sweep and this callback
        if self.store.contains(key) {
            debug!(key, "evicted key was set again, keeping it indexed");
            return;
        }

        if self.index.delete_key(key) {
            self.stats.record_expiration();
            debug!(key, "expired key removed from index");
        } else if self.released.lock().remove(key) {
            self.stats.record_expiration();
            debug!(key, "late eviction notice for key already released");
        } else {
            let err = CacheError::IndexInconsistent(key.to_string());
            error!(error = %err, "key index out of sync with store");
        }
    }
}

impl<V, S: ExpiringStore<V>> Clone for BoundedCache<V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, S: ExpiringStore<V>> fmt::Debug for BoundedCache<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.inner.capacity)
            .field("ttl", &self.inner.ttl)
            .field("len", &self.inner.index.len())
            .finish()
    }
}
