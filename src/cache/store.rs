//! Expiring Store Module
//!
//! The key/value layer underneath the bounded cache: per-entry TTL, lazy
//! expiry on read, a sweep that purges expired entries and an eviction
//! handler notified for every entry the sweep removes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::Entry;
use crate::tasks::{Janitor, Sweep};

/// Callback invoked with the key and value of every autonomously removed entry.
pub type EvictionHandler<V> = Arc<dyn Fn(&str, V) + Send + Sync>;

// == Expiring Store Trait ==
/// Contract the bounded cache needs from its backing store.
///
/// Implementations synchronize themselves. The eviction handler must fire
/// exactly once per entry the store removes on its own (expiry), never for
/// explicit [`ExpiringStore::delete`] calls, and must be invoked without
/// holding any store lock.
pub trait ExpiringStore<V>: Send + Sync {
    /// Inserts or overwrites `key`, expiring `ttl` from now.
    fn set(&self, key: String, value: V, ttl: Duration);

    /// Returns the value for `key` if present and not expired.
    fn get(&self, key: &str) -> Option<V>;

    /// Returns true if `key` is present and not expired.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key` without notifying the eviction handler.
    fn delete(&self, key: &str) -> Option<V>;

    /// Registers the eviction handler, replacing any previous one.
    fn on_evicted(&self, handler: EvictionHandler<V>);

    /// Removes every expired entry, notifying the handler for each.
    ///
    /// Returns the number of entries removed.
    fn delete_expired(&self) -> usize;
}

impl<V, T> ExpiringStore<V> for Arc<T>
where
    T: ExpiringStore<V> + ?Sized,
{
    fn set(&self, key: String, value: V, ttl: Duration) {
        (**self).set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Option<V> {
        (**self).get(key)
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }

    fn delete(&self, key: &str) -> Option<V> {
        (**self).delete(key)
    }

    fn on_evicted(&self, handler: EvictionHandler<V>) {
        (**self).on_evicted(handler)
    }

    fn delete_expired(&self) -> usize {
        (**self).delete_expired()
    }
}

// == Shared Store State ==
struct StoreShared<V> {
    items: RwLock<HashMap<String, Entry<V>>>,
    on_evicted: RwLock<Option<EvictionHandler<V>>>,
}

impl<V> StoreShared<V> {
    fn delete_expired(&self) -> usize {
        let now = Instant::now();

        // Collect under the write lock, notify after releasing it.
        let evicted: Vec<(String, V)> = {
            let mut items = self.items.write();
            let expired: Vec<String> = items
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();

            expired
                .into_iter()
                .filter_map(|key| items.remove(&key).map(|entry| (key, entry.value)))
                .collect()
        };

        let count = evicted.len();
        let handler = self.on_evicted.read().clone();
        if let Some(handler) = handler {
            for (key, value) in evicted {
                handler(&key, value);
            }
        }

        count
    }
}

impl<V: Send + Sync + 'static> Sweep for StoreShared<V> {
    fn sweep(&self) -> usize {
        self.delete_expired()
    }
}

// == TTL Store ==
/// Default [`ExpiringStore`]: a locked `HashMap` of entries with an optional
/// background janitor sweeping on a fixed interval.
///
/// Expired entries are invisible to reads immediately and physically
/// removed by the next sweep. Dropping the store stops its janitor.
pub struct TtlStore<V> {
    shared: Arc<StoreShared<V>>,
    sweep_interval: Option<Duration>,
    janitor: Option<Janitor>,
}

impl<V: Clone + Send + Sync + 'static> TtlStore<V> {
    // == Constructor ==
    /// Creates a store swept every `sweep_interval`.
    ///
    /// The janitor runs on the ambient tokio runtime, or on its own thread
    /// when called outside one. If neither can be started a warning is
    /// logged and expired entries are only purged through
    /// [`ExpiringStore::delete_expired`].
    pub fn new(sweep_interval: Duration) -> Self {
        let mut store = Self::without_janitor();
        store.sweep_interval = Some(sweep_interval);

        match Janitor::start(Arc::downgrade(&store.shared), sweep_interval) {
            Ok(janitor) => store.janitor = Some(janitor),
            Err(err) => warn!(
                error = %err,
                "expired entries will only be purged on explicit sweeps"
            ),
        }

        store
    }

    /// Creates a store with no background sweep.
    pub fn without_janitor() -> Self {
        Self {
            shared: Arc::new(StoreShared {
                items: RwLock::new(HashMap::new()),
                on_evicted: RwLock::new(None),
            }),
            sweep_interval: None,
            janitor: None,
        }
    }
}

impl<V> TtlStore<V> {
    /// Returns the janitor interval, if one was requested.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval
    }

    /// Returns true while a background janitor is sweeping this store.
    pub fn has_janitor(&self) -> bool {
        self.janitor
            .as_ref()
            .is_some_and(|janitor| !janitor.is_finished())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.read().is_empty()
    }
}

impl<V: Clone + Send + Sync> ExpiringStore<V> for TtlStore<V> {
    fn set(&self, key: String, value: V, ttl: Duration) {
        self.shared.items.write().insert(key, Entry::new(value, ttl));
    }

    fn get(&self, key: &str) -> Option<V> {
        let items = self.shared.items.read();
        items
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    fn contains(&self, key: &str) -> bool {
        let items = self.shared.items.read();
        items.get(key).is_some_and(|entry| !entry.is_expired())
    }

    fn delete(&self, key: &str) -> Option<V> {
        self.shared
            .items
            .write()
            .remove(key)
            .map(|entry| entry.value)
    }

    fn on_evicted(&self, handler: EvictionHandler<V>) {
        *self.shared.on_evicted.write() = Some(handler);
    }

    fn delete_expired(&self) -> usize {
        let removed = self.shared.delete_expired();
        if removed > 0 {
            debug!(removed, "purged expired entries");
        }
        removed
    }
}

impl<V> fmt::Debug for TtlStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlStore")
            .field("len", &self.len())
            .field("sweep_interval", &self.sweep_interval)
            .field("janitor", &self.has_janitor())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::sleep;

    const LONG_TTL: Duration = Duration::from_secs(300);

    fn recording_handler(store: &TtlStore<u32>) -> Arc<Mutex<Vec<(String, u32)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_evicted(Arc::new(move |key: &str, value: u32| {
            sink.lock().unwrap().push((key.to_string(), value));
        }));
        seen
    }

    #[test]
    fn test_store_set_and_get() {
        let store = TtlStore::without_janitor();

        store.set("key1".to_string(), "value1".to_string(), LONG_TTL);

        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert!(store.contains("key1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store: TtlStore<u32> = TtlStore::without_janitor();
        assert_eq!(store.get("nonexistent"), None);
        assert!(!store.contains("nonexistent"));
    }

    #[test]
    fn test_store_overwrite_resets_value() {
        let store = TtlStore::without_janitor();

        store.set("key1".to_string(), 1u32, LONG_TTL);
        store.set("key1".to_string(), 2u32, LONG_TTL);

        assert_eq!(store.get("key1"), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_expired_entry_is_invisible_before_sweep() {
        let store = TtlStore::without_janitor();

        store.set("key1".to_string(), 1u32, Duration::from_millis(20));
        sleep(Duration::from_millis(50));

        assert_eq!(store.get("key1"), None);
        assert!(!store.contains("key1"));
        // Still physically present until swept
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_delete_does_not_notify() {
        let store = TtlStore::without_janitor();
        let seen = recording_handler(&store);

        store.set("key1".to_string(), 1, LONG_TTL);

        assert_eq!(store.delete("key1"), Some(1));
        assert_eq!(store.delete("key1"), None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_store_delete_expired_notifies_each_entry_once() {
        let store = TtlStore::without_janitor();
        let seen = recording_handler(&store);

        store.set("short1".to_string(), 1, Duration::from_millis(20));
        store.set("short2".to_string(), 2, Duration::from_millis(20));
        store.set("long".to_string(), 3, LONG_TTL);
        sleep(Duration::from_millis(50));

        assert_eq!(store.delete_expired(), 2);
        assert_eq!(store.delete_expired(), 0);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![("short1".to_string(), 1), ("short2".to_string(), 2)]
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(3));
    }

    #[test]
    fn test_store_handler_can_reenter_store() {
        let store = Arc::new(TtlStore::<u32>::without_janitor());
        let weak = Arc::downgrade(&store);
        let reentered = Arc::new(Mutex::new(false));
        let flag = reentered.clone();

        store.on_evicted(Arc::new(move |key: &str, _value: u32| {
            if let Some(store) = weak.upgrade() {
                // Would deadlock if the sweep still held the items lock
                assert!(!store.contains(key));
                *flag.lock().unwrap() = true;
            }
        }));

        store.set("key1".to_string(), 1, Duration::from_millis(10));
        sleep(Duration::from_millis(30));

        assert_eq!(store.delete_expired(), 1);
        assert!(*reentered.lock().unwrap());
    }

    #[test]
    fn test_store_without_runtime_sweeps_on_own_thread() {
        let store = TtlStore::new(Duration::from_millis(10));
        assert!(store.has_janitor());
        let seen = recording_handler(&store);

        store.set("expire_soon".to_string(), 1, Duration::from_millis(20));
        sleep(Duration::from_millis(150));

        assert!(store.is_empty());
        assert_eq!(
            seen.lock().unwrap().clone(),
            vec![("expire_soon".to_string(), 1)]
        );
    }

    #[test]
    fn test_janitor_does_not_keep_dropped_store_alive() {
        let store: TtlStore<u32> = TtlStore::new(Duration::from_millis(10));
        assert!(store.has_janitor());
        let shared = Arc::downgrade(&store.shared);

        sleep(Duration::from_millis(35));
        drop(store);
        sleep(Duration::from_millis(30));

        assert!(shared.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_store_janitor_sweeps_expired_entries() {
        let store = TtlStore::new(Duration::from_millis(20));
        assert!(store.has_janitor());
        let seen = recording_handler(&store);

        store.set("expire_soon".to_string(), 1, Duration::from_millis(10));
        store.set("long_lived".to_string(), 2, LONG_TTL);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(
            seen.lock().unwrap().clone(),
            vec![("expire_soon".to_string(), 1)]
        );
        assert_eq!(store.get("long_lived"), Some(2));
    }
}
