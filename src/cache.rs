//! Local entity cache: a keyed, consumer-subscribed store of query results.
//!
//! Both pull fetches and push-driven reconciliation write into this cache;
//! it is the single source of truth for rendering. Writers race freely and
//! the last write wins — the authoritative state lives server-side, the
//! cache is a read-mostly projection.
//!
//! Consumers register interest per query key and receive a disposer handle;
//! dropping the handle unregisters the callback. All subscribers of a key
//! are notified synchronously within the call that mutated it.
//!
//! The cache is bounded: a simple LRU over entries caps memory for
//! long-running dashboard sessions.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Default maximum number of cached query entries.
const DEFAULT_MAX_ENTRIES: usize = 256;

/// Hierarchical query key, e.g. `orders`, `kitchen:orders`,
/// `notifications:unread-count`. The segment before the first `:` is the
/// key's scope for prefix invalidation.
pub type QueryKey = String;

/// What happened to a subscribed query key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// The key now holds a fresh value.
    Updated(QueryKey),
    /// The key was marked stale; consumers should re-fetch on next read.
    Invalidated(QueryKey),
    /// The key was evicted to stay within the cache bound.
    Evicted(QueryKey),
}

impl CacheUpdate {
    /// The query key this update concerns.
    pub fn key(&self) -> &str {
        match self {
            Self::Updated(k) | Self::Invalidated(k) | Self::Evicted(k) => k,
        }
    }
}

type Callback = Arc<dyn Fn(&CacheUpdate) + Send + Sync>;

struct Entry {
    value: JsonValue,
    stale: bool,
    /// Monotonic access stamp for LRU eviction.
    touched: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, Entry>,
    subscribers: HashMap<u64, (QueryKey, Callback)>,
    next_sub_id: u64,
    clock: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.touched = self.clock;
        }
    }

    fn callbacks_for(&self, key: &str) -> Vec<Callback> {
        self.subscribers
            .values()
            .filter(|(k, _)| k == key)
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    /// Evict least-recently-used entries down to `max_entries`, returning
    /// the evicted keys.
    fn evict_over(&mut self, max_entries: usize) -> Vec<QueryKey> {
        let mut evicted = Vec::new();
        while self.entries.len() > max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }
}

/// Keyed, subscribable query cache with a bounded LRU footprint.
///
/// Cloning is cheap; all clones share the same underlying store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
    max_entries: usize,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl QueryCache {
    /// Create a cache bounded to `max_entries` query entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner::default())),
            max_entries: max_entries.max(1),
        }
    }

    /// Read the cached value for a key. Stale entries are still returned —
    /// staleness is advisory, checked via [`QueryCache::is_stale`].
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.touch(key);
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Whether a key is missing or has been invalidated since last set.
    pub fn is_stale(&self, key: &str) -> bool {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.get(key).map(|e| e.stale).unwrap_or(true)
    }

    /// Store a value, clearing staleness and notifying subscribers of the
    /// key in the same call.
    pub fn set(&self, key: impl Into<QueryKey>, value: JsonValue) {
        let key = key.into();
        let (callbacks, evictions) = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            inner.clock += 1;
            let touched = inner.clock;
            inner.entries.insert(key.clone(), Entry { value, stale: false, touched });
            let evicted = inner.evict_over(self.max_entries);
            let eviction_cbs: Vec<(QueryKey, Vec<Callback>)> = evicted
                .into_iter()
                .map(|k| {
                    let cbs = inner.callbacks_for(&k);
                    (k, cbs)
                })
                .collect();
            (inner.callbacks_for(&key), eviction_cbs)
        };
        // Dispatch outside the lock so a callback may re-enter the cache.
        let update = CacheUpdate::Updated(key);
        for cb in callbacks {
            cb(&update);
        }
        for (key, cbs) in evictions {
            let update = CacheUpdate::Evicted(key);
            for cb in cbs {
                cb(&update);
            }
        }
    }

    /// Read-modify-write under a single lock acquisition.
    ///
    /// `f` receives the current value (if any) and returns the new value;
    /// returning `None` leaves the entry untouched and notifies nobody.
    /// Used by the reconciler for list prepends and counter bumps that must
    /// not race against concurrent fetch completions.
    pub fn update<F>(&self, key: &str, f: F)
    where
        F: FnOnce(Option<&JsonValue>) -> Option<JsonValue>,
    {
        let (callbacks, evictions) = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            let current = inner.entries.get(key).map(|e| &e.value);
            match f(current) {
                Some(new_value) => {
                    inner.clock += 1;
                    let touched = inner.clock;
                    inner
                        .entries
                        .insert(key.to_string(), Entry { value: new_value, stale: false, touched });
                    let evicted = inner.evict_over(self.max_entries);
                    let eviction_cbs: Vec<(QueryKey, Vec<Callback>)> = evicted
                        .into_iter()
                        .map(|k| {
                            let cbs = inner.callbacks_for(&k);
                            (k, cbs)
                        })
                        .collect();
                    (inner.callbacks_for(key), eviction_cbs)
                }
                None => return,
            }
        };
        let update = CacheUpdate::Updated(key.to_string());
        for cb in callbacks {
            cb(&update);
        }
        for (key, cbs) in evictions {
            let update = CacheUpdate::Evicted(key);
            for cb in cbs {
                cb(&update);
            }
        }
    }

    /// Mark a single key stale and notify its subscribers.
    pub fn invalidate(&self, key: &str) {
        let callbacks = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            match inner.entries.get_mut(key) {
                Some(entry) => {
                    entry.stale = true;
                    inner.callbacks_for(key)
                }
                // Invalidating an uncached key still notifies subscribers:
                // they may be holding derived state.
                None => inner.callbacks_for(key),
            }
        };
        let update = CacheUpdate::Invalidated(key.to_string());
        for cb in callbacks {
            cb(&update);
        }
    }

    /// Mark every key under a scope stale: the scope key itself plus every
    /// key with the `scope:` prefix (`orders` covers `orders:recent`, ...).
    pub fn invalidate_scope(&self, scope: &str) {
        let prefix = format!("{}:", scope);
        let keys: Vec<QueryKey> = {
            let inner = self.inner.lock().expect("cache lock poisoned");
            inner
                .entries
                .keys()
                .filter(|k| k.as_str() == scope || k.starts_with(&prefix))
                .cloned()
                .collect()
        };
        if keys.is_empty() {
            // Still notify subscribers of the bare scope key.
            self.invalidate(scope);
            return;
        }
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Store an entity snapshot under its collection (`order:{id}`, ...).
    pub fn upsert_entity(&self, collection: &str, id: &str, value: JsonValue) {
        self.set(format!("{}:{}", collection, id), value);
    }

    /// Read a cached entity snapshot by collection and id.
    pub fn entity(&self, collection: &str, id: &str) -> Option<JsonValue> {
        self.get(&format!("{}:{}", collection, id))
    }

    /// Register interest in a query key.
    ///
    /// The callback fires synchronously for every update, invalidation, or
    /// eviction of the key. The returned handle unregisters on drop.
    pub fn subscribe<F>(&self, key: impl Into<QueryKey>, callback: F) -> CacheSubscription
    where
        F: Fn(&CacheUpdate) + Send + Sync + 'static,
    {
        let key = key.into();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        inner.subscribers.insert(id, (key, Arc::new(callback)));
        CacheSubscription { id, inner: Arc::downgrade(&self.inner) }
    }

    /// Number of cached query entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposer handle for a cache subscription; unregisters on drop.
pub struct CacheSubscription {
    id: u64,
    inner: Weak<Mutex<CacheInner>>,
}

impl Drop for CacheSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut inner) = inner.lock() {
                inner.subscribers.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_get_roundtrip() {
        let cache = QueryCache::default();
        cache.set("orders", json!([{"id": "o1"}]));
        assert_eq!(cache.get("orders").unwrap()[0]["id"], "o1");
        assert!(!cache.is_stale("orders"));
        assert!(cache.is_stale("payments"));
    }

    #[test]
    fn test_invalidate_marks_stale_but_keeps_value() {
        let cache = QueryCache::default();
        cache.set("orders", json!([1, 2]));
        cache.invalidate("orders");
        assert!(cache.is_stale("orders"));
        assert!(cache.get("orders").is_some());
    }

    #[test]
    fn test_invalidate_scope_covers_prefixed_keys() {
        let cache = QueryCache::default();
        cache.set("kitchen", json!(1));
        cache.set("kitchen:orders", json!(2));
        cache.set("kitchenette", json!(3)); // not under the scope
        cache.invalidate_scope("kitchen");
        assert!(cache.is_stale("kitchen"));
        assert!(cache.is_stale("kitchen:orders"));
        assert!(!cache.is_stale("kitchenette"));
    }

    #[test]
    fn test_subscribers_notified_in_same_call() {
        let cache = QueryCache::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = hits.clone();
        let _sub_a = cache.subscribe("orders", move |u| {
            assert_eq!(u.key(), "orders");
            hits_a.fetch_add(1, Ordering::SeqCst);
        });
        let hits_b = hits.clone();
        let _sub_b = cache.subscribe("orders", move |_| {
            hits_b.fetch_add(1, Ordering::SeqCst);
        });

        cache.set("orders", json!([]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        cache.invalidate("orders");
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let cache = QueryCache::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_c = hits.clone();
        let sub = cache.subscribe("orders", move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });
        cache.set("orders", json!(1));
        drop(sub);
        cache.set("orders", json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_read_modify_write() {
        let cache = QueryCache::default();
        cache.set("notifications:unread-count", json!({"count": 3}));
        cache.update("notifications:unread-count", |current| {
            let count = current
                .and_then(|v| v.get("count"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            Some(json!({ "count": count + 1 }))
        });
        assert_eq!(cache.get("notifications:unread-count").unwrap()["count"], 4);
    }

    #[test]
    fn test_update_returning_none_is_a_noop() {
        let cache = QueryCache::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_c = hits.clone();
        let _sub = cache.subscribe("orders", move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });
        cache.update("orders", |_| None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(cache.get("orders").is_none());
    }

    #[test]
    fn test_lru_eviction_respects_bound() {
        let cache = QueryCache::new(2);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.get("a"); // a is now more recently used than b
        cache.set("c", json!(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none(), "least-recently-used entry must go");
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_update_insert_respects_bound() {
        let cache = QueryCache::new(2);
        for key in ["a", "b", "c", "d", "e"] {
            cache.update(key, |_| Some(json!(1)));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("e").is_some(), "newest insert survives");
        assert!(cache.get("a").is_none(), "oldest insert evicted");
    }

    #[test]
    fn test_callback_may_reenter_cache() {
        let cache = QueryCache::default();
        let cache_inner = cache.clone();
        let _sub = cache.subscribe("orders", move |_| {
            // Re-entrant read must not deadlock.
            let _ = cache_inner.get("orders");
        });
        cache.set("orders", json!([]));
    }
}
