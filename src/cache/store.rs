//! Capacity Store Module
//!
//! Fixed-capacity, internally synchronized LRU storage with an eviction hook.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Callback invoked with every entry that leaves the store, whether by
/// capacity eviction or explicit removal.
pub type EvictionCallback<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

// == Capacity Store ==
/// Bounded key-value storage that evicts the least recently used entry.
///
/// All operations lock an internal mutex for the duration of the container
/// mutation only. The eviction callback always runs after that lock has been
/// released, so a callback may safely call back into the store.
pub struct CapacityStore<K, V> {
    /// Entries ordered by recency
    entries: Mutex<LruCache<K, V>>,
    /// Eviction hook
    on_evicted: Option<EvictionCallback<K, V>>,
}

impl<K: Hash + Eq, V> CapacityStore<K, V> {
    // == Constructor ==
    /// Creates a new store holding at most `capacity` entries.
    ///
    /// # Errors
    /// Returns `CacheError::InvalidCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::build(capacity, None)
    }

    /// Creates a new store that reports departing entries to `on_evicted`.
    pub fn with_eviction_callback<F>(capacity: usize, on_evicted: F) -> Result<Self>
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        Self::build(capacity, Some(Box::new(on_evicted)))
    }

    fn build(capacity: usize, on_evicted: Option<EvictionCallback<K, V>>) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity(capacity))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(cap)),
            on_evicted,
        })
    }

    // == Get ==
    /// Returns a clone of the value and marks the key most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.entries.lock().get(key).cloned()
    }

    // == Peek ==
    /// Returns a clone of the value without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.entries.lock().peek(key).cloned()
    }

    // == Peek With ==
    /// Applies `f` to the value without cloning it or touching its recency.
    pub fn peek_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> R,
    {
        self.entries.lock().peek(key).map(f)
    }

    // == Add ==
    /// Inserts or overwrites a key-value pair and marks it most recently used.
    ///
    /// If the key is new and the store is full, the least recently used entry
    /// is evicted and handed to the eviction callback.
    ///
    /// Returns true if an eviction occurred.
    pub fn add(&self, key: K, value: V) -> bool {
        let (evicted, capacity) = {
            let mut entries = self.entries.lock();
            let evicted = if entries.contains(&key) {
                entries.put(key, value);
                None
            } else {
                entries.push(key, value)
            };
            (evicted, entries.cap().get())
        };

        match evicted {
            Some((key, value)) => {
                debug!("LRU eviction: store at capacity of {} entries", capacity);
                self.notify(&key, &value);
                true
            }
            None => false,
        }
    }

    // == Remove ==
    /// Removes a key, handing the departing entry to the eviction callback.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.lock().pop_entry(key);
        removed.map(|(key, value)| {
            self.notify(&key, &value);
            value
        })
    }

    // == Remove If ==
    /// Removes a key only if `predicate` accepts its current value.
    ///
    /// The check and the removal happen under one lock acquisition, so a
    /// value written concurrently under the same key is never removed by
    /// mistake.
    pub fn remove_if<Q, F>(&self, key: &Q, predicate: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
    {
        let removed = {
            let mut entries = self.entries.lock();
            if entries.peek(key).map_or(false, predicate) {
                entries.pop_entry(key)
            } else {
                None
            }
        };
        removed.map(|(key, value)| {
            self.notify(&key, &value);
            value
        })
    }

    // == Keys Where ==
    /// Returns the keys whose entries satisfy `predicate`, most recently
    /// used first.
    pub fn keys_where<F>(&self, mut predicate: F) -> Vec<K>
    where
        K: Clone,
        F: FnMut(&K, &V) -> bool,
    {
        self.entries
            .lock()
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Resize ==
    /// Changes the capacity, evicting least recently used entries that no
    /// longer fit. Returns the number of entries evicted.
    pub fn resize(&self, capacity: usize) -> Result<usize> {
        let cap = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity(capacity))?;
        let evicted = {
            let mut entries = self.entries.lock();
            let mut evicted = Vec::new();
            while entries.len() > cap.get() {
                match entries.pop_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            entries.resize(cap);
            evicted
        };

        debug!("Store resized to {} entries, evicted {}", capacity, evicted.len());
        for (key, value) in &evicted {
            self.notify(key, value);
        }
        Ok(evicted.len())
    }

    // == Purge ==
    /// Removes every entry, handing each to the eviction callback.
    /// Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        let drained = {
            let mut entries = self.entries.lock();
            let mut drained = Vec::with_capacity(entries.len());
            while let Some(entry) = entries.pop_lru() {
                drained.push(entry);
            }
            drained
        };

        for (key, value) in &drained {
            self.notify(key, value);
        }
        drained.len()
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    // == Capacity ==
    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    fn notify(&self, key: &K, value: &V) {
        if let Some(on_evicted) = &self.on_evicted {
            on_evicted(key, value);
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for CapacityStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("CapacityStore")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .field("has_eviction_callback", &self.on_evicted.is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type EvictionLog = Arc<Mutex<Vec<(String, i32)>>>;

    fn recording_store(capacity: usize) -> (CapacityStore<String, i32>, EvictionLog) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let store = CapacityStore::with_eviction_callback(capacity, move |k: &String, v: &i32| {
            sink.lock().push((k.clone(), *v));
        })
        .unwrap();
        (store, log)
    }

    #[test]
    fn test_store_new() {
        let store: CapacityStore<String, i32> = CapacityStore::new(10).unwrap();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.capacity(), 10);
    }

    #[test]
    fn test_store_zero_capacity_rejected() {
        let result: Result<CapacityStore<String, i32>> = CapacityStore::new(0);
        assert_eq!(result.unwrap_err(), CacheError::InvalidCapacity(0));
    }

    #[test]
    fn test_store_add_and_get() {
        let store = CapacityStore::new(10).unwrap();

        assert!(!store.add("key1".to_string(), 1));
        assert_eq!(store.get("key1"), Some(1));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_store_overwrite_does_not_evict() {
        let (store, log) = recording_store(2);

        store.add("a".to_string(), 1);
        store.add("b".to_string(), 2);
        assert!(!store.add("a".to_string(), 10));

        assert_eq!(store.len(), 2);
        assert_eq!(store.peek("a"), Some(10));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_store_lru_eviction() {
        let (store, log) = recording_store(3);

        store.add("key1".to_string(), 1);
        store.add("key2".to_string(), 2);
        store.add("key3".to_string(), 3);

        assert!(store.add("key4".to_string(), 4));

        assert_eq!(store.len(), 3);
        assert_eq!(store.peek("key1"), None);
        assert_eq!(*log.lock(), vec![("key1".to_string(), 1)]);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let store = CapacityStore::new(3).unwrap();

        store.add("key1".to_string(), 1);
        store.add("key2".to_string(), 2);
        store.add("key3".to_string(), 3);

        store.get("key1");
        store.add("key4".to_string(), 4);

        assert_eq!(store.peek("key1"), Some(1));
        assert_eq!(store.peek("key2"), None);
    }

    #[test]
    fn test_store_peek_keeps_recency() {
        let store = CapacityStore::new(2).unwrap();

        store.add("a".to_string(), 1);
        store.add("b".to_string(), 2);
        assert_eq!(store.peek("a"), Some(1));
        store.add("c".to_string(), 3);

        assert_eq!(store.peek("a"), None);
    }

    #[test]
    fn test_store_remove_notifies() {
        let (store, log) = recording_store(4);

        store.add("a".to_string(), 1);
        assert_eq!(store.remove("a"), Some(1));
        assert_eq!(store.remove("a"), None);

        assert!(store.is_empty());
        assert_eq!(*log.lock(), vec![("a".to_string(), 1)]);
    }

    #[test]
    fn test_store_remove_if() {
        let (store, log) = recording_store(4);

        store.add("a".to_string(), 1);
        assert_eq!(store.remove_if("a", |v| *v == 2), None);
        assert_eq!(store.peek("a"), Some(1));

        assert_eq!(store.remove_if("a", |v| *v == 1), Some(1));
        assert_eq!(store.peek("a"), None);
        assert_eq!(store.remove_if("missing", |_| true), None);
        assert_eq!(*log.lock(), vec![("a".to_string(), 1)]);
    }

    #[test]
    fn test_store_keys_most_recent_first() {
        let store = CapacityStore::new(4).unwrap();

        store.add("a".to_string(), 1);
        store.add("b".to_string(), 2);
        store.add("c".to_string(), 3);
        store.get("a");

        assert_eq!(
            store.keys_where(|_, _| true),
            vec!["a".to_string(), "c".to_string(), "b".to_string()]
        );
        assert_eq!(store.keys_where(|_, v| *v >= 2), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_store_peek_with() {
        let store = CapacityStore::new(2).unwrap();

        store.add("a".to_string(), 10);
        store.add("b".to_string(), 20);

        assert_eq!(store.peek_with("a", |v| *v + 1), Some(11));
        assert_eq!(store.peek_with("missing", |v: &i32| *v), None);

        // No recency refresh: "a" is still the victim.
        store.add("c".to_string(), 30);
        assert_eq!(store.peek("a"), None);
    }

    #[test]
    fn test_store_resize_evicts_oldest() {
        let (store, log) = recording_store(4);

        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            store.add(key.to_string(), i as i32);
        }

        assert_eq!(store.resize(2).unwrap(), 2);
        assert_eq!(store.capacity(), 2);
        assert_eq!(store.keys_where(|_, _| true), vec!["d".to_string(), "c".to_string()]);
        assert_eq!(log.lock().len(), 2);
        assert_eq!(store.resize(0), Err(CacheError::InvalidCapacity(0)));
    }

    #[test]
    fn test_store_purge() {
        let (store, log) = recording_store(4);

        store.add("a".to_string(), 1);
        store.add("b".to_string(), 2);

        assert_eq!(store.purge(), 2);
        assert!(store.is_empty());
        assert_eq!(log.lock().len(), 2);
    }
}
