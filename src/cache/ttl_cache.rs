//! TTL Cache Module
//!
//! Layers lazy per-entry TTL expiry on top of the bounded LRU [`CapacityStore`].
//!
//! Expiry records live in their own map behind their own lock. The map lock
//! and the store lock are never held at the same time: a reader checks the
//! record under the shared lock, releases it, and only then consults the
//! store. Expired entries are not swept; a read that finds an expired record
//! removes the record and the stored value on the spot.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::cache::expiry::Expiry;
use crate::cache::stats::StatsRecorder;
use crate::cache::{CacheStats, CapacityStore, EvictionCallback};
use crate::config::CacheConfig;
use crate::error::Result;

/// Expiry record for one write.
///
/// `stamp` ties the record to the stored value of the same write, so cleanup
/// triggered by one write never discards the record of a later one.
#[derive(Debug, Clone, Copy)]
struct TtlRecord {
    expiry: Expiry,
    stamp: u64,
}

/// Value as held by the capacity store.
#[derive(Debug, Clone)]
struct Stamped<V> {
    value: V,
    stamp: u64,
}

type RecordMap<K> = Arc<RwLock<HashMap<K, TtlRecord>>>;

// == TTL LRU Cache ==
/// Bounded, thread-safe LRU cache whose entries expire after a per-entry TTL.
///
/// Only keys written through [`TtlLruCache::put`] are readable: a key with no
/// expiry record is reported as absent.
pub struct TtlLruCache<K, V> {
    /// Bounded storage, recency tracking and eviction
    store: CapacityStore<K, Stamped<V>>,
    /// Absolute expiry per key
    records: RecordMap<K>,
    /// Source of write stamps
    next_stamp: AtomicU64,
    /// TTL used by `put_default`
    default_ttl: Duration,
    /// Performance statistics
    stats: StatsRecorder,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: 'static,
{
    // == Constructors ==
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    /// Returns `CacheError::InvalidCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::build(capacity, None)
    }

    /// Creates a cache that hands every entry leaving the store to
    /// `on_evicted`, whether it left through capacity pressure, explicit
    /// removal, lazy expiry or a purge.
    ///
    /// The callback runs on the calling thread with no cache lock held.
    pub fn with_eviction_callback<F>(capacity: usize, on_evicted: F) -> Result<Self>
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        Self::build(capacity, Some(Box::new(on_evicted)))
    }

    /// Creates a cache sized and configured from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(config.capacity)?.with_default_ttl(config.default_ttl()))
    }

    /// Sets the TTL applied by [`TtlLruCache::put_default`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    fn build(capacity: usize, on_evicted: Option<EvictionCallback<K, V>>) -> Result<Self> {
        let records: RecordMap<K> = Arc::new(RwLock::new(HashMap::new()));
        // Runs after the store lock is released; drops the record that
        // belongs to the departing value, then forwards to the caller's hook.
        let cleanup_records = Arc::clone(&records);
        let store = CapacityStore::with_eviction_callback(
            capacity,
            move |key: &K, entry: &Stamped<V>| {
                {
                    let mut records = cleanup_records.write();
                    if records.get(key).map_or(false, |r| r.stamp == entry.stamp) {
                        records.remove(key);
                    }
                }
                if let Some(on_evicted) = &on_evicted {
                    on_evicted(key, &entry.value);
                }
            },
        )?;

        Ok(Self {
            store,
            records,
            next_stamp: AtomicU64::new(0),
            default_ttl: CacheConfig::default().default_ttl(),
            stats: StatsRecorder::default(),
        })
    }

    // == Put ==
    /// Stores a key-value pair that expires `ttl` from now.
    ///
    /// Rewriting an existing key replaces its value and expiry and marks it
    /// most recently used. A zero TTL is accepted; the entry is expired for
    /// the next read.
    ///
    /// Returns true if storing the entry evicted the least recently used one.
    pub fn put(&self, key: K, value: V, ttl: Duration) -> bool {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        let record = TtlRecord {
            expiry: Expiry::after(ttl),
            stamp,
        };

        // Record first, so a reader that sees the new value sees its expiry.
        self.records.write().insert(key.clone(), record);

        let evicted = self.store.add(key, Stamped { value, stamp });
        if evicted {
            self.stats.record_eviction();
        }
        evicted
    }

    /// Stores a key-value pair with the configured default TTL.
    pub fn put_default(&self, key: K, value: V) -> bool {
        self.put(key, value, self.default_ttl)
    }

    // == Get ==
    /// Retrieves a value if its key was written with a TTL that has not
    /// elapsed, marking it most recently used.
    ///
    /// An expired entry is removed from the cache by this call.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let record = { self.records.read().get(key).copied() };

        let Some(record) = record else {
            trace!("Cache miss: no expiry record");
            self.stats.record_miss();
            return None;
        };

        if record.expiry.is_expired() {
            self.remove_expired(key, record.stamp);
            self.stats.record_miss();
            return None;
        }

        // The entry may have been evicted since the record was read.
        match self.store.get(key) {
            Some(entry) if entry.stamp >= record.stamp => {
                trace!("Cache hit");
                self.stats.record_hit();
                Some(entry.value)
            }
            // Left by an earlier write that landed after this record's write;
            // it is not covered by this expiry.
            Some(_) => {
                trace!("Cache miss: stored value predates its expiry record");
                self.stats.record_miss();
                None
            }
            None => {
                trace!("Cache miss: expiry record without stored value");
                self.stats.record_miss();
                None
            }
        }
    }

    /// Drops an expired record and the stored value written with it.
    fn remove_expired<Q>(&self, key: &Q, stamp: u64)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let still_expired = {
            let mut records = self.records.write();
            // A rewrite since the read owns the key now.
            let unchanged = records.get(key).map_or(false, |r| r.stamp == stamp);
            if unchanged {
                records.remove(key);
            }
            unchanged
        };

        if still_expired {
            // Older stamps are values whose own records were overwritten.
            self.store.remove_if(key, |entry| entry.stamp <= stamp);
            self.stats.record_expiration();
            debug!("Lazy expiry: removed expired entry");
        }
    }

    // == Peek ==
    /// Retrieves a live value without touching its recency.
    ///
    /// Unlike [`TtlLruCache::get`], an expired entry is left in place.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let record = self.live_record(key)?;
        self.store
            .peek(key)
            .filter(|entry| entry.stamp >= record.stamp)
            .map(|entry| entry.value)
    }

    // == Contains ==
    /// Checks whether a live value is held for the key, without touching
    /// its recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.live_record(key) {
            Some(record) => self.covers(key, record),
            None => false,
        }
    }

    fn live_record<Q>(&self, key: &Q) -> Option<TtlRecord>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let record = { self.records.read().get(key).copied() };
        record.filter(|r| !r.expiry.is_expired())
    }

    /// Checks that the stored value was written no earlier than `record`.
    fn covers<Q>(&self, key: &Q, record: TtlRecord) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store
            .peek_with(key, |entry| entry.stamp >= record.stamp)
            .unwrap_or(false)
    }

    // == Time To Live ==
    /// Returns the remaining lifetime of a held key.
    ///
    /// - `Some(Duration::ZERO)` if the key has expired but was not yet read
    /// - `Some(Duration::MAX)` if the TTL was too large to represent
    /// - `None` if the key is not held
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let record = { self.records.read().get(key).copied() }?;
        if !self.covers(key, record) {
            return None;
        }
        Some(record.expiry.remaining())
    }

    // == Remove ==
    /// Removes a key and returns its value, expired or not.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // The store's eviction hook drops the matching record.
        self.store.remove(key).map(|entry| entry.value)
    }

    // == Keys ==
    /// Returns the keys of live entries, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        // Snapshot the records so the two locks are never held together.
        let live: HashMap<K, u64> = {
            let records = self.records.read();
            records
                .iter()
                .filter(|(_, r)| !r.expiry.is_expired())
                .map(|(key, r)| (key.clone(), r.stamp))
                .collect()
        };
        self.store
            .keys_where(|key, entry| live.get(key).map_or(false, |stamp| entry.stamp >= *stamp))
    }

    // == Resize ==
    /// Changes the capacity, evicting least recently used entries that no
    /// longer fit. Returns the number of entries evicted.
    pub fn resize(&self, capacity: usize) -> Result<usize> {
        let evicted = self.store.resize(capacity)?;
        for _ in 0..evicted {
            self.stats.record_eviction();
        }
        Ok(evicted)
    }

    // == Purge ==
    /// Removes every entry and every expiry record.
    pub fn purge(&self) {
        self.records.write().clear();
        let removed = self.store.purge();
        debug!("Purged {} entries", removed);
    }

    // == Length ==
    /// Returns the number of entries held, including expired entries that
    /// have not been read yet.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // == Capacity ==
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    // == Default TTL ==
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.store.len())
    }

    /// Resets hit, miss, expiration and eviction counters to zero.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl<K: Hash + Eq, V> fmt::Debug for TtlLruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlLruCache")
            .field("store", &self.store)
            .field("records", &self.records.read().len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
