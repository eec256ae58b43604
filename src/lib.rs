//! ttl_lru - A bounded, thread-safe LRU cache with per-entry TTL
//!
//! Entries are evicted least-recently-used first once the cache is full, and
//! expire lazily: an entry whose TTL has elapsed becomes invisible to reads
//! and is removed by the first read that notices it. No background thread is
//! involved.
//!
//! ```
//! use std::time::Duration;
//! use ttl_lru::TtlLruCache;
//!
//! let cache = TtlLruCache::new(2)?;
//! cache.put("a", 1, Duration::from_secs(3600));
//! cache.put("b", 2, Duration::from_secs(3600));
//! assert!(cache.put("c", 3, Duration::from_secs(3600)));
//! assert_eq!(cache.get(&"a"), None);
//! assert_eq!(cache.get(&"c"), Some(3));
//! # Ok::<(), ttl_lru::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStats, CapacityStore, TtlLruCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
