//! Cache Module
//!
//! Provides a bounded in-memory cache with LRU eviction and lazy TTL expiry.

mod expiry;
mod stats;
mod store;
mod ttl_cache;


// Re-export public types
pub use stats::CacheStats;
pub use store::{CapacityStore, EvictionCallback};
pub use ttl_cache::TtlLruCache;
