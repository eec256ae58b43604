//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default maximum number of entries
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default TTL in milliseconds for `put_default`
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub capacity: usize,
    /// TTL in milliseconds applied by `put_default`
    pub default_ttl_ms: u64,
}

impl CacheConfig {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unparsable values fall back to their defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`CacheConfig::from_env`], but rejects values that fail to parse.
    pub fn try_from_env() -> Result<Self> {
        Self::try_from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source, ignoring bad values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            capacity: lookup("CACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CAPACITY),
            default_ttl_ms: lookup("CACHE_DEFAULT_TTL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_MS),
        }
    }

    /// Builds a config from an arbitrary variable source, failing on bad values.
    pub fn try_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            capacity: parse_var(&lookup, "CACHE_CAPACITY", DEFAULT_CAPACITY)?,
            default_ttl_ms: parse_var(&lookup, "CACHE_DEFAULT_TTL_MS", DEFAULT_TTL_MS)?,
        })
    }

    /// Returns the default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CacheError::InvalidConfig(format!("{}={}", name, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.default_ttl_ms, 300_000);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = CacheConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_config_from_lookup_values() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("CACHE_CAPACITY", "64"),
            ("CACHE_DEFAULT_TTL_MS", "1500"),
        ]));
        assert_eq!(config.capacity, 64);
        assert_eq!(config.default_ttl(), Duration::from_millis(1500));
    }

    #[test]
    fn test_config_from_lookup_ignores_garbage() {
        let config = CacheConfig::from_lookup(lookup_from(&[("CACHE_CAPACITY", "lots")]));
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_config_try_from_lookup_rejects_garbage() {
        let result = CacheConfig::try_from_lookup(lookup_from(&[("CACHE_DEFAULT_TTL_MS", "-5")]));
        assert_eq!(
            result,
            Err(CacheError::InvalidConfig("CACHE_DEFAULT_TTL_MS=-5".to_string()))
        );
    }

    #[test]
    fn test_config_deserialize() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"capacity":8,"default_ttl_ms":250}"#).unwrap();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.default_ttl_ms, 250);
    }
}
