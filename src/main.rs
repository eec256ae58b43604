//! ttl_lru - stress driver for the TTL-aware LRU cache
//!
//! Runs concurrent writers and readers against one cache and reports the
//! resulting statistics as JSON on stdout.

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttl_lru::{CacheConfig, TtlLruCache};

/// Stress run parameters read from the environment.
#[derive(Debug, Clone)]
struct StressPlan {
    /// Number of worker threads
    threads: usize,
    /// put/get rounds per worker
    iterations: usize,
}

impl StressPlan {
    /// # Environment Variables
    /// - `STRESS_THREADS` - Worker threads (default: 8)
    /// - `STRESS_ITERATIONS` - Rounds per worker (default: 1000)
    fn from_env() -> Self {
        Self {
            threads: env::var("STRESS_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            iterations: env::var("STRESS_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }
}

/// Entry point for the stress run.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache configuration from environment variables
/// 3. Hammer the cache from worker threads, each owning its key
/// 4. Verify every worker's last write is readable
/// 5. Print statistics as JSON
fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttl_lru=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CacheConfig::try_from_env().context("loading cache configuration")?;
    let plan = StressPlan::from_env();
    info!(
        "Configuration loaded: capacity={}, default_ttl={}ms, threads={}, iterations={}",
        config.capacity, config.default_ttl_ms, plan.threads, plan.iterations
    );

    if plan.threads > config.capacity {
        warn!(
            "More workers ({}) than capacity ({}); some keys will be evicted",
            plan.threads, config.capacity
        );
    }

    let cache = TtlLruCache::from_config(&config)?;
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..plan.threads {
            let cache = &cache;
            let iterations = plan.iterations;
            scope.spawn(move || {
                let key = format!("worker-{}", worker);
                for round in 0..iterations {
                    cache.put_default(key.clone(), round);
                    cache.get(key.as_str());
                }
            });
        }
    });

    let elapsed = started.elapsed();
    let readable = (0..plan.threads)
        .filter(|worker| {
            cache.get(format!("worker-{}", worker).as_str()) == plan.iterations.checked_sub(1)
        })
        .count();
    info!(
        "Stress run finished in {:?}: {}/{} workers' last writes readable",
        elapsed, readable, plan.threads
    );

    let stats = cache.stats();
    info!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if elapsed > Duration::from_millis(config.default_ttl_ms) {
        warn!("Run outlasted the default TTL; expired entries skew the readable count");
    }

    Ok(())
}
