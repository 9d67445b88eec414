//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use cachelock::{CacheManager, LockConfig, MemoryPool, MemoryStore};

static TRACING: Once = Once::new();

/// Routes test logs through `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Lock settings in whole seconds.
pub fn lock_config(lease: u64, renewal: u64, renewal_timeout: u64) -> LockConfig {
    LockConfig::builder()
        .prefix("LOCK")
        .lease(Duration::from_secs(lease))
        .renewal_interval(Duration::from_secs(renewal))
        .renewal_timeout(Duration::from_secs(renewal_timeout))
        .build()
        .unwrap()
}

/// Manager over a fresh in-memory store with `max_active` connections.
pub fn memory_manager(max_active: usize, config: LockConfig) -> (MemoryStore, CacheManager<MemoryPool>) {
    init_tracing();
    let store = MemoryStore::new();
    let manager = CacheManager::new(store.pool(max_active), config).unwrap();
    (store, manager)
}

/// Redis address from `REDIS_URL`, accepting a bare `host:port` or a `redis://` URL.
pub fn redis_address() -> String {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    url.trim_start_matches("redis://")
        .trim_end_matches('/')
        .to_string()
}
