//! Redis backend for cachelock: pooled connections, a command client and
//! lease-based locks with background renewal.

pub mod client;
pub mod config;
pub mod lock;
pub mod manager;
pub mod memory;
pub mod pool;
pub mod script;
pub mod token;

mod renewal;
mod scope;
mod slot;

pub use client::CacheClient;
pub use config::{LockConfig, LockConfigBuilder, PoolConfig, PoolConfigBuilder};
pub use lock::Locker;
pub use manager::{CacheManager, LockManager};
pub use memory::{MemoryConnection, MemoryPool, MemoryStore};
pub use pool::{RedisConnection, RedisPool};
