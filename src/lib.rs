//! Redis-backed leases with background renewal, plus a pooled command layer.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cachelock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CacheManager::connect(&PoolConfig::default(), LockConfig::default()).await?;
//!
//!     let mut locker = manager.acquire_locker("nightly-report").await?;
//!     if locker.apply().await? {
//!         // Only one process gets here until the lease is released or lost.
//!         println!("generating report");
//!     }
//!     manager.release_locker(locker).await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Leases
//!
//! A [`Locker`] writes a unique token under `{prefix}:{name}` with
//! `SET NX EX`. While renewal is enabled a background task refreshes the TTL
//! every `renewal-seconds`, but only while the stored token is still ours, and
//! gives up once `renewal-timeout` has passed. Release deletes the key with a
//! compare-and-delete script, so a lease taken over by someone else after
//! expiry is never removed.
//!
//! ```rust,no_run
//! # use cachelock::*;
//! # async fn run(manager: CacheManager<RedisPool>) -> LockResult<()> {
//! let mut locker = manager.acquire_locker("import").await?;
//! let mut lost = locker.lost();
//! if locker.apply().await? {
//!     tokio::select! {
//!         _ = lost.wait_for(|lost| *lost) => eprintln!("lease lost"),
//!         _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
//!     }
//! }
//! locker.release().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Commands
//!
//! [`CacheClient`] borrows a pooled connection per call:
//!
//! ```rust,no_run
//! # use cachelock::*;
//! # async fn run(manager: CacheManager<RedisPool>) -> StoreResult<()> {
//! let client = manager.client();
//! client.set("greeting", "hello").await?;
//! let reply = client.get("greeting").await?;
//! assert_eq!(reply.as_string(), "hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `cachelock-core`: traits, values, replies and errors
//! - `cachelock-redis`: the Redis pool, in-memory store, client and locks
//!
//! For fine-grained control, you can depend on individual crates instead.

pub use cachelock_core::*;

pub use cachelock_redis::*;
