//! Guards a periodic job with a renewable lease.
//!
//! Run several copies against the same server; only one does the work at a time.
//!
//! ```text
//! REDIS_ADDR=127.0.0.1:6379 cargo run --example redis_lock
//! ```

use std::time::Duration;

use cachelock::{CacheManager, LockConfig, PoolConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let address = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    let pool = PoolConfig::builder().address(address).max_active(4).build()?;
    let locks = LockConfig::builder()
        .prefix("DEMO")
        .lease(Duration::from_secs(10))
        .renewal_interval(Duration::from_secs(3))
        .build()?;
    let manager = CacheManager::connect(&pool, locks).await?;

    let mut locker = manager.acquire_locker("report").await?;
    if !locker.apply().await? {
        info!(key = locker.key(), "another instance holds the lease");
        manager.release_locker(locker).await;
        return Ok(());
    }

    let mut lost = locker.lost();
    let runs = manager.client().incr("DEMO:report:runs").await?;
    info!(key = locker.key(), runs, "lease acquired, working");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(15)) => info!("work finished"),
        _ = lost.wait_for(|lost| *lost) => warn!("lease lost, abandoning work"),
    }

    manager.release_locker(locker).await;
    Ok(())
}
