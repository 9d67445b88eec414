//! Integration tests against a live Redis server.
//!
//! Run with `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.

mod common;

use std::time::Duration;

use cachelock::{CacheManager, LockConfig, LockError, PoolConfig, RedisPool};
use common::{lock_config, redis_address};

async fn manager(config: LockConfig) -> CacheManager<RedisPool> {
    common::init_tracing();
    let pool = PoolConfig::builder()
        .address(redis_address())
        .max_active(8)
        .build()
        .unwrap();
    CacheManager::connect(&pool, config).await.unwrap()
}

fn unique(name: &str) -> String {
    format!("{}-{}", name, cachelock::token::create_token())
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_exclusive_apply_and_release() {
    let manager = manager(lock_config(30, 5, 3600)).await;
    let name = unique("exclusive");

    let mut a = manager.acquire_locker(&name).await.unwrap();
    let mut b = manager.acquire_locker(&name).await.unwrap();
    assert!(a.apply().await.unwrap());
    assert!(!b.apply().await.unwrap());

    let stored = manager.client().get(a.key()).await.unwrap();
    assert_eq!(stored.as_string(), a.token());

    manager.release_locker(a).await;
    assert!(b.apply().await.unwrap());
    manager.release_locker(b).await;

    let key = LockConfig::default().key_for(&name);
    assert!(!manager.client().exists(&key).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_lease_expires_without_renewal() {
    let manager = manager(lock_config(2, 1, 3600)).await;
    let name = unique("expiry");

    let mut locker = manager.acquire_locker(&name).await.unwrap();
    locker.renewal(false);
    assert!(locker.apply().await.unwrap());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(manager.client().get(locker.key()).await.unwrap().is_nil());
    manager.release_locker(locker).await;
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_renewal_extends_lease() {
    let manager = manager(lock_config(3, 1, 3600)).await;
    let name = unique("renewal");

    let mut locker = manager.acquire_locker(&name).await.unwrap();
    assert!(locker.apply().await.unwrap());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stored = manager.client().get(locker.key()).await.unwrap();
    assert_eq!(stored.as_string(), locker.token());
    assert!(locker.is_held());

    manager.release_locker(locker).await;
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_renewal_stops_when_lease_is_taken_over() {
    let manager = manager(lock_config(5, 1, 3600)).await;
    let name = unique("takeover");

    let mut locker = manager.acquire_locker(&name).await.unwrap();
    let mut lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    manager.client().set(locker.key(), "intruder").await.unwrap();
    tokio::time::timeout(Duration::from_secs(3), lost.wait_for(|lost| *lost))
        .await
        .unwrap()
        .unwrap();
    assert!(!locker.is_held());

    let key = locker.key().to_string();
    manager.release_locker(locker).await;
    assert!(manager.client().get(&key).await.unwrap().eq_str("intruder"));
    manager.client().del(&[&key]).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_client_commands() {
    let manager = manager(LockConfig::default()).await;
    let client = manager.client();
    let key = unique("counter");

    assert_eq!(client.incr(&key).await.unwrap(), 1);
    assert_eq!(client.incr_by(&key, 4).await.unwrap(), 5);
    assert_eq!(client.decr_by(&key, 2).await.unwrap(), 3);
    assert!(client.expire(&key, Duration::from_secs(30)).await.unwrap());
    assert!(client.ttl(&key).await.unwrap().is_some());
    assert!(client.del(&[&key]).await.unwrap().eq_int(1));
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_unreachable_server_fails_connect() {
    let pool = PoolConfig::builder()
        .address("127.0.0.1:1")
        .connect_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let err = CacheManager::connect(&pool, LockConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::StoreUnavailable(_)));
}
