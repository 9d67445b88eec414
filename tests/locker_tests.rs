//! Lease behaviour against the in-memory store.
//!
//! All tests run on a paused tokio clock, so TTLs and renewal ticks elapse
//! instantly and deterministically.

mod common;

use std::time::Duration;

use cachelock::{LockError, MemoryStore};
use common::{lock_config, memory_manager};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_lease_expires_without_renewal() {
    let (store, manager) = memory_manager(4, lock_config(2, 1, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    locker.renewal(false);
    assert!(locker.apply().await.unwrap());
    assert_eq!(store.get("LOCK:job").as_deref(), Some(locker.token()));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(store.executed("EVAL"), 0);

    manager.release_locker(locker).await;
}

#[tokio::test(start_paused = true)]
async fn test_renewal_keeps_lease_alive() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    assert!(locker.apply().await.unwrap());

    sleep(Duration::from_secs(12)).await;
    assert_eq!(store.get("LOCK:job").as_deref(), Some(locker.token()));
    assert!(locker.is_held());
    assert!(store.executed("EVAL") >= 5);

    manager.release_locker(locker).await;
    assert_eq!(store.get("LOCK:job"), None);
}

#[tokio::test(start_paused = true)]
async fn test_contender_wins_after_release() {
    let (store, manager) = memory_manager(4, lock_config(30, 5, 3600));

    let mut a = manager.acquire_locker("job").await.unwrap();
    let mut b = manager.acquire_locker("job").await.unwrap();
    assert_ne!(a.token(), b.token());

    assert!(a.apply().await.unwrap());
    assert!(!b.apply().await.unwrap());
    assert!(!b.is_held());

    manager.release_locker(a).await;
    assert!(b.apply().await.unwrap());
    assert_eq!(store.get("LOCK:job").as_deref(), Some(b.token()));

    manager.release_locker(b).await;
}

#[tokio::test(start_paused = true)]
async fn test_only_one_concurrent_apply_succeeds() {
    let (store, manager) = memory_manager(16, lock_config(30, 5, 3600));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            let mut locker = manager.acquire_locker("contended").await.unwrap();
            let won = locker.apply().await.unwrap();
            (won, locker)
        }));
    }

    let mut winners = Vec::new();
    let mut lockers = Vec::new();
    for task in tasks {
        let (won, locker) = task.await.unwrap();
        if won {
            winners.push(locker.token().to_string());
        }
        lockers.push(locker);
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(store.get("LOCK:contended").as_ref(), winners.first());

    for locker in lockers {
        manager.release_locker(locker).await;
    }
    assert_eq!(store.get("LOCK:contended"), None);
    assert_eq!(manager.pool_status().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_release_does_not_delete_foreign_lease() {
    let (store, manager) = memory_manager(4, lock_config(2, 1, 3600));

    let mut a = manager.acquire_locker("job").await.unwrap();
    a.renewal(false);
    assert!(a.apply().await.unwrap());

    sleep(Duration::from_secs(3)).await;

    let mut b = manager.acquire_locker("job").await.unwrap();
    assert!(b.apply().await.unwrap());

    manager.release_locker(a).await;
    assert_eq!(store.get("LOCK:job").as_deref(), Some(b.token()));

    manager.release_locker(b).await;
    assert_eq!(store.get("LOCK:job"), None);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_stops_after_losing_lease() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    let mut lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    store.insert("LOCK:job", "intruder", Some(Duration::from_secs(60)));
    lost.wait_for(|lost| *lost).await.unwrap();
    assert!(!locker.is_held());
    assert_eq!(store.executed("EVAL"), 1);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.executed("EVAL"), 1);

    // Nothing to delete: the release skips the compare-and-delete entirely.
    manager.release_locker(locker).await;
    assert_eq!(store.executed("EVAL"), 1);
    assert_eq!(store.get("LOCK:job").as_deref(), Some("intruder"));
}

#[tokio::test(start_paused = true)]
async fn test_renewal_ends_at_renewal_timeout() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 7));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    assert!(locker.apply().await.unwrap());

    sleep(Duration::from_secs(20)).await;
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(store.executed("EVAL"), 3);
    assert!(!locker.is_held());
    assert!(*locker.lost().borrow());

    manager.release_locker(locker).await;
}

#[tokio::test(start_paused = true)]
async fn test_renewal_timeout_reports_lost_once_lease_runs_out() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 7));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    let lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    // Renewals at 2s, 4s and 6s; the last one runs out at 11s.
    sleep(Duration::from_secs(10)).await;
    assert!(locker.is_held());
    assert!(!*lost.borrow());
    assert_eq!(store.get("LOCK:job").as_deref(), Some(locker.token()));

    sleep(Duration::from_secs(2)).await;
    assert!(!locker.is_held());
    assert!(*lost.borrow());
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(store.executed("EVAL"), 3);

    manager.release_locker(locker).await;
    assert_eq!(store.executed("EVAL"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_release_after_renewal_timeout_still_deletes_live_lease() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 7));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    let lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    sleep(Duration::from_secs(8)).await;
    assert!(locker.is_held());

    manager.release_locker(locker).await;
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(store.executed("EVAL"), 4);
    assert!(!*lost.borrow());
}

#[tokio::test(start_paused = true)]
async fn test_renewal_stops_on_transport_error() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    let mut lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    store.set_unavailable(true);
    lost.wait_for(|lost| *lost).await.unwrap();
    assert!(!locker.is_held());
    assert_eq!(store.executed("EVAL"), 0);

    store.set_unavailable(false);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.executed("EVAL"), 0);

    manager.release_locker(locker).await;
    assert_eq!(store.executed("EVAL"), 0);
    assert_eq!(manager.pool_status().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_stops_when_key_is_deleted_externally() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    let mut lost = locker.lost();
    assert!(locker.apply().await.unwrap());

    store.remove("LOCK:job");
    lost.wait_for(|lost| *lost).await.unwrap();
    assert!(!locker.is_held());
    assert_eq!(store.executed("EVAL"), 1);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.executed("EVAL"), 1);

    manager.release_locker(locker).await;
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(store.executed("EVAL"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_apply_after_scope_ends_is_rejected() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    sleep(Duration::from_secs(4)).await;

    let err = locker.apply().await.unwrap_err();
    assert!(matches!(err, LockError::ExpiredBeforeUse(ref key) if key == "LOCK:job"));
    assert_eq!(store.executed("SET"), 0);

    manager.release_locker(locker).await;
}

#[tokio::test(start_paused = true)]
async fn test_apply_when_held_skips_round_trip() {
    let (store, manager) = memory_manager(4, lock_config(30, 5, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    assert!(locker.apply().await.unwrap());
    assert!(locker.apply().await.unwrap());
    assert_eq!(store.executed("SET"), 1);

    manager.release_locker(locker).await;
}

#[tokio::test(start_paused = true)]
async fn test_lock_objects_are_reused_without_residue() {
    let (_store, manager) = memory_manager(4, lock_config(30, 5, 3600));

    let mut first = manager.acquire_locker("a").await.unwrap();
    assert!(first.apply().await.unwrap());
    let first_token = first.token().to_string();
    manager.release_locker(first).await;
    assert_eq!(manager.idle_lockers(), 1);

    let second = manager.acquire_locker("b").await.unwrap();
    assert_eq!(manager.idle_lockers(), 0);
    assert_eq!(second.key(), "LOCK:b");
    assert_ne!(second.token(), first_token);
    assert!(!second.is_held());
    assert!(!*second.lost().borrow());

    manager.release_locker(second).await;
    assert_eq!(manager.idle_lockers(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_locker_holds_dedicated_connection() {
    let (_store, manager) = memory_manager(4, lock_config(30, 5, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    assert_eq!(manager.pool_status().in_use(), 1);
    assert!(locker.apply().await.unwrap());
    assert_eq!(manager.pool_status().in_use(), 1);

    manager.release_locker(locker).await;
    assert_eq!(manager.pool_status().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_fails_fast() {
    common::init_tracing();
    let store = MemoryStore::new();
    let manager =
        cachelock::CacheManager::new(store.pool(1).fail_fast(), lock_config(30, 5, 3600)).unwrap();

    let held = manager.acquire_locker("a").await.unwrap();
    let err = manager.acquire_locker("b").await.unwrap_err();
    assert!(matches!(err, LockError::PoolExhausted(_)));
    assert_eq!(manager.idle_lockers(), 0);

    manager.release_locker(held).await;
    assert!(manager.acquire_locker("b").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_is_an_error_not_contention() {
    let (store, manager) = memory_manager(4, lock_config(30, 5, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    store.set_unavailable(true);
    let err = locker.apply().await.unwrap_err();
    assert!(matches!(err, LockError::StoreUnavailable(_)));
    assert!(!locker.is_held());

    let err = manager.acquire_locker("other").await.unwrap_err();
    assert!(matches!(err, LockError::StoreUnavailable(_)));

    manager.release_locker(locker).await;
    assert_eq!(manager.pool_status().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_locker_stops_renewing() {
    let (store, manager) = memory_manager(4, lock_config(5, 2, 3600));

    let mut locker = manager.acquire_locker("job").await.unwrap();
    assert!(locker.apply().await.unwrap());
    drop(locker);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(store.executed("EVAL"), 0);
    assert_eq!(store.get("LOCK:job"), None);
    assert_eq!(manager.pool_status().in_use(), 0);
    assert_eq!(manager.idle_lockers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_tracks_renewal_timeout() {
    let (_store, manager) = memory_manager(4, lock_config(5, 2, 60));

    let started = tokio::time::Instant::now();
    let locker = manager.acquire_locker("job").await.unwrap();
    assert_eq!(locker.deadline(), Some(started + Duration::from_secs(60)));

    manager.release_locker(locker).await;
}
