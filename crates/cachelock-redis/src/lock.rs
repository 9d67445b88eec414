//! Lease-based lock object.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use cachelock_core::error::{LockError, LockResult};
use cachelock_core::reply::Reply;
use cachelock_core::traits::StoreConnection;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Span, debug, field, info, instrument, warn};

use crate::config::LockConfig;
use crate::script;
use crate::slot::{LockerPool, LockerSlot, Shared};

/// A lock on one key, bound to a dedicated connection until released.
///
/// Obtained from [`LockManager::acquire_locker`](crate::manager::LockManager::acquire_locker).
/// A successful [`apply`](Self::apply) writes a unique token under the key
/// with a TTL; while renewal is enabled a background task refreshes that TTL
/// until the locker is released or its renewal timeout passes.
///
/// Always finish with [`release`](Self::release). A locker dropped without
/// release stops renewing and leaves the lease to expire on its own.
pub struct Locker<C: StoreConnection> {
    slot: Option<LockerSlot<C>>,
    lockers: Arc<LockerPool<C>>,
    prefix_len: usize,
    lease: Duration,
    renewal_interval: Duration,
}

impl<C: StoreConnection> Locker<C> {
    pub(crate) fn new(slot: LockerSlot<C>, lockers: Arc<LockerPool<C>>, config: &LockConfig) -> Self {
        Self {
            slot: Some(slot),
            lockers,
            prefix_len: config.prefix.len() + 1,
            lease: config.lease(),
            renewal_interval: config.renewal_interval(),
        }
    }

    fn shared(&self) -> Option<&Shared<C>> {
        self.slot.as_ref().map(|slot| slot.shared.as_ref())
    }

    /// Full store key, e.g. `LOCK:orders`.
    pub fn key(&self) -> &str {
        self.shared().map(|s| s.key.as_str()).unwrap_or_default()
    }

    /// The name the locker was requested with.
    pub fn name(&self) -> &str {
        self.key().get(self.prefix_len..).unwrap_or_default()
    }

    /// Ownership token written on success.
    pub fn token(&self) -> &str {
        self.shared().map(|s| s.token.as_str()).unwrap_or_default()
    }

    /// Whether the last `apply` succeeded and renewal has not since failed.
    pub fn is_held(&self) -> bool {
        self.shared()
            .is_some_and(|s| s.held.load(Ordering::SeqCst))
    }

    /// When the cancellation scope ends and renewal stops for good.
    pub fn deadline(&self) -> Option<Instant> {
        self.slot
            .as_ref()
            .and_then(|slot| slot.scope.as_ref())
            .map(|scope| scope.deadline())
    }

    /// Flips to `true` once the lease can no longer be trusted: a renewal
    /// tick failed, or the renewal timeout passed and the last renewed TTL ran out.
    pub fn lost(&self) -> watch::Receiver<bool> {
        match self.shared() {
            Some(shared) => shared.lost.subscribe(),
            None => watch::channel(true).1,
        }
    }

    /// Enables or disables background renewal for the next `apply`.
    ///
    /// Defaults to enabled. Has no effect on a renewal task already running.
    pub fn renewal(&mut self, enabled: bool) -> &mut Self {
        if let Some(slot) = self.slot.as_mut() {
            slot.renewal_enabled = enabled;
        }
        self
    }

    /// Tries once to take the lease.
    ///
    /// Returns `Ok(false)` when another owner holds the key. Calling again
    /// while already held returns `Ok(true)` without a round-trip.
    #[instrument(
        skip(self),
        fields(lock.key = %self.key(), backend = "redis", acquired = field::Empty, elapsed_ms = field::Empty)
    )]
    pub async fn apply(&mut self) -> LockResult<bool> {
        let started = Instant::now();
        let (lease, every) = (self.lease, self.renewal_interval);
        let slot = self.slot.as_mut().ok_or(LockError::Released)?;
        let shared = slot.shared.clone();

        if shared.held.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let scope = slot.scope.as_ref().ok_or(LockError::Released)?;
        if scope.is_done() {
            return Err(LockError::ExpiredBeforeUse(shared.key.clone()));
        }

        let reply = {
            let mut conn = shared.conn.lock().await;
            let conn = conn.as_mut().ok_or(LockError::Released)?;
            conn.execute(&script::acquire(&shared.key, &shared.token, lease))
                .await?
        };

        let acquired = Reply::new(reply).is_ok();
        let span = Span::current();
        span.record("acquired", acquired);
        span.record("elapsed_ms", started.elapsed().as_millis() as u64);

        if acquired {
            shared.held.store(true, Ordering::SeqCst);
            if slot.renewal_enabled {
                slot.start_renewal(every, lease);
            }
            debug!("lease acquired");
        } else {
            debug!("lease held elsewhere");
        }
        Ok(acquired)
    }

    /// Stops renewal, deletes the lease if this token still owns it, and
    /// returns the connection and the lock object to their pools.
    ///
    /// Delete failures are logged; teardown always completes.
    #[instrument(skip(self), fields(lock.key = %self.key(), backend = "redis"))]
    pub async fn release(mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if let Some(slot) = teardown(slot).await {
            self.lockers.checkin(slot);
        }
    }
}

async fn teardown<C: StoreConnection>(mut slot: LockerSlot<C>) -> Option<LockerSlot<C>> {
    if let Some(scope) = &slot.scope {
        scope.cancel();
    }
    if let Some(task) = slot.renewal.take() {
        task.join().await;
    }

    let held = slot.shared.held.swap(false, Ordering::SeqCst);
    let conn = slot.shared.conn.lock().await.take();
    if let Some(mut conn) = conn {
        if held {
            delete_lease(&slot.shared, &mut conn).await;
        } else {
            info!("lease not held, skipping delete");
        }
        if let Err(err) = conn.close().await {
            warn!(error = %err, "failed to return lock connection");
        }
    }

    if slot.scrub() {
        Some(slot)
    } else {
        warn!("lock object still referenced after teardown, discarding it");
        None
    }
}

async fn delete_lease<C: StoreConnection>(shared: &Shared<C>, conn: &mut C) {
    let reply = conn
        .execute(&script::release(&shared.key, &shared.token))
        .await
        .map(Reply::new);
    let reason = match reply {
        Ok(reply) if reply.eq_int(1) => {
            debug!("lease deleted");
            return;
        }
        Ok(_) => "lease already expired or taken over".to_string(),
        Err(err) => err.to_string(),
    };
    let err = LockError::ReleaseDeleteFailed {
        key: shared.key.clone(),
        reason,
    };
    warn!(error = %err, "lease not deleted");
}

impl<C: StoreConnection> Drop for Locker<C> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if let Some(scope) = &slot.scope {
            scope.cancel();
        }
        if let Some(task) = &slot.renewal {
            task.abort();
        }
        if slot.shared.held.load(Ordering::SeqCst) {
            warn!(lock.key = %slot.shared.key, "locker dropped without release, lease left to expire");
        }
    }
}

impl<C: StoreConnection> std::fmt::Debug for Locker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("key", &self.key())
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}
