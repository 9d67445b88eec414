//! Background lease renewal.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use cachelock_core::error::LockError;
use cachelock_core::reply::Reply;
use cachelock_core::traits::StoreConnection;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info_span, warn};

use crate::scope::{ScopeEnd, ScopeWatcher};
use crate::script;
use crate::slot::Shared;

/// Handle to the single renewal task of a held lease.
pub(crate) struct RenewalTask {
    handle: JoinHandle<()>,
}

impl RenewalTask {
    pub(crate) fn spawn<C: StoreConnection>(
        shared: Arc<Shared<C>>,
        watcher: ScopeWatcher,
        every: Duration,
        lease: Duration,
    ) -> Self {
        let span = info_span!("renewal", lock.key = %shared.key, every = ?every);
        let handle = tokio::spawn(run(shared, watcher, every, lease).instrument(span));
        Self { handle }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the task to observe its scope ending.
    pub(crate) async fn join(self) {
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            warn!(error = %err, "renewal task panicked");
        }
    }
}

async fn run<C: StoreConnection>(
    shared: Arc<Shared<C>>,
    mut watcher: ScopeWatcher,
    every: Duration,
    lease: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // `apply` wrote the lease just before this task was spawned.
    let mut lapses_at = Instant::now() + lease;

    loop {
        tokio::select! {
            biased;
            end = watcher.done() => {
                debug!(reason = ?end, "renewal stopped");
                if end == ScopeEnd::Deadline {
                    await_lapse(&shared, &mut watcher, lapses_at).await;
                }
                return;
            }
            _ = ticker.tick() => {}
        }

        match renew_once(&shared, lease).await {
            Ok(()) => {
                lapses_at = Instant::now() + lease;
                debug!("lease renewed");
            }
            Err(reason) => {
                mark_lost(&shared, reason);
                return;
            }
        }
    }
}

/// After the renewal timeout, waits out the last renewed TTL and then reports
/// the lease as lost. A release arriving first still deletes the lease.
async fn await_lapse<C: StoreConnection>(
    shared: &Shared<C>,
    watcher: &mut ScopeWatcher,
    lapses_at: Instant,
) {
    tokio::select! {
        biased;
        _ = watcher.cancelled() => {}
        _ = tokio::time::sleep_until(lapses_at) => {
            mark_lost(shared, "renewal timeout reached and the lease ran out".to_string());
        }
    }
}

fn mark_lost<C>(shared: &Shared<C>, reason: String) {
    shared.held.store(false, Ordering::SeqCst);
    shared.lost.send_replace(true);
    let err = LockError::RenewalLost {
        key: shared.key.clone(),
        reason,
    };
    warn!(error = %err, "renewal stopped");
}

async fn renew_once<C: StoreConnection>(shared: &Shared<C>, lease: Duration) -> Result<(), String> {
    let mut conn = shared.conn.lock().await;
    let conn = conn
        .as_mut()
        .ok_or_else(|| "connection already returned".to_string())?;
    let reply = conn
        .execute(&script::renew(&shared.key, &shared.token, lease))
        .await
        .map_err(|e| e.to_string())?;

    if Reply::new(reply).is_ok() {
        Ok(())
    } else {
        Err("lease no longer held by this token".to_string())
    }
}
