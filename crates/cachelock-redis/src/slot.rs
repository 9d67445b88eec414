//! Reusable lock objects and the free list they return to.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cachelock_core::traits::StoreConnection;
use tokio::sync::watch;

use crate::renewal::RenewalTask;
use crate::scope::CancelScope;
use crate::token::create_token;

/// State visible to both the lock object and its renewal task.
///
/// `key` and `token` are only written while the slot is uniquely owned, so
/// readers never need the connection lock to see them.
pub(crate) struct Shared<C> {
    pub(crate) key: String,
    pub(crate) token: String,
    pub(crate) held: AtomicBool,
    pub(crate) lost: watch::Sender<bool>,
    /// Dedicated connection; the mutex serializes in-flight commands.
    pub(crate) conn: tokio::sync::Mutex<Option<C>>,
}

impl<C> Shared<C> {
    fn idle() -> Self {
        let (lost, _) = watch::channel(false);
        Self {
            key: String::new(),
            token: String::new(),
            held: AtomicBool::new(false),
            lost,
            conn: tokio::sync::Mutex::new(None),
        }
    }
}

pub(crate) struct LockerSlot<C> {
    pub(crate) shared: Arc<Shared<C>>,
    pub(crate) renewal_enabled: bool,
    pub(crate) scope: Option<CancelScope>,
    pub(crate) renewal: Option<RenewalTask>,
}

impl<C: StoreConnection> LockerSlot<C> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared::idle()),
            renewal_enabled: true,
            scope: None,
            renewal: None,
        }
    }

    /// Arms an idle slot for one lease attempt on `key`.
    pub(crate) fn prepare(&mut self, key: &str, conn: C, renewal_timeout: Duration) {
        if Arc::get_mut(&mut self.shared).is_none() {
            self.shared = Arc::new(Shared::idle());
        }
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.key.clear();
            shared.key.push_str(key);
            shared.token = create_token();
            *shared.held.get_mut() = false;
            // Fresh channel so observers of a previous lease never see this one.
            shared.lost = watch::channel(false).0;
            *shared.conn.get_mut() = Some(conn);
        }
        self.renewal_enabled = true;
        self.scope = Some(CancelScope::with_timeout(renewal_timeout));
        self.renewal = None;
    }

    /// Starts the renewal task unless one is already running.
    pub(crate) fn start_renewal(&mut self, interval: Duration, lease: Duration) {
        if self.renewal.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let Some(scope) = &self.scope else {
            return;
        };
        if scope.is_done() {
            return;
        }
        self.renewal = Some(RenewalTask::spawn(
            self.shared.clone(),
            scope.watcher(),
            interval,
            lease,
        ));
    }

    /// Clears every per-lease field. Fails while a renewal task still holds a reference.
    pub(crate) fn scrub(&mut self) -> bool {
        self.scope = None;
        self.renewal = None;
        self.renewal_enabled = true;
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => {
                shared.key.clear();
                shared.token.clear();
                *shared.held.get_mut() = false;
                shared.conn.get_mut().take();
                true
            }
            None => false,
        }
    }

    fn is_idle(&mut self) -> bool {
        self.scope.is_none()
            && self.renewal.is_none()
            && Arc::get_mut(&mut self.shared).is_some_and(|shared| {
                shared.key.is_empty()
                    && shared.token.is_empty()
                    && !*shared.held.get_mut()
                    && shared.conn.get_mut().is_none()
            })
    }
}

/// Bounded free list of idle lock objects.
pub(crate) struct LockerPool<C> {
    free: Mutex<Vec<LockerSlot<C>>>,
    capacity: usize,
}

impl<C: StoreConnection> LockerPool<C> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Pops an idle slot or builds a new one.
    pub(crate) fn checkout(&self) -> LockerSlot<C> {
        self.lock().pop().unwrap_or_else(LockerSlot::new)
    }

    /// Returns a scrubbed slot; it is dropped once the pool is full.
    pub(crate) fn checkin(&self, mut slot: LockerSlot<C>) {
        if !slot.is_idle() {
            return;
        }
        let mut free = self.lock();
        if free.len() < self.capacity {
            free.push(slot);
        }
    }

    pub(crate) fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LockerSlot<C>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
