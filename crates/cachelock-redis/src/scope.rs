//! Cancellation scope bounding a lock object's active life.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeEnd {
    Cancelled,
    Deadline,
}

/// Ends either when cancelled or when its deadline passes, whichever comes first.
#[derive(Debug)]
pub(crate) struct CancelScope {
    cancel: watch::Sender<bool>,
    deadline: Instant,
}

impl CancelScope {
    pub(crate) fn with_timeout(timeout: Duration) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.cancel.borrow() || Instant::now() >= self.deadline
    }

    /// Idempotent.
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn watcher(&self) -> ScopeWatcher {
        ScopeWatcher {
            cancelled: self.cancel.subscribe(),
            deadline: self.deadline,
        }
    }
}

/// Receiving half handed to background tasks.
#[derive(Debug)]
pub(crate) struct ScopeWatcher {
    cancelled: watch::Receiver<bool>,
    deadline: Instant,
}

impl ScopeWatcher {
    /// Resolves once the scope has ended.
    pub(crate) async fn done(&mut self) -> ScopeEnd {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => ScopeEnd::Deadline,
            // A dropped sender means the owning lock object is gone.
            _ = self.cancelled.wait_for(|cancelled| *cancelled) => ScopeEnd::Cancelled,
        }
    }

    /// Resolves once the scope is cancelled or its owner is gone, ignoring the deadline.
    pub(crate) async fn cancelled(&mut self) {
        let _ = self.cancelled.wait_for(|cancelled| *cancelled).await;
    }
}
