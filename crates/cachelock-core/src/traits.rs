//! Core traits for store connections and connection pools.

use std::future::Future;

use crate::error::StoreResult;
use crate::value::{Command, StoreValue};

// ============================================================================
// Store Connection Trait
// ============================================================================

/// A single checked-out connection to the key-value store.
///
/// A connection carries one command at a time; callers that share it across
/// tasks must serialize access themselves.
///
/// # Example
///
/// ```rust,ignore
/// let mut conn = pool.acquire().await?;
/// let value = conn.execute(&Command::new("GET").arg("greeting")).await?;
/// conn.close().await?;
/// ```
pub trait StoreConnection: Send + 'static {
    /// Issues `command` and waits for its raw reply.
    ///
    /// Transport failures surface as `StoreError::Unavailable`, error replies
    /// as `StoreError::Server`.
    fn execute(&mut self, command: &Command)
    -> impl Future<Output = StoreResult<StoreValue>> + Send;

    /// Hands the connection back to its pool.
    ///
    /// Dropping the connection has the same effect; this version reports
    /// errors.
    fn close(self) -> impl Future<Output = StoreResult<()>> + Send
    where
        Self: Sized;
}

// ============================================================================
// Connection Pool Trait
// ============================================================================

/// Snapshot of a pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Upper bound on open connections.
    pub max_size: usize,
    /// Connections currently open (idle plus checked out).
    pub size: usize,
    /// Idle connections ready for checkout.
    pub available: usize,
}

impl PoolStatus {
    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }
}

/// Bounded pool of store connections shared by every lock and cache call.
///
/// `acquire` blocks up to the pool's wait policy when exhausted, then fails
/// with `StoreError::PoolExhausted`.
pub trait ConnectionPool: Send + Sync + 'static {
    /// Connection type handed out by this pool.
    type Connection: StoreConnection;

    /// Checks a connection out of the pool.
    fn acquire(&self) -> impl Future<Output = StoreResult<Self::Connection>> + Send;

    /// Current occupancy.
    fn status(&self) -> PoolStatus;
}
