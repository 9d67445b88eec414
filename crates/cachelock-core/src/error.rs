//! Error types for store commands and lock operations.

use thiserror::Error;

/// Errors raised while talking to the key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached (connect, IO, timeout).
    #[error("store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No connection could be checked out within the pool's wait policy.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// The store answered with an error reply.
    #[error("store error reply: {0}")]
    Server(String),

    /// A command failed; carries the command line for diagnostics.
    #[error("command `{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Wraps an arbitrary transport error.
    pub fn unavailable(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unavailable(err.into())
    }

    /// Returns the innermost error, looking through `Command` wrappers.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::Command { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the pool had no connection to hand out.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self.root(), Self::PoolExhausted(_))
    }
}

/// Errors that can occur during lock operations.
///
/// Contention is not an error: `apply` reports it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum LockError {
    /// Transport or connection failure; acquisition did not happen.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// No connection available for the lock within the pool's wait policy.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// The lock's cancellation scope ended before `apply` was called.
    #[error("lock {0} expired before use")]
    ExpiredBeforeUse(String),

    /// A renewal tick could not refresh the lease.
    #[error("lease on {key} lost during renewal: {reason}")]
    RenewalLost { key: String, reason: String },

    /// The ownership-checked delete during release failed or was skipped.
    #[error("release of {key} did not delete the lease: {reason}")]
    ReleaseDeleteFailed { key: String, reason: String },

    /// Invalid lock name.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The locker was already torn down.
    #[error("locker already released")]
    Released,
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        if err.is_pool_exhausted() {
            LockError::PoolExhausted(err.to_string())
        } else {
            LockError::StoreUnavailable(err)
        }
    }
}

/// Result type for store commands.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
