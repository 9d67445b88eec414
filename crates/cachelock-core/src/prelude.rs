//! Convenience prelude for store and lock types.

pub use crate::error::{LockError, LockResult, StoreError, StoreResult};
pub use crate::reply::Reply;
pub use crate::traits::{ConnectionPool, PoolStatus, StoreConnection};
pub use crate::value::{Command, StoreValue};
