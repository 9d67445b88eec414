//! Core contracts for cache commands and store-backed leases.
//!
//! Backends implement [`StoreConnection`] and [`ConnectionPool`]; everything
//! above them (locks, the command executor) is written against these traits.

pub mod error;
pub mod prelude;
pub mod reply;
pub mod traits;
pub mod value;

pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use prelude::*;
