//! Entry points owning the connection pool and the lock object pool.

use std::fmt;
use std::sync::Arc;

use cachelock_core::error::{LockError, LockResult, StoreResult};
use cachelock_core::traits::{ConnectionPool, PoolStatus};
use tracing::{debug, instrument};

use crate::client::CacheClient;
use crate::config::{LockConfig, PoolConfig};
use crate::lock::Locker;
use crate::pool::RedisPool;
use crate::slot::LockerPool;

/// Hands out [`Locker`]s, each bound to its own pooled connection.
pub struct LockManager<P: ConnectionPool> {
    pool: Arc<P>,
    config: Arc<LockConfig>,
    lockers: Arc<LockerPool<P::Connection>>,
}

impl<P: ConnectionPool> Clone for LockManager<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
            lockers: self.lockers.clone(),
        }
    }
}

impl<P: ConnectionPool> LockManager<P> {
    pub fn new(pool: Arc<P>, config: LockConfig) -> LockResult<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            lockers: Arc::new(LockerPool::new(config.pool_capacity)),
            config: Arc::new(config),
        })
    }

    /// Prepares a lock object for `name` without touching the key.
    ///
    /// The returned locker owns a dedicated connection and a fresh token;
    /// call [`Locker::apply`] to take the lease.
    #[instrument(skip(self), fields(lock.name = %name, backend = "redis"))]
    pub async fn acquire_locker(&self, name: &str) -> LockResult<Locker<P::Connection>> {
        if name.is_empty() {
            return Err(LockError::InvalidName("lock name cannot be empty".to_string()));
        }

        let conn = self.pool.acquire().await?;
        let mut slot = self.lockers.checkout();
        slot.prepare(
            &self.config.key_for(name),
            conn,
            self.config.renewal_timeout(),
        );
        debug!("locker ready");
        Ok(Locker::new(slot, self.lockers.clone(), &self.config))
    }

    /// Same as [`Locker::release`].
    pub async fn release_locker(&self, locker: Locker<P::Connection>) {
        locker.release().await;
    }

    /// Lock objects waiting in the free list.
    pub fn idle_lockers(&self) -> usize {
        self.lockers.idle()
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }
}

/// Connection pool, command client and lock manager behind one handle.
pub struct CacheManager<P: ConnectionPool> {
    pool: Arc<P>,
    client: CacheClient<P>,
    locks: LockManager<P>,
}

impl<P: ConnectionPool> Clone for CacheManager<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            client: self.client.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<P: ConnectionPool> fmt::Debug for LockManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("idle_lockers", &self.idle_lockers())
            .finish_non_exhaustive()
    }
}

impl<P: ConnectionPool> fmt::Debug for CacheManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("pool", &self.pool.status())
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl CacheManager<RedisPool> {
    /// Dials Redis and builds the manager on top of it.
    pub async fn connect(pool: &PoolConfig, locks: LockConfig) -> LockResult<Self> {
        let redis = RedisPool::connect(pool).await?;
        Self::new(redis, locks)
    }
}

impl<P: ConnectionPool> CacheManager<P> {
    pub fn new(pool: P, locks: LockConfig) -> LockResult<Self> {
        let pool = Arc::new(pool);
        Ok(Self {
            client: CacheClient::new(pool.clone()),
            locks: LockManager::new(pool.clone(), locks)?,
            pool,
        })
    }

    /// Checks out a raw connection; dropping or closing it returns it.
    pub async fn acquire_conn(&self) -> StoreResult<P::Connection> {
        self.pool.acquire().await
    }

    pub fn client(&self) -> &CacheClient<P> {
        &self.client
    }

    pub fn locks(&self) -> &LockManager<P> {
        &self.locks
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Lock objects waiting in the free list.
    pub fn idle_lockers(&self) -> usize {
        self.locks.idle_lockers()
    }

    pub async fn acquire_locker(&self, name: &str) -> LockResult<Locker<P::Connection>> {
        self.locks.acquire_locker(name).await
    }

    pub async fn release_locker(&self, locker: Locker<P::Connection>) {
        self.locks.release_locker(locker).await;
    }
}
