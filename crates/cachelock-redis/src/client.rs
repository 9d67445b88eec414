//! Pooled command execution.

use std::sync::Arc;
use std::time::Duration;

use cachelock_core::error::{StoreError, StoreResult};
use cachelock_core::reply::Reply;
use cachelock_core::traits::{ConnectionPool, StoreConnection};
use cachelock_core::value::{Command, StoreValue};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Runs single commands on connections borrowed from a pool.
///
/// Each call checks a connection out and hands it back before returning,
/// on success and on error alike.
pub struct CacheClient<P> {
    pool: Arc<P>,
}

impl<P> Clone for CacheClient<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<P: ConnectionPool> CacheClient<P> {
    pub fn new(pool: Arc<P>) -> Self {
        Self { pool }
    }

    /// Issues one command and wraps the raw reply.
    ///
    /// Failures carry the rendered command text.
    #[instrument(skip(self, command), fields(command = %command.name()))]
    pub async fn execute(&self, command: Command) -> StoreResult<Reply> {
        let started = Instant::now();
        let result = self.run(&command).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                debug!(elapsed_ms, "command completed");
                Ok(Reply::new(value))
            }
            Err(source) => {
                error!(elapsed_ms, command = %command, error = %source, "command failed");
                Err(StoreError::Command {
                    command: command.to_string(),
                    source: Box::new(source),
                })
            }
        }
    }

    async fn run(&self, command: &Command) -> StoreResult<StoreValue> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.execute(command).await;
        if let Err(err) = conn.close().await {
            warn!(error = %err, "failed to return connection");
        }
        result
    }

    async fn keyed(&self, key: &str, command: Command) -> StoreResult<Reply> {
        Ok(self.execute(command).await?.with_key(key))
    }

    pub async fn get(&self, key: &str) -> StoreResult<Reply> {
        self.keyed(key, Command::new("GET").arg(key)).await
    }

    pub async fn set(&self, key: &str, value: impl Into<StoreValue>) -> StoreResult<Reply> {
        self.keyed(key, Command::new("SET").arg(key).arg(value)).await
    }

    /// `SET key value EX ttl`.
    pub async fn set_ex(&self, key: &str, value: impl Into<StoreValue>, ttl: Duration) -> StoreResult<Reply> {
        let command = Command::new("SET").arg(key).arg(value).arg("EX").arg(ttl_seconds(ttl));
        self.keyed(key, command).await
    }

    /// `SET key value NX`; the reply is nil when the key already existed.
    pub async fn set_nx(&self, key: &str, value: impl Into<StoreValue>) -> StoreResult<Reply> {
        self.keyed(key, Command::new("SET").arg(key).arg(value).arg("NX"))
            .await
    }

    /// `SET key value NX EX ttl`.
    pub async fn set_nx_ex(
        &self,
        key: &str,
        value: impl Into<StoreValue>,
        ttl: Duration,
    ) -> StoreResult<Reply> {
        let command = Command::new("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl));
        self.keyed(key, command).await
    }

    /// Deletes `keys`; the reply is the number removed.
    pub async fn del(&self, keys: &[&str]) -> StoreResult<Reply> {
        let reply = self
            .execute(Command::new("DEL").args(keys.iter().copied()))
            .await?;
        Ok(match keys {
            [key] => reply.with_key(*key),
            _ => reply,
        })
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .keyed(key, Command::new("EXISTS").arg(key))
            .await?
            .as_i64()
            > 0)
    }

    /// Sets a TTL on an existing key; `false` when the key is missing.
    ///
    /// A TTL under one second deletes the key, as `EXPIRE key 0` does.
    pub async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let reply = self
            .keyed(key, Command::new("EXPIRE").arg(key).arg(ttl.as_secs()))
            .await?;
        Ok(reply.eq_int(1))
    }

    /// Remaining TTL; `None` for a missing or persistent key.
    pub async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let seconds = self.keyed(key, Command::new("TTL").arg(key)).await?.as_i64();
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    pub async fn incr(&self, key: &str) -> StoreResult<i64> {
        Ok(self.keyed(key, Command::new("INCR").arg(key)).await?.as_i64())
    }

    pub async fn incr_by(&self, key: &str, step: i64) -> StoreResult<i64> {
        let reply = self
            .keyed(key, Command::new("INCRBY").arg(key).arg(step))
            .await?;
        Ok(reply.as_i64())
    }

    pub async fn decr(&self, key: &str) -> StoreResult<i64> {
        Ok(self.keyed(key, Command::new("DECR").arg(key)).await?.as_i64())
    }

    pub async fn decr_by(&self, key: &str, step: i64) -> StoreResult<i64> {
        let reply = self
            .keyed(key, Command::new("DECRBY").arg(key).arg(step))
            .await?;
        Ok(reply.as_i64())
    }
}

// `SET .. EX` rejects zero, so sub-second TTLs round up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
