//! Redis connection pool.
//!
//! Each pooled object is its own fred client with a single connection, so a
//! checked-out [`RedisConnection`] is never shared with another caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cachelock_core::error::{LockError, LockResult, StoreError, StoreResult};
use cachelock_core::traits::{ConnectionPool, PoolStatus, StoreConnection};
use cachelock_core::value::{Command, StoreValue};
use deadpool::Runtime;
use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use fred::prelude::*;
use fred::types::{ConnectionConfig, CustomCommand, PerformanceConfig, RedisConfig, ServerConfig};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::config::PoolConfig;

/// One physical connection.
pub struct RedisLink {
    client: RedisClient,
}

impl Drop for RedisLink {
    fn drop(&mut self) {
        // fred keeps the socket task alive until QUIT.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            runtime.spawn(async move {
                let _ = client.quit().await;
            });
        }
    }
}

/// deadpool manager dialing fred clients.
pub struct RedisConnector {
    config: RedisConfig,
    performance: PerformanceConfig,
    connection: ConnectionConfig,
    connect_timeout: Option<Duration>,
    keep_alive: Option<Duration>,
    idle_timeout: Option<Duration>,
    max_lifetime: Option<Duration>,
}

impl RedisConnector {
    /// Translates pool settings into fred client settings.
    pub fn new(pool_config: &PoolConfig) -> LockResult<Self> {
        pool_config.validate()?;
        let (host, port) = pool_config.host_port()?;

        let config = RedisConfig {
            server: ServerConfig::new_centralized(host, port),
            username: pool_config.username.clone(),
            password: pool_config.password.clone(),
            database: Some(pool_config.database),
            ..Default::default()
        };

        let mut performance = PerformanceConfig::default();
        if let Some(timeout) = pool_config.command_timeout() {
            performance.default_command_timeout = timeout;
        }

        let mut connection = ConnectionConfig::default();
        if let Some(timeout) = pool_config.connect_timeout() {
            connection.connection_timeout = timeout;
        }

        Ok(Self {
            config,
            performance,
            connection,
            connect_timeout: pool_config.connect_timeout(),
            keep_alive: pool_config.keep_alive(),
            idle_timeout: pool_config.idle_timeout(),
            max_lifetime: pool_config.max_lifetime(),
        })
    }

    async fn dial(&self) -> Result<RedisClient, RedisError> {
        let client = RedisClient::new(
            self.config.clone(),
            Some(self.performance.clone()),
            Some(self.connection.clone()),
            None,
        );
        let _ = client.connect();
        client.wait_for_connect().await?;
        Ok(client)
    }
}

impl managed::Manager for RedisConnector {
    type Type = RedisLink;
    type Error = RedisError;

    async fn create(&self) -> Result<RedisLink, RedisError> {
        let client = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.dial())
                .await
                .map_err(|_| RedisError::new(RedisErrorKind::Timeout, "connect timed out"))??,
            None => self.dial().await?,
        };
        debug!("dialed redis connection");
        Ok(RedisLink { client })
    }

    async fn recycle(&self, link: &mut RedisLink, metrics: &Metrics) -> RecycleResult<RedisError> {
        if let Some(max_lifetime) = self.max_lifetime
            && metrics.age() >= max_lifetime
        {
            return Err(RecycleError::Message("connection exceeded max lifetime".into()));
        }
        if let Some(idle_timeout) = self.idle_timeout
            && metrics.last_used() >= idle_timeout
        {
            return Err(RecycleError::Message("connection idle too long".into()));
        }
        if !link.client.is_connected() {
            return Err(RecycleError::Message("connection closed".into()));
        }
        if let Some(keep_alive) = self.keep_alive
            && metrics.last_used() >= keep_alive
        {
            let ping = CustomCommand::new("PING", None, false);
            let reply: Result<RedisValue, RedisError> =
                link.client.custom(ping, Vec::<RedisValue>::new()).await;
            reply.map_err(RecycleError::Backend)?;
        }
        Ok(())
    }
}

/// Aborts the idle reaper once the last pool handle is gone.
struct Reaper(JoinHandle<()>);

impl Drop for Reaper {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Bounded pool of Redis connections.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool<RedisConnector>,
    _reaper: Option<Arc<Reaper>>,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RedisPool {
    /// Builds the pool and dials one connection to prove the store is reachable.
    #[instrument(skip(config), fields(address = %config.address, max_active = config.max_active))]
    pub async fn connect(config: &PoolConfig) -> LockResult<Self> {
        let connector = RedisConnector::new(config)?;
        let pool = Pool::builder(connector)
            .max_size(config.max_active)
            .wait_timeout(config.checkout_wait())
            .create_timeout(config.connect_timeout())
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| LockError::InvalidConfig(format!("failed to build pool: {}", e)))?;

        let first = pool.get().await.map_err(map_pool_error)?;
        drop(first);

        let reaper = config
            .idle_timeout()
            .map(|idle| Arc::new(spawn_reaper(pool.clone(), idle, config.max_idle)));

        Ok(Self {
            pool,
            _reaper: reaper,
        })
    }

    /// Closes the pool; outstanding connections are dropped on return.
    pub fn close(&self) {
        self.pool.close();
    }
}

impl ConnectionPool for RedisPool {
    type Connection = RedisConnection;

    async fn acquire(&self) -> StoreResult<RedisConnection> {
        let object = self.pool.get().await.map_err(map_pool_error)?;
        Ok(RedisConnection {
            object,
            broken: false,
        })
    }

    fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
        }
    }
}

/// A checked-out Redis connection.
pub struct RedisConnection {
    object: Object<RedisConnector>,
    broken: bool,
}

impl StoreConnection for RedisConnection {
    async fn execute(&mut self, command: &Command) -> StoreResult<StoreValue> {
        let custom = CustomCommand::new(command.name().to_string(), None, false);
        let args: Vec<RedisValue> = command.arguments().iter().map(to_redis_value).collect();

        let result: Result<RedisValue, RedisError> = self.object.client.custom(custom, args).await;
        match result {
            Ok(value) => Ok(from_redis_value(value)),
            Err(err) => {
                let err = map_redis_error(err);
                if matches!(err, StoreError::Unavailable(_)) {
                    self.broken = true;
                }
                Err(err)
            }
        }
    }

    async fn close(self) -> StoreResult<()> {
        if self.broken {
            // Detach so the next checkout dials a fresh connection.
            drop(Object::take(self.object));
            debug!("discarded broken redis connection");
        }
        Ok(())
    }
}

fn spawn_reaper(pool: Pool<RedisConnector>, idle_timeout: Duration, max_idle: usize) -> Reaper {
    let period = (idle_timeout / 2).max(Duration::from_secs(1));
    Reaper(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let kept = AtomicUsize::new(0);
            let result = pool.retain(|_, metrics| {
                metrics.last_used() < idle_timeout && kept.fetch_add(1, Ordering::Relaxed) < max_idle
            });
            if !result.removed.is_empty() {
                debug!(
                    evicted = result.removed.len(),
                    retained = result.retained,
                    "evicted idle redis connections"
                );
            }
        }
    }))
}

fn map_pool_error(err: PoolError<RedisError>) -> StoreError {
    match err {
        PoolError::Timeout(managed::TimeoutType::Wait) => {
            StoreError::PoolExhausted("no idle connection within the wait policy".to_string())
        }
        PoolError::Backend(err) => map_redis_error(err),
        other => StoreError::unavailable(other.to_string()),
    }
}

fn map_redis_error(err: RedisError) -> StoreError {
    match err.kind() {
        RedisErrorKind::IO
        | RedisErrorKind::Timeout
        | RedisErrorKind::Canceled
        | RedisErrorKind::Backpressure => StoreError::unavailable(err),
        _ => StoreError::Server(err.details().to_string()),
    }
}

fn to_redis_value(value: &StoreValue) -> RedisValue {
    match value {
        StoreValue::Nil => RedisValue::Null,
        StoreValue::Int(i) => RedisValue::Integer(*i),
        StoreValue::Double(d) => RedisValue::Double(*d),
        StoreValue::Text(s) => RedisValue::String(s.clone().into()),
        StoreValue::Bytes(b) => RedisValue::Bytes(b.clone().into()),
        StoreValue::Array(items) => RedisValue::Array(items.iter().map(to_redis_value).collect()),
    }
}

fn from_redis_value(value: RedisValue) -> StoreValue {
    match value {
        RedisValue::Null => StoreValue::Nil,
        RedisValue::Integer(i) => StoreValue::Int(i),
        RedisValue::Boolean(b) => StoreValue::Int(i64::from(b)),
        RedisValue::Double(d) => StoreValue::Double(d),
        RedisValue::String(s) => StoreValue::Text(s.to_string()),
        RedisValue::Bytes(b) => StoreValue::Bytes(b.to_vec()),
        RedisValue::Queued => StoreValue::Text("QUEUED".to_string()),
        RedisValue::Array(items) => {
            StoreValue::Array(items.into_iter().map(from_redis_value).collect())
        }
        RedisValue::Map(map) => StoreValue::Array(
            map.inner()
                .into_iter()
                .flat_map(|(key, value)| {
                    [
                        StoreValue::Bytes(key.as_bytes().to_vec()),
                        from_redis_value(value),
                    ]
                })
                .collect(),
        ),
    }
}
