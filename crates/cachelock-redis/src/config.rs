//! Pool and lock configuration.
//!
//! Both structs deserialize from kebab-case keys with defaults, so they can be
//! embedded in an application's own config file. They are built once at
//! startup and handed to the pool and manager constructors.

use std::time::Duration;

use cachelock_core::error::{LockError, LockResult};
use serde::Deserialize;

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolConfig {
    /// Transport; only `tcp` is supported.
    pub network: String,
    /// `host:port` of the store.
    #[serde(alias = "addr")]
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Selected database index.
    pub database: u8,
    /// Connect timeout in seconds, `0` for the client default.
    #[serde(alias = "timeout")]
    pub connect_timeout: u64,
    /// Read timeout in seconds, `0` for none.
    pub read_timeout: u64,
    /// Write timeout in seconds, `0` for none.
    pub write_timeout: u64,
    /// Connections idle this many seconds are pinged before reuse, `0` to skip.
    pub keep_alive: u64,
    /// Upper bound on idle connections kept by the reaper.
    pub max_idle: usize,
    /// Upper bound on open connections.
    pub max_active: usize,
    /// Seconds a connection may sit idle before eviction, `0` to keep forever.
    pub idle_timeout: u64,
    /// Seconds a connection may live before it is replaced, `0` for no limit.
    pub max_lifetime: u64,
    /// Block on exhaustion instead of failing immediately.
    pub wait: bool,
    /// Upper bound on a blocking checkout in seconds, `0` to wait forever.
    pub wait_timeout: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            address: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            database: 0,
            connect_timeout: 5,
            read_timeout: 0,
            write_timeout: 0,
            keep_alive: 60,
            max_idle: 8,
            max_active: 32,
            idle_timeout: 240,
            max_lifetime: 0,
            wait: true,
            wait_timeout: 0,
        }
    }
}

impl PoolConfig {
    /// Returns a new builder for configuring the pool.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Splits `address` into host and port.
    pub fn host_port(&self) -> LockResult<(String, u16)> {
        let (host, port) = self.address.rsplit_once(':').ok_or_else(|| {
            LockError::InvalidConfig(format!("address {:?} is not host:port", self.address))
        })?;
        let port = port.parse::<u16>().map_err(|e| {
            LockError::InvalidConfig(format!("invalid port in {:?}: {}", self.address, e))
        })?;
        if host.is_empty() {
            return Err(LockError::InvalidConfig("empty host".to_string()));
        }
        Ok((host.trim_matches(['[', ']']).to_string(), port))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        seconds(self.connect_timeout)
    }

    /// Per-command timeout: the longer of the read and write timeouts.
    pub fn command_timeout(&self) -> Option<Duration> {
        seconds(self.read_timeout.max(self.write_timeout))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        seconds(self.idle_timeout)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        seconds(self.max_lifetime)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        seconds(self.keep_alive)
    }

    /// Checkout wait policy: `Some(ZERO)` fails fast, `None` waits forever.
    pub fn checkout_wait(&self) -> Option<Duration> {
        if !self.wait {
            Some(Duration::ZERO)
        } else {
            seconds(self.wait_timeout)
        }
    }

    /// Checks the settings for values no pool can honour.
    pub fn validate(&self) -> LockResult<()> {
        if !self.network.eq_ignore_ascii_case("tcp") {
            return Err(LockError::InvalidConfig(format!(
                "unsupported network {:?}",
                self.network
            )));
        }
        if self.max_active == 0 {
            return Err(LockError::InvalidConfig(
                "max-active must be at least 1".to_string(),
            ));
        }
        self.host_port().map(|_| ())
    }
}

/// Builder for [`PoolConfig`].
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Sets the `host:port` address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: u8) -> Self {
        self.config.database = database;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout.as_secs();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout.as_secs();
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout.as_secs();
        self
    }

    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.config.keep_alive = interval.as_secs();
        self
    }

    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.config.max_idle = max_idle;
        self
    }

    pub fn max_active(mut self, max_active: usize) -> Self {
        self.config.max_active = max_active;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout.as_secs();
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime.as_secs();
        self
    }

    /// Sets whether checkout blocks when the pool is exhausted.
    pub fn wait(mut self, wait: bool) -> Self {
        self.config.wait = wait;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = timeout.as_secs();
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> LockResult<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock settings shared by every lock a manager hands out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LockConfig {
    /// Namespace prepended to every lock key as `{prefix}:{name}`.
    pub prefix: String,
    /// TTL of a lease in seconds.
    pub lifetime: u64,
    /// Seconds between renewal ticks.
    pub renewal_seconds: u64,
    /// Hard cap in seconds on how long a lock may keep renewing.
    pub renewal_timeout: u64,
    /// Idle lock objects kept for reuse.
    pub pool_capacity: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            prefix: "LOCK".to_string(),
            lifetime: 30,
            renewal_seconds: 5,
            renewal_timeout: 3600,
            pool_capacity: 64,
        }
    }
}

impl LockConfig {
    /// Returns a new builder for configuring locks.
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_seconds)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout)
    }

    /// Store key for the lock called `name`.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.prefix.is_empty() {
            return Err(LockError::InvalidConfig("empty key prefix".to_string()));
        }
        if self.lifetime == 0 || self.renewal_seconds == 0 || self.renewal_timeout == 0 {
            return Err(LockError::InvalidConfig(
                "lease, renewal interval and renewal timeout must be non-zero".to_string(),
            ));
        }
        if self.renewal_seconds >= self.lifetime {
            return Err(LockError::InvalidConfig(format!(
                "renewal interval {}s must be shorter than the {}s lease",
                self.renewal_seconds, self.lifetime
            )));
        }
        Ok(())
    }
}

/// Builder for [`LockConfig`].
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: LockConfig::default(),
        }
    }

    /// Sets the key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Sets the lease TTL. Sub-second precision is dropped.
    pub fn lease(mut self, lease: Duration) -> Self {
        self.config.lifetime = lease.as_secs();
        self
    }

    /// Sets the renewal cadence.
    pub fn renewal_interval(mut self, interval: Duration) -> Self {
        self.config.renewal_seconds = interval.as_secs();
        self
    }

    /// Sets the hard upper bound on renewal.
    pub fn renewal_timeout(mut self, timeout: Duration) -> Self {
        self.config.renewal_timeout = timeout.as_secs();
        self
    }

    /// Sets how many idle lock objects are kept for reuse.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> LockResult<LockConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LockConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
