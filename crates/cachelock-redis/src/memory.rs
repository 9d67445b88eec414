//! In-memory store speaking the Redis subset this crate issues.
//!
//! Keys expire lazily against the tokio clock, so tests running with a paused
//! clock observe TTLs without real waiting. Connections come from a
//! [`MemoryPool`] bounded by a semaphore, which mirrors the max-active and
//! wait-on-exhaustion behaviour of the Redis pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cachelock_core::error::{StoreError, StoreResult};
use cachelock_core::traits::{ConnectionPool, PoolStatus, StoreConnection};
use cachelock_core::value::{Command, StoreValue};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;

use crate::script;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
    unavailable: bool,
    executed: HashMap<String, usize>,
}

impl StoreState {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn remove_live(&mut self, key: &str) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }
}

/// Shared in-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool handing out at most `max_active` connections, waiting when exhausted.
    pub fn pool(&self, max_active: usize) -> MemoryPool {
        MemoryPool::new(self.clone(), max_active)
    }

    /// Makes every subsequent command and checkout fail as a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Reads a key the way an external client would.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().live(key).map(|e| e.value.clone())
    }

    /// Writes a key directly, bypassing command accounting.
    pub fn insert(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock().entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove_live(key)
    }

    /// Remaining time to live; `None` when the key is absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.lock();
        let expires_at = state.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }

    /// How many times `command` reached the store.
    pub fn executed(&self, command: &str) -> usize {
        self.lock()
            .executed
            .get(&command.to_ascii_uppercase())
            .copied()
            .unwrap_or_default()
    }

    /// Runs one command atomically.
    pub fn apply(&self, command: &Command) -> StoreResult<StoreValue> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(StoreError::unavailable(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory store unavailable",
            )));
        }

        let name = command.name().to_ascii_uppercase();
        *state.executed.entry(name.clone()).or_default() += 1;
        let args = command.arguments();

        match name.as_str() {
            "PING" => Ok(StoreValue::Text("PONG".to_string())),
            "GET" => {
                arity(&name, args, 1)?;
                let key = text(args, 0)?;
                Ok(state
                    .live(&key)
                    .map(|e| StoreValue::Text(e.value.clone()))
                    .unwrap_or(StoreValue::Nil))
            }
            "SET" => set(&mut state, args),
            "DEL" => {
                min_arity(&name, args, 1)?;
                let mut deleted = 0;
                for idx in 0..args.len() {
                    if state.remove_live(&text(args, idx)?) {
                        deleted += 1;
                    }
                }
                Ok(StoreValue::Int(deleted))
            }
            "EXISTS" => {
                min_arity(&name, args, 1)?;
                let mut found = 0;
                for idx in 0..args.len() {
                    if state.live(&text(args, idx)?).is_some() {
                        found += 1;
                    }
                }
                Ok(StoreValue::Int(found))
            }
            "EXPIRE" => {
                arity(&name, args, 2)?;
                let seconds = int(args, 1)?;
                let key = text(args, 0)?;
                if seconds <= 0 {
                    return Ok(StoreValue::Int(i64::from(state.remove_live(&key))));
                }
                match state.live(&key) {
                    Some(entry) => {
                        entry.expires_at = Some(Instant::now() + secs(seconds));
                        Ok(StoreValue::Int(1))
                    }
                    None => Ok(StoreValue::Int(0)),
                }
            }
            "TTL" => {
                arity(&name, args, 1)?;
                let key = text(args, 0)?;
                Ok(StoreValue::Int(match state.live(&key) {
                    None => -2,
                    Some(Entry {
                        expires_at: None, ..
                    }) => -1,
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let millis = at.saturating_duration_since(Instant::now()).as_millis();
                        i64::try_from((millis + 500) / 1000).unwrap_or(i64::MAX)
                    }
                }))
            }
            "INCR" | "DECR" => {
                arity(&name, args, 1)?;
                let delta = if name == "INCR" { 1 } else { -1 };
                add(&mut state, &text(args, 0)?, delta)
            }
            "INCRBY" | "DECRBY" => {
                arity(&name, args, 2)?;
                let step = int(args, 1)?;
                let delta = if name == "INCRBY" {
                    step
                } else {
                    step.checked_neg().ok_or_else(out_of_range)?
                };
                add(&mut state, &text(args, 0)?, delta)
            }
            "EVAL" => eval(&mut state, args),
            _ => Err(StoreError::Server(format!("ERR unknown command '{}'", name))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set(state: &mut StoreState, args: &[StoreValue]) -> StoreResult<StoreValue> {
    min_arity("SET", args, 2)?;
    let key = text(args, 0)?;
    let value = text(args, 1)?;

    let mut only_if_absent = false;
    let mut only_if_present = false;
    let mut ttl = None;
    let mut idx = 2;
    while idx < args.len() {
        match text(args, idx)?.to_ascii_uppercase().as_str() {
            "NX" => only_if_absent = true,
            "XX" => only_if_present = true,
            "EX" => {
                idx += 1;
                ttl = Some(secs(positive(int(args, idx)?)?));
            }
            "PX" => {
                idx += 1;
                let millis = positive(int(args, idx)?)?;
                ttl = Some(Duration::from_millis(millis.unsigned_abs()));
            }
            _ => return Err(syntax_error()),
        }
        idx += 1;
    }
    if only_if_absent && only_if_present {
        return Err(syntax_error());
    }

    let exists = state.live(&key).is_some();
    if (only_if_absent && exists) || (only_if_present && !exists) {
        return Ok(StoreValue::Nil);
    }

    state.entries.insert(
        key,
        Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        },
    );
    Ok(StoreValue::Text("OK".to_string()))
}

fn add(state: &mut StoreState, key: &str, delta: i64) -> StoreResult<StoreValue> {
    let (current, expires_at) = match state.live(key) {
        Some(entry) => (
            entry
                .value
                .parse::<i64>()
                .map_err(|_| StoreError::Server("ERR value is not an integer or out of range".to_string()))?,
            entry.expires_at,
        ),
        None => (0, None),
    };
    let next = current.checked_add(delta).ok_or_else(out_of_range)?;
    state.entries.insert(
        key.to_string(),
        Entry {
            value: next.to_string(),
            expires_at,
        },
    );
    Ok(StoreValue::Int(next))
}

/// Runs the two lock scripts; anything else is unknown to this store.
fn eval(state: &mut StoreState, args: &[StoreValue]) -> StoreResult<StoreValue> {
    min_arity("EVAL", args, 2)?;
    let source = text(args, 0)?;
    let key = text(args, 2)?;
    let token = text(args, 3)?;
    let owned = state.live(&key).is_some_and(|e| e.value == token);

    if source == script::RELEASE_SCRIPT {
        if owned {
            state.entries.remove(&key);
            return Ok(StoreValue::Int(1));
        }
        return Ok(StoreValue::Int(0));
    }

    if source == script::RENEW_SCRIPT {
        let seconds = positive(int(args, 4)?)?;
        return match state.live(&key) {
            Some(entry) if owned => {
                entry.expires_at = Some(Instant::now() + secs(seconds));
                Ok(StoreValue::Text("OK".to_string()))
            }
            _ => Ok(StoreValue::Nil),
        };
    }

    Err(StoreError::Server(
        "NOSCRIPT script not supported by the memory store".to_string(),
    ))
}

fn arity(name: &str, args: &[StoreValue], expected: usize) -> StoreResult<()> {
    if args.len() != expected {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn min_arity(name: &str, args: &[StoreValue], expected: usize) -> StoreResult<()> {
    if args.len() < expected {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn wrong_arity(name: &str) -> StoreError {
    StoreError::Server(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn syntax_error() -> StoreError {
    StoreError::Server("ERR syntax error".to_string())
}

fn out_of_range() -> StoreError {
    StoreError::Server("ERR increment or decrement would overflow".to_string())
}

fn text(args: &[StoreValue], idx: usize) -> StoreResult<String> {
    match args.get(idx) {
        Some(StoreValue::Nil) | None => Err(syntax_error()),
        Some(value) => Ok(value.to_string()),
    }
}

fn int(args: &[StoreValue], idx: usize) -> StoreResult<i64> {
    match args.get(idx) {
        Some(StoreValue::Int(i)) => Ok(*i),
        Some(value) => value
            .to_string()
            .parse()
            .map_err(|_| StoreError::Server("ERR value is not an integer or out of range".to_string())),
        None => Err(syntax_error()),
    }
}

fn positive(value: i64) -> StoreResult<i64> {
    if value <= 0 {
        return Err(StoreError::Server(
            "ERR invalid expire time in 'set' command".to_string(),
        ));
    }
    Ok(value)
}

fn secs(seconds: i64) -> Duration {
    Duration::from_secs(seconds.unsigned_abs())
}

/// Bounded pool over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryPool {
    store: MemoryStore,
    permits: Arc<Semaphore>,
    max_active: usize,
    wait: bool,
}

impl MemoryPool {
    pub fn new(store: MemoryStore, max_active: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_active)),
            max_active,
            wait: true,
        }
    }

    /// Fails checkout immediately instead of waiting when exhausted.
    pub fn fail_fast(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl ConnectionPool for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> StoreResult<MemoryConnection> {
        let permit = if self.wait {
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(StoreError::unavailable)?
        } else {
            self.permits
                .clone()
                .try_acquire_owned()
                .map_err(|e| match e {
                    TryAcquireError::NoPermits => StoreError::PoolExhausted(format!(
                        "all {} connections in use",
                        self.max_active
                    )),
                    TryAcquireError::Closed => StoreError::unavailable(e),
                })?
        };

        self.store.apply(&Command::new("PING"))?;
        Ok(MemoryConnection {
            store: self.store.clone(),
            _permit: permit,
        })
    }

    fn status(&self) -> PoolStatus {
        let in_use = self.max_active - self.permits.available_permits();
        PoolStatus {
            max_size: self.max_active,
            size: in_use,
            available: 0,
        }
    }
}

/// Connection checked out of a [`MemoryPool`]; returns its slot on drop.
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    _permit: OwnedSemaphorePermit,
}

impl StoreConnection for MemoryConnection {
    async fn execute(&mut self, command: &Command) -> StoreResult<StoreValue> {
        // Give other tasks a chance to interleave, as a network round-trip would.
        tokio::task::yield_now().await;
        self.store.apply(command)
    }

    async fn close(self) -> StoreResult<()> {
        Ok(())
    }
}
