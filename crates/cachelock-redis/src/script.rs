//! Lock protocol commands.
//!
//! Acquisition is a plain `SET NX EX`. Renewal and release run as Lua
//! scripts so the ownership check and the write happen atomically on the
//! server.

use std::time::Duration;

use cachelock_core::value::Command;

/// Refreshes the TTL with `SET .. XX EX` while the stored value is still ours.
///
/// Returns the `OK` status on success and nil otherwise.
pub const RENEW_SCRIPT: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('set', KEYS[1], ARGV[1], 'XX', 'EX', ARGV[2])
    end
    return false
"#;

/// Deletes the key only while the stored value is still ours.
///
/// Returns the number of keys deleted.
pub const RELEASE_SCRIPT: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// `SET key token NX EX lease`: create the lease only when absent.
pub fn acquire(key: &str, token: &str, lease: Duration) -> Command {
    Command::new("SET")
        .arg(key)
        .arg(token)
        .arg("NX")
        .arg("EX")
        .arg(lease_seconds(lease))
}

/// Ownership-checked `SET key token XX EX lease`.
pub fn renew(key: &str, token: &str, lease: Duration) -> Command {
    Command::new("EVAL")
        .arg(RENEW_SCRIPT)
        .arg(1)
        .arg(key)
        .arg(token)
        .arg(lease_seconds(lease))
}

/// Compare-and-delete of `key` against `token`.
pub fn release(key: &str, token: &str) -> Command {
    Command::new("EVAL")
        .arg(RELEASE_SCRIPT)
        .arg(1)
        .arg(key)
        .arg(token)
}

// EX rejects zero.
fn lease_seconds(lease: Duration) -> u64 {
    lease.as_secs().max(1)
}
