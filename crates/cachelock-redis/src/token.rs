//! Ownership token generation.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Generates a token proving ownership of one lease.
///
/// Format: `{process_id}_{counter}_{unix_micros}_{random}`. The counter keeps
/// tokens distinct inside a process; the random component and the process
/// id keep them distinct across hosts.
pub fn create_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();

    let random: u64 = rand::thread_rng().r#gen();

    format!("{}_{}_{}_{:016x}", process::id(), counter, micros, random)
}
