// nomadbase-core/src/config.rs
//! Tunables for the engines and the cross-run coordination protocol
//!
//! Every tunable lives here next to its default constant. Configuration is
//! plain data handed to the owning component at construction time -
//! nothing global, nothing mutable after startup.

use std::time::Duration;

/// Default cap on recursive query nesting ($and/$or inside $and/$or...)
pub const DEFAULT_MAX_QUERY_DEPTH: usize = 32;

/// Default cap on per-collection modification history entries
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default advisory lock timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of lock acquisition attempts before LockUnavailable
pub const DEFAULT_LOCK_RETRY_ATTEMPTS: u32 = 5;

/// Default initial backoff between lock attempts (doubles per attempt)
pub const DEFAULT_LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Query engine tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// Maximum nesting depth of logical operators before the query is
    /// rejected as InvalidQuery. Bounds recursion on hostile input.
    pub max_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            max_depth: DEFAULT_MAX_QUERY_DEPTH,
        }
    }
}

/// Cross-run coordination tunables (locks, retries, history)
///
/// The lock timeout is the backstop against a run that died while holding
/// the advisory lock: expiry is observed lazily by the next lock-sensitive
/// operation, never pushed by a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinationConfig {
    /// How long a held lock stays valid before any caller may treat it as expired
    pub lock_timeout: Duration,
    /// How many times coordinate() attempts acquisition before giving up
    pub lock_retry_attempts: u32,
    /// Initial sleep between attempts; doubles on each subsequent attempt
    pub lock_retry_backoff: Duration,
    /// Per-collection modification history cap (FIFO eviction)
    pub history_limit: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        CoordinationConfig {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_retry_attempts: DEFAULT_LOCK_RETRY_ATTEMPTS,
            lock_retry_backoff: DEFAULT_LOCK_RETRY_BACKOFF,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CoordinationConfig {
    /// Backoff before the given (0-based) retry attempt.
    ///
    /// Attempt 0 runs immediately; attempt n sleeps backoff * 2^(n-1).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.lock_retry_backoff * 2u32.saturating_pow(attempt - 1)
        }
    }
}
