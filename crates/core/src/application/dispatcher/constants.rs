// Dispatcher constants (ADR: No magic values)
use std::time::Duration;

/// Sleep duration when no claimable jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a store error before retrying the loop (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default delay after the first failed attempt (2s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 2000;

/// Default backoff multiplier per attempt
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Default upper bound on any retry delay (60s)
pub const DEFAULT_RETRY_MAX_DELAY_MS: i64 = 60_000;

/// Default delay after a fatal transport rejection (500ms) - short on
/// purpose so the attempt cap exhausts quickly
pub const DEFAULT_FATAL_RETRY_DELAY_MS: i64 = 500;

/// A PRINTING job older than this is presumed abandoned by a crashed
/// worker and eligible for reclaim (5 minutes)
pub const DEFAULT_STALE_AFTER_MS: i64 = 5 * 60 * 1000;

/// How often the reclaim sweeper runs (30s)
pub const DEFAULT_STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Floating workers added on top of one-per-printer when sizing the pool
pub const DEFAULT_FLOATING_WORKERS: usize = 2;
