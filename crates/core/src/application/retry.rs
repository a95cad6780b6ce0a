// Retry backoff policy

use crate::domain::PrintJob;
use tracing::info;

/// Retry policy for failed dispatch attempts.
///
/// The delay before a job becomes claimable again grows with its attempt
/// count: `base_delay_ms * backoff_factor^attempts`, clamped to
/// `max_delay_ms`. Monotonically non-decreasing and bounded, so a
/// persistently broken printer never spins workers in a tight failure loop.
pub struct RetryPolicy {
    base_delay_ms: i64,
    backoff_factor: f64,
    max_delay_ms: i64,
    fatal_delay_ms: i64,
}

impl RetryPolicy {
    /// # Arguments
    /// * `base_delay_ms` - Delay after the first failed attempt
    /// * `backoff_factor` - Multiplier per subsequent attempt
    /// * `max_delay_ms` - Upper bound on any computed delay
    /// * `fatal_delay_ms` - Short fixed delay after a fatal rejection, so the
    ///   attempt cap exhausts quickly instead of waiting full backoff
    pub fn new(base_delay_ms: i64, backoff_factor: f64, max_delay_ms: i64, fatal_delay_ms: i64) -> Self {
        Self {
            base_delay_ms,
            backoff_factor,
            max_delay_ms,
            fatal_delay_ms,
        }
    }

    /// Delay in ms before the job's next attempt becomes visible.
    ///
    /// Applies ±10% jitter to prevent a thundering herd when a printer comes
    /// back. The jitter is derived from the job id, so it is deterministic
    /// per job and keeps the per-job schedule monotone.
    pub fn retry_delay_ms(&self, job: &PrintJob) -> i64 {
        let exp_delay = self.base_delay_ms as f64 * self.backoff_factor.powi(job.attempts);

        let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = ((exp_delay * jitter_factor) as i64).min(self.max_delay_ms);

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            max_attempts = %job.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        delay_ms
    }

    /// Delay after a fatal (non-retryable) transport rejection
    pub fn fatal_delay_ms(&self) -> i64 {
        self.fatal_delay_ms
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::application::dispatcher::constants::*;
        Self::new(
            DEFAULT_RETRY_BASE_DELAY_MS,
            DEFAULT_RETRY_BACKOFF_FACTOR,
            DEFAULT_RETRY_MAX_DELAY_MS,
            DEFAULT_FATAL_RETRY_DELAY_MS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_are_monotone_and_bounded() {
        let policy = RetryPolicy::new(1000, 2.0, 30_000, 250);
        let mut job = PrintJob::new_test("printer-1", 0);
        job.max_attempts = 20;

        let mut previous = 0;
        for attempt in 0..20 {
            job.attempts = attempt;
            let delay = policy.retry_delay_ms(&job);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            assert!(delay <= 30_000);
            previous = delay;
        }
        // Deep into the schedule the bound dominates
        job.attempts = 19;
        assert_eq!(policy.retry_delay_ms(&job), 30_000);
    }

    #[test]
    fn test_jitter_is_deterministic_per_job() {
        let policy = RetryPolicy::new(1000, 2.0, 30_000, 250);
        let job = PrintJob::new_test("printer-1", 0);
        assert_eq!(policy.retry_delay_ms(&job), policy.retry_delay_ms(&job));
    }

    #[test]
    fn test_fatal_delay_is_short() {
        let policy = RetryPolicy::default();
        let job = PrintJob::new_test("printer-1", 0);
        assert!(policy.fatal_delay_ms() < policy.retry_delay_ms(&job));
    }
}
