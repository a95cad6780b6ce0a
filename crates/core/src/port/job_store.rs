// Job Store Port (Interface)
//
// The relational store is the single source of truth and the synchronization
// point between workers: no in-process shared job list exists anywhere.

use crate::domain::{JobId, JobStatus, PrintJob, PrinterId};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of a stale-claim sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Jobs returned to PENDING with attempts incremented
    pub requeued: u64,
    /// Jobs whose increment reached the cap and went to FAILED
    pub exhausted: u64,
}

impl ReclaimReport {
    pub fn total(&self) -> u64 {
        self.requeued + self.exhausted
    }
}

/// Read-side filter for operational queries
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub printer_id: Option<PrinterId>,
    pub status: Option<JobStatus>,
    pub line_item_ref: Option<String>,
}

/// Durable record of each print job.
///
/// State-machine violations surface as `AppError::InvalidState` - an
/// expected, non-fatal outcome for racing callers to log and ignore.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new PENDING job. Single row write, no printer communication.
    async fn insert(&self, job: &PrintJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<PrintJob>>;

    /// Atomically claim one eligible PENDING job and move it to PRINTING.
    ///
    /// Eligible: target printer active, `next_attempt_at` due. Ties broken by
    /// priority descending, then creation time ascending (oldest
    /// highest-priority job first). At most one worker can win a given row;
    /// losers simply see the next candidate or `None`.
    async fn claim_next(&self, worker: &str) -> Result<Option<PrintJob>>;

    /// PRINTING -> COMPLETED. Idempotent no-op when already COMPLETED.
    async fn record_success(&self, id: &JobId) -> Result<()>;

    /// PRINTING -> PENDING (visible again after `retry_delay_ms`) or FAILED
    /// once the attempt cap is reached. Increments `attempts` and records
    /// `error_message` verbatim. Returns the resulting status.
    async fn record_failure(
        &self,
        id: &JobId,
        error_message: &str,
        retry_delay_ms: i64,
    ) -> Result<JobStatus>;

    /// {PENDING, PRINTING} -> CANCELLED. Idempotent no-op when already
    /// CANCELLED; `InvalidState` for COMPLETED/FAILED jobs.
    async fn cancel(&self, id: &JobId, reason: &str) -> Result<()>;

    /// Cancel every non-terminal job referencing the line item. Safe when no
    /// jobs match and safe to call repeatedly. Returns the number cancelled.
    async fn cancel_all_for_line_item(&self, line_item_ref: &str, reason: &str) -> Result<u64>;

    /// Return abandoned PRINTING jobs (claimed longer ago than
    /// `older_than_ms`) to the pending pool, incrementing `attempts` as if
    /// the dispatch had failed. Bounds the blast radius of a crashed worker.
    async fn reclaim_stale(&self, older_than_ms: i64) -> Result<ReclaimReport>;

    /// Manual operator override: FAILED -> PENDING with attempts reset to 0.
    async fn retry_failed(&self, id: &JobId) -> Result<()>;

    /// Operational read: jobs matching the filter, newest first.
    async fn list(&self, filter: &JobFilter, limit: i64) -> Result<Vec<PrintJob>>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::TimeProvider;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// In-memory JobStore with the same conditional-update semantics as the
    /// SQLite adapter. Used by dispatcher and service tests.
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<JobId, PrintJob>>,
        paused_printers: Mutex<HashSet<PrinterId>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
                paused_printers: Mutex::new(HashSet::new()),
                time_provider,
            }
        }

        /// Make a printer's jobs ineligible for claiming (deactivated printer)
        pub fn set_printer_paused(&self, printer_id: &str, paused: bool) {
            let mut paused_set = self.paused_printers.lock().unwrap();
            if paused {
                paused_set.insert(printer_id.to_string());
            } else {
                paused_set.remove(printer_id);
            }
        }

        fn missing(id: &JobId) -> AppError {
            AppError::NotFound(format!("Job {} not found", id))
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &PrintJob) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<PrintJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn claim_next(&self, worker: &str) -> Result<Option<PrintJob>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let paused = self.paused_printers.lock().unwrap();

            let next_id = jobs
                .values()
                .filter(|j| {
                    j.status == JobStatus::Pending
                        && j.next_attempt_at <= now
                        && !paused.contains(&j.printer_id)
                })
                .min_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(a.created_at.cmp(&b.created_at))
                        .then(a.id.cmp(&b.id))
                })
                .map(|j| j.id.clone());

            match next_id {
                Some(id) => {
                    let job = jobs.get_mut(&id).unwrap();
                    job.claim(worker, now)
                        .map_err(|e| AppError::InvalidState(e.to_string()))?;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        }

        async fn record_success(&self, id: &JobId) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| Self::missing(id))?;
            if job.status == JobStatus::Completed {
                return Ok(());
            }
            job.complete(now)
                .map_err(|e| AppError::InvalidState(e.to_string()))
        }

        async fn record_failure(
            &self,
            id: &JobId,
            error_message: &str,
            retry_delay_ms: i64,
        ) -> Result<JobStatus> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| Self::missing(id))?;
            job.record_failure(error_message, now, retry_delay_ms)
                .map_err(|e| AppError::InvalidState(e.to_string()))
        }

        async fn cancel(&self, id: &JobId, reason: &str) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| Self::missing(id))?;
            job.cancel(reason, now)
                .map_err(|e| AppError::InvalidState(e.to_string()))
        }

        async fn cancel_all_for_line_item(
            &self,
            line_item_ref: &str,
            reason: &str,
        ) -> Result<u64> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let mut cancelled = 0;
            for job in jobs.values_mut() {
                if job.line_item_ref.as_deref() == Some(line_item_ref)
                    && !job.status.is_terminal()
                {
                    job.cancel(reason, now)
                        .map_err(|e| AppError::InvalidState(e.to_string()))?;
                    cancelled += 1;
                }
            }
            Ok(cancelled)
        }

        async fn reclaim_stale(&self, older_than_ms: i64) -> Result<ReclaimReport> {
            let now = self.time_provider.now_millis();
            let cutoff = now - older_than_ms;
            let mut jobs = self.jobs.lock().unwrap();
            let mut report = ReclaimReport::default();

            for job in jobs.values_mut() {
                if job.status != JobStatus::Printing {
                    continue;
                }
                let Some(started_at) = job.started_at else {
                    continue;
                };
                if started_at >= cutoff {
                    continue;
                }
                let status = job
                    .record_failure("stale claim reclaimed", now, 0)
                    .map_err(|e| AppError::InvalidState(e.to_string()))?;
                match status {
                    JobStatus::Failed => report.exhausted += 1,
                    _ => report.requeued += 1,
                }
            }
            Ok(report)
        }

        async fn retry_failed(&self, id: &JobId) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| Self::missing(id))?;
            job.reset_for_retry(now)
                .map_err(|e| AppError::InvalidState(e.to_string()))
        }

        async fn list(&self, filter: &JobFilter, limit: i64) -> Result<Vec<PrintJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut matched: Vec<PrintJob> = jobs
                .values()
                .filter(|j| {
                    filter
                        .printer_id
                        .as_ref()
                        .map_or(true, |p| &j.printer_id == p)
                        && filter.status.map_or(true, |s| j.status == s)
                        && filter
                            .line_item_ref
                            .as_ref()
                            .map_or(true, |r| j.line_item_ref.as_ref() == Some(r))
                })
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            matched.truncate(limit.max(0) as usize);
            Ok(matched)
        }

        async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.values().filter(|j| j.status == status).count() as i64)
        }
    }
}
