// Print Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::printer::PrinterId;
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4, opaque to callers - never the DB rowid)
pub type JobId = String;

/// Priority (higher number = claimed sooner)
pub type Priority = i32;

/// Weak reference to the order line item that requested the job.
/// Id-plus-lookup only: the line item never owns the job row.
pub type LineItemRef = String;

/// Job lifecycle status
///
/// State machine:
/// `pending -> printing -> {completed | pending(retry) | failed}`,
/// `{pending, printing} -> cancelled`. All other transitions are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Printing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are immutable: no later call may change
    /// status, attempts or error fields.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Printing => write!(f, "PRINTING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Print payload: content already rendered for the target printer.
/// Opaque to this subsystem - no inspection, no re-rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintPayload(String);

impl PrintPayload {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Print Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    /// Target printer (referenced, never owned - many jobs share one printer)
    pub printer_id: PrinterId,
    pub payload: PrintPayload,
    pub priority: Priority,
    pub status: JobStatus,

    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,

    /// Worker that currently holds the claim (PRINTING only)
    pub claimed_by: Option<String>,
    pub line_item_ref: Option<LineItemRef>,
    pub cancel_reason: Option<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub cancelled_at: Option<i64>,

    /// Jobs are invisible to claim_next until this instant (retry backoff)
    pub next_attempt_at: i64,
}

impl PrintJob {
    /// Create a new PENDING job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `printer_id` - Target printer
    /// * `payload` - Rendered print content
    /// * `priority` - Higher = claimed sooner
    /// * `max_attempts` - Attempt cap, copied from the printer config
    /// * `line_item_ref` - Optional weak reference to the requesting line item
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        printer_id: impl Into<String>,
        payload: PrintPayload,
        priority: Priority,
        max_attempts: i32,
        line_item_ref: Option<LineItemRef>,
    ) -> Self {
        Self {
            id: id.into(),
            printer_id: printer_id.into(),
            payload,
            priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            claimed_by: None,
            line_item_ref,
            cancel_reason: None,
            created_at,
            started_at: None,
            finished_at: None,
            cancelled_at: None,
            next_attempt_at: created_at,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (job-1, job-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: Tests only. Production code injects ID and time via providers.
    pub fn new_test(printer_id: impl Into<String>, priority: Priority) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("job-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(
            id,
            created_at,
            printer_id,
            PrintPayload::new("CHIT #1\n1x Pad Thai\n"),
            priority,
            3,
            None,
        )
    }

    fn invalid_transition(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Claim for dispatch: PENDING -> PRINTING
    pub fn claim(&mut self, worker: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(self.invalid_transition(JobStatus::Printing));
        }
        self.status = JobStatus::Printing;
        self.started_at = Some(now_millis);
        self.claimed_by = Some(worker.into());
        Ok(())
    }

    /// Successful dispatch: PRINTING -> COMPLETED
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Printing {
            return Err(self.invalid_transition(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.finished_at = Some(now_millis);
        self.claimed_by = None;
        Ok(())
    }

    /// Failed dispatch attempt: PRINTING -> PENDING (retry) or FAILED (cap).
    ///
    /// Increments `attempts` and records the error verbatim. Once the cap is
    /// reached the job is FAILED, never silently re-queued. Returns the
    /// resulting status.
    pub fn record_failure(
        &mut self,
        error_message: impl Into<String>,
        now_millis: i64,
        retry_delay_ms: i64,
    ) -> Result<JobStatus> {
        if self.status != JobStatus::Printing {
            return Err(self.invalid_transition(JobStatus::Pending));
        }
        self.attempts += 1;
        self.last_error = Some(error_message.into());
        self.started_at = None;
        self.claimed_by = None;

        if self.attempts >= self.max_attempts {
            self.status = JobStatus::Failed;
            self.finished_at = Some(now_millis);
        } else {
            self.status = JobStatus::Pending;
            self.next_attempt_at = now_millis + retry_delay_ms;
        }
        Ok(self.status)
    }

    /// External cancellation: {PENDING, PRINTING} -> CANCELLED.
    ///
    /// No-op when already cancelled (idempotent). A COMPLETED or FAILED job
    /// cannot be retroactively cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        match self.status {
            JobStatus::Cancelled => Ok(()),
            JobStatus::Pending | JobStatus::Printing => {
                self.status = JobStatus::Cancelled;
                self.cancelled_at = Some(now_millis);
                self.cancel_reason = Some(reason.into());
                self.claimed_by = None;
                Ok(())
            }
            _ => Err(self.invalid_transition(JobStatus::Cancelled)),
        }
    }

    /// Manual operator override: FAILED -> PENDING with the attempt counter
    /// reset to zero. Distinct from automatic retry.
    pub fn reset_for_retry(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Failed {
            return Err(self.invalid_transition(JobStatus::Pending));
        }
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.started_at = None;
        self.finished_at = None;
        self.claimed_by = None;
        self.next_attempt_at = now_millis;
        Ok(())
    }
}
