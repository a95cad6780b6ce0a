// SQLite JobStore Implementation

use async_trait::async_trait;
use chitline_core::domain::{JobId, JobStatus, PrintJob, PrintPayload};
use chitline_core::error::{AppError, Result};
use chitline_core::port::{JobFilter, JobStore, ReclaimReport, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "787" | "3850" => {
                        // FOREIGN KEY constraint failed
                        AppError::Database(format!(
                            "Foreign key constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Disambiguate a conditional update that touched no rows: the job is
    /// either missing or in a state the transition rejects.
    async fn rejection_for(&self, id: &JobId, wanted: &str) -> AppError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(format!("Job {} not found", id)),
            Ok(Some(state)) => AppError::InvalidState(format!(
                "Cannot move job {} from {} to {}",
                id, state, wanted
            )),
            Err(e) => map_sqlx_error(e),
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &PrintJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, printer_id, payload, priority, status,
                attempts, max_attempts, last_error, claimed_by,
                line_item_ref, cancel_reason,
                created_at, started_at, finished_at, cancelled_at,
                next_attempt_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.printer_id)
        .bind(job.payload.as_str())
        .bind(job.priority)
        .bind(job.status.to_string())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(&job.claimed_by)
        .bind(&job.line_item_ref)
        .bind(&job.cancel_reason)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.cancelled_at)
        .bind(job.next_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<PrintJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_job()))
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<PrintJob>> {
        // Single conditional UPDATE: two workers can never both win the same
        // row. Candidates are PENDING jobs whose backoff is due, on printers
        // that are currently active; oldest highest-priority job first.
        let now = self.time_provider.now_millis();

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = ?, started_at = ?, claimed_by = ?
            WHERE id = (
                SELECT j.id FROM jobs j
                JOIN printers p ON p.id = j.printer_id
                WHERE j.status = ? AND p.active = 1 AND j.next_attempt_at <= ?
                ORDER BY j.priority DESC, j.created_at ASC, j.id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(JobStatus::Printing.to_string())
        .bind(now)
        .bind(worker)
        .bind(JobStatus::Pending.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_job()))
    }

    async fn record_success(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, finished_at = ?, claimed_by = NULL
             WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Completed.to_string())
        .bind(now)
        .bind(id)
        .bind(JobStatus::Printing.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Idempotent for repeated success reports
            if let Some(job) = self.find_by_id(id).await? {
                if job.status == JobStatus::Completed {
                    return Ok(());
                }
            }
            return Err(self.rejection_for(id, "COMPLETED").await);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &JobId,
        error_message: &str,
        retry_delay_ms: i64,
    ) -> Result<JobStatus> {
        let now = self.time_provider.now_millis();

        // All expressions see the pre-update row, so the cap check and the
        // increment stay consistent within the one statement.
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                last_error = ?,
                started_at = NULL,
                claimed_by = NULL,
                status = CASE WHEN attempts + 1 >= max_attempts THEN ? ELSE ? END,
                finished_at = CASE WHEN attempts + 1 >= max_attempts THEN ? ELSE finished_at END,
                next_attempt_at = CASE WHEN attempts + 1 >= max_attempts THEN next_attempt_at ELSE ? END
            WHERE id = ? AND status = ?
            RETURNING status
            "#,
        )
        .bind(error_message)
        .bind(JobStatus::Failed.to_string())
        .bind(JobStatus::Pending.to_string())
        .bind(now)
        .bind(now + retry_delay_ms)
        .bind(id)
        .bind(JobStatus::Printing.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match status.as_deref() {
            Some("FAILED") => Ok(JobStatus::Failed),
            Some(_) => Ok(JobStatus::Pending),
            None => Err(self.rejection_for(id, "PENDING").await),
        }
    }

    async fn cancel(&self, id: &JobId, reason: &str) -> Result<()> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, cancelled_at = ?, cancel_reason = ?, claimed_by = NULL
             WHERE id = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Cancelled.to_string())
        .bind(now)
        .bind(reason)
        .bind(id)
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::Printing.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Idempotent for repeated cancellations
            if let Some(job) = self.find_by_id(id).await? {
                if job.status == JobStatus::Cancelled {
                    return Ok(());
                }
            }
            return Err(self.rejection_for(id, "CANCELLED").await);
        }
        Ok(())
    }

    async fn cancel_all_for_line_item(&self, line_item_ref: &str, reason: &str) -> Result<u64> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, cancelled_at = ?, cancel_reason = ?, claimed_by = NULL
             WHERE line_item_ref = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Cancelled.to_string())
        .bind(now)
        .bind(reason)
        .bind(line_item_ref)
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::Printing.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn reclaim_stale(&self, older_than_ms: i64) -> Result<ReclaimReport> {
        let now = self.time_provider.now_millis();
        let cutoff = now - older_than_ms;
        const STALE_ERROR: &str = "stale claim reclaimed (worker presumed crashed)";

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Abandoned claims whose charged attempt reaches the cap go straight
        // to FAILED; a PRINTING row without started_at is inconsistent and
        // treated as stale too.
        let exhausted = sqlx::query(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                status = ?,
                finished_at = ?,
                last_error = ?,
                started_at = NULL,
                claimed_by = NULL
            WHERE status = ?
              AND (started_at IS NULL OR started_at < ?)
              AND attempts + 1 >= max_attempts
            "#,
        )
        .bind(JobStatus::Failed.to_string())
        .bind(now)
        .bind(STALE_ERROR)
        .bind(JobStatus::Printing.to_string())
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                status = ?,
                last_error = ?,
                started_at = NULL,
                claimed_by = NULL,
                next_attempt_at = ?
            WHERE status = ?
              AND (started_at IS NULL OR started_at < ?)
            "#,
        )
        .bind(JobStatus::Pending.to_string())
        .bind(STALE_ERROR)
        .bind(now)
        .bind(JobStatus::Printing.to_string())
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ReclaimReport { requeued, exhausted })
    }

    async fn retry_failed(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            "UPDATE jobs
             SET status = ?, attempts = 0, started_at = NULL, finished_at = NULL,
                 claimed_by = NULL, next_attempt_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Pending.to_string())
        .bind(now)
        .bind(id)
        .bind(JobStatus::Failed.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(self.rejection_for(id, "PENDING").await);
        }
        Ok(())
    }

    async fn list(&self, filter: &JobFilter, limit: i64) -> Result<Vec<PrintJob>> {
        let status = filter.status.map(|s| s.to_string());

        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE (?1 IS NULL OR printer_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR line_item_ref = ?3)
            ORDER BY created_at DESC, id ASC
            LIMIT ?4
            "#,
        )
        .bind(&filter.printer_id)
        .bind(&status)
        .bind(&filter.line_item_ref)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_job()).collect())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    printer_id: String,
    payload: String,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    claimed_by: Option<String>,
    line_item_ref: Option<String>,
    cancel_reason: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    cancelled_at: Option<i64>,
    next_attempt_at: i64,
}

impl JobRow {
    fn into_job(self) -> PrintJob {
        let status = match self.status.as_str() {
            "PENDING" => JobStatus::Pending,
            "PRINTING" => JobStatus::Printing,
            "COMPLETED" => JobStatus::Completed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        };

        PrintJob {
            id: self.id,
            printer_id: self.printer_id,
            payload: PrintPayload::new(self.payload),
            priority: self.priority,
            status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
            claimed_by: self.claimed_by,
            line_item_ref: self.line_item_ref,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            cancelled_at: self.cancelled_at,
            next_attempt_at: self.next_attempt_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqlitePrinterRegistry};
    use chitline_core::domain::{PrinterConfig, PrinterSpec};
    use chitline_core::port::time_provider::SystemTimeProvider;
    use chitline_core::port::PrinterRegistry;

    async fn setup() -> (SqliteJobStore, SqlitePool) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

        let registry = SqlitePrinterRegistry::new(pool.clone());
        let printer = PrinterConfig::new(
            "printer-1",
            1000,
            PrinterSpec {
                name: "Kitchen".to_string(),
                address: "/dev/usb/lp0".to_string(),
                max_attempts: 3,
                timeout_secs: 10,
            },
        )
        .unwrap();
        registry.insert(&printer).await.unwrap();

        (SqliteJobStore::new(pool.clone(), time_provider), pool)
    }

    fn job(id: &str, created_at: i64, priority: i32) -> PrintJob {
        PrintJob::new(
            id,
            created_at,
            "printer-1",
            PrintPayload::new("CHIT #3\n1x Tonkotsu\n"),
            priority,
            3,
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (store, _pool) = setup().await;
        let new_job = job("j-1", 1000, 0);
        store.insert(&new_job).await.unwrap();

        let found = store.find_by_id(&new_job.id).await.unwrap().unwrap();
        assert_eq!(found.id, new_job.id);
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.payload, new_job.payload);
    }

    #[tokio::test]
    async fn test_claim_prefers_priority_then_age() {
        let (store, _pool) = setup().await;
        store.insert(&job("j-old-low", 1000, 1)).await.unwrap();
        store.insert(&job("j-new-high", 2000, 5)).await.unwrap();
        store.insert(&job("j-old-high", 1500, 5)).await.unwrap();

        let first = store.claim_next("worker-1").await.unwrap().unwrap();
        assert_eq!(first.id, "j-old-high");
        assert_eq!(first.status, JobStatus::Printing);
        assert_eq!(first.claimed_by.as_deref(), Some("worker-1"));

        let second = store.claim_next("worker-1").await.unwrap().unwrap();
        assert_eq!(second.id, "j-new-high");

        let third = store.claim_next("worker-1").await.unwrap().unwrap();
        assert_eq!(third.id, "j-old-low");

        assert!(store.claim_next("worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_skips_inactive_printers() {
        let (store, pool) = setup().await;
        store.insert(&job("j-1", 1000, 0)).await.unwrap();

        let registry = SqlitePrinterRegistry::new(pool);
        registry.deactivate(&"printer-1".to_string()).await.unwrap();
        assert!(store.claim_next("worker-1").await.unwrap().is_none());

        // Re-activation resumes delivery without resubmission
        registry.activate(&"printer-1".to_string()).await.unwrap();
        assert!(store.claim_next("worker-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_success_is_idempotent() {
        let (store, _pool) = setup().await;
        store.insert(&job("j-1", 1000, 0)).await.unwrap();
        let claimed = store.claim_next("worker-1").await.unwrap().unwrap();

        store.record_success(&claimed.id).await.unwrap();
        // Second report: no-op
        store.record_success(&claimed.id).await.unwrap();

        let done = store.find_by_id(&claimed.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_record_failure_respects_cap() {
        let (store, _pool) = setup().await;
        let mut j = job("j-1", 1000, 0);
        j.max_attempts = 2;
        store.insert(&j).await.unwrap();

        store.claim_next("worker-1").await.unwrap().unwrap();
        let status = store.record_failure(&j.id, "timeout", 0).await.unwrap();
        assert_eq!(status, JobStatus::Pending);

        store.claim_next("worker-1").await.unwrap().unwrap();
        let status = store.record_failure(&j.id, "timeout", 0).await.unwrap();
        assert_eq!(status, JobStatus::Failed);

        let failed = store.find_by_id(&j.id).await.unwrap().unwrap();
        assert_eq!(failed.attempts, 2);
        assert_eq!(failed.last_error.as_deref(), Some("timeout"));

        // Never claimable again
        assert!(store.claim_next("worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backoff_gates_visibility() {
        let (store, _pool) = setup().await;
        store.insert(&job("j-1", 1000, 0)).await.unwrap();
        store.claim_next("worker-1").await.unwrap().unwrap();

        // Requeue with a delay far in the future
        store
            .record_failure(&"j-1".to_string(), "busy", 60 * 60 * 1000)
            .await
            .unwrap();
        assert!(store.claim_next("worker-1").await.unwrap().is_none());
    }
}
