// SQLite Maintenance Implementation

use crate::job_store::map_sqlx_error;
use async_trait::async_trait;
use chitline_core::domain::JobStatus;
use chitline_core::error::{AppError, Result};
use chitline_core::port::{Maintenance, MaintenanceStats, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Get DB file size in MB
    async fn get_db_size(&self) -> Result<(f64, i64)> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        let size_bytes = page_count * page_size;
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);

        Ok((size_mb, size_bytes))
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let (size_before, _) = self.get_db_size().await?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        let (size_after, _) = self.get_db_size().await?;
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64> {
        let now = self.time_provider.now_millis();
        let retention_ms = retention_days * 24 * 60 * 60 * 1000;
        let cutoff_time = now - retention_ms;

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Running finished job GC"
        );

        // Terminal jobs only; pending/printing history is never touched.
        // Cancelled rows use cancelled_at since finished_at stays NULL.
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE (status IN (?, ?) AND finished_at IS NOT NULL AND finished_at < ?)
               OR (status = ? AND cancelled_at IS NOT NULL AND cancelled_at < ?)
            "#,
        )
        .bind(JobStatus::Completed.to_string())
        .bind(JobStatus::Failed.to_string())
        .bind(cutoff_time)
        .bind(JobStatus::Cancelled.to_string())
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected() as i64;

        info!(deleted_jobs = deleted, "Finished job GC completed");

        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let (db_size_mb, db_size_bytes) = self.get_db_size().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let terminal_job_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN (?, ?, ?)",
        )
        .bind(JobStatus::Completed.to_string())
        .bind(JobStatus::Failed.to_string())
        .bind(JobStatus::Cancelled.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let freelist_count: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get freelist count: {}", e)))?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let fragmentation_percent = if page_count > 0 {
            (freelist_count as f64 / page_count as f64) * 100.0
        } else {
            0.0
        };

        Ok(MaintenanceStats {
            db_size_mb,
            db_size_bytes,
            job_count,
            terminal_job_count,
            fragmentation_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobStore, SqlitePrinterRegistry};
    use chitline_core::domain::{PrintJob, PrintPayload, PrinterConfig, PrinterSpec};
    use chitline_core::port::time_provider::mocks::MockTimeProvider;
    use chitline_core::port::{JobStore, PrinterRegistry};

    #[tokio::test]
    async fn test_gc_removes_only_old_terminal_jobs() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let now = 100 * 24 * 60 * 60 * 1000i64;
        let time = Arc::new(MockTimeProvider::new(now));
        let store = SqliteJobStore::new(pool.clone(), time.clone());

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

        // One old completed job, one still pending
        let mut old = PrintJob::new(
            "j-old",
            1000,
            "printer-1",
            PrintPayload::new("CHIT\n"),
            0,
            3,
            None,
        );
        old.status = JobStatus::Completed;
        old.finished_at = Some(1000);
        store.insert(&old).await.unwrap();
        store
            .insert(&PrintJob::new(
                "j-pending",
                1000,
                "printer-1",
                PrintPayload::new("CHIT\n"),
                0,
                3,
                None,
            ))
            .await
            .unwrap();

        let maintenance = SqliteMaintenance::new(pool, time);
        let deleted = maintenance.gc_finished_jobs(7).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.find_by_id(&"j-old".to_string()).await.unwrap().is_none());
        assert!(store
            .find_by_id(&"j-pending".to_string())
            .await
            .unwrap()
            .is_some());
    }
}
