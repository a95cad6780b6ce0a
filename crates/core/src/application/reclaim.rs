// Stale claim recovery
//
// A worker that crashes after claiming (PRINTING) but before recording an
// outcome must not strand the job forever. The sweep returns such jobs to
// the pending pool, charging one attempt as if the dispatch had failed.

use crate::application::dispatcher::constants::{
    DEFAULT_STALE_AFTER_MS, DEFAULT_STALE_SWEEP_INTERVAL,
};
use crate::application::dispatcher::ShutdownToken;
use crate::error::Result;
use crate::port::{JobStore, ReclaimReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

pub struct ReclaimService {
    store: Arc<dyn JobStore>,
    stale_after_ms: i64,
    sweep_interval: Duration,
}

impl ReclaimService {
    /// # Arguments
    /// * `store` - Job store
    /// * `stale_after_ms` - Age at which a PRINTING claim counts as abandoned
    ///   (default: 5 minutes)
    /// * `sweep_interval` - How often the background sweep runs
    pub fn new(
        store: Arc<dyn JobStore>,
        stale_after_ms: Option<i64>,
        sweep_interval: Option<Duration>,
    ) -> Self {
        Self {
            store,
            stale_after_ms: stale_after_ms.unwrap_or(DEFAULT_STALE_AFTER_MS),
            sweep_interval: sweep_interval.unwrap_or(DEFAULT_STALE_SWEEP_INTERVAL),
        }
    }

    /// One sweep. Also called once at daemon startup to recover jobs
    /// orphaned by a previous crash.
    pub async fn run_once(&self) -> Result<ReclaimReport> {
        let report = self.store.reclaim_stale(self.stale_after_ms).await?;
        if report.total() > 0 {
            info!(
                requeued = report.requeued,
                exhausted = report.exhausted,
                stale_after_ms = self.stale_after_ms,
                "Reclaimed stale print jobs"
            );
        }
        Ok(report)
    }

    /// Periodic sweep loop. Should be spawned in tokio::spawn.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            stale_after_ms = self.stale_after_ms,
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "Reclaim sweeper started"
        );

        let mut tick = interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Stale reclaim sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Reclaim sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, PrintJob, PrintPayload};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::MockTimeProvider;

    fn job(id: &str, max_attempts: i32) -> PrintJob {
        PrintJob::new(
            id,
            1000,
            "printer-1",
            PrintPayload::new("CHIT\n"),
            0,
            max_attempts,
            None,
        )
    }

    #[tokio::test]
    async fn test_stale_printing_job_is_requeued_with_attempt_charged() {
        let time = Arc::new(MockTimeProvider::new(10_000));
        let store = Arc::new(InMemoryJobStore::new(time.clone()));
        store.insert(&job("j-1", 3)).await.unwrap();

        // Worker claims, then "crashes" - no outcome is ever recorded
        store.claim_next("worker-1").await.unwrap().unwrap();
        time.advance(10 * 60 * 1000);

        let service = ReclaimService::new(store.clone(), Some(5 * 60 * 1000), None);
        let report = service.run_once().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.exhausted, 0);

        let reclaimed = store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(reclaimed.status, JobStatus::Pending);
        assert_eq!(reclaimed.attempts, 1);
        assert!(reclaimed.started_at.is_none());
    }

    #[tokio::test]
    async fn test_fresh_claims_are_left_alone() {
        let time = Arc::new(MockTimeProvider::new(10_000));
        let store = Arc::new(InMemoryJobStore::new(time.clone()));
        store.insert(&job("j-1", 3)).await.unwrap();
        store.claim_next("worker-1").await.unwrap().unwrap();
        time.advance(60 * 1000); // one minute, well under the threshold

        let service = ReclaimService::new(store.clone(), Some(5 * 60 * 1000), None);
        assert_eq!(service.run_once().await.unwrap().total(), 0);

        let untouched = store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Printing);
    }

    #[tokio::test]
    async fn test_reclaim_at_cap_fails_job() {
        let time = Arc::new(MockTimeProvider::new(10_000));
        let store = Arc::new(InMemoryJobStore::new(time.clone()));
        store.insert(&job("j-1", 1)).await.unwrap();
        store.claim_next("worker-1").await.unwrap().unwrap();
        time.advance(10 * 60 * 1000);

        let service = ReclaimService::new(store.clone(), Some(5 * 60 * 1000), None);
        let report = service.run_once().await.unwrap();
        assert_eq!(report.exhausted, 1);

        let failed = store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 1);
    }
}
