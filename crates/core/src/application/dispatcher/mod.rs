// Dispatcher - print job delivery loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::RetryPolicy;
use crate::domain::{JobStatus, PrintJob};
use crate::error::{AppError, Result};
use crate::port::{JobStore, PrinterRegistry, PrinterTransport, SendOutcome};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// One dispatch worker. Several run concurrently against the shared store;
/// the store's atomic claim is the only synchronization between them.
pub struct Dispatcher {
    worker_id: String,
    store: Arc<dyn JobStore>,
    registry: Arc<dyn PrinterRegistry>,
    transport: Arc<dyn PrinterTransport>,
    retry_policy: Arc<RetryPolicy>,
}

impl Dispatcher {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        registry: Arc<dyn PrinterRegistry>,
        transport: Arc<dyn PrinterTransport>,
        retry_policy: Arc<RetryPolicy>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            registry,
            transport,
            retry_policy,
        }
    }

    /// Run the dispatch loop with graceful shutdown support.
    ///
    /// Store errors abort the iteration and sleep, never the process.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.worker_id, "Dispatcher started");
        loop {
            if shutdown.is_shutdown() {
                info!(worker = %self.worker_id, "Dispatcher shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!(worker = %self.worker_id, "Dispatcher interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(worker = %self.worker_id, error = %e, "Dispatcher error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker = %self.worker_id, "Dispatcher interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker = %self.worker_id, "Dispatcher stopped");
        Ok(())
    }

    /// Claim and dispatch one job (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        // The claim commits the row to PRINTING before any network I/O, so a
        // stuck send can never block other workers on this row.
        let job = match self.store.claim_next(&self.worker_id).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            worker = %self.worker_id,
            job_id = %job.id,
            printer_id = %job.printer_id,
            attempt = %(job.attempts + 1),
            "Dispatching print job"
        );

        self.dispatch(&job).await?;
        Ok(true)
    }

    async fn dispatch(&self, job: &PrintJob) -> Result<()> {
        let printer = match self.registry.get(&job.printer_id).await? {
            Some(p) => p,
            None => {
                // Registry row vanished between claim and dispatch - treat as
                // a transient failure so the job follows normal retry rules.
                let delay = self.retry_policy.retry_delay_ms(job);
                self.record_failure(job, "printer missing from registry", delay)
                    .await;
                return Ok(());
            }
        };

        let outcome = match self.transport.send(&printer, &job.payload).await {
            Ok(outcome) => outcome,
            Err(e) => SendOutcome::Retryable(e.to_string()),
        };

        match outcome {
            SendOutcome::Accepted => {
                match self.store.record_success(&job.id).await {
                    Ok(()) => {
                        info!(worker = %self.worker_id, job_id = %job.id, "Print job completed");
                        if let Err(e) = self
                            .registry
                            .touch_last_used(&printer.id, self.now_from(job))
                            .await
                        {
                            warn!(printer_id = %printer.id, error = %e, "Failed to update last_used");
                        }
                    }
                    // A cancellation won the race while the payload was in
                    // flight. The physical chit may exist; the record stays
                    // cancelled.
                    Err(AppError::InvalidState(msg)) => {
                        warn!(job_id = %job.id, detail = %msg, "Success outcome superseded");
                    }
                    Err(e) => return Err(e),
                }
            }
            SendOutcome::Retryable(message) => {
                let delay = self.retry_policy.retry_delay_ms(job);
                self.record_failure(job, &message, delay).await;
            }
            SendOutcome::Fatal(message) => {
                // Still consumes an attempt, but requeues with the minimal
                // delay so the cap exhausts quickly.
                let delay = self.retry_policy.fatal_delay_ms();
                self.record_failure(job, &message, delay).await;
            }
        }
        Ok(())
    }

    async fn record_failure(&self, job: &PrintJob, message: &str, retry_delay_ms: i64) {
        match self
            .store
            .record_failure(&job.id, message, retry_delay_ms)
            .await
        {
            Ok(JobStatus::Pending) => {
                info!(
                    worker = %self.worker_id,
                    job_id = %job.id,
                    attempt = %(job.attempts + 1),
                    delay_ms = %retry_delay_ms,
                    error = %message,
                    "Dispatch failed, job requeued"
                );
            }
            Ok(status) => {
                error!(
                    worker = %self.worker_id,
                    job_id = %job.id,
                    status = %status,
                    error = %message,
                    "Print job failed after max attempts"
                );
            }
            Err(AppError::InvalidState(msg)) => {
                warn!(job_id = %job.id, detail = %msg, "Failure outcome superseded");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record dispatch outcome");
            }
        }
    }

    // Best-effort timestamp for advisory bookkeeping; the claim stamped
    // started_at just before dispatch.
    fn now_from(&self, job: &PrintJob) -> i64 {
        job.started_at.unwrap_or(job.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PrinterConfig, PrinterSpec, PrintJob, PrintPayload};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::printer_registry::mocks::InMemoryPrinterRegistry;
    use crate::port::printer_transport::mocks::MockPrinterTransport;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::TimeProvider;

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        registry: Arc<InMemoryPrinterRegistry>,
        time: Arc<MockTimeProvider>,
    }

    async fn fixture() -> Fixture {
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let store = Arc::new(InMemoryJobStore::new(time.clone()));
        let registry = Arc::new(InMemoryPrinterRegistry::new());
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
        Fixture {
            store,
            registry,
            time,
        }
    }

    fn dispatcher(f: &Fixture, transport: MockPrinterTransport) -> Dispatcher {
        Dispatcher::new(
            "worker-1",
            f.store.clone(),
            f.registry.clone(),
            Arc::new(transport),
            Arc::new(RetryPolicy::default()),
        )
    }

    fn job(id: &str, created_at: i64) -> PrintJob {
        PrintJob::new(
            id,
            created_at,
            "printer-1",
            PrintPayload::new("CHIT #42\n2x Ramen\n"),
            0,
            3,
            None,
        )
    }

    #[tokio::test]
    async fn test_no_pending_jobs_is_a_noop() {
        let f = fixture().await;
        let d = dispatcher(&f, MockPrinterTransport::new_accepting());
        assert!(!d.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_accepted_outcome_completes_job() {
        let f = fixture().await;
        f.store.insert(&job("j-1", 1000)).await.unwrap();

        let d = dispatcher(&f, MockPrinterTransport::new_accepting());
        assert!(d.process_next_job().await.unwrap());

        let done = f.store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.finished_at.is_some());

        let printer = f.registry.get(&"printer-1".to_string()).await.unwrap().unwrap();
        assert!(printer.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_retryable_failures_exhaust_to_failed() {
        let f = fixture().await;
        f.store.insert(&job("j-1", 1000)).await.unwrap();

        let d = dispatcher(&f, MockPrinterTransport::new_retryable("connection refused"));

        for _ in 0..3 {
            assert!(d.process_next_job().await.unwrap());
            // Step past any backoff so the job is claimable again
            f.time.advance(120_000);
        }

        let failed = f.store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.last_error.as_deref(), Some("connection refused"));

        // Exhausted jobs are never claimed again
        assert!(!d.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_fatal_outcome_still_counts_attempts() {
        let f = fixture().await;
        f.store.insert(&job("j-1", 1000)).await.unwrap();

        let d = dispatcher(&f, MockPrinterTransport::new_fatal("malformed payload"));
        assert!(d.process_next_job().await.unwrap());

        let requeued = f.store.find_by_id(&"j-1".to_string()).await.unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempts, 1);
        // Fatal rejections requeue with the short delay, not full backoff
        assert!(requeued.next_attempt_at <= f.time.now_millis() + 1000);
    }

    #[tokio::test]
    async fn test_higher_priority_claimed_first() {
        let f = fixture().await;
        let mut low = job("j-low", 1000);
        low.priority = 1;
        let mut high = job("j-high", 2000); // created later
        high.priority = 5;
        f.store.insert(&low).await.unwrap();
        f.store.insert(&high).await.unwrap();

        let transport = MockPrinterTransport::new_accepting();
        let d = dispatcher(&f, transport);
        assert!(d.process_next_job().await.unwrap());

        let high_after = f.store.find_by_id(&"j-high".to_string()).await.unwrap().unwrap();
        let low_after = f.store.find_by_id(&"j-low".to_string()).await.unwrap().unwrap();
        assert_eq!(high_after.status, JobStatus::Completed);
        assert_eq!(low_after.status, JobStatus::Pending);
    }
}
