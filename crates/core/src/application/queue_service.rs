// Print Queue Service - the upstream-facing contract
//
// The order subsystem calls `enqueue` when a line item enters its
// "ready to print" state and `cancel_line_item` when it is voided. Both are
// explicit method calls: no lifecycle hooks, no hidden coupling to unrelated
// field updates.

use crate::domain::{DomainError, JobId, LineItemRef, PrintJob, PrintPayload, PrinterId};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, PrinterRegistry, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub printer_id: PrinterId,
    /// Content already rendered for the printer; opaque here
    pub payload: String,
    #[serde(default)]
    pub priority: i32,
    /// Weak reference to the requesting order line item
    #[serde(default)]
    pub line_item_ref: Option<LineItemRef>,
}

/// Upstream contract of the print subsystem.
///
/// Enqueue-once per (line item, printer) state transition is the CALLER's
/// responsibility; this service only guarantees idempotent cancellation.
pub struct PrintQueueService {
    registry: Arc<dyn PrinterRegistry>,
    store: Arc<dyn JobStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl PrintQueueService {
    pub fn new(
        registry: Arc<dyn PrinterRegistry>,
        store: Arc<dyn JobStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            id_provider,
            time_provider,
        }
    }

    /// Durably queue a print job. Writes one row; performs no printer
    /// communication, so it is safe to call from the same transaction/call
    /// path that changes the line item's status.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<JobId> {
        if req.payload.is_empty() {
            return Err(AppError::Validation("print payload is empty".into()));
        }

        let printer = self
            .registry
            .get(&req.printer_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| DomainError::PrinterNotFound(req.printer_id.clone()))?;

        let job = PrintJob::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            printer.id,
            PrintPayload::new(req.payload),
            req.priority,
            printer.max_attempts,
            req.line_item_ref,
        );

        self.store.insert(&job).await?;

        info!(
            job_id = %job.id,
            printer_id = %job.printer_id,
            priority = %job.priority,
            line_item_ref = ?job.line_item_ref,
            "Print job enqueued"
        );

        Ok(job.id)
    }

    /// Cancel one job. Idempotent when already cancelled; `InvalidState`
    /// for finished jobs is an expected outcome for the caller to log.
    pub async fn cancel_job(&self, job_id: &JobId, reason: &str) -> Result<()> {
        self.store.cancel(job_id, reason).await
    }

    /// Cancellation cascade: cancel every non-terminal job for a voided line
    /// item. Safe with zero matching jobs and safe to call repeatedly.
    pub async fn cancel_line_item(&self, line_item_ref: &str, reason: &str) -> Result<u64> {
        let cancelled = self
            .store
            .cancel_all_for_line_item(line_item_ref, reason)
            .await?;
        if cancelled > 0 {
            info!(
                line_item_ref = %line_item_ref,
                cancelled = %cancelled,
                reason = %reason,
                "Cancelled print jobs for voided line item"
            );
        }
        Ok(cancelled)
    }

    /// Human override: reset a FAILED job to PENDING with attempts zeroed.
    pub async fn retry_job(&self, job_id: &JobId) -> Result<()> {
        self.store.retry_failed(job_id).await?;
        info!(job_id = %job_id, "Failed job manually requeued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, PrinterConfig, PrinterSpec};
    use crate::port::id_provider::UuidProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::job_store::JobFilter;
    use crate::port::printer_registry::mocks::InMemoryPrinterRegistry;
    use crate::port::time_provider::mocks::MockTimeProvider;

    async fn service() -> (PrintQueueService, Arc<InMemoryJobStore>) {
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let store = Arc::new(InMemoryJobStore::new(time.clone()));
        let registry = Arc::new(InMemoryPrinterRegistry::new());

        let kitchen = PrinterConfig::new(
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
        registry.insert(&kitchen).await.unwrap();

        let mut bar = PrinterConfig::new(
            "printer-2",
            1000,
            PrinterSpec {
                name: "Bar".to_string(),
                address: "192.168.1.50:9100".to_string(),
                max_attempts: 3,
                timeout_secs: 10,
            },
        )
        .unwrap();
        bar.active = false;
        registry.insert(&bar).await.unwrap();

        let svc = PrintQueueService::new(
            registry,
            store.clone(),
            Arc::new(UuidProvider),
            time,
        );
        (svc, store)
    }

    fn request(printer_id: &str, line_item_ref: Option<&str>) -> EnqueueRequest {
        EnqueueRequest {
            printer_id: printer_id.to_string(),
            payload: "CHIT #7\n1x Margherita\n".to_string(),
            priority: 0,
            line_item_ref: line_item_ref.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn test_enqueue_copies_printer_cap() {
        let (svc, store) = service().await;
        let job_id = svc.enqueue(request("printer-1", Some("item-1"))).await.unwrap();

        let job = store.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.line_item_ref.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unknown_and_inactive_printers() {
        let (svc, _store) = service().await;

        let err = svc.enqueue(request("no-such-printer", None)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::PrinterNotFound(_))
        ));

        // printer-2 exists but is deactivated
        let err = svc.enqueue(request("printer-2", None)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::PrinterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_line_item_is_idempotent() {
        let (svc, store) = service().await;
        svc.enqueue(request("printer-1", Some("item-9"))).await.unwrap();
        svc.enqueue(request("printer-1", Some("item-9"))).await.unwrap();
        svc.enqueue(request("printer-1", Some("item-other"))).await.unwrap();

        assert_eq!(svc.cancel_line_item("item-9", "voided").await.unwrap(), 2);
        // Second call: nothing left to cancel, still no error
        assert_eq!(svc.cancel_line_item("item-9", "voided").await.unwrap(), 0);
        // Unknown line item: no-op
        assert_eq!(svc.cancel_line_item("item-unknown", "voided").await.unwrap(), 0);

        let cancelled = store
            .list(
                &JobFilter {
                    status: Some(JobStatus::Cancelled),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_job_is_never_claimed() {
        let (svc, store) = service().await;
        let job_id = svc.enqueue(request("printer-1", Some("item-1"))).await.unwrap();
        svc.cancel_job(&job_id, "table left").await.unwrap();

        assert!(store.claim_next("worker-1").await.unwrap().is_none());
        let job = store.find_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
