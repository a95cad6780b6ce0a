//! Automatic retry exhaustion and the manual operator override

use chitline_core::application::{Dispatcher, EnqueueRequest, PrintQueueService, RetryPolicy};
use chitline_core::domain::{JobStatus, PrinterConfig, PrinterSpec};
use chitline_core::port::id_provider::UuidProvider;
use chitline_core::port::printer_transport::mocks::MockPrinterTransport;
use chitline_core::port::printer_transport::SendOutcome;
use chitline_core::port::time_provider::mocks::MockTimeProvider;
use chitline_core::port::{JobStore, PrinterRegistry};
use chitline_infra_sqlite::{create_pool, run_migrations, SqliteJobStore, SqlitePrinterRegistry};
use std::sync::Arc;

struct Harness {
    service: PrintQueueService,
    store: Arc<SqliteJobStore>,
    registry: Arc<SqlitePrinterRegistry>,
    time: Arc<MockTimeProvider>,
}

async fn harness() -> Harness {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(MockTimeProvider::new(1_000_000));
    let store = Arc::new(SqliteJobStore::new(pool.clone(), time.clone()));
    let registry = Arc::new(SqlitePrinterRegistry::new(pool));

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

    let service = PrintQueueService::new(
        registry.clone(),
        store.clone(),
        Arc::new(UuidProvider),
        time.clone(),
    );

    Harness {
        service,
        store,
        registry,
        time,
    }
}

fn dispatcher(h: &Harness, transport: MockPrinterTransport) -> Dispatcher {
    Dispatcher::new(
        "worker-1",
        h.store.clone(),
        h.registry.clone(),
        Arc::new(transport),
        Arc::new(RetryPolicy::default()),
    )
}

fn request() -> EnqueueRequest {
    EnqueueRequest {
        printer_id: "printer-1".to_string(),
        payload: "CHIT #5\n1x Bibimbap\n".to_string(),
        priority: 0,
        line_item_ref: None,
    }
}

/// Three consecutive retryable outcomes against max_attempts=3:
/// the job ends FAILED with attempts == 3 and the error preserved verbatim
#[tokio::test]
async fn test_three_retryable_failures_exhaust() {
    let h = harness().await;
    let job_id = h.service.enqueue(request()).await.unwrap();

    let d = dispatcher(&h, MockPrinterTransport::new_retryable("connection refused"));

    for round in 1..=3 {
        assert!(d.process_next_job().await.unwrap(), "round {}", round);
        h.time.advance(120_000); // step past backoff
    }

    let job = h.store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.attempts <= job.max_attempts);
    assert_eq!(job.last_error.as_deref(), Some("connection refused"));
    assert!(job.finished_at.is_some());

    // Never silently requeued
    h.time.advance(24 * 60 * 60 * 1000);
    assert!(!d.process_next_job().await.unwrap());
}

/// A transient glitch resolves: fail twice, then the printer comes back
#[tokio::test]
async fn test_recovery_before_exhaustion() {
    let h = harness().await;
    let job_id = h.service.enqueue(request()).await.unwrap();

    let transport = MockPrinterTransport::new(vec![
        SendOutcome::Retryable("paper out".to_string()),
        SendOutcome::Retryable("paper out".to_string()),
        SendOutcome::Accepted,
    ]);
    let d = dispatcher(&h, transport);

    for _ in 0..3 {
        assert!(d.process_next_job().await.unwrap());
        h.time.advance(120_000);
    }

    let job = h.store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
}

/// Manual retry: only FAILED jobs, attempts reset to zero, job claimable again
#[tokio::test]
async fn test_manual_retry_override() {
    let h = harness().await;
    let job_id = h.service.enqueue(request()).await.unwrap();

    let d = dispatcher(&h, MockPrinterTransport::new_fatal("malformed payload"));
    for _ in 0..3 {
        assert!(d.process_next_job().await.unwrap());
        h.time.advance(120_000);
    }

    let failed = h.store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 3);

    h.service.retry_job(&job_id).await.unwrap();

    let requeued = h.store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.attempts, 0);

    // A pending job rejects the override
    assert!(h.service.retry_job(&job_id).await.is_err());

    // And the requeued job can complete
    let d = dispatcher(&h, MockPrinterTransport::new_accepting());
    assert!(d.process_next_job().await.unwrap());
    let job = h.store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}
