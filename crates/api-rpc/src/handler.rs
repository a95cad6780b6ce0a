//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{code, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::*;
use chitline_core::application::{EnqueueRequest, PrintQueueService};
use chitline_core::domain::{JobStatus, PrinterConfig, PrinterSpec};
use chitline_core::error::AppError;
use chitline_core::port::{
    IdProvider, JobFilter, JobStore, Maintenance, PrinterRegistry, PrinterTransport, TimeProvider,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    queue_service: Arc<PrintQueueService>,
    store: Arc<dyn JobStore>,
    registry: Arc<dyn PrinterRegistry>,
    transport: Arc<dyn PrinterTransport>,
    maintenance: Arc<dyn Maintenance>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    rate_limiter: RateLimiter,
    start_time: std::time::Instant,
}

fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}

fn parse_status(s: &str) -> Result<JobStatus, ErrorObjectOwned> {
    match s {
        "PENDING" => Ok(JobStatus::Pending),
        "PRINTING" => Ok(JobStatus::Printing),
        "COMPLETED" => Ok(JobStatus::Completed),
        "FAILED" => Ok(JobStatus::Failed),
        "CANCELLED" => Ok(JobStatus::Cancelled),
        other => Err(ErrorObjectOwned::owned(
            code::VALIDATION_ERROR,
            format!("unknown job status: {}", other),
            None::<()>,
        )),
    }
}

impl RpcHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_service: Arc<PrintQueueService>,
        store: Arc<dyn JobStore>,
        registry: Arc<dyn PrinterRegistry>,
        transport: Arc<dyn PrinterTransport>,
        maintenance: Arc<dyn Maintenance>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        // Default: 200 burst, 100 req/sec (configurable via env)
        let max_burst: u32 = std::env::var("CHITLINE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("CHITLINE_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            queue_service,
            store,
            registry,
            transport,
            maintenance,
            id_provider,
            time_provider,
            rate_limiter: RateLimiter::new(max_burst, rate_per_sec),
            start_time: std::time::Instant::now(),
        }
    }

    fn check_rate_limit(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check() {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// print.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueParams) -> Result<EnqueueResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        let job_id = self
            .queue_service
            .enqueue(EnqueueRequest {
                printer_id: params.printer_id,
                payload: params.payload,
                priority: params.priority,
                line_item_ref: params.line_item_ref,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(EnqueueResponse {
            job_id,
            status: JobStatus::Pending.to_string(),
        })
    }

    /// print.cancel.v1
    pub async fn cancel_job(
        &self,
        params: CancelJobParams,
    ) -> Result<CancelJobResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        self.queue_service
            .cancel_job(&params.job_id, &params.reason)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelJobResponse {
            job_id: params.job_id,
            cancelled: true,
        })
    }

    /// print.cancel_line_item.v1
    pub async fn cancel_line_item(
        &self,
        params: CancelLineItemParams,
    ) -> Result<CancelLineItemResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        let cancelled_jobs = self
            .queue_service
            .cancel_line_item(&params.line_item_ref, &params.reason)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelLineItemResponse {
            line_item_ref: params.line_item_ref,
            cancelled_jobs,
        })
    }

    /// print.retry.v1
    pub async fn retry(&self, params: RetryParams) -> Result<JobView, ErrorObjectOwned> {
        self.check_rate_limit()?;

        self.queue_service
            .retry_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        self.get_job(GetJobParams {
            job_id: params.job_id,
        })
        .await
    }

    /// jobs.get.v1
    pub async fn get_job(&self, params: GetJobParams) -> Result<JobView, ErrorObjectOwned> {
        let job = self
            .store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Job {} not found",
                    params.job_id
                )))
            })?;

        Ok(job.into())
    }

    /// jobs.list.v1
    pub async fn list_jobs(
        &self,
        params: ListJobsParams,
    ) -> Result<ListJobsResponse, ErrorObjectOwned> {
        let status = params.status.as_deref().map(parse_status).transpose()?;

        let filter = JobFilter {
            printer_id: params.printer_id,
            status,
            line_item_ref: params.line_item_ref,
        };

        let jobs = self
            .store
            .list(&filter, params.limit.clamp(1, 500))
            .await
            .map_err(to_rpc_error)?;

        Ok(ListJobsResponse {
            jobs: jobs.into_iter().map(JobView::from).collect(),
        })
    }

    /// printers.register.v1
    pub async fn register_printer(
        &self,
        params: RegisterPrinterParams,
    ) -> Result<RegisterPrinterResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        let spec = PrinterSpec {
            name: params.name,
            address: params.address,
            max_attempts: params.max_attempts.unwrap_or(3),
            timeout_secs: params.timeout_secs.unwrap_or(10),
        };

        let printer = PrinterConfig::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            spec,
        )
        .map_err(|e| to_rpc_error(e.into()))?;

        self.registry.insert(&printer).await.map_err(to_rpc_error)?;

        Ok(RegisterPrinterResponse {
            printer_id: printer.id,
        })
    }

    /// printers.list.v1
    pub async fn list_printers(
        &self,
        params: ListPrintersParams,
    ) -> Result<ListPrintersResponse, ErrorObjectOwned> {
        let printers = if params.include_inactive {
            self.registry.list_all().await
        } else {
            self.registry.list_active().await
        }
        .map_err(to_rpc_error)?;

        Ok(ListPrintersResponse {
            printers: printers.into_iter().map(PrinterView::from).collect(),
        })
    }

    /// printers.activate.v1
    pub async fn activate_printer(
        &self,
        params: PrinterIdParams,
    ) -> Result<PrinterAckResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        self.registry
            .activate(&params.printer_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(PrinterAckResponse {
            printer_id: params.printer_id,
            active: true,
        })
    }

    /// printers.deactivate.v1
    pub async fn deactivate_printer(
        &self,
        params: PrinterIdParams,
    ) -> Result<PrinterAckResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        self.registry
            .deactivate(&params.printer_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(PrinterAckResponse {
            printer_id: params.printer_id,
            active: false,
        })
    }

    /// printers.health.v1
    ///
    /// Operational probe only - the dispatch path never consults it.
    pub async fn printer_health(
        &self,
        params: PrinterIdParams,
    ) -> Result<PrinterHealthResponse, ErrorObjectOwned> {
        let printer = self
            .registry
            .get(&params.printer_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Printer {} not found",
                    params.printer_id
                )))
            })?;

        let health = self
            .transport
            .health_check(&printer)
            .await
            .map_err(to_rpc_error)?;

        Ok(PrinterHealthResponse {
            printer_id: params.printer_id,
            health: health.to_string(),
        })
    }

    /// printers.status.v1
    ///
    /// Raw status passthrough from the print service (optional endpoint).
    pub async fn printer_status(
        &self,
        params: PrinterIdParams,
    ) -> Result<PrinterStatusResponse, ErrorObjectOwned> {
        let printer = self
            .registry
            .get(&params.printer_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "Printer {} not found",
                    params.printer_id
                )))
            })?;

        let status = self
            .transport
            .probe_status(&printer)
            .await
            .map_err(to_rpc_error)?;

        Ok(PrinterStatusResponse {
            printer_id: params.printer_id,
            status,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsParams) -> Result<StatsResponse, ErrorObjectOwned> {
        let pending = self.count(JobStatus::Pending).await?;
        let printing = self.count(JobStatus::Printing).await?;
        let completed = self.count(JobStatus::Completed).await?;
        let failed = self.count(JobStatus::Failed).await?;
        let cancelled = self.count(JobStatus::Cancelled).await?;

        let stats = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            total_jobs: stats.job_count,
            pending_jobs: pending,
            printing_jobs: printing,
            completed_jobs: completed,
            failed_jobs: failed,
            cancelled_jobs: cancelled,
            db_size_bytes: stats.db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    async fn count(&self, status: JobStatus) -> Result<i64, ErrorObjectOwned> {
        self.store
            .count_by_status(status)
            .await
            .map_err(to_rpc_error)
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceParams,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        let vacuum_run = if params.force_vacuum || stats_before.fragmentation_percent > 10.0 {
            self.maintenance.vacuum().await.map_err(to_rpc_error)?;
            true
        } else {
            false
        };

        let jobs_deleted = self
            .maintenance
            .gc_finished_jobs(7)
            .await
            .map_err(to_rpc_error)?;

        let stats_after = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(MaintenanceResponse {
            vacuum_run,
            jobs_deleted,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: stats_after.db_size_bytes,
        })
    }
}
