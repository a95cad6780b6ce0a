//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use chitline_core::domain::{PrintJob, PrinterConfig};
use serde::{Deserialize, Serialize};

fn default_cancel_reason() -> String {
    "cancelled via api".to_string()
}

fn default_list_limit() -> i64 {
    50
}

/// print.enqueue.v1 - Durably queue a print job
#[derive(Debug, Deserialize)]
pub struct EnqueueParams {
    pub printer_id: String,
    pub payload: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub line_item_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub status: String,
}

/// print.cancel.v1 - Cancel a single job
#[derive(Debug, Deserialize)]
pub struct CancelJobParams {
    pub job_id: String,
    #[serde(default = "default_cancel_reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// print.cancel_line_item.v1 - Cancellation cascade for a voided line item
#[derive(Debug, Deserialize)]
pub struct CancelLineItemParams {
    pub line_item_ref: String,
    #[serde(default = "default_cancel_reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelLineItemResponse {
    pub line_item_ref: String,
    pub cancelled_jobs: u64,
}

/// print.retry.v1 - Manual operator override for a FAILED job
#[derive(Debug, Deserialize)]
pub struct RetryParams {
    pub job_id: String,
}

/// jobs.get.v1
#[derive(Debug, Deserialize)]
pub struct GetJobParams {
    pub job_id: String,
}

/// jobs.list.v1
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    #[serde(default)]
    pub printer_id: Option<String>,
    /// Status name (PENDING, PRINTING, COMPLETED, FAILED, CANCELLED)
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub line_item_ref: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
}

/// Wire representation of a job for admin tooling
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub printer_id: String,
    pub status: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub line_item_ref: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub cancelled_at: Option<i64>,
}

impl From<PrintJob> for JobView {
    fn from(job: PrintJob) -> Self {
        Self {
            job_id: job.id,
            printer_id: job.printer_id,
            status: job.status.to_string(),
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            line_item_ref: job.line_item_ref,
            cancel_reason: job.cancel_reason,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            cancelled_at: job.cancelled_at,
        }
    }
}

/// printers.register.v1
#[derive(Debug, Deserialize)]
pub struct RegisterPrinterParams {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterPrinterResponse {
    pub printer_id: String,
}

/// printers.activate.v1 / printers.deactivate.v1 / printers.health.v1
#[derive(Debug, Deserialize)]
pub struct PrinterIdParams {
    pub printer_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrinterAckResponse {
    pub printer_id: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrinterHealthResponse {
    pub printer_id: String,
    pub health: String,
}

/// printers.status.v1 - raw status passthrough from the print service
#[derive(Debug, Clone, Serialize)]
pub struct PrinterStatusResponse {
    pub printer_id: String,
    pub status: serde_json::Value,
}

/// printers.list.v1
#[derive(Debug, Deserialize)]
pub struct ListPrintersParams {
    /// When true, deactivated printers are included
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPrintersResponse {
    pub printers: Vec<PrinterView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrinterView {
    pub printer_id: String,
    pub name: String,
    pub address: String,
    pub active: bool,
    pub max_attempts: i32,
    pub timeout_secs: u32,
    pub last_used_at: Option<i64>,
}

impl From<PrinterConfig> for PrinterView {
    fn from(printer: PrinterConfig) -> Self {
        Self {
            printer_id: printer.id,
            name: printer.name,
            address: printer.address,
            active: printer.active,
            max_attempts: printer.max_attempts,
            timeout_secs: printer.timeout_secs,
            last_used_at: printer.last_used_at,
        }
    }
}

/// admin.stats.v1
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub printing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}

/// admin.maintenance.v1
#[derive(Debug, Deserialize)]
pub struct MaintenanceParams {
    #[serde(default)]
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub vacuum_run: bool,
    pub jobs_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
