//! Chitline CLI - Admin tooling for the print dispatch daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9517";

#[derive(Parser)]
#[command(name = "chit")]
#[command(about = "Chitline print dispatch CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CHITLINE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Printer configuration management
    #[command(subcommand)]
    Printers(PrinterCommands),

    /// Job queries and overrides
    #[command(subcommand)]
    Jobs(JobCommands),

    /// Enqueue a print job
    Enqueue {
        /// Target printer id
        #[arg(short, long)]
        printer: String,

        /// Pre-rendered payload to print
        #[arg(long)]
        payload: String,

        /// Priority (higher = claimed sooner)
        #[arg(long, default_value = "0")]
        priority: i32,

        /// Order line item reference
        #[arg(long)]
        line_item: Option<String>,
    },

    /// Cancel every queued job for a voided order line item
    Void {
        /// Line item reference
        line_item: String,

        /// Cancellation reason
        #[arg(long, default_value = "line item voided")]
        reason: String,
    },

    /// Show system status
    Status,

    /// Run maintenance operations
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },
}

#[derive(Subcommand)]
enum PrinterCommands {
    /// Register a new printer
    Add {
        /// Human-readable name
        #[arg(short, long)]
        name: String,

        /// Device path or host:port (must be unique among active printers)
        #[arg(short, long)]
        address: String,

        /// Attempt cap for jobs on this printer
        #[arg(long, default_value = "3")]
        max_attempts: i32,

        /// Per-attempt timeout in seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u32,
    },

    /// List printers
    List {
        /// Include deactivated printers
        #[arg(long)]
        all: bool,
    },

    /// Re-enable a printer (pending jobs resume without resubmission)
    Enable { printer_id: String },

    /// Disable a printer (pending jobs stay queued)
    Disable { printer_id: String },

    /// Probe the print service for liveness
    Health { printer_id: String },

    /// Fetch the raw device status from the print service
    Status { printer_id: String },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs
    List {
        /// Filter by printer id
        #[arg(short, long)]
        printer: Option<String>,

        /// Filter by status (PENDING, PRINTING, COMPLETED, FAILED, CANCELLED)
        #[arg(short, long)]
        status: Option<String>,

        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show one job
    Show { job_id: String },

    /// Reset a FAILED job to PENDING (attempts back to zero)
    Retry { job_id: String },

    /// Cancel a job
    Cancel {
        job_id: String,

        /// Cancellation reason
        #[arg(long, default_value = "cancelled by operator")]
        reason: String,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct PrinterRow {
    printer_id: String,
    name: String,
    address: String,
    active: bool,
    max_attempts: i32,
    timeout_secs: u32,
}

#[derive(Deserialize, Tabled)]
struct JobRow {
    job_id: String,
    printer_id: String,
    status: String,
    priority: i32,
    attempts: i32,
    max_attempts: i32,
    #[tabled(display_with = "display_option")]
    last_error: Option<String>,
}

fn display_option(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Printers(cmd) => run_printer_command(&cli.rpc_url, cmd).await?,
        Commands::Jobs(cmd) => run_job_command(&cli.rpc_url, cmd).await?,

        Commands::Enqueue {
            printer,
            payload,
            priority,
            line_item,
        } => {
            let params = json!({
                "printer_id": printer,
                "payload": payload,
                "priority": priority,
                "line_item_ref": line_item,
            });

            let result = call_rpc(&cli.rpc_url, "print.enqueue.v1", params).await?;

            println!("{}", "✓ Job enqueued".green().bold());
            println!("  {} {}", "Job ID:".bold(), result["job_id"]);
        }

        Commands::Void { line_item, reason } => {
            let params = json!({
                "line_item_ref": line_item,
                "reason": reason,
            });

            let result = call_rpc(&cli.rpc_url, "print.cancel_line_item.v1", params).await?;

            println!(
                "{}",
                format!(
                    "✓ Cancelled {} job(s) for line item {}",
                    result["cancelled_jobs"], line_item
                )
                .green()
                .bold()
            );
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Printing:".bold(), stats["printing_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!("  {} {}", "Cancelled:".bold(), stats["cancelled_jobs"]);
                    println!();
                    let db_mb =
                        stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());

            let params = json!({ "force_vacuum": force_vacuum });

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await {
                Ok(result) => {
                    println!("  ✓ Maintenance completed");
                    if result["vacuum_run"].as_bool().unwrap_or(false) {
                        println!("  {} VACUUM executed", "✓".green());
                    } else {
                        println!("  ○ VACUUM skipped (not needed)");
                    }
                    println!("  {} {} jobs deleted", "✓".green(), result["jobs_deleted"]);
                    let size_before_mb =
                        result["db_size_before"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    let size_after_mb =
                        result["db_size_after"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!(
                        "  {} {:.2} MB → {:.2} MB",
                        "DB Size:".bold(),
                        size_before_mb,
                        size_after_mb
                    );
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }
    }

    Ok(())
}

async fn run_printer_command(rpc_url: &str, cmd: PrinterCommands) -> Result<()> {
    match cmd {
        PrinterCommands::Add {
            name,
            address,
            max_attempts,
            timeout_secs,
        } => {
            let params = json!({
                "name": name,
                "address": address,
                "max_attempts": max_attempts,
                "timeout_secs": timeout_secs,
            });

            let result = call_rpc(rpc_url, "printers.register.v1", params).await?;

            println!("{}", "✓ Printer registered".green().bold());
            println!("  {} {}", "Printer ID:".bold(), result["printer_id"]);
        }

        PrinterCommands::List { all } => {
            let params = json!({ "include_inactive": all });
            let result = call_rpc(rpc_url, "printers.list.v1", params).await?;

            let printers: Vec<PrinterRow> = serde_json::from_value(result["printers"].clone())?;
            if printers.is_empty() {
                println!("{}", "No printers registered".yellow());
            } else {
                println!("{}", Table::new(printers));
            }
        }

        PrinterCommands::Enable { printer_id } => {
            call_rpc(
                rpc_url,
                "printers.activate.v1",
                json!({ "printer_id": printer_id }),
            )
            .await?;
            println!("{}", format!("✓ Printer {} enabled", printer_id).green().bold());
        }

        PrinterCommands::Disable { printer_id } => {
            call_rpc(
                rpc_url,
                "printers.deactivate.v1",
                json!({ "printer_id": printer_id }),
            )
            .await?;
            println!("{}", format!("✓ Printer {} disabled", printer_id).green().bold());
        }

        PrinterCommands::Health { printer_id } => {
            let result = call_rpc(
                rpc_url,
                "printers.health.v1",
                json!({ "printer_id": printer_id }),
            )
            .await?;

            let health = result["health"].as_str().unwrap_or("UNKNOWN");
            let coloured = match health {
                "ONLINE" => health.green().bold(),
                _ => health.red().bold(),
            };
            println!("  {} {}", "Health:".bold(), coloured);
        }

        PrinterCommands::Status { printer_id } => {
            let result = call_rpc(
                rpc_url,
                "printers.status.v1",
                json!({ "printer_id": printer_id }),
            )
            .await?;

            println!("{}", serde_json::to_string_pretty(&result["status"])?);
        }
    }
    Ok(())
}

async fn run_job_command(rpc_url: &str, cmd: JobCommands) -> Result<()> {
    match cmd {
        JobCommands::List {
            printer,
            status,
            limit,
        } => {
            let params = json!({
                "printer_id": printer,
                "status": status.map(|s| s.to_uppercase()),
                "limit": limit,
            });

            let result = call_rpc(rpc_url, "jobs.list.v1", params).await?;

            let jobs: Vec<JobRow> = serde_json::from_value(result["jobs"].clone())?;
            if jobs.is_empty() {
                println!("{}", "No matching jobs".yellow());
            } else {
                println!("{}", Table::new(jobs));
            }
        }

        JobCommands::Show { job_id } => {
            let result = call_rpc(rpc_url, "jobs.get.v1", json!({ "job_id": job_id })).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        JobCommands::Retry { job_id } => {
            call_rpc(rpc_url, "print.retry.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("✓ Job {} requeued", job_id).green().bold());
        }

        JobCommands::Cancel { job_id, reason } => {
            call_rpc(
                rpc_url,
                "print.cancel.v1",
                json!({ "job_id": job_id, "reason": reason }),
            )
            .await?;
            println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
        }
    }
    Ok(())
}
