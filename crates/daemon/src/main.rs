//! Chitline Print Dispatch Daemon - Main Entry Point
//!
//! Composition root: wires the SQLite store, the HTTP transport, the
//! dispatcher worker pool, the reclaim sweeper and the JSON-RPC surface.

mod config;
mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use chitline_api_rpc::{server::RpcServerConfig, RpcServer};
use chitline_core::application::dispatcher::constants::DEFAULT_FLOATING_WORKERS;
use chitline_core::application::{
    shutdown_channel, Dispatcher, MaintenanceScheduler, PrintQueueService, ReclaimService,
    RetryPolicy,
};
use chitline_core::port::id_provider::UuidProvider;
use chitline_core::port::time_provider::SystemTimeProvider;
use chitline_core::port::{
    JobStore, Maintenance, MaintenanceConfig, PrinterRegistry, PrinterTransport,
};
use chitline_infra_http::HttpPrinterTransport;
use chitline_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteMaintenance, SqlitePrinterRegistry,
};

use config::AppConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("CHITLINE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("chitline=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Chitline print dispatch daemon v{} starting...", VERSION);

    // 1.1. Initialize OpenTelemetry (optional)
    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration (constructed once, immutable thereafter)
    let app_config = AppConfig::from_env();
    info!(db_path = %app_config.db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&app_config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let store: Arc<dyn JobStore> =
        Arc::new(SqliteJobStore::new(pool.clone(), time_provider.clone()));
    let registry: Arc<dyn PrinterRegistry> = Arc::new(SqlitePrinterRegistry::new(pool.clone()));
    let transport: Arc<dyn PrinterTransport> =
        Arc::new(HttpPrinterTransport::new(app_config.print_service_url.as_str()));
    let maintenance: Arc<dyn Maintenance> =
        Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));

    let retry_policy = Arc::new(RetryPolicy::new(
        app_config.retry_base_delay_ms,
        app_config.retry_backoff_factor,
        app_config.retry_max_delay_ms,
        app_config.fatal_retry_delay_ms,
    ));

    let queue_service = Arc::new(PrintQueueService::new(
        registry.clone(),
        store.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));

    // 5. Recover jobs orphaned by a previous crash
    info!("Running startup stale-claim recovery...");
    let reclaim = ReclaimService::new(
        store.clone(),
        Some(app_config.stale_after_ms),
        Some(std::time::Duration::from_secs(app_config.stale_sweep_secs)),
    );
    match reclaim.run_once().await {
        Ok(report) => info!(
            requeued = report.requeued,
            exhausted = report.exhausted,
            "Startup recovery completed"
        ),
        Err(e) => tracing::error!(error = ?e, "Startup recovery failed"),
    }

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: app_config.rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        queue_service,
        store.clone(),
        registry.clone(),
        transport.clone(),
        maintenance.clone(),
        id_provider,
        time_provider.clone(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 7. Start the dispatcher worker pool
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let worker_count = match app_config.workers {
        Some(n) => n.max(1),
        None => registry.list_active().await.map(|p| p.len()).unwrap_or(0)
            + DEFAULT_FLOATING_WORKERS,
    };
    info!(workers = worker_count, "Starting dispatcher workers...");

    let mut worker_handles = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let dispatcher = Dispatcher::new(
            format!("worker-{}", i + 1),
            store.clone(),
            registry.clone(),
            transport.clone(),
            retry_policy.clone(),
        );
        let token = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(token).await {
                tracing::error!(error = ?e, "Dispatcher failed");
            }
        }));
    }

    // 8. Start the periodic reclaim sweeper
    let sweeper_token = shutdown_rx.clone();
    tokio::spawn(async move {
        reclaim.run(sweeper_token).await;
    });

    // 9. Start the maintenance scheduler
    info!("Starting maintenance scheduler...");
    let maintenance_scheduler = MaintenanceScheduler::new(
        maintenance,
        MaintenanceConfig::default(),
        24, // Run every 24 hours
    );
    tokio::spawn(async move {
        maintenance_scheduler.run().await;
    });

    info!("System ready. Waiting for print jobs...");
    info!("Press Ctrl+C to shutdown");

    // 10. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 11. Graceful shutdown
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    for handle in worker_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}
