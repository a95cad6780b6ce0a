//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP on localhost.

use crate::handler::RpcHandler;
use crate::types::{
    CancelJobParams, CancelLineItemParams, EnqueueParams, GetJobParams, ListJobsParams,
    ListPrintersParams, MaintenanceParams, PrinterIdParams, RegisterPrinterParams, RetryParams,
    StatsParams,
};
use chitline_core::application::PrintQueueService;
use chitline_core::port::{
    IdProvider, JobStore, Maintenance, PrinterRegistry, PrinterTransport, TimeProvider,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9517;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RpcServerConfig,
        queue_service: Arc<PrintQueueService>,
        store: Arc<dyn JobStore>,
        registry: Arc<dyn PrinterRegistry>,
        transport: Arc<dyn PrinterTransport>,
        maintenance: Arc<dyn Maintenance>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(
                queue_service,
                store,
                registry,
                transport,
                maintenance,
                id_provider,
                time_provider,
            )),
        }
    }

    /// Start the JSON-RPC server.
    ///
    /// Security: only binds to localhost; the print queue has no business
    /// being reachable from outside the host.
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP (localhost only)"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());

        // Upstream trigger contract
        let handler = self.handler.clone();
        module
            .register_async_method("print.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueParams = params.parse()?;
                    handler.enqueue(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("print.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CancelJobParams = params.parse()?;
                    handler.cancel_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("print.cancel_line_item.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CancelLineItemParams = params.parse()?;
                    handler.cancel_line_item(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("print.retry.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RetryParams = params.parse()?;
                    handler.retry(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Operational visibility
        let handler = self.handler.clone();
        module
            .register_async_method("jobs.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetJobParams = params.parse()?;
                    handler.get_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListJobsParams = params.parse()?;
                    handler.list_jobs(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Printer configuration management
        let handler = self.handler.clone();
        module
            .register_async_method("printers.register.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RegisterPrinterParams = params.parse()?;
                    handler.register_printer(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("printers.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListPrintersParams = params.parse().unwrap_or(ListPrintersParams {
                        include_inactive: false,
                    });
                    handler.list_printers(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("printers.activate.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PrinterIdParams = params.parse()?;
                    handler.activate_printer(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("printers.deactivate.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PrinterIdParams = params.parse()?;
                    handler.deactivate_printer(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("printers.health.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PrinterIdParams = params.parse()?;
                    handler.printer_health(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("printers.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PrinterIdParams = params.parse()?;
                    handler.printer_status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Admin
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsParams = params.parse().unwrap_or(StatsParams {});
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.maintenance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: MaintenanceParams = params.parse()?;
                    handler.maintenance(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
