// Application Layer - Use Cases and Business Logic

pub mod dispatcher;
pub mod maintenance;
pub mod queue_service;
pub mod reclaim;
pub mod retry;

// Re-exports
pub use dispatcher::{shutdown_channel, Dispatcher, ShutdownSender, ShutdownToken};
pub use maintenance::MaintenanceScheduler;
pub use queue_service::{EnqueueRequest, PrintQueueService};
pub use reclaim::ReclaimService;
pub use retry::RetryPolicy;
