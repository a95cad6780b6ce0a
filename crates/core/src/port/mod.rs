// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod maintenance;
pub mod printer_registry;
pub mod printer_transport;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_store::{JobFilter, JobStore, ReclaimReport};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use printer_registry::PrinterRegistry;
pub use printer_transport::{PrinterHealth, PrinterTransport, SendOutcome};
pub use time_provider::TimeProvider;
