// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod printer;

// Re-exports
pub use error::DomainError;
pub use job::{JobId, JobStatus, LineItemRef, PrintJob, PrintPayload, Priority};
pub use printer::{PrinterConfig, PrinterId, PrinterSpec};
