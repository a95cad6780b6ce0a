// Printer Transport Port
// Abstraction over the network call to the remote print service

use crate::domain::{PrinterConfig, PrintPayload};
use crate::error::Result;
use async_trait::async_trait;

/// Classified result of a dispatch attempt.
///
/// Outcomes are VALUES, never errors: the dispatcher drives retry bookkeeping
/// from them instead of unwinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The print service accepted the payload
    Accepted,
    /// Transient transport failure (refused, DNS, timeout, 5xx) - consumed
    /// by automatic retry
    Retryable(String),
    /// Explicit application-level rejection (e.g. malformed payload) -
    /// retrying the same payload is pointless, but the attempt cap still
    /// bounds the job rather than any special casing
    Fatal(String),
}

/// Side-effect-free liveness probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterHealth {
    Online,
    Offline,
}

impl std::fmt::Display for PrinterHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrinterHealth::Online => write!(f, "ONLINE"),
            PrinterHealth::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Client for the remote print service.
///
/// All calls enforce the printer's per-attempt timeout client-side. The
/// dispatch path never calls `health_check` - it attempts `send` directly and
/// lets failure classification decide, avoiding the check-then-send race.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// Deliver a payload to the printer's port. `Err` is reserved for local
    /// misconfiguration; every network-level result maps to a `SendOutcome`.
    async fn send(&self, printer: &PrinterConfig, payload: &PrintPayload) -> Result<SendOutcome>;

    /// Liveness probe for operational tooling only
    async fn health_check(&self, printer: &PrinterConfig) -> Result<PrinterHealth>;

    /// Raw status passthrough for operational tooling (optional endpoint)
    async fn probe_status(&self, printer: &PrinterConfig) -> Result<serde_json::Value>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted transport: pops one outcome per `send` call, repeating the
    /// last entry once the script is exhausted.
    pub struct MockPrinterTransport {
        script: Arc<Mutex<Vec<SendOutcome>>>,
        health: Arc<Mutex<PrinterHealth>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockPrinterTransport {
        pub fn new(script: Vec<SendOutcome>) -> Self {
            assert!(!script.is_empty(), "script must contain at least one outcome");
            Self {
                script: Arc::new(Mutex::new(script)),
                health: Arc::new(Mutex::new(PrinterHealth::Online)),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_accepting() -> Self {
            Self::new(vec![SendOutcome::Accepted])
        }

        pub fn new_retryable(message: impl Into<String>) -> Self {
            Self::new(vec![SendOutcome::Retryable(message.into())])
        }

        pub fn new_fatal(message: impl Into<String>) -> Self {
            Self::new(vec![SendOutcome::Fatal(message.into())])
        }

        pub fn set_health(&self, health: PrinterHealth) {
            *self.health.lock().unwrap() = health;
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl PrinterTransport for MockPrinterTransport {
        async fn send(
            &self,
            _printer: &PrinterConfig,
            _payload: &PrintPayload,
        ) -> Result<SendOutcome> {
            *self.call_count.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let outcome = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            Ok(outcome)
        }

        async fn health_check(&self, _printer: &PrinterConfig) -> Result<PrinterHealth> {
            Ok(*self.health.lock().unwrap())
        }

        async fn probe_status(&self, _printer: &PrinterConfig) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "online": true }))
        }
    }
}
