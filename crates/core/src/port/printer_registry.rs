// Printer Registry Port (Interface)

use crate::domain::{PrinterConfig, PrinterId};
use crate::error::Result;
use async_trait::async_trait;

/// Configuration store for physical printers.
///
/// Registration fails with `ConfigConflict` when a different ACTIVE printer
/// already claims the same connection address. Deactivation never touches
/// existing jobs: rows already PENDING for a deactivated printer stay pending
/// and are simply never claimed until the printer is re-activated.
#[async_trait]
pub trait PrinterRegistry: Send + Sync {
    /// Register a new printer (the caller builds the config with injected
    /// id and timestamp). Fails with `Conflict` on a duplicate active address.
    async fn insert(&self, printer: &PrinterConfig) -> Result<()>;

    /// Find printer by ID
    async fn get(&self, id: &PrinterId) -> Result<Option<PrinterConfig>>;

    /// Printers eligible as dispatch targets. Order undefined.
    async fn list_active(&self) -> Result<Vec<PrinterConfig>>;

    /// All printers, including deactivated ones (admin views)
    async fn list_all(&self) -> Result<Vec<PrinterConfig>>;

    /// Clear the activity flag. Existing jobs are untouched.
    async fn deactivate(&self, id: &PrinterId) -> Result<()>;

    /// Set the activity flag, re-checking the address conflict against
    /// currently-active printers.
    async fn activate(&self, id: &PrinterId) -> Result<()>;

    /// Advisory bookkeeping for health dashboards
    async fn touch_last_used(&self, id: &PrinterId, now_millis: i64) -> Result<()>;
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory PrinterRegistry for service and dispatcher tests
    #[derive(Default)]
    pub struct InMemoryPrinterRegistry {
        printers: Mutex<HashMap<PrinterId, PrinterConfig>>,
    }

    impl InMemoryPrinterRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        fn missing(id: &PrinterId) -> AppError {
            AppError::NotFound(format!("Printer {} not found", id))
        }

        fn address_in_use(printers: &HashMap<PrinterId, PrinterConfig>, candidate: &PrinterConfig) -> bool {
            printers
                .values()
                .any(|p| p.active && p.id != candidate.id && p.address == candidate.address)
        }
    }

    #[async_trait]
    impl PrinterRegistry for InMemoryPrinterRegistry {
        async fn insert(&self, printer: &PrinterConfig) -> Result<()> {
            let mut printers = self.printers.lock().unwrap();
            if printer.active && Self::address_in_use(&printers, printer) {
                return Err(AppError::Conflict(format!(
                    "address {} already registered to an active printer",
                    printer.address
                )));
            }
            printers.insert(printer.id.clone(), printer.clone());
            Ok(())
        }

        async fn get(&self, id: &PrinterId) -> Result<Option<PrinterConfig>> {
            Ok(self.printers.lock().unwrap().get(id).cloned())
        }

        async fn list_active(&self) -> Result<Vec<PrinterConfig>> {
            Ok(self
                .printers
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.active)
                .cloned()
                .collect())
        }

        async fn list_all(&self) -> Result<Vec<PrinterConfig>> {
            Ok(self.printers.lock().unwrap().values().cloned().collect())
        }

        async fn deactivate(&self, id: &PrinterId) -> Result<()> {
            let mut printers = self.printers.lock().unwrap();
            let printer = printers.get_mut(id).ok_or_else(|| Self::missing(id))?;
            printer.active = false;
            Ok(())
        }

        async fn activate(&self, id: &PrinterId) -> Result<()> {
            let mut printers = self.printers.lock().unwrap();
            let candidate = printers.get(id).cloned().ok_or_else(|| Self::missing(id))?;
            if Self::address_in_use(&printers, &candidate) {
                return Err(AppError::Conflict(format!(
                    "address {} already registered to an active printer",
                    candidate.address
                )));
            }
            printers.get_mut(id).unwrap().active = true;
            Ok(())
        }

        async fn touch_last_used(&self, id: &PrinterId, now_millis: i64) -> Result<()> {
            let mut printers = self.printers.lock().unwrap();
            let printer = printers.get_mut(id).ok_or_else(|| Self::missing(id))?;
            printer.last_used_at = Some(now_millis);
            Ok(())
        }
    }
}
