// Printer Configuration Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Printer ID (UUID v4)
pub type PrinterId = String;

/// Registration request for a new printer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSpec {
    pub name: String,
    /// Serial/USB device path (`/dev/usb/lp0`) or network `host:port`,
    /// forwarded verbatim to the print proxy as the target port identifier.
    pub address: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
}

fn default_max_attempts() -> i32 {
    3
}

fn default_timeout_secs() -> u32 {
    10
}

impl PrinterSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("printer name is empty".into()));
        }
        if self.address.trim().is_empty() {
            return Err(DomainError::Validation("printer address is empty".into()));
        }
        if self.max_attempts < 1 {
            return Err(DomainError::Validation(format!(
                "max_attempts must be >= 1, got {}",
                self.max_attempts
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DomainError::Validation("timeout_secs must be >= 1".into()));
        }
        Ok(())
    }
}

/// Printer Configuration Entity
///
/// Created and edited by configuration management; referenced, never owned,
/// by jobs. Constructed once and treated as immutable by the dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub id: PrinterId,
    pub name: String,
    /// Unique among ACTIVE printers
    pub address: String,
    pub active: bool,

    /// Attempt cap copied onto each job at enqueue
    pub max_attempts: i32,
    /// Per-attempt transport timeout
    pub timeout_secs: u32,

    /// Advisory, for health dashboards only
    pub last_used_at: Option<i64>,
    pub created_at: i64, // epoch ms
}

impl PrinterConfig {
    pub fn new(id: impl Into<String>, created_at: i64, spec: PrinterSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            id: id.into(),
            name: spec.name,
            address: spec.address,
            active: true,
            max_attempts: spec.max_attempts,
            timeout_secs: spec.timeout_secs,
            last_used_at: None,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, address: &str) -> PrinterSpec {
        PrinterSpec {
            name: name.to_string(),
            address: address.to_string(),
            max_attempts: 3,
            timeout_secs: 10,
        }
    }

    #[test]
    fn test_new_printer_is_active() {
        let printer = PrinterConfig::new("p-1", 1000, spec("Kitchen", "/dev/usb/lp0")).unwrap();
        assert!(printer.active);
        assert_eq!(printer.max_attempts, 3);
        assert!(printer.last_used_at.is_none());
    }

    #[test]
    fn test_spec_validation() {
        assert!(spec("", "/dev/usb/lp0").validate().is_err());
        assert!(spec("Bar", "  ").validate().is_err());

        let mut bad_cap = spec("Bar", "192.168.1.50:9100");
        bad_cap.max_attempts = 0;
        assert!(bad_cap.validate().is_err());

        assert!(spec("Bar", "192.168.1.50:9100").validate().is_ok());
    }
}
