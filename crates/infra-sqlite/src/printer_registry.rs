// SQLite PrinterRegistry Implementation

use crate::job_store::map_sqlx_error;
use async_trait::async_trait;
use chitline_core::domain::{PrinterConfig, PrinterId};
use chitline_core::error::{AppError, Result};
use chitline_core::port::PrinterRegistry;
use sqlx::SqlitePool;

/// Printer configuration rows. The partial unique index on
/// `printers(address) WHERE active = 1` is what enforces the
/// one-active-printer-per-address rule; violations surface as `Conflict`.
pub struct SqlitePrinterRegistry {
    pool: SqlitePool,
}

impl SqlitePrinterRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn missing(id: &PrinterId) -> AppError {
        AppError::NotFound(format!("Printer {} not found", id))
    }
}

#[async_trait]
impl PrinterRegistry for SqlitePrinterRegistry {
    async fn insert(&self, printer: &PrinterConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO printers (
                id, name, address, active, max_attempts, timeout_secs,
                last_used_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&printer.id)
        .bind(&printer.name)
        .bind(&printer.address)
        .bind(if printer.active { 1 } else { 0 })
        .bind(printer.max_attempts)
        .bind(printer.timeout_secs as i64)
        .bind(printer.last_used_at)
        .bind(printer.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, id: &PrinterId) -> Result<Option<PrinterConfig>> {
        let row = sqlx::query_as::<_, PrinterRow>("SELECT * FROM printers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_printer()))
    }

    async fn list_active(&self) -> Result<Vec<PrinterConfig>> {
        let rows: Vec<PrinterRow> =
            sqlx::query_as("SELECT * FROM printers WHERE active = 1")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_printer()).collect())
    }

    async fn list_all(&self) -> Result<Vec<PrinterConfig>> {
        let rows: Vec<PrinterRow> =
            sqlx::query_as("SELECT * FROM printers ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_printer()).collect())
    }

    async fn deactivate(&self, id: &PrinterId) -> Result<()> {
        let result = sqlx::query("UPDATE printers SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(Self::missing(id));
        }
        Ok(())
    }

    async fn activate(&self, id: &PrinterId) -> Result<()> {
        // The partial unique index re-checks the address conflict here: a
        // second active printer on the same address fails the UPDATE.
        let result = sqlx::query("UPDATE printers SET active = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(Self::missing(id));
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: &PrinterId, now_millis: i64) -> Result<()> {
        let result = sqlx::query("UPDATE printers SET last_used_at = ? WHERE id = ?")
            .bind(now_millis)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(Self::missing(id));
        }
        Ok(())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct PrinterRow {
    id: String,
    name: String,
    address: String,
    active: i32, // SQLite boolean as integer
    max_attempts: i32,
    timeout_secs: i64,
    last_used_at: Option<i64>,
    created_at: i64,
}

impl PrinterRow {
    fn into_printer(self) -> PrinterConfig {
        PrinterConfig {
            id: self.id,
            name: self.name,
            address: self.address,
            active: self.active != 0,
            max_attempts: self.max_attempts,
            timeout_secs: self.timeout_secs as u32,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use chitline_core::domain::PrinterSpec;

    async fn setup() -> SqlitePrinterRegistry {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlitePrinterRegistry::new(pool)
    }

    fn printer(id: &str, address: &str) -> PrinterConfig {
        PrinterConfig::new(
            id,
            1000,
            PrinterSpec {
                name: format!("Printer {}", id),
                address: address.to_string(),
                max_attempts: 3,
                timeout_secs: 10,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = setup().await;
        registry.insert(&printer("p-1", "/dev/usb/lp0")).await.unwrap();

        let found = registry.get(&"p-1".to_string()).await.unwrap().unwrap();
        assert_eq!(found.address, "/dev/usb/lp0");
        assert!(found.active);
    }

    #[tokio::test]
    async fn test_duplicate_active_address_conflicts() {
        let registry = setup().await;
        registry.insert(&printer("p-1", "192.168.1.50:9100")).await.unwrap();

        let err = registry
            .insert(&printer("p-2", "192.168.1.50:9100"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deactivated_address_can_be_reused() {
        let registry = setup().await;
        registry.insert(&printer("p-1", "192.168.1.50:9100")).await.unwrap();
        registry.deactivate(&"p-1".to_string()).await.unwrap();

        // Address freed by deactivation
        registry.insert(&printer("p-2", "192.168.1.50:9100")).await.unwrap();

        // Re-activating p-1 now collides with p-2
        let err = registry.activate(&"p-1".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_active_excludes_deactivated() {
        let registry = setup().await;
        registry.insert(&printer("p-1", "/dev/usb/lp0")).await.unwrap();
        registry.insert(&printer("p-2", "/dev/usb/lp1")).await.unwrap();
        registry.deactivate(&"p-2".to_string()).await.unwrap();

        let active = registry.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "p-1");

        assert_eq!(registry.list_all().await.unwrap().len(), 2);
    }
}
