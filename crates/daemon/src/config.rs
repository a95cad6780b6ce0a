//! Daemon configuration
//!
//! Built ONCE from the environment at service start and immutable
//! thereafter. Reconfiguration means a restart - no component reads the
//! environment after this struct exists.

use chitline_core::application::dispatcher::constants::{
    DEFAULT_FATAL_RETRY_DELAY_MS, DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_STALE_AFTER_MS,
};

const DEFAULT_DB_PATH: &str = "~/.chitline/chitline.db";
const DEFAULT_RPC_PORT: u16 = 9517;
const DEFAULT_PRINT_SERVICE_URL: &str = "http://127.0.0.1:8043";
const DEFAULT_STALE_SWEEP_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub rpc_port: u16,
    pub print_service_url: String,

    /// Worker pool size override. Default: active printers + 2 floaters.
    pub workers: Option<usize>,

    pub retry_base_delay_ms: i64,
    pub retry_backoff_factor: f64,
    pub retry_max_delay_ms: i64,
    pub fatal_retry_delay_ms: i64,

    pub stale_after_ms: i64,
    pub stale_sweep_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("CHITLINE_DB_PATH")
                .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned()),
            rpc_port: env_parse("CHITLINE_RPC_PORT").unwrap_or(DEFAULT_RPC_PORT),
            print_service_url: std::env::var("CHITLINE_PRINT_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_PRINT_SERVICE_URL.to_string()),
            workers: env_parse("CHITLINE_WORKERS"),
            retry_base_delay_ms: env_parse("CHITLINE_RETRY_BASE_DELAY_MS")
                .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_backoff_factor: env_parse("CHITLINE_RETRY_BACKOFF_FACTOR")
                .unwrap_or(DEFAULT_RETRY_BACKOFF_FACTOR),
            retry_max_delay_ms: env_parse("CHITLINE_RETRY_MAX_DELAY_MS")
                .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
            fatal_retry_delay_ms: env_parse("CHITLINE_FATAL_RETRY_DELAY_MS")
                .unwrap_or(DEFAULT_FATAL_RETRY_DELAY_MS),
            stale_after_ms: env_parse("CHITLINE_STALE_AFTER_MS").unwrap_or(DEFAULT_STALE_AFTER_MS),
            stale_sweep_secs: env_parse("CHITLINE_STALE_SWEEP_SECS")
                .unwrap_or(DEFAULT_STALE_SWEEP_SECS),
        }
    }
}
