// HTTP Printer Transport
//
// Wire contract of the print proxy service:
//   GET  /health            -> { "status": "ok", ... }
//   POST /print             -> body { "port": <address>, "payload": <string> }
//                              reply { "success": bool, "error": string|null }
//   GET  /status?port=...   -> raw status JSON (operational tooling only)
//
// Timeouts are enforced client-side per attempt from the printer config. No
// reply within the timeout, connection refused and DNS failures classify as
// Retryable; an explicit service rejection classifies as Fatal.

use async_trait::async_trait;
use chitline_core::domain::{PrintPayload, PrinterConfig};
use chitline_core::error::{AppError, Result};
use chitline_core::port::{PrinterHealth, PrinterTransport, SendOutcome};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct PrintRequest<'a> {
    port: &'a str,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
struct PrintResponse {
    success: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// reqwest client for the print proxy service. One instance per process,
/// shared across all dispatch workers.
pub struct HttpPrinterTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPrinterTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn timeout_for(printer: &PrinterConfig) -> Duration {
        Duration::from_secs(printer.timeout_secs as u64)
    }
}

#[async_trait]
impl PrinterTransport for HttpPrinterTransport {
    async fn send(&self, printer: &PrinterConfig, payload: &PrintPayload) -> Result<SendOutcome> {
        let url = format!("{}/print", self.base_url);
        let body = PrintRequest {
            port: &printer.address,
            payload: payload.as_str(),
        };

        debug!(printer_id = %printer.id, address = %printer.address, "Sending print payload");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Self::timeout_for(printer))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return Ok(classify_request_error(&e)),
        };

        let status = response.status();
        match response.text().await {
            Ok(text) => Ok(outcome_from_response(status, &text)),
            Err(e) => Ok(SendOutcome::Retryable(format!(
                "failed to read print service reply: {}",
                e
            ))),
        }
    }

    async fn health_check(&self, printer: &PrinterConfig) -> Result<PrinterHealth> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Self::timeout_for(printer))
            .send()
            .await;

        let health = match response {
            Ok(r) if r.status().is_success() => match r.json::<HealthResponse>().await {
                Ok(h) if h.status == "ok" => PrinterHealth::Online,
                Ok(h) => {
                    warn!(printer_id = %printer.id, status = %h.status, "Print service degraded");
                    PrinterHealth::Offline
                }
                Err(_) => PrinterHealth::Offline,
            },
            Ok(r) => {
                warn!(printer_id = %printer.id, http_status = %r.status(), "Health check failed");
                PrinterHealth::Offline
            }
            Err(e) => {
                debug!(printer_id = %printer.id, error = %e, "Health check unreachable");
                PrinterHealth::Offline
            }
        };

        Ok(health)
    }

    async fn probe_status(&self, printer: &PrinterConfig) -> Result<serde_json::Value> {
        let url = format!("{}/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("port", printer.address.as_str())])
            .timeout(Self::timeout_for(printer))
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("status probe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "status probe returned {}",
                response.status()
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AppError::Transport(format!("unparseable status reply: {}", e)))
    }
}

/// Connection-level failures are all transient from the queue's perspective.
fn classify_request_error(err: &reqwest::Error) -> SendOutcome {
    if err.is_timeout() {
        SendOutcome::Retryable(format!("print service timed out: {}", err))
    } else if err.is_connect() {
        SendOutcome::Retryable(format!("print service unreachable: {}", err))
    } else {
        SendOutcome::Retryable(format!("print service request failed: {}", err))
    }
}

/// Map an HTTP reply to a dispatch outcome.
///
/// 2xx with `success=false` and any 4xx are application-level rejections:
/// retrying the identical payload cannot help, so they classify Fatal. 5xx
/// and unparseable replies are service-side trouble and stay Retryable.
fn outcome_from_response(status: StatusCode, body: &str) -> SendOutcome {
    if status.is_success() {
        return match serde_json::from_str::<PrintResponse>(body) {
            Ok(reply) if reply.success => SendOutcome::Accepted,
            Ok(reply) => SendOutcome::Fatal(
                reply
                    .error
                    .unwrap_or_else(|| "print rejected by service".to_string()),
            ),
            Err(e) => SendOutcome::Retryable(format!("unparseable print service reply: {}", e)),
        };
    }

    if status.is_client_error() {
        SendOutcome::Fatal(format!(
            "print service rejected request ({}): {}",
            status,
            body.trim()
        ))
    } else {
        SendOutcome::Retryable(format!(
            "print service error ({}): {}",
            status,
            body.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_reply_is_accepted() {
        let outcome = outcome_from_response(StatusCode::OK, r#"{"success": true, "error": null}"#);
        assert_eq!(outcome, SendOutcome::Accepted);
    }

    #[test]
    fn test_service_rejection_is_fatal_with_reason() {
        let outcome = outcome_from_response(
            StatusCode::OK,
            r#"{"success": false, "error": "malformed ESC/POS payload"}"#,
        );
        assert_eq!(
            outcome,
            SendOutcome::Fatal("malformed ESC/POS payload".to_string())
        );
    }

    #[test]
    fn test_client_error_is_fatal() {
        let outcome = outcome_from_response(StatusCode::BAD_REQUEST, "unknown port");
        assert!(matches!(outcome, SendOutcome::Fatal(_)));
    }

    #[test]
    fn test_server_error_is_retryable() {
        let outcome = outcome_from_response(StatusCode::BAD_GATEWAY, "proxy restarting");
        assert!(matches!(outcome, SendOutcome::Retryable(_)));
    }

    #[test]
    fn test_garbage_reply_is_retryable() {
        let outcome = outcome_from_response(StatusCode::OK, "<html>not json</html>");
        assert!(matches!(outcome, SendOutcome::Retryable(_)));
    }
}
