//! Per-request relay errors and their HTTP rendering
//!
//! Upstream failures that happen before any bytes reach the caller become a
//! JSON error response. Failures after streaming began cannot change the
//! status that was already sent; they abort the outbound body instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur while relaying one request
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// Inbound body is not a generation request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream could not be reached, or answered with a non-success status
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { status: StatusCode, message: String },

    /// Upstream body failed after the relay started streaming it
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Buffered upstream body was not JSON
    #[error("Invalid upstream response: {0}")]
    InvalidUpstreamBody(String),
}

impl ProxyError {
    /// Build the error for a failed upstream round trip
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("Upstream request timed out: {err}")
        } else if err.is_connect() {
            format!("Failed to connect to upstream: {err}")
        } else {
            format!("Upstream request failed: {err}")
        };

        ProxyError::UpstreamUnavailable {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message,
        }
    }

    /// Build the error for a non-success upstream status.
    ///
    /// Ollama reports failures as `{"error": "..."}`; that message is kept
    /// when present, otherwise the raw body, otherwise the status itself.
    pub fn from_upstream_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| format!("Upstream returned {status}"));

        ProxyError::UpstreamUnavailable { status, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable { status, .. } => *status,
            ProxyError::StreamInterrupted(_) | ProxyError::InvalidUpstreamBody(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Human-readable message placed in the `error` field
    pub fn message(&self) -> String {
        match self {
            ProxyError::UpstreamUnavailable { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "request",
            ProxyError::UpstreamUnavailable { .. } => "upstream",
            ProxyError::StreamInterrupted(_) => "stream",
            ProxyError::InvalidUpstreamBody(_) => "upstream_body",
        }
    }

    pub fn log(&self) {
        match self {
            ProxyError::InvalidRequest(_) => warn!(
                error_type = self.category(),
                error_message = %self,
                "Rejected inbound request"
            ),
            _ => error!(
                error_type = self.category(),
                status = %self.status(),
                error_message = %self,
                "Relay failed"
            ),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message() });
        (self.status(), Json(body)).into_response()
    }
}
