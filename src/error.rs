//! Error taxonomy for the model client and the relay's HTTP mapping.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Failures talking to an upstream HTTP service (Ollama for the relay, the relay for the CLI).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("stream interrupted: {0}")]
    StreamTransport(String),

    /// The upstream refused the request as invalid; retrying it unchanged will not help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::UpstreamUnavailable(_) => "upstream_unavailable",
            ClientError::UpstreamError(_) => "upstream_error",
            ClientError::Timeout(_) => "timeout",
            ClientError::StreamTransport(_) => "stream_transport_error",
            ClientError::Rejected(_) => "validation_error",
        }
    }

    /// Classify a reqwest failure raised before any response bytes were read.
    pub fn from_send(err: reqwest::Error, timeout: Option<Duration>) -> Self {
        if err.is_connect() {
            return ClientError::UpstreamUnavailable(err.to_string());
        }
        match timeout {
            Some(limit) if err.is_timeout() => ClientError::Timeout(limit),
            _ if err.is_timeout() => ClientError::UpstreamUnavailable(err.to_string()),
            _ => ClientError::UpstreamError(err.to_string()),
        }
    }
}

/// Errors returned by relay handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Client(ClientError::Rejected(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Client(ClientError::UpstreamUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Client(ClientError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Client(ClientError::UpstreamError(_) | ClientError::StreamTransport(_)) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match &self {
            AppError::Validation(msg) => ("validation_error", msg.clone()),
            AppError::Client(err) => (err.kind(), format!("Failed to generate response: {err}")),
        };

        if status.is_server_error() {
            tracing::warn!(%status, kind, %message, "chat request failed");
        }

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
