//! Error types for the HTTP service

use crate::responses::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use job_relay_core::{
    AuthorizationError, ConfigurationError, DispatchError, JobName, RunId, ValidationError,
    WaitError,
};
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: unknown environment, invalid job name, body that is
///   not valid UTF-8
/// - `401 Unauthorized`: webhook secret missing or wrong
/// - `500 Internal Server Error`: missing credential, trigger failure, failed
///   status lookup during a sync wait
/// - `503 Service Unavailable`: sync wait cancelled by shutdown
/// - `504 Gateway Timeout`: sync wait budget exhausted
///
/// Every variant renders as `{success: false, error, timestamp}`; wait
/// failures also carry `triggerId` and `runId` because the run was started.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),

    #[error(transparent)]
    MissingConfiguration(#[from] ConfigurationError),

    #[error(transparent)]
    DispatchFailed(#[from] DispatchError),

    /// The run started but waiting for it did not produce a terminal status
    #[error("{source}")]
    WaitFailed {
        trigger_id: JobName,
        run_id: RunId,
        source: WaitError,
    },
}

impl WebhookHandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingConfiguration(_) | Self::DispatchFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::WaitFailed { source, .. } => match source {
                WaitError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                WaitError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
                WaitError::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = %status, error = %message, "Webhook request failed");
        } else {
            warn!(status = %status, error = %message, "Webhook request rejected");
        }

        let body = match self {
            Self::WaitFailed {
                trigger_id, run_id, ..
            } => ErrorResponse::new(message).for_run(trigger_id, run_id),
            _ => ErrorResponse::new(message),
        };

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for the service binary
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::BindFailed { .. } => 2,
            Self::ServerFailed { .. } => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {message}")]
    Loading { message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
