//! Response bodies for the webhook and health endpoints.
//!
//! Webhook bodies use camelCase field names (`triggerId`, `runId`,
//! `publicAccessToken`).

use chrono::{DateTime, Utc};
use job_relay_core::{JobName, RunId, RunStatus};
use serde::Serialize;
use serde_json::Value;

/// Body returned when a run was started in async mode
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedResponse {
    pub success: bool,
    pub trigger_id: JobName,
    pub run_id: RunId,
    pub public_access_token: Option<String>,
}

/// Body returned when a sync run completed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompletedResponse {
    pub success: bool,
    pub trigger_id: JobName,
    pub run_id: RunId,
    pub output: Option<Value>,
}

/// Body returned when a sync run ended in a non-success terminal status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailedResponse {
    pub success: bool,
    pub trigger_id: JobName,
    pub run_id: RunId,
    pub status: RunStatus,
    pub error: Option<Value>,
}

/// JSON error body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<JobName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            trigger_id: None,
            run_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_run(mut self, trigger_id: JobName, run_id: RunId) -> Self {
        self.trigger_id = Some(trigger_id);
        self.run_id = Some(run_id);
        self
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}
