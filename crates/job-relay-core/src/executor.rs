//! # Job Executor Gateway
//!
//! Interface to the external job-execution backend.
//!
//! The backend starts named jobs asynchronously and reports the state of
//! each run. Every call carries the credential selected for the current
//! request; implementations must not cache or share it between calls.
//!
//! The dispatcher never retries a failed call. Retries, if any, happen inside
//! the backend according to its own [`BackendRetryPolicy`].

use crate::{ApiKey, ConfigurationError, JobName, RunId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Handle returned when a run has been started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub run_id: RunId,
    pub public_access_token: Option<String>,
}

impl JobHandle {
    pub fn new(run_id: RunId, public_access_token: Option<String>) -> Self {
        Self {
            run_id,
            public_access_token,
        }
    }
}

// ============================================================================
// Run Status
// ============================================================================

/// Status of a run as reported by the backend
///
/// Statuses the backend may add in future are kept verbatim in
/// [`RunStatus::Other`] and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Pending,
    Queued,
    Executing,
    Reattempting,
    Delayed,
    Completed,
    Canceled,
    Failed,
    Crashed,
    SystemFailure,
    Other(String),
}

impl RunStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "PENDING" => Self::Pending,
            "QUEUED" => Self::Queued,
            "EXECUTING" => Self::Executing,
            "REATTEMPTING" => Self::Reattempting,
            "DELAYED" => Self::Delayed,
            "COMPLETED" => Self::Completed,
            "CANCELED" => Self::Canceled,
            "FAILED" => Self::Failed,
            "CRASHED" => Self::Crashed,
            "SYSTEM_FAILURE" => Self::SystemFailure,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Executing => "EXECUTING",
            Self::Reattempting => "REATTEMPTING",
            Self::Delayed => "DELAYED",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Crashed => "CRASHED",
            Self::SystemFailure => "SYSTEM_FAILURE",
            Self::Other(value) => value,
        }
    }

    /// Whether no further state change can occur
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Crashed | Self::SystemFailure
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Snapshot of one run
///
/// `output` is only kept for completed runs and `error` only for runs that
/// ended in any other terminal status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: RunId,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JobRun {
    pub fn new(id: RunId, status: RunStatus, output: Option<Value>, error: Option<Value>) -> Self {
        let output = output.filter(|_| status.is_success());
        let error = error.filter(|_| status.is_terminal() && !status.is_success());
        Self {
            id,
            status,
            output,
            error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure to start a run (500, not retried by the dispatcher)
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown job: {job}")]
    UnknownJob { job: String },

    #[error("Trigger API error ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Job backend unreachable: {message}")]
    Unreachable { message: String },

    #[error("Unexpected trigger response: {message}")]
    InvalidResponse { message: String },
}

impl DispatchError {
    /// Check if the failure might succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::UnknownJob { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

/// Failure to read the state of a run
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: RunId },

    #[error("Failed to retrieve run status: {status}")]
    Rejected { status: u16, body: String },

    #[error("Job backend unreachable: {message}")]
    Unreachable { message: String },

    #[error("Unexpected run response: {message}")]
    InvalidResponse { message: String },
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Interface for starting and observing runs on the execution backend
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Start `job` with `payload` under `credential`
    async fn trigger(
        &self,
        credential: &ApiKey,
        job: &JobName,
        payload: &Value,
    ) -> Result<JobHandle, DispatchError>;

    /// Read the current state of a run
    async fn retrieve(&self, credential: &ApiKey, run_id: &RunId) -> Result<JobRun, LookupError>;
}

// ============================================================================
// Backend Retry Policy
// ============================================================================

/// Retry behaviour the execution backend applies to a failing run
///
/// The dispatcher does not retry on its own; this describes what the backend
/// is expected to do before it marks a run `FAILED` or `CRASHED`, so the wait
/// budget can be sized against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendRetryPolicy {
    /// Maximum attempts per run, including the first
    pub max_attempts: u32,

    /// Minimum delay between attempts in milliseconds
    pub min_timeout_ms: u64,

    /// Maximum delay between attempts in milliseconds
    pub max_timeout_ms: u64,

    /// Exponential growth factor
    pub factor: f64,

    /// Randomize each delay by a factor in `[1, 2)`
    pub randomize: bool,
}

impl Default for BackendRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_timeout_ms: 1_000,
            max_timeout_ms: 10_000,
            factor: 2.0,
            randomize: true,
        }
    }
}

impl BackendRetryPolicy {
    pub fn without_randomization(mut self) -> Self {
        self.randomize = false;
        self
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// `min * factor^(retry - 1)`, capped at the maximum, then multiplied by a
    /// random factor in `[1, 2)` when randomization is enabled.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.min_timeout_ms as f64 * self.factor.powi(exponent);
        let capped = base.min(self.max_timeout_ms as f64);

        let millis = if self.randomize {
            capped * rand::random_range(1.0..2.0)
        } else {
            capped
        };

        Duration::from_secs_f64(millis.max(0.0) / 1000.0)
    }

    /// Longest time the backend can spend sleeping between attempts of one run
    pub fn worst_case_backoff(&self) -> Duration {
        let spread = if self.randomize { 2.0 } else { 1.0 };
        (1..self.max_attempts)
            .map(|retry| {
                let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
                let base = self.min_timeout_ms as f64 * self.factor.powi(exponent);
                Duration::from_secs_f64(base.min(self.max_timeout_ms as f64) * spread / 1000.0)
            })
            .sum()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err(invalid("factor", "must be a finite value of at least 1.0"));
        }
        if self.min_timeout_ms > self.max_timeout_ms {
            return Err(invalid(
                "min_timeout_ms",
                "must not exceed max_timeout_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        key: format!("backend_retry.{}", field),
        message: message.to_string(),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
