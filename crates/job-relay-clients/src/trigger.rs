//! Trigger.dev job executor client.
//!
//! Starts tasks through `POST {tasks_api}/tasks/{task}/trigger` and reads runs
//! through `GET {runs_api}/runs/{run}`. The credential is supplied per call as
//! a bearer token.

use crate::{endpoint, parse_base_url, ClientError};
use async_trait::async_trait;
use job_relay_core::{
    ApiKey, DispatchError, JobExecutor, JobHandle, JobName, JobRun, LookupError, RunId, RunStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Configuration for [`TriggerClient`]
///
/// # Examples
///
/// ```
/// use job_relay_clients::TriggerClientConfig;
///
/// let config = TriggerClientConfig::default()
///     .with_timeout_seconds(10)
///     .with_tasks_api_url("http://localhost:3030/api/v1");
/// assert_eq!(config.timeout_seconds, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerClientConfig {
    /// Base URL of the task API (trigger endpoint)
    pub tasks_api_url: String,

    /// Base URL of the run API (status endpoint)
    pub runs_api_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent string for API requests
    pub user_agent: String,
}

impl Default for TriggerClientConfig {
    fn default() -> Self {
        Self {
            tasks_api_url: "https://api.trigger.dev/api/v1".to_string(),
            runs_api_url: "https://api.trigger.dev/api/v3".to_string(),
            timeout_seconds: 30,
            user_agent: format!("job-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TriggerClientConfig {
    pub fn with_tasks_api_url(mut self, url: impl Into<String>) -> Self {
        self.tasks_api_url = url.into();
        self
    }

    pub fn with_runs_api_url(mut self, url: impl Into<String>) -> Self {
        self.runs_api_url = url.into();
        self
    }

    /// Point both APIs at one server, as local backends and test doubles do
    pub fn with_base_url(self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.with_tasks_api_url(format!("{}/api/v1", base))
            .with_runs_api_url(format!("{}/api/v3", base))
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    id: String,
    #[serde(rename = "publicAccessToken", default)]
    public_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
    status: RunStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// HTTP [`JobExecutor`] for Trigger.dev
#[derive(Clone)]
pub struct TriggerClient {
    http_client: reqwest::Client,
    tasks_api: Url,
    runs_api: Url,
    config: TriggerClientConfig,
}

impl TriggerClient {
    /// Build a client
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for malformed base URLs or when the HTTP client
    /// cannot be created.
    pub fn new(config: TriggerClientConfig) -> Result<Self, ClientError> {
        let tasks_api = parse_base_url("trigger.tasks_api_url", &config.tasks_api_url)?;
        let runs_api = parse_base_url("trigger.runs_api_url", &config.runs_api_url)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            tasks_api,
            runs_api,
            config,
        })
    }

    pub fn config(&self) -> &TriggerClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for TriggerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerClient")
            .field("tasks_api", &self.tasks_api.as_str())
            .field("runs_api", &self.runs_api.as_str())
            .finish()
    }
}

#[async_trait]
impl JobExecutor for TriggerClient {
    #[instrument(skip_all, fields(job = %job))]
    async fn trigger(
        &self,
        credential: &ApiKey,
        job: &JobName,
        payload: &Value,
    ) -> Result<JobHandle, DispatchError> {
        let url = endpoint(&self.tasks_api, &["tasks", job.as_str(), "trigger"]);

        let response = self
            .http_client
            .post(url)
            .bearer_auth(credential.expose())
            .json(&json!({ "payload": payload }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timeout = e.is_timeout(), "Trigger request failed");
                DispatchError::Unreachable {
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let started = response
            .json::<TriggerResponse>()
            .await
            .map_err(|e| DispatchError::InvalidResponse {
                message: format!("Failed to parse trigger response: {}", e),
            })?;

        debug!(run_id = %started.id, "Run started");

        Ok(JobHandle::new(
            RunId::new(started.id),
            started.public_access_token,
        ))
    }

    #[instrument(skip_all, fields(run_id = %run_id))]
    async fn retrieve(&self, credential: &ApiKey, run_id: &RunId) -> Result<JobRun, LookupError> {
        let url = endpoint(&self.runs_api, &["runs", run_id.as_str()]);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(|e| LookupError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::RunNotFound {
                run_id: run_id.clone(),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(LookupError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let run = response
            .json::<RunResponse>()
            .await
            .map_err(|e| LookupError::InvalidResponse {
                message: format!("Failed to parse run response: {}", e),
            })?;

        Ok(JobRun::new(
            RunId::new(run.id),
            run.status,
            run.output,
            run.error,
        ))
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
