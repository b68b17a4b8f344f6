//! Common test utilities for job-relay-api integration tests
//!
//! This module provides:
//! - A recording [`JobExecutor`] mock with scripted run statuses
//! - Builders for application state with fast polling
//! - Request helpers for driving the router with `oneshot`

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use job_relay_api::{create_router, AppState, ServiceConfig};
use job_relay_core::{
    ApiKey, CredentialScope, DispatchError, JobExecutor, JobHandle, JobName, JobRun, LookupError,
    PollPolicy, RunId, RunStatus, SecretValidator,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Mock Job Executor
// ============================================================================

/// A trigger call as seen by the executor
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub struct RecordedTrigger {
    pub job: String,
    pub credential: String,
    pub payload: Value,
}

/// Executor that records every call and replays a status script
///
/// Every run follows the same script; the last status repeats. A trigger
/// delay can be set to force concurrent requests to overlap.
#[derive(Clone)]
#[allow(dead_code)]
pub struct RecordingExecutor {
    triggers: Arc<Mutex<Vec<RecordedTrigger>>>,
    lookups: Arc<Mutex<Vec<(String, String)>>>,
    statuses: Arc<Mutex<Vec<RunStatus>>>,
    output: Arc<Mutex<Option<Value>>>,
    error: Arc<Mutex<Option<Value>>>,
    trigger_delay: Arc<Mutex<Option<Duration>>>,
    trigger_failure: Arc<Mutex<Option<DispatchError>>>,
}

#[allow(dead_code)]
impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            triggers: Arc::new(Mutex::new(Vec::new())),
            lookups: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(vec![RunStatus::Completed])),
            output: Arc::new(Mutex::new(None)),
            error: Arc::new(Mutex::new(None)),
            trigger_delay: Arc::new(Mutex::new(None)),
            trigger_failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_statuses(&self, statuses: Vec<RunStatus>) {
        *self.statuses.lock().unwrap() = statuses;
    }

    pub fn set_output(&self, output: Value) {
        *self.output.lock().unwrap() = Some(output);
    }

    pub fn set_error(&self, error: Value) {
        *self.error.lock().unwrap() = Some(error);
    }

    pub fn set_trigger_delay(&self, delay: Duration) {
        *self.trigger_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_trigger_failure(&self, error: DispatchError) {
        *self.trigger_failure.lock().unwrap() = Some(error);
    }

    pub fn triggers(&self) -> Vec<RecordedTrigger> {
        self.triggers.lock().unwrap().clone()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    /// Credentials used for status lookups, in order
    pub fn lookup_credentials(&self) -> Vec<String> {
        self.lookups
            .lock()
            .unwrap()
            .iter()
            .map(|(_, credential)| credential.clone())
            .collect()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn trigger(
        &self,
        credential: &ApiKey,
        job: &JobName,
        payload: &Value,
    ) -> Result<JobHandle, DispatchError> {
        let run_number = {
            let mut triggers = self.triggers.lock().unwrap();
            triggers.push(RecordedTrigger {
                job: job.to_string(),
                credential: credential.expose().to_string(),
                payload: payload.clone(),
            });
            triggers.len()
        };

        let delay = *self.trigger_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.trigger_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let run_id = RunId::new(format!("run_{}", run_number));
        Ok(JobHandle::new(run_id, Some(format!("pat_{}", run_number))))
    }

    async fn retrieve(&self, credential: &ApiKey, run_id: &RunId) -> Result<JobRun, LookupError> {
        let check = {
            let mut lookups = self.lookups.lock().unwrap();
            lookups.push((run_id.to_string(), credential.expose().to_string()));
            lookups
                .iter()
                .filter(|(id, _)| id == run_id.as_str())
                .count()
                - 1
        };

        let statuses = self.statuses.lock().unwrap().clone();
        let status = statuses
            .get(check)
            .or_else(|| statuses.last())
            .cloned()
            .unwrap_or(RunStatus::Pending);

        Ok(JobRun::new(
            run_id.clone(),
            status,
            self.output.lock().unwrap().clone(),
            self.error.lock().unwrap().clone(),
        ))
    }
}

// ============================================================================
// State builders
// ============================================================================

/// Poll policy with millisecond intervals and no jitter
#[allow(dead_code)]
pub fn fast_poll_policy() -> PollPolicy {
    PollPolicy {
        initial_interval_ms: 10,
        max_interval_ms: 50,
        multiplier: 1.5,
        max_wait_seconds: 5,
        jitter_percent: 0.0,
        tolerate_not_found: true,
    }
}

#[allow(dead_code)]
pub fn both_credentials() -> CredentialScope {
    CredentialScope::new(ApiKey::new("tr_prod_key"), ApiKey::new("tr_staging_key"))
}

/// Router with fast polling around `executor`
#[allow(dead_code)]
pub fn build_app(
    executor: Arc<dyn JobExecutor>,
    validator: SecretValidator,
    credentials: CredentialScope,
) -> Router {
    create_router(build_state(executor, validator, credentials, fast_poll_policy()))
}

#[allow(dead_code)]
pub fn build_state(
    executor: Arc<dyn JobExecutor>,
    validator: SecretValidator,
    credentials: CredentialScope,
    poll: PollPolicy,
) -> AppState {
    let mut config = ServiceConfig::default();
    config.dispatch.poll = poll;
    AppState::new(config, validator, credentials, executor)
}

// ============================================================================
// Request helpers
// ============================================================================

/// POST `body` to `uri` and return the status and JSON body
#[allow(dead_code)]
pub async fn post_webhook(app: Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap();
    send(app, request).await
}

#[allow(dead_code)]
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
