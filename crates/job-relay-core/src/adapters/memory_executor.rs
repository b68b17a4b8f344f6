//! # In-Memory Job Executor
//!
//! Scripted [`JobExecutor`] for tests and local runs.
//!
//! Each registered job carries a [`RunScript`]: the sequence of statuses a
//! run reports on successive `retrieve` calls, plus the output or error it
//! ends with. The last status repeats once the script is exhausted.

use crate::{
    ApiKey, DispatchError, JobExecutor, JobHandle, JobName, JobRun, LookupError, RunId, RunStatus,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Status sequence and final result of a scripted run
#[derive(Debug, Clone, PartialEq)]
pub struct RunScript {
    statuses: Vec<RunStatus>,
    output: Option<Value>,
    error: Option<Value>,
}

impl RunScript {
    /// Run that reports the given statuses in order
    pub fn progressing(statuses: Vec<RunStatus>) -> Self {
        Self {
            statuses,
            output: None,
            error: None,
        }
    }

    /// Run that is already complete on the first check
    pub fn completes_with(output: Value) -> Self {
        Self::progressing(vec![RunStatus::Completed]).with_output(output)
    }

    /// Run that never leaves `EXECUTING`
    pub fn never_finishes() -> Self {
        Self::progressing(vec![RunStatus::Executing])
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    fn status_at(&self, check: usize) -> RunStatus {
        self.statuses
            .get(check)
            .or_else(|| self.statuses.last())
            .cloned()
            .unwrap_or(RunStatus::Pending)
    }
}

/// A recorded `trigger` call
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCall {
    pub job: String,
    pub credential: String,
    pub payload: Value,
}

#[derive(Debug)]
struct ScriptedRun {
    script: RunScript,
    checks: usize,
}

#[derive(Debug, Default)]
struct ExecutorState {
    jobs: HashMap<String, RunScript>,
    runs: HashMap<RunId, ScriptedRun>,
    triggers: Vec<TriggerCall>,
    lookups: Vec<RunId>,
    trigger_failure: Option<DispatchError>,
    next_run: u64,
}

/// In-memory [`JobExecutor`]
///
/// ```rust
/// use job_relay_core::adapters::{InMemoryJobExecutor, RunScript};
/// use job_relay_core::{ApiKey, JobExecutor, JobName, RunStatus};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let executor = InMemoryJobExecutor::new()
///     .with_job("hello", RunScript::completes_with(json!({"ok": true})));
/// let credential = ApiKey::new("tr_dev").unwrap();
/// let job = JobName::new("hello").unwrap();
///
/// let handle = executor.trigger(&credential, &job, &json!({})).await.unwrap();
/// let run = executor.retrieve(&credential, &handle.run_id).await.unwrap();
///
/// assert_eq!(run.status, RunStatus::Completed);
/// assert_eq!(run.output, Some(json!({"ok": true})));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl InMemoryJobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and the script its runs follow
    pub fn with_job(self, job: impl Into<String>, script: RunScript) -> Self {
        self.lock().jobs.insert(job.into(), script);
        self
    }

    /// Make every trigger call fail with `error`
    pub fn with_trigger_failure(self, error: DispatchError) -> Self {
        self.lock().trigger_failure = Some(error);
        self
    }

    /// Recorded trigger calls in arrival order
    pub fn trigger_calls(&self) -> Vec<TriggerCall> {
        self.lock().triggers.clone()
    }

    pub fn trigger_count(&self) -> usize {
        self.lock().triggers.len()
    }

    /// Number of `retrieve` calls for one run
    pub fn lookup_count(&self, run_id: &RunId) -> usize {
        self.lock().lookups.iter().filter(|id| *id == run_id).count()
    }

    pub fn total_lookups(&self) -> usize {
        self.lock().lookups.len()
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobExecutor for InMemoryJobExecutor {
    async fn trigger(
        &self,
        credential: &ApiKey,
        job: &JobName,
        payload: &Value,
    ) -> Result<JobHandle, DispatchError> {
        let mut state = self.lock();
        state.triggers.push(TriggerCall {
            job: job.to_string(),
            credential: credential.expose().to_string(),
            payload: payload.clone(),
        });

        if let Some(error) = &state.trigger_failure {
            return Err(error.clone());
        }

        let script = state
            .jobs
            .get(job.as_str())
            .cloned()
            .ok_or_else(|| DispatchError::UnknownJob {
                job: job.to_string(),
            })?;

        state.next_run += 1;
        let run_id = RunId::new(format!("run_{:04}", state.next_run));
        state.runs.insert(
            run_id.clone(),
            ScriptedRun {
                script,
                checks: 0,
            },
        );

        Ok(JobHandle::new(
            run_id.clone(),
            Some(format!("pat_{}", run_id)),
        ))
    }

    async fn retrieve(&self, _credential: &ApiKey, run_id: &RunId) -> Result<JobRun, LookupError> {
        let mut state = self.lock();
        state.lookups.push(run_id.clone());

        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| LookupError::RunNotFound {
                run_id: run_id.clone(),
            })?;

        let status = run.script.status_at(run.checks);
        run.checks += 1;

        Ok(JobRun::new(
            run_id.clone(),
            status,
            run.script.output.clone(),
            run.script.error.clone(),
        ))
    }
}

#[cfg(test)]
#[path = "memory_executor_tests.rs"]
mod tests;
