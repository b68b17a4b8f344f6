//! # Run Waiter
//!
//! Bridges a synchronous webhook to an asynchronous run by polling the
//! executor until the run reaches a terminal status.
//!
//! # Polling Strategy
//!
//! - **First check**: immediately after the run was started
//! - **Backoff**: `initial * multiplier^n` between checks, capped at `max_interval`
//! - **Jitter**: ±`jitter_percent` applied to each interval
//! - **Budget**: the whole wait is bounded by `max_wait_seconds`
//! - **Cancellation**: a [`CancellationToken`] ends the wait early, e.g. on shutdown
//!
//! Sleeping suspends only the waiting request's task.

use crate::{ApiKey, ConfigurationError, JobExecutor, JobRun, LookupError, RunId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default delay before the second status check (1 second).
const DEFAULT_INITIAL_INTERVAL_MS: u64 = 1_000;

/// Default cap on the delay between checks (5 seconds).
const DEFAULT_MAX_INTERVAL_MS: u64 = 5_000;

/// Default wait budget (5 minutes).
const DEFAULT_MAX_WAIT_SECS: u64 = 300;

/// Backoff and budget for waiting on a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay after the first check, in milliseconds
    pub initial_interval_ms: u64,

    /// Upper bound for the delay between checks, in milliseconds
    pub max_interval_ms: u64,

    /// Growth factor applied to the delay after every check
    pub multiplier: f64,

    /// Total time a request may wait for a terminal status, in seconds
    pub max_wait_seconds: u64,

    /// Jitter range as a fraction of the delay (0.0 to 1.0)
    pub jitter_percent: f64,

    /// Keep polling when the backend does not know the run yet
    ///
    /// A freshly started run can briefly be invisible to the status API.
    pub tolerate_not_found: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MS,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            multiplier: 1.5,
            max_wait_seconds: DEFAULT_MAX_WAIT_SECS,
            jitter_percent: 0.1,
            tolerate_not_found: true,
        }
    }
}

impl PollPolicy {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter_percent = 0.0;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Set the wait budget, rounding partial seconds up
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        let partial = u64::from(max_wait.subsec_nanos() > 0);
        self.max_wait_seconds = max_wait.as_secs().saturating_add(partial);
        self
    }

    /// Delay after check number `check` (0-based)
    pub fn interval_after(&self, check: u32) -> Duration {
        let exponent = check.min(i32::MAX as u32) as i32;
        let base = self.initial_interval().as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_interval().as_secs_f64());

        let jittered = if self.jitter_percent > 0.0 {
            let range = capped * self.jitter_percent;
            capped + rand::random_range(-range..=range)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_wait_seconds == 0 {
            return Err(invalid("max_wait_seconds", "must be greater than zero"));
        }
        if self.initial_interval_ms == 0 {
            return Err(invalid("initial_interval_ms", "must be greater than zero"));
        }
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err(invalid(
                "multiplier",
                "must be a finite value of at least 1.0",
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(invalid(
                "max_interval_ms",
                "must not be smaller than initial_interval_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_percent) {
            return Err(invalid("jitter_percent", "must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        key: format!("dispatch.poll.{}", field),
        message: message.to_string(),
    }
}

/// Reasons a wait ends without a terminal run
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    #[error("Timeout waiting for task completion")]
    TimedOut { run_id: RunId, waited: Duration },

    #[error("Wait for run {run_id} was cancelled")]
    Cancelled { run_id: RunId },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Polls an executor until a run reaches a terminal status
#[derive(Debug, Clone, Default)]
pub struct RunWaiter {
    policy: PollPolicy,
}

impl RunWaiter {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Wait for `run_id` to finish
    ///
    /// Returns the terminal run, whatever its status.
    ///
    /// # Errors
    ///
    /// - [`WaitError::TimedOut`] when the budget runs out
    /// - [`WaitError::Cancelled`] when `cancel` fires
    /// - [`WaitError::Lookup`] when a status check fails; the wait stops at the first failure
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn wait(
        &self,
        executor: &dyn JobExecutor,
        credential: &ApiKey,
        run_id: &RunId,
        cancel: &CancellationToken,
    ) -> Result<JobRun, WaitError> {
        let budget = self.policy.max_wait();
        let polling = self.poll_until_terminal(executor, credential, run_id);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Wait cancelled before the run finished");
                Err(WaitError::Cancelled {
                    run_id: run_id.clone(),
                })
            }
            result = tokio::time::timeout(budget, polling) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(budget_secs = budget.as_secs(), "Run did not finish within the wait budget");
                    Err(WaitError::TimedOut {
                        run_id: run_id.clone(),
                        waited: budget,
                    })
                }
            },
        }
    }

    async fn poll_until_terminal(
        &self,
        executor: &dyn JobExecutor,
        credential: &ApiKey,
        run_id: &RunId,
    ) -> Result<JobRun, WaitError> {
        let mut check: u32 = 0;

        loop {
            match executor.retrieve(credential, run_id).await {
                Ok(run) if run.is_terminal() => {
                    info!(status = %run.status, checks = check + 1, "Run reached terminal status");
                    return Ok(run);
                }
                Ok(run) => {
                    debug!(status = %run.status, check, "Run still in progress");
                }
                Err(LookupError::RunNotFound { .. }) if self.policy.tolerate_not_found => {
                    debug!(check, "Run not visible yet");
                }
                Err(e) => {
                    warn!(error = %e, check, "Status check failed; abandoning wait");
                    return Err(WaitError::Lookup(e));
                }
            }

            let delay = self.policy.interval_after(check);
            check = check.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
#[path = "run_waiter_tests.rs"]
mod tests;
