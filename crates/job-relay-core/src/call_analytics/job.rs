//! The call-analytics ingestion job.

use super::{NormalizationError, PayloadNormalizer};
use crate::{BackendRetryPolicy, PersistenceError, RecordId, RecordStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

const SUMMARY_PREVIEW_CHARS: usize = 50;

/// Result returned by a successful ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIngestOutput {
    pub success: bool,
    pub message: String,
    pub record_id: RecordId,
}

/// Ingestion failures; surfaced as the run's failure reason
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("Normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Supabase Insert Error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl JobError {
    /// Normalization is deterministic; only store failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Normalizes a call-analytics payload and stores the result
#[derive(Clone)]
pub struct CallAnalyticsJob {
    normalizer: PayloadNormalizer,
    store: Arc<dyn RecordStore>,
}

impl CallAnalyticsJob {
    pub fn new(normalizer: PayloadNormalizer, store: Arc<dyn RecordStore>) -> Self {
        Self { normalizer, store }
    }

    /// Run the job once
    ///
    /// # Errors
    ///
    /// Both normalization and store failures end the run; neither is retried
    /// here.
    #[instrument(skip(self, payload))]
    pub async fn run(&self, payload: &Value) -> Result<CallIngestOutput, JobError> {
        let record = self.normalizer.normalize(payload)?;

        info!(
            summary = %preview(&record.summary),
            transcript_len = record.transcript.len(),
            call_date = %record.call_date_iso(),
            source_id = %record.source_id,
            "Normalized call analytics payload"
        );

        let record_id = self.store.insert(record).await.map_err(|e| {
            error!(error = %e, "Failed to store call record");
            JobError::Persistence(e)
        })?;

        info!(record_id = %record_id, "Stored call record");

        Ok(CallIngestOutput {
            success: true,
            message: "Successfully stored 11Labs call data".to_string(),
            record_id,
        })
    }

    /// Run the job, retrying store failures the way the backend retries a run
    ///
    /// Attempts stop at `policy.max_attempts`; the last error is returned.
    #[instrument(skip(self, payload, policy), fields(max_attempts = policy.max_attempts))]
    pub async fn run_with_retries(
        &self,
        payload: &Value,
        policy: &BackendRetryPolicy,
    ) -> Result<CallIngestOutput, JobError> {
        let mut attempt = 1;
        loop {
            match self.run(payload).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_before_retry(attempt);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Call ingestion attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for CallAnalyticsJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAnalyticsJob")
            .field("normalizer", &self.normalizer)
            .field("store", &"<RecordStore>")
            .finish()
    }
}

fn preview(summary: &str) -> String {
    let mut chars = summary.chars();
    let head: String = chars.by_ref().take(SUMMARY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
