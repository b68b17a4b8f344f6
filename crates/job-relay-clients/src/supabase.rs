//! Supabase record store.
//!
//! Inserts call records through the PostgREST endpoint
//! `POST {url}/rest/v1/{table}` and reads the assigned `id` back from the
//! returned representation.

use crate::{endpoint, parse_base_url, ClientError};
use async_trait::async_trait;
use job_relay_core::call_analytics::NormalizedCallRecord;
use job_relay_core::{ApiKey, ConfigurationError, PersistenceError, RecordId, RecordStore};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Environment variable holding the Supabase project URL
pub const SUPABASE_URL_KEY: &str = "SUPABASE_URL";

/// Environment variable holding the Supabase service key
pub const SUPABASE_KEY_KEY: &str = "SUPABASE_KEY";

/// Table that receives call records
pub const DEFAULT_TABLE: &str = "agent_calls";

/// Connection settings for [`SupabaseStore`]
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: ApiKey,
    pub table: String,
    pub timeout_seconds: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, key: ApiKey) -> Self {
        Self {
            url: url.into(),
            key,
            table: DEFAULT_TABLE.to_string(),
            timeout_seconds: 30,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Read `SUPABASE_URL` and `SUPABASE_KEY` through `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] naming the first absent
    /// or blank variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(SUPABASE_URL_KEY)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigurationError::MissingSetting {
                key: SUPABASE_URL_KEY.to_string(),
            })?;

        let key = lookup(SUPABASE_KEY_KEY)
            .and_then(ApiKey::new)
            .ok_or_else(|| ConfigurationError::MissingSetting {
                key: SUPABASE_KEY_KEY.to_string(),
            })?;

        Ok(Self::new(url, key))
    }

    /// Read the settings from the process environment
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// PostgREST-backed [`RecordStore`]
#[derive(Clone)]
pub struct SupabaseStore {
    http_client: reqwest::Client,
    insert_url: Url,
    key: ApiKey,
}

impl SupabaseStore {
    /// Build a store client
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for a malformed project URL or when the HTTP
    /// client cannot be created.
    pub fn new(config: SupabaseConfig) -> Result<Self, ClientError> {
        let base = parse_base_url("supabase_url", &config.url)?;
        let insert_url = endpoint(&base, &["rest", "v1", config.table.as_str()]);

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            insert_url,
            key: config.key,
        })
    }

    pub fn insert_url(&self) -> &Url {
        &self.insert_url
    }
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("insert_url", &self.insert_url.as_str())
            .finish()
    }
}

/// Pull the `id` out of a PostgREST representation
///
/// The endpoint returns either the inserted row or a one-element array of
/// rows, depending on the `Accept` header the deployment honors.
fn extract_record_id(body: &Value) -> Option<RecordId> {
    let row = match body {
        Value::Array(rows) => rows.first()?,
        other => other,
    };
    match row.get("id")? {
        Value::Number(n) => n.as_i64().map(RecordId::Number),
        Value::String(s) => Some(RecordId::Text(s.clone())),
        _ => None,
    }
}

/// Build the rejection message from a PostgREST error body
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body))
}

#[async_trait]
impl RecordStore for SupabaseStore {
    #[instrument(skip_all, fields(source_id = %record.source_id))]
    async fn insert(&self, record: NormalizedCallRecord) -> Result<RecordId, PersistenceError> {
        let response = self
            .http_client
            .post(self.insert_url.clone())
            .header("apikey", self.key.expose())
            .bearer_auth(self.key.expose())
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(&record)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Record store request failed");
                PersistenceError::Unreachable {
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PersistenceError::InvalidResponse {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                message: rejection_message(status, &body),
            });
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|e| PersistenceError::InvalidResponse {
                message: format!("Failed to parse insert response: {}", e),
            })?;

        let id = extract_record_id(&parsed).ok_or_else(|| PersistenceError::InvalidResponse {
            message: "Insert response did not include an id".to_string(),
        })?;

        debug!(record_id = %id, "Call record stored");
        Ok(id)
    }
}

#[cfg(test)]
#[path = "supabase_tests.rs"]
mod tests;
