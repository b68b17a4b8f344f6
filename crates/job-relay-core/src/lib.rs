//! # Job Relay Core
//!
//! Domain logic for the Job Relay webhook dispatcher.
//!
//! This crate contains everything that does not depend on a concrete HTTP
//! stack: webhook secret checks, per-environment credential selection, the
//! gateway traits for the job-execution backend and the record store, the
//! run waiter that bridges a synchronous request to an asynchronous run, and
//! the call-analytics payload normalizer.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions ([`JobExecutor`], [`RecordStore`])
//! - HTTP implementations live in `job-relay-clients`
//! - In-memory implementations live in [`adapters`] for tests and dry runs
//!
//! ## Usage
//!
//! ```rust
//! use job_relay_core::{Environment, JobName, RunMode};
//!
//! let env: Environment = "staging".parse().unwrap();
//! assert_eq!(env.credential_key(), "TRIGGER_SECRET_KEY_STAGING");
//!
//! let job = JobName::new("process-elevenlabs-call").unwrap();
//! assert_eq!(job.as_str(), "process-elevenlabs-call");
//!
//! assert_eq!(RunMode::from_query(Some("sync")), RunMode::Sync);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod adapters;
pub mod call_analytics;
pub mod credentials;
pub mod executor;
pub mod record_store;
pub mod run_waiter;
pub mod webhook_secret;

pub use credentials::{ApiKey, CredentialScope};
pub use executor::{
    BackendRetryPolicy, DispatchError, JobExecutor, JobHandle, JobRun, LookupError, RunStatus,
};
pub use record_store::{PersistenceError, RecordId, RecordStore};
pub use run_waiter::{PollPolicy, RunWaiter, WaitError};
pub use webhook_secret::{AuthorizationError, SecretValidator, SuppliedSecret};

/// Environment variable holding the production job-backend credential
pub const PRODUCTION_CREDENTIAL_KEY: &str = "TRIGGER_SECRET_KEY";

/// Environment variable holding the staging job-backend credential
pub const STAGING_CREDENTIAL_KEY: &str = "TRIGGER_SECRET_KEY_STAGING";

/// Environment variable holding the optional webhook secret
pub const WEBHOOK_SECRET_KEY: &str = "WEBHOOK_SECRET";

// ============================================================================
// Request Selectors
// ============================================================================

/// Deployment environment selected by the webhook path
///
/// Only the two environments that carry a job-backend credential are
/// recognized. Anything else is rejected before a credential is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
}

impl Environment {
    /// All recognized environments
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Staging];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }

    /// Name of the configuration key that holds this environment's credential
    pub fn credential_key(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_CREDENTIAL_KEY,
            Self::Staging => STAGING_CREDENTIAL_KEY,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    /// Matching is exact: the webhook path segment must be spelled in lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            _ => Err(ValidationError::UnknownEnvironment {
                value: s.to_string(),
            }),
        }
    }
}

/// How the dispatcher answers a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Reply as soon as the run has been started
    #[default]
    Async,

    /// Wait for the run to reach a terminal status before replying
    Sync,
}

impl RunMode {
    /// Interpret the `mode` query parameter
    ///
    /// Only the exact value `sync` selects synchronous mode; an absent or
    /// unrecognized value falls back to the asynchronous default.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("sync") => Self::Sync,
            _ => Self::Async,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Async => "async",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Name of a job known to the execution backend
///
/// Job names travel into backend URL paths, so they are limited to ASCII
/// alphanumerics plus `-`, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName(String);

impl JobName {
    /// Maximum accepted length of a job name
    pub const MAX_LENGTH: usize = 128;

    /// Create a job name with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "job_name".to_string(),
            });
        }

        if value.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "job_name".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        let invalid: String = value
            .chars()
            .filter(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .collect();
        if !invalid.is_empty() {
            return Err(ValidationError::InvalidCharacters {
                field: "job_name".to_string(),
                invalid_chars: invalid,
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobName> for String {
    fn from(value: JobName) -> Self {
        value.0
    }
}

/// Identifier of one run, assigned by the execution backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Malformed request input (400)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid environment. Must be either \"production\" or \"staging\"")]
    UnknownEnvironment { value: String },

    #[error("Invalid payload")]
    UnreadableBody { message: String },

    #[error("Invalid request path: {message}")]
    InvalidPath { message: String },

    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Missing or invalid process configuration (500, never retried)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing API key for {environment} environment. Please set {key}")]
    MissingCredential {
        environment: Environment,
        key: String,
    },

    #[error("Missing required configuration: {key}")]
    MissingSetting { key: String },

    #[error("Invalid configuration for {key}: {message}")]
    InvalidSetting { key: String, message: String },
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
