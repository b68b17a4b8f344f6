//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use job_relay_clients::TriggerClientConfig;
use job_relay_core::{BackendRetryPolicy, PollPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Sync-mode waiting and backend retry expectations
    pub dispatch: DispatchConfig,

    /// Job backend endpoints
    pub trigger: TriggerClientConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check the loaded configuration for values the service cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than zero".to_string(),
            });
        }
        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }
        if self.trigger.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "trigger.timeout_seconds must be greater than zero".to_string(),
            });
        }

        self.dispatch.poll.validate().map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;
        self.dispatch
            .backend_retry
            .validate()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
            enable_cors: true,
            enable_compression: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Status polling for `mode=sync`
    pub poll: PollPolicy,

    /// Retry schedule the backend applies to runs
    pub backend_retry: BackendRetryPolicy,
}

impl DispatchConfig {
    /// Whether a sync wait can outlast a run that uses every backend retry
    ///
    /// A `false` result is not an error: runs that exhaust their retries will
    /// simply be reported as timed out.
    pub fn wait_covers_backend_retries(&self) -> bool {
        self.poll.max_wait() >= self.backend_retry.worst_case_backoff()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
