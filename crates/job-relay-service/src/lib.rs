//! # Job Relay Service
//!
//! Startup helpers for the service binary: layered configuration loading,
//! logging initialization, and wiring of the HTTP state from the process
//! environment.

use job_relay_api::{AppState, ConfigError, LoggingConfig, ServiceConfig};
use job_relay_clients::TriggerClient;
use job_relay_core::{CredentialScope, SecretValidator};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "JOB_RELAY_CONFIG_FILE";

/// Prefix of configuration overrides in the environment (`JR__SERVER__PORT`)
pub const CONFIG_ENV_PREFIX: &str = "JR";

const SYSTEM_CONFIG_FILE: &str = "/etc/job-relay/service";
const LOCAL_CONFIG_FILE: &str = "config/service";

/// Load the service configuration
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/job-relay/service.{yaml,toml,json}`
///  2. `./config/service.{yaml,toml,json}`
///  3. `explicit_path`, usually taken from `JOB_RELAY_CONFIG_FILE`
///  4. `JR__`-prefixed environment variables with `__` as the nesting separator
///
/// Absent optional files are fine; every field has a default. A malformed
/// file, an uncoercible override or a configuration that fails validation is
/// an error.
pub fn load_config(explicit_path: Option<&str>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name(SYSTEM_CONFIG_FILE).required(false))
        .add_source(config::File::with_name(LOCAL_CONFIG_FILE).required(false));

    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }

    let service_config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix(CONFIG_ENV_PREFIX).separator("__"))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Loading {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// Job Relay crates and `tower_http` logs at debug.
pub fn init_logging(
    logging: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&logging.level)));

    let (json_layer, text_layer) = if logging.json_format {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

fn default_filter(level: &str) -> String {
    [
        "job_relay_service",
        "job_relay_api",
        "job_relay_core",
        "job_relay_clients",
    ]
    .iter()
    .map(|target| format!("{}={}", target, level))
    .chain(std::iter::once("tower_http=debug".to_string()))
    .collect::<Vec<_>>()
    .join(",")
}

/// Build the HTTP state from configuration and the secret-bearing environment
///
/// Missing job-backend credentials are logged, not fatal: requests for that
/// environment answer 500 until the variable is set and the service restarts.
pub fn build_state(config: ServiceConfig) -> Result<AppState, ConfigError> {
    let credentials = CredentialScope::from_env();
    for environment in credentials.missing() {
        warn!(
            environment = %environment,
            key = environment.credential_key(),
            "No job backend credential configured; requests for this environment will fail"
        );
    }

    let secret_validator = SecretValidator::from_env();
    if secret_validator.is_open() {
        warn!("WEBHOOK_SECRET is not set; webhook requests are not authenticated");
    }

    if !config.dispatch.wait_covers_backend_retries() {
        warn!(
            max_wait_seconds = config.dispatch.poll.max_wait_seconds,
            "Sync wait budget is shorter than the backend's worst-case retry backoff"
        );
    }

    let executor = TriggerClient::new(config.trigger.clone()).map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })?;

    info!(executor = ?executor, "Job backend client ready");

    Ok(AppState::new(
        config,
        secret_validator,
        credentials,
        Arc::new(executor),
    ))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
