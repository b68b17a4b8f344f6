//! # Job Relay CLI
//!
//! Command-line interface for Job Relay.
//!
//! This module provides CLI commands for:
//! - Normalizing call-analytics payloads offline
//! - Running the call-analytics job against the record store
//! - Triggering jobs on the execution backend, optionally waiting for the run

use clap::{Parser, Subcommand};
use job_relay_clients::{
    ClientError, SupabaseConfig, SupabaseStore, TriggerClient, TriggerClientConfig,
};
use job_relay_core::adapters::InMemoryRecordStore;
use job_relay_core::call_analytics::{
    CallAnalyticsJob, EpochUnitPolicy, JobError, NormalizationError, PayloadNormalizer,
};
use job_relay_core::{
    BackendRetryPolicy, ConfigurationError, CredentialScope, DispatchError, Environment,
    JobExecutor, JobName, PollPolicy, RecordStore, RunWaiter, WaitError,
};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// Job Relay CLI - webhook-triggered jobs and call-analytics ingestion
#[derive(Parser)]
#[command(name = "job-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trigger background jobs and ingest call analytics")]
pub struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the normalized call record for a payload
    Normalize {
        /// Payload file (`-` reads stdin)
        #[arg(short, long)]
        file: PathBuf,

        /// Also show which rule supplied each field
        #[arg(long)]
        explain: bool,

        /// Numeric timestamps below this value are read as seconds
        #[arg(long, default_value_t = EpochUnitPolicy::default().seconds_below)]
        seconds_below: f64,
    },

    /// Run the call-analytics job and store the record
    ProcessCall {
        /// Payload file (`-` reads stdin)
        #[arg(short, long)]
        file: PathBuf,

        /// Keep the record in memory instead of writing to the record store
        #[arg(long)]
        dry_run: bool,

        /// Retry record store failures with the backend retry policy
        #[arg(long)]
        retries: bool,
    },

    /// Trigger a job on the execution backend
    Trigger {
        /// Job identifier
        #[arg(value_parser = parse_job_name)]
        job: JobName,

        /// Environment whose credential is used
        #[arg(short, long, value_parser = parse_environment)]
        env: Environment,

        /// Payload file (`-` reads stdin); defaults to `{}`
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Wait for the run to reach a terminal status
        #[arg(short, long)]
        wait: bool,

        /// Maximum time to wait, in seconds
        #[arg(long, default_value = "300")]
        max_wait_seconds: u64,

        /// Backend base URL (serves `/api/v1` and `/api/v3`)
        #[arg(long, env = "JOB_RELAY_BACKEND_URL")]
        backend_url: Option<String>,
    },
}

fn parse_job_name(value: &str) -> Result<JobName, String> {
    JobName::new(value).map_err(|e| e.to_string())
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    value.parse().map_err(|e: job_relay_core::ValidationError| e.to_string())
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Client setup failed: {0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Job(#[from] JobError),

    #[error("Normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    Wait(#[from] WaitError),

    #[error("Run {run_id} finished with status {status}")]
    RunFailed { run_id: String, status: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Client(_) => 1,
            Self::Job(_)
            | Self::Normalization(_)
            | Self::Dispatch(_)
            | Self::Wait(_)
            | Self::RunFailed { .. } => 2,
            Self::Io { .. } => 3,
            Self::InvalidArgument { .. } => 4,
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parse arguments, initialize logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli.command, &mut out).await
}

/// Logs go to stderr so command output on stdout stays machine-readable
fn initialize_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "job_relay={0},job_relay_cli={0},job_relay_core={0},job_relay_clients={0}",
            cli.log_level
        ))
    });

    let (json_layer, text_layer) = if cli.json_logs {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// Run one command, writing its JSON result to `out`
pub async fn execute<W: Write>(command: Commands, out: &mut W) -> Result<(), CliError> {
    match command {
        Commands::Normalize {
            file,
            explain,
            seconds_below,
        } => execute_normalize(&file, explain, seconds_below, out),
        Commands::ProcessCall {
            file,
            dry_run,
            retries,
        } => {
            let retry_policy = retries.then(BackendRetryPolicy::default);
            execute_process_call(&file, dry_run, retry_policy.as_ref(), out).await
        }
        Commands::Trigger {
            job,
            env,
            file,
            wait,
            max_wait_seconds,
            backend_url,
        } => {
            let credentials = CredentialScope::from_env();
            let credential = credentials.select(env)?;

            let mut config = TriggerClientConfig::default();
            if let Some(url) = backend_url {
                config = config.with_base_url(&url);
            }
            let client = TriggerClient::new(config)?;

            let payload = match file {
                Some(path) => read_payload(&path)?,
                None => json!({}),
            };

            let options = TriggerOptions {
                wait,
                max_wait: Duration::from_secs(max_wait_seconds),
            };
            execute_trigger(&client, credential, &job, &payload, options, out).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_normalize<W: Write>(
    file: &Path,
    explain: bool,
    seconds_below: f64,
    out: &mut W,
) -> Result<(), CliError> {
    if !(seconds_below.is_finite() && seconds_below > 0.0) {
        return Err(CliError::InvalidArgument {
            message: "--seconds-below must be a positive number".to_string(),
        });
    }

    let payload = read_payload(file)?;
    let normalizer = PayloadNormalizer::new(EpochUnitPolicy { seconds_below });

    let result = if explain {
        let normalized = normalizer.resolve_at(&payload, chrono::Utc::now())?;
        to_json(&normalized)
    } else {
        let record = normalizer.normalize(&payload)?;
        to_json(&record)
    };

    write_json(out, &result)
}

async fn execute_process_call<W: Write>(
    file: &Path,
    dry_run: bool,
    retry_policy: Option<&BackendRetryPolicy>,
    out: &mut W,
) -> Result<(), CliError> {
    let payload = read_payload(file)?;

    if dry_run {
        let store = InMemoryRecordStore::new();
        let output = run_call_job(Arc::new(store.clone()), &payload, retry_policy).await?;
        let record = store.records().into_iter().next();
        return write_json(out, &json!({ "output": output, "record": record }));
    }

    let store = SupabaseStore::new(SupabaseConfig::from_env()?)?;
    info!(insert_url = %store.insert_url(), "Writing call record");
    let output = run_call_job(Arc::new(store), &payload, retry_policy).await?;
    write_json(out, &to_json(&output))
}

/// Run the job once, or under `retry_policy` when one is given
async fn run_call_job(
    store: Arc<dyn RecordStore>,
    payload: &Value,
    retry_policy: Option<&BackendRetryPolicy>,
) -> Result<Value, CliError> {
    let job = CallAnalyticsJob::new(PayloadNormalizer::default(), store);
    let output = match retry_policy {
        Some(policy) => job.run_with_retries(payload, policy).await?,
        None => job.run(payload).await?,
    };
    Ok(to_json(&output))
}

/// Options of the `trigger` command
#[derive(Debug, Clone, Copy)]
pub struct TriggerOptions {
    pub wait: bool,
    pub max_wait: Duration,
}

/// Trigger `job` and print the run handle, or the final run with `wait`
///
/// # Errors
///
/// A wait budget of zero is rejected with [`CliError::InvalidArgument`]
/// before the job is triggered. A run that ends in any terminal status other
/// than `COMPLETED` is printed and then reported as [`CliError::RunFailed`].
pub async fn execute_trigger<W: Write>(
    executor: &dyn JobExecutor,
    credential: &job_relay_core::ApiKey,
    job: &JobName,
    payload: &Value,
    options: TriggerOptions,
    out: &mut W,
) -> Result<(), CliError> {
    let poll_policy = PollPolicy::default().with_max_wait(options.max_wait);
    if options.wait {
        poll_policy
            .validate()
            .map_err(|e| CliError::InvalidArgument {
                message: format!("--max-wait-seconds: {}", e),
            })?;
    }

    let handle = executor.trigger(credential, job, payload).await?;
    info!(run_id = %handle.run_id, job = %job, "Job triggered");

    if !options.wait {
        return write_json(
            out,
            &json!({
                "triggerId": job,
                "runId": handle.run_id,
                "publicAccessToken": handle.public_access_token,
            }),
        );
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; no longer waiting for the run");
            ctrl_c_token.cancel();
        }
    });

    let waiter = RunWaiter::new(poll_policy);
    let result = waiter
        .wait(executor, credential, &handle.run_id, &cancel)
        .await;
    ctrl_c.abort();

    let run = result?;
    write_json(out, &to_json(&run))?;

    if run.status.is_success() {
        Ok(())
    } else {
        Err(CliError::RunFailed {
            run_id: run.id.to_string(),
            status: run.status.to_string(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a JSON payload from a file, or from stdin for `-`
fn read_payload(path: &Path) -> Result<Value, CliError> {
    let display = path.display().to_string();
    let io_error = |source| CliError::Io {
        path: display.clone(),
        source,
    };

    let text = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(io_error)?;
        buffer
    } else {
        std::fs::read_to_string(path).map_err(io_error)?
    };

    serde_json::from_str(&text).map_err(|e| CliError::InvalidArgument {
        message: format!("{} is not valid JSON: {}", display, e),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn write_json<W: Write>(out: &mut W, value: &Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    writeln!(out, "{}", text).map_err(|source| CliError::Io {
        path: "stdout".to_string(),
        source,
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
