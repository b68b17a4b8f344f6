//! # Job Relay Service
//!
//! Binary entry point for the Job Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and `JR__` environment overrides
//! - Initializes logging
//! - Reads credentials and the webhook secret from the environment
//! - Starts the HTTP server from job-relay-api

use job_relay_api::{start_server, ServiceError};
use job_relay_service::{build_state, init_logging, load_config, CONFIG_FILE_ENV};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let explicit_path = std::env::var(CONFIG_FILE_ENV).ok();
    let loaded = load_config(explicit_path.as_deref());

    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(ServiceError::from(e).exit_code());
        }
    };

    info!("Starting Job Relay Service");
    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    let state = match build_state(service_config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize service; aborting");
            std::process::exit(ServiceError::from(e).exit_code());
        }
    };

    info!(
        host = %state.config.server.host,
        port = state.config.server.port,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(state).await {
        error!("Server stopped with error: {}", e);
        std::process::exit(e.exit_code());
    }
}
