//! # Job Relay HTTP Service
//!
//! HTTP server that receives webhooks and starts jobs on the execution
//! backend.
//!
//! This service provides:
//! - `POST /api/webhooks/{env}/{trigger_id}`: authorize, select the
//!   environment's credential, trigger the job, and optionally wait for it
//! - `GET /`: liveness text
//! - `GET /health`: JSON health status

pub mod config;
pub mod errors;
pub mod responses;

pub use config::{DispatchConfig, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use responses::{
    ErrorResponse, HealthResponse, RunCompletedResponse, RunFailedResponse, RunStartedResponse,
};

use axum::{
    extract::{rejection::PathRejection, DefaultBodyLimit, Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use job_relay_core::{
    CredentialScope, Environment, JobExecutor, JobName, RunMode, RunWaiter, SecretValidator,
    SuppliedSecret, ValidationError,
};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

/// Header carrying the webhook secret when it is not given as a query parameter
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Header carrying the request correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Text returned by the liveness endpoint
pub const LIVENESS_MESSAGE: &str = "Job Relay webhook server is running!";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
///
/// Everything in here is read-only after construction. The shutdown token is
/// the only cross-request signal.
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Webhook secret check
    pub secret_validator: Arc<SecretValidator>,

    /// Per-environment job backend credentials
    pub credentials: Arc<CredentialScope>,

    /// Job execution backend
    pub executor: Arc<dyn JobExecutor>,

    /// Sync-mode waiter
    pub waiter: RunWaiter,

    /// Cancelled when the server starts shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        secret_validator: SecretValidator,
        credentials: CredentialScope,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        let waiter = RunWaiter::new(config.dispatch.poll.clone());
        Self {
            config: Arc::new(config),
            secret_validator: Arc::new(secret_validator),
            credentials: Arc::new(credentials),
            executor,
            waiter,
            shutdown: CancellationToken::new(),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes =
        Router::new().route("/api/webhooks/{env}/{trigger_id}", post(handle_webhook));

    let health_routes = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health_check));

    let mut router = Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(
                    |request: &axum::extract::Request| {
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            path = %request.uri().path(),
                        )
                    },
                ))
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM. On shutdown the state's cancellation token is
/// cancelled so in-flight sync waits return promptly, then in-flight requests
/// get up to the configured shutdown timeout to finish.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let server_config = state.config.server.clone();
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let address = server_config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let shutdown_timeout = server_config.shutdown_timeout();
    let signal_token = shutdown.clone();
    let shutdown_signal = async move {
        wait_for_shutdown_signal().await;
        info!(
            "Initiating graceful shutdown with {}s timeout",
            shutdown_timeout.as_secs()
        );
        signal_token.cancel();
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .into_future();

    let drain_deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!("Shutdown timeout elapsed with requests still in flight");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Query parameters of the webhook endpoint
///
/// Parsed by hand so that a malformed or repeated parameter never rejects the
/// request before the secret check. The first occurrence of a key wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WebhookQuery {
    pub mode: Option<String>,
    pub agtr_secret: Option<String>,
}

impl WebhookQuery {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        let Some(raw) = raw else {
            return query;
        };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let slot = match key.as_ref() {
                "mode" => &mut query.mode,
                "agtr_secret" => &mut query.agtr_secret,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        query
    }
}

/// Handle a job-trigger webhook
///
/// Checks run in a fixed order and each failure answers immediately:
/// secret (401), path (400), environment (400), job name (400), credential
/// (500), body (400). Only then is the backend called.
#[instrument(skip(state, path, raw_query, headers, body), fields(mode))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookHandlerError> {
    let query = WebhookQuery::parse(raw_query.as_deref());
    let header_secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    state
        .secret_validator
        .authorize(SuppliedSecret::new(query.agtr_secret.as_deref(), header_secret))?;

    let Path((env, trigger_id)) = path.map_err(|rejection| ValidationError::InvalidPath {
        message: rejection.body_text(),
    })?;
    let environment: Environment = env.parse()?;
    let job = JobName::new(trigger_id)?;
    let credential = state.credentials.select(environment)?;
    let payload = decode_payload(&body)?;
    let mode = RunMode::from_query(query.mode.as_deref());
    tracing::Span::current().record("mode", mode.as_str());

    info!(
        environment = %environment,
        job = %job,
        mode = %mode,
        "Triggering job"
    );

    let handle = state.executor.trigger(credential, &job, &payload).await?;

    info!(run_id = %handle.run_id, "Job triggered");

    if mode == RunMode::Async {
        return Ok(Json(RunStartedResponse {
            success: true,
            trigger_id: job,
            run_id: handle.run_id,
            public_access_token: handle.public_access_token,
        })
        .into_response());
    }

    let run = state
        .waiter
        .wait(
            state.executor.as_ref(),
            credential,
            &handle.run_id,
            &state.shutdown,
        )
        .await
        .map_err(|source| WebhookHandlerError::WaitFailed {
            trigger_id: job.clone(),
            run_id: handle.run_id.clone(),
            source,
        })?;

    if run.status.is_success() {
        info!(run_id = %run.id, "Run completed");
        Ok(Json(RunCompletedResponse {
            success: true,
            trigger_id: job,
            run_id: run.id,
            output: run.output,
        })
        .into_response())
    } else {
        warn!(run_id = %run.id, status = %run.status, "Run ended without success");
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RunFailedResponse {
                success: false,
                trigger_id: job,
                run_id: run.id,
                status: run.status,
                error: run.error,
            }),
        )
            .into_response())
    }
}

/// Turn a webhook body into the job payload
///
/// JSON bodies pass through unchanged. Any other text, including an empty
/// body, is wrapped as `{"rawBody": text}`.
///
/// # Errors
///
/// Returns [`ValidationError::UnreadableBody`] when the body is not UTF-8.
pub fn decode_payload(body: &[u8]) -> Result<Value, ValidationError> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return Ok(value);
    }

    let text = std::str::from_utf8(body).map_err(|e| ValidationError::UnreadableBody {
        message: e.to_string(),
    })?;

    Ok(json!({ "rawBody": text }))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

async fn handle_root() -> &'static str {
    LIVENESS_MESSAGE
}

async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Takes the correlation id from the request or generates one, logs request
/// start and completion, and echoes the id in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri().path(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    request.extensions_mut().insert(correlation_id.clone());

    info!(method = %method, path = %path, "Request started");

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    // Query strings may hold the webhook secret; only the path is logged
    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
