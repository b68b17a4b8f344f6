//! Tests for routing, request handling order, and body decoding.

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use job_relay_core::adapters::{InMemoryJobExecutor, RunScript};
use job_relay_core::{ApiKey, PollPolicy, RunStatus};
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Test helpers
// ============================================================================

const JOB: &str = "process-elevenlabs-call";

fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.dispatch.poll = PollPolicy {
        initial_interval_ms: 5,
        max_interval_ms: 20,
        multiplier: 2.0,
        max_wait_seconds: 5,
        jitter_percent: 0.0,
        tolerate_not_found: true,
    };
    config
}

fn both_credentials() -> CredentialScope {
    CredentialScope::new(ApiKey::new("tr_prod"), ApiKey::new("tr_stg"))
}

fn test_state(
    executor: &InMemoryJobExecutor,
    validator: SecretValidator,
    credentials: CredentialScope,
) -> AppState {
    AppState::new(
        fast_config(),
        validator,
        credentials,
        Arc::new(executor.clone()),
    )
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Liveness and health
// ============================================================================

#[tokio::test]
async fn test_root_returns_liveness_text() {
    let executor = InMemoryJobExecutor::new();
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], LIVENESS_MESSAGE.as_bytes());
}

#[tokio::test]
async fn test_health_reports_version() {
    let executor = InMemoryJobExecutor::new();
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_correlation_id_is_echoed_or_generated() {
    let executor = InMemoryJobExecutor::new();
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let echoed = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(CORRELATION_ID_HEADER, "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let generated = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(echoed.headers()[CORRELATION_ID_HEADER], "req-123");
    let id = generated.headers()[CORRELATION_ID_HEADER].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

// ============================================================================
// Webhook request order
// ============================================================================

#[tokio::test]
async fn test_secret_is_checked_before_environment() {
    let executor = InMemoryJobExecutor::new();
    let validator = SecretValidator::new(Some("s3cret".to_string()));
    let app = create_router(test_state(&executor, validator, both_credentials()));

    let response = app
        .oneshot(post("/api/webhooks/development/x", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(executor.trigger_count(), 0);
}

#[tokio::test]
async fn test_query_secret_takes_precedence_over_header() {
    let executor =
        InMemoryJobExecutor::new().with_job(JOB, RunScript::completes_with(json!(null)));
    let validator = SecretValidator::new(Some("s3cret".to_string()));
    let app = create_router(test_state(&executor, validator, both_credentials()));

    let mut wrong_query = post(
        &format!("/api/webhooks/production/{}?agtr_secret=nope", JOB),
        "{}",
    );
    wrong_query
        .headers_mut()
        .insert(WEBHOOK_SECRET_HEADER, "s3cret".parse().unwrap());

    let mut right_query = post(
        &format!("/api/webhooks/production/{}?agtr_secret=s3cret", JOB),
        "{}",
    );
    right_query
        .headers_mut()
        .insert(WEBHOOK_SECRET_HEADER, "nope".parse().unwrap());

    let rejected = app.clone().oneshot(wrong_query).await.unwrap();
    let accepted = app.oneshot(right_query).await.unwrap();

    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(executor.trigger_count(), 1);
}

#[tokio::test]
async fn test_header_secret_is_accepted() {
    let executor =
        InMemoryJobExecutor::new().with_job(JOB, RunScript::completes_with(json!(null)));
    let validator = SecretValidator::new(Some("s3cret".to_string()));
    let app = create_router(test_state(&executor, validator, both_credentials()));

    let mut request = post(&format!("/api/webhooks/staging/{}", JOB), "{}");
    request
        .headers_mut()
        .insert(WEBHOOK_SECRET_HEADER, "s3cret".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_job_name_is_rejected() {
    let executor = InMemoryJobExecutor::new();
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(post("/api/webhooks/production/bad%20job", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(executor.trigger_count(), 0);
}

#[tokio::test]
async fn test_unknown_job_is_a_dispatch_failure() {
    let executor = InMemoryJobExecutor::new();
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(post("/api/webhooks/production/not-registered", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unknown job: not-registered");
}

// ============================================================================
// Async and sync modes
// ============================================================================

#[tokio::test]
async fn test_async_mode_returns_run_handle() {
    let executor =
        InMemoryJobExecutor::new().with_job(JOB, RunScript::never_finishes());
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(post(
            &format!("/api/webhooks/production/{}?mode=bogus", JOB),
            r#"{"summary":"hi"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(
        body,
        json!({
            "success": true,
            "triggerId": JOB,
            "runId": "run_0001",
            "publicAccessToken": "pat_run_0001"
        })
    );
    assert_eq!(executor.total_lookups(), 0);
}

#[tokio::test]
async fn test_sync_mode_waits_for_completion() {
    let executor = InMemoryJobExecutor::new().with_job(
        JOB,
        RunScript::progressing(vec![RunStatus::Queued, RunStatus::Completed])
            .with_output(json!({"recordId": 7})),
    );
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(post(
            &format!("/api/webhooks/staging/{}?mode=sync", JOB),
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["output"], json!({"recordId": 7}));
    assert_eq!(body["runId"], "run_0001");
    assert_eq!(executor.total_lookups(), 2);
}

#[tokio::test]
async fn test_sync_wait_is_cancelled_by_shutdown() {
    let executor = InMemoryJobExecutor::new().with_job(JOB, RunScript::never_finishes());
    let state = test_state(&executor, SecretValidator::open(), both_credentials());
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let response = app
        .oneshot(post(
            &format!("/api/webhooks/production/{}?mode=sync", JOB),
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["runId"], "run_0001");
    assert_eq!(body["triggerId"], JOB);
}

// ============================================================================
// Query and path handling
// ============================================================================

#[test]
fn test_webhook_query_first_occurrence_wins() {
    let query = WebhookQuery::parse(Some("agtr_secret=a%20b&mode=sync&agtr_secret=other&x=1"));

    assert_eq!(query.agtr_secret.as_deref(), Some("a b"));
    assert_eq!(query.mode.as_deref(), Some("sync"));
}

#[test]
fn test_webhook_query_absent_is_empty() {
    assert_eq!(WebhookQuery::parse(None), WebhookQuery::default());
    assert_eq!(WebhookQuery::parse(Some("")), WebhookQuery::default());
}

#[tokio::test]
async fn test_repeated_secret_parameter_is_authorized_as_json() {
    let executor =
        InMemoryJobExecutor::new().with_job(JOB, RunScript::completes_with(json!(null)));
    let validator = SecretValidator::new(Some("s3cret".to_string()));
    let app = create_router(test_state(&executor, validator, both_credentials()));

    let accepted = app
        .clone()
        .oneshot(post(
            &format!("/api/webhooks/production/{}?agtr_secret=s3cret&agtr_secret=s3cret", JOB),
            "{}",
        ))
        .await
        .unwrap();
    let rejected = app
        .oneshot(post(
            &format!("/api/webhooks/production/{}?agtr_secret=nope&agtr_secret=s3cret", JOB),
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        rejected.headers()["content-type"],
        "application/json"
    );
    let body = read_json(rejected).await;
    assert_eq!(body["error"], "Unauthorized: Invalid or missing webhook secret");
    assert_eq!(executor.trigger_count(), 1);
}

#[tokio::test]
async fn test_repeated_mode_parameter_uses_first_value() {
    let executor = InMemoryJobExecutor::new().with_job(
        JOB,
        RunScript::completes_with(json!({"recordId": 3})),
    );
    let app = create_router(test_state(&executor, SecretValidator::open(), both_credentials()));

    let response = app
        .oneshot(post(
            &format!("/api/webhooks/production/{}?mode=sync&mode=async", JOB),
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["output"], json!({"recordId": 3}));
}

#[tokio::test]
async fn test_undecodable_path_is_json_400_after_secret_check() {
    let executor = InMemoryJobExecutor::new();
    let validator = SecretValidator::new(Some("s3cret".to_string()));
    let app = create_router(test_state(&executor, validator, both_credentials()));

    let unauthorized = app
        .clone()
        .oneshot(post("/api/webhooks/production/%FF%FE", "{}"))
        .await
        .unwrap();
    let invalid = app
        .oneshot(post("/api/webhooks/production/%FF%FE?agtr_secret=s3cret", "{}"))
        .await
        .unwrap();

    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body = read_json(invalid).await;
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request path"));
    assert_eq!(executor.trigger_count(), 0);
}

// ============================================================================
// Body decoding
// ============================================================================

#[test]
fn test_decode_payload_passes_json_through() {
    let value = decode_payload(br#"{"a":[1,2]}"#).unwrap();
    assert_eq!(value, json!({"a": [1, 2]}));
}

#[test]
fn test_decode_payload_wraps_plain_text() {
    let value = decode_payload(b"hello=world").unwrap();
    assert_eq!(value, json!({"rawBody": "hello=world"}));
}

#[test]
fn test_decode_payload_wraps_empty_body_as_raw_text() {
    assert_eq!(decode_payload(b"").unwrap(), json!({"rawBody": ""}));
    assert_eq!(decode_payload(b"  \n").unwrap(), json!({"rawBody": "  \n"}));
}

#[test]
fn test_decode_payload_rejects_invalid_utf8() {
    let err = decode_payload(&[0xff, 0xfe, 0x00]).unwrap_err();
    assert!(matches!(err, ValidationError::UnreadableBody { .. }));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let executor =
        InMemoryJobExecutor::new().with_job(JOB, RunScript::never_finishes());
    let mut config = fast_config();
    config.server.max_body_size = 16;
    let state = AppState::new(
        config,
        SecretValidator::open(),
        both_credentials(),
        Arc::new(executor.clone()),
    );
    let app = create_router(state);

    let response = app
        .oneshot(post(
            &format!("/api/webhooks/production/{}", JOB),
            format!("{{\"data\":\"{}\"}}", "x".repeat(64)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(executor.trigger_count(), 0);
}
