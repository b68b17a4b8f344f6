//! End-to-end tests for the `job-relay` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn job_relay() -> Command {
    let mut cmd = Command::cargo_bin("job-relay").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("TRIGGER_SECRET_KEY")
        .env_remove("TRIGGER_SECRET_KEY_STAGING")
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_KEY")
        .env_remove("JOB_RELAY_BACKEND_URL");
    cmd
}

#[test]
fn test_normalize_reads_stdin() {
    job_relay()
        .args(["normalize", "--file", "-"])
        .write_stdin(
            r#"{"analysis":{"summary":"Caller asked about pricing"},"metadata":{"start_time_unix_secs":1700000000},"call":{"phone_number_id":"+15551234567"}}"#,
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("2023-11-14T22:13:20.000Z"))
        .stdout(predicate::str::contains("Caller asked about pricing"));
}

#[test]
fn test_normalize_missing_file_exits_with_io_code() {
    job_relay()
        .args(["normalize", "--file", "/nonexistent/payload.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_normalize_unparseable_timestamp_is_a_job_failure() {
    job_relay()
        .args(["normalize", "--file", "-"])
        .write_stdin(r#"{"start_timestamp":"yesterday-ish"}"#)
        .assert()
        .code(2);
}

#[test]
fn test_process_call_without_store_settings_is_config_error() {
    job_relay()
        .args(["process-call", "--file", "-"])
        .write_stdin(r#"{"summary":"x"}"#)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SUPABASE_URL"));
}

#[test]
fn test_trigger_without_credential_names_missing_key() {
    job_relay()
        .args(["trigger", "process-elevenlabs-call", "--env", "staging"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("TRIGGER_SECRET_KEY_STAGING"));
}

#[test]
fn test_trigger_with_unknown_environment_is_usage_error() {
    job_relay()
        .args(["trigger", "process-elevenlabs-call", "--env", "qa"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid environment"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_trigger_and_wait_against_backend() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tasks/process-elevenlabs-call/trigger"))
        .and(header("Authorization", "Bearer tr_prod_cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_cli_1"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/runs/run_cli_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_cli_1",
            "status": "COMPLETED",
            "output": {"recordId": 9}
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        job_relay()
            .args(["trigger", "process-elevenlabs-call", "--env", "production", "--wait"])
            .env("TRIGGER_SECRET_KEY", "tr_prod_cli")
            .env("JOB_RELAY_BACKEND_URL", uri)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("\"recordId\": 9"))
        .stdout(predicate::str::contains("COMPLETED"));
}

#[test]
fn test_trigger_with_zero_wait_budget_is_invalid_argument() {
    job_relay()
        .args([
            "trigger",
            "process-elevenlabs-call",
            "--env",
            "production",
            "--wait",
            "--max-wait-seconds",
            "0",
        ])
        .env("TRIGGER_SECRET_KEY", "tr_prod_cli")
        .env("JOB_RELAY_BACKEND_URL", "http://127.0.0.1:9")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("max_wait_seconds"));
}
