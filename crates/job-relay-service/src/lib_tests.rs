//! Tests for configuration loading and startup wiring.

use super::*;
use serial_test::serial;
use std::io::Write;

fn clear_overrides() {
    for key in [
        "JR__SERVER__PORT",
        "JR__DISPATCH__POLL__MAX_WAIT_SECONDS",
        "JR__LOGGING__JSON_FORMAT",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================================
// load_config
// ============================================================================

#[test]
#[serial]
fn test_load_config_defaults_without_sources() {
    clear_overrides();

    let config = load_config(None).unwrap();

    assert_eq!(config.server.port, 3000);
    assert_eq!(config.dispatch.poll.max_wait_seconds, 300);
}

#[test]
#[serial]
fn test_load_config_reads_explicit_yaml_file() {
    clear_overrides();
    let file = write_config(
        ".yaml",
        "server:\n  port: 8081\ndispatch:\n  poll:\n    max_wait_seconds: 45\nlogging:\n  level: debug\n",
    );

    let config = load_config(file.path().to_str()).unwrap();

    assert_eq!(config.server.port, 8081);
    assert_eq!(config.dispatch.poll.max_wait_seconds, 45);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_overrides();
    let file = write_config(".toml", "[server]\nport = 8081\n");
    std::env::set_var("JR__SERVER__PORT", "9090");
    std::env::set_var("JR__LOGGING__JSON_FORMAT", "true");

    let result = load_config(file.path().to_str());
    clear_overrides();

    let config = result.unwrap();
    assert_eq!(config.server.port, 9090);
    assert!(config.logging.json_format);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_overrides();

    let err = load_config(Some("/nonexistent/job-relay/service.yaml")).unwrap_err();

    assert!(matches!(err, ConfigError::Loading { .. }));
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    clear_overrides();
    std::env::set_var("JR__DISPATCH__POLL__MAX_WAIT_SECONDS", "0");

    let result = load_config(None);
    clear_overrides();

    let err = result.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
    assert!(err.to_string().contains("dispatch.poll.max_wait_seconds"));
}

// ============================================================================
// Logging filter
// ============================================================================

#[test]
fn test_default_filter_covers_all_crates() {
    let filter = default_filter("warn");

    assert_eq!(
        filter,
        "job_relay_service=warn,job_relay_api=warn,job_relay_core=warn,job_relay_clients=warn,tower_http=debug"
    );
}

// ============================================================================
// build_state
// ============================================================================

#[test]
#[serial]
fn test_build_state_uses_environment_credentials() {
    std::env::set_var("TRIGGER_SECRET_KEY", "tr_prod_env");
    std::env::remove_var("TRIGGER_SECRET_KEY_STAGING");
    std::env::set_var("WEBHOOK_SECRET", "hook");

    let state = build_state(ServiceConfig::default()).unwrap();

    std::env::remove_var("TRIGGER_SECRET_KEY");
    std::env::remove_var("WEBHOOK_SECRET");

    assert!(state
        .credentials
        .is_configured(job_relay_core::Environment::Production));
    assert!(!state
        .credentials
        .is_configured(job_relay_core::Environment::Staging));
    assert!(!state.secret_validator.is_open());
}

#[test]
#[serial]
fn test_build_state_rejects_bad_backend_url() {
    let mut config = ServiceConfig::default();
    config.trigger.tasks_api_url = "not a url".to_string();

    let err = build_state(config).err().expect("build_state should fail");

    assert!(err.to_string().contains("trigger.tasks_api_url"));
}
