//! Config load validation tests for incident-gate-config.
// crates/incident-gate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, fields).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

#![allow(clippy::use_debug, reason = "Test failures render config values.")]

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use incident_gate_config::BackendAuthConfig;
use incident_gate_config::ConfigError;
use incident_gate_config::IncidentGateConfig;
use incident_gate_config::ServerTransport;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

const VALID: &str = r#"
[server]
transport = "sse"
bind = "127.0.0.1:9090"

[server.sessions]
idle_timeout_ms = 60000
sweep_interval_ms = 5000

[backend]
instance_url = "https://example.service-now.com"
timeout_ms = 5000

[backend.auth]
type = "api_key"
api_key = "k-123"

[catalog]
default_package = "read_only"

[[access.grants]]
identity = "auditor"
packages = ["read_only"]
"#;

fn assert_invalid(result: Result<IncidentGateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

fn no_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[test]
fn load_reads_valid_file() -> TestResult {
    let file = write_config(VALID.as_bytes())?;
    let config = IncidentGateConfig::load_with_env(Some(file.path()), &no_env())
        .map_err(|err| err.to_string())?;
    if config.server.transport != ServerTransport::Sse {
        return Err("expected sse transport".to_string());
    }
    if config.server.bind_address() != "127.0.0.1:9090" {
        return Err(format!("unexpected bind {}", config.server.bind_address()));
    }
    if config.catalog.default_package != "read_only" {
        return Err("default package not read".to_string());
    }
    match &config.backend.auth {
        BackendAuthConfig::ApiKey {
            header_name, ..
        } if header_name == "X-ServiceNow-API-Key" => {}
        other => return Err(format!("unexpected auth {other:?}")),
    }
    if config.access.grants.len() != 1 {
        return Err("expected one access grant".to_string());
    }
    Ok(())
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(path), &no_env()),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(path), &no_env()),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(IncidentGateConfig::load_with_env(Some(&path), &no_env()), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'a'; 1_048_577])?;
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(file.path()), &no_env()),
        "config file exceeds size limit",
    )
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(file.path()), &no_env()),
        "config file must be utf-8",
    )
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let file = write_config(b"[backend\ninstance_url = ")?;
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(file.path()), &no_env()),
        "config parse error",
    )
}

#[test]
fn load_rejects_unknown_transport() -> TestResult {
    let file = write_config(b"[server]\ntransport = \"websocket\"\n")?;
    assert_invalid(
        IncidentGateConfig::load_with_env(Some(file.path()), &no_env()),
        "config parse error",
    )
}

#[test]
fn validate_rejects_cleartext_instance_without_opt_in() -> TestResult {
    let content = VALID.replace("https://example", "http://example");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "allow_http")
}

#[test]
fn validate_accepts_cleartext_instance_with_opt_in() -> TestResult {
    let content = VALID
        .replace("https://example", "http://example")
        .replace("timeout_ms = 5000", "timeout_ms = 5000\nallow_http = true");
    IncidentGateConfig::from_toml_str(&content).map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn validate_rejects_embedded_credentials() -> TestResult {
    let content = VALID.replace("https://example", "https://user:pw@example");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "must not embed credentials")
}

#[test]
fn validate_rejects_missing_api_key() -> TestResult {
    let content = VALID.replace("api_key = \"k-123\"", "");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "requires api_key")
}

#[test]
fn validate_rejects_incomplete_oauth() -> TestResult {
    let content = VALID.replace(
        "type = \"api_key\"\napi_key = \"k-123\"",
        "type = \"oauth\"\nclient_id = \"cid\"",
    );
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "oauth auth requires")
}

#[test]
fn validate_rejects_zero_retry_attempts() -> TestResult {
    let ordered =
        VALID.replace("[backend.auth]", "[backend.retry]\nmax_attempts = 0\n\n[backend.auth]");
    assert_invalid(IncidentGateConfig::from_toml_str(&ordered), "max_attempts")
}

#[test]
fn validate_rejects_backoff_inversion() -> TestResult {
    let ordered = VALID.replace(
        "[backend.auth]",
        "[backend.retry]\ninitial_backoff_ms = 9000\nmax_backoff_ms = 100\n\n[backend.auth]",
    );
    assert_invalid(IncidentGateConfig::from_toml_str(&ordered), "initial_backoff_ms")
}

#[test]
fn validate_rejects_timeout_out_of_range() -> TestResult {
    let content = VALID.replace("timeout_ms = 5000", "timeout_ms = 10");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "backend.timeout_ms")
}

#[test]
fn validate_rejects_zero_response_limit() -> TestResult {
    let content = VALID.replace("timeout_ms = 5000", "timeout_ms = 5000\nmax_response_bytes = 0");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "backend.max_response_bytes")
}

#[test]
fn validate_rejects_request_id_cap_below_inflight() -> TestResult {
    let content = VALID
        .replace("sweep_interval_ms = 5000", "sweep_interval_ms = 5000\nmax_request_ids = 8");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "sessions.max_request_ids")
}

#[test]
fn validate_rejects_sweep_longer_than_idle() -> TestResult {
    let content = VALID.replace("sweep_interval_ms = 5000", "sweep_interval_ms = 120000");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "sweep_interval_ms")
}

#[test]
fn validate_rejects_invalid_bind() -> TestResult {
    let content = VALID.replace("127.0.0.1:9090", "not-an-address");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "invalid bind address")
}

#[test]
fn validate_rejects_blank_grant_identity() -> TestResult {
    let content = VALID.replace("identity = \"auditor\"", "identity = \" \"");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "identity must be non-empty")
}

#[test]
fn validate_rejects_bad_table_name() -> TestResult {
    let content =
        VALID.replace("timeout_ms = 5000", "timeout_ms = 5000\ntable = \"incident;drop\"");
    assert_invalid(IncidentGateConfig::from_toml_str(&content), "backend.table")
}
