//! CLI integration tests for the trellis binary.
//! Runs each command against a mock entity API and checks stdout, stderr
//! and the exit status.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================
// Helper functions
// ============================================================

/// Build an `assert_cmd::Command` pointing at the `trellis` binary,
/// with its working directory set to `dir`.
fn trellis_cmd(dir: &Path) -> Command {
    let mut cmd = assert_cmd::cargo_bin_cmd!("trellis");
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

/// Write a config file aimed at `server`, with `extra` YAML appended.
fn write_config(dir: &Path, server: &ServerGuard, extra: &str) -> PathBuf {
    let path = dir.join("trellis.yaml");
    let yaml = format!(
        "backend:\n  base_url: {}\n  app_id: garden\n  api_key: sk-test-secret\nlogging:\n  level: error\n{extra}",
        server.url()
    );
    fs::write(&path, yaml).expect("Failed to write config");
    path
}

/// Run a command with `--json --config`, and return the exit assertion plus parsed stdout.
fn run_json(dir: &Path, config: &Path, args: &[&str]) -> (assert_cmd::assert::Assert, Value) {
    let assert = trellis_cmd(dir)
        .arg("--json")
        .arg("--config")
        .arg(config)
        .args(args)
        .assert();
    let stdout = assert.get_output().stdout.clone();
    let value = serde_json::from_slice(&stdout).unwrap_or_else(|e| {
        panic!(
            "Failed to parse JSON from {args:?}: {e}\n{}",
            String::from_utf8_lossy(&stdout)
        )
    });
    (assert, value)
}

// ============================================================
// query
// ============================================================

#[test]
fn test_query_prints_items_and_stats() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/apps/garden/entities/Garden")
        .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
        .match_header("authorization", "Bearer sk-test-secret")
        .with_status(200)
        .with_body(r#"[{"id": "g1", "name": "Raised bed"}]"#)
        .expect(1)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "");

    let (assert, out) = run_json(dir.path(), &config, &["query", "Garden"]);

    assert.success();
    assert_eq!(out["count"], 1);
    assert_eq!(out["items"][0]["id"], "g1");
    assert_eq!(out["stats"]["backend_calls"], 1);
    mock.assert();
}

#[test]
fn test_query_repeat_coalesces_onto_one_backend_call() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/apps/garden/entities/Task")
        .match_query(Matcher::UrlEncoded("q".into(), r#"{"status":"open"}"#.into()))
        .with_status(200)
        .with_body(r#"[{"id": "t1", "status": "open"}]"#)
        .expect(1)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "");

    let (assert, out) = run_json(
        dir.path(),
        &config,
        &["query", "Task", "--filter", r#"{"status":"open"}"#, "--repeat", "3"],
    );

    assert.success();
    assert_eq!(out["stats"]["backend_calls"], 1);
    assert_eq!(out["stats"]["cache_misses"], 1);
    assert_eq!(
        out["stats"]["coalesced"].as_u64().unwrap() + out["stats"]["cache_hits"].as_u64().unwrap(),
        2
    );
    mock.assert();
}

#[test]
fn test_query_rate_limit_exhausted_json_error() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/apps/garden/entities/Garden")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "retry:\n  max_attempts: 1\n");

    let (assert, out) = run_json(dir.path(), &config, &["query", "Garden"]);

    assert.failure().code(1);
    assert_eq!(out["code"], "RATE_LIMIT");
    assert_eq!(out["retry_in_ms"], 5000);
    assert!(out["message"].as_str().unwrap().contains("1 attempts"));
    mock.assert();
}

#[test]
fn test_query_fetch_error_json_has_null_retry() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/api/apps/garden/entities/Garden")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("boom")
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "");

    let (assert, out) = run_json(dir.path(), &config, &["query", "Garden"]);

    assert.failure().code(1);
    assert_eq!(out["code"], "FETCH_ERROR");
    assert!(out["retry_in_ms"].is_null());
    assert!(out["message"].as_str().unwrap().contains("boom"));
}

#[test]
fn test_query_rate_limit_human_error_on_stderr() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/api/apps/garden/entities/Garden")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "9")
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "retry:\n  max_attempts: 1\n");

    trellis_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["query", "Garden"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error [RATE_LIMIT]"))
        .stderr(predicate::str::contains("Retry in 9000 ms"));
}

#[test]
fn test_invalid_config_is_reported() {
    let server = Server::new();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "cache:\n  ttl_ms: 0\n");

    let (assert, out) = run_json(dir.path(), &config, &["query", "Garden"]);

    assert.failure().code(1);
    assert_eq!(out["code"], "ERROR");
    assert!(out["message"].as_str().unwrap().contains("ttl_ms"));
}

// ============================================================
// config show
// ============================================================

#[test]
fn test_config_show_json_redacts_api_key() {
    let server = Server::new();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "cache:\n  ttl_ms: 20000\n");

    let (assert, out) = run_json(dir.path(), &config, &["config", "show"]);

    assert
        .success()
        .stdout(predicate::str::contains("sk-test-secret").not());
    assert_eq!(out["backend"]["api_key"], "********");
    assert_eq!(out["backend"]["app_id"], "garden");
    assert_eq!(out["cache"]["ttl_ms"], 20000);
}

#[test]
fn test_config_show_yaml_redacts_api_key() {
    let server = Server::new();
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, "");

    trellis_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app_id: garden"))
        .stdout(predicate::str::contains("sk-test-secret").not());
}
