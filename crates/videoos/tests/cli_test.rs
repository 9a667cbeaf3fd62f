//! Integration tests for the `videoos` CLI binary.
//!
//! Argument parsing, config handling and exit codes run without a device;
//! the device commands run against a wiremock endpoint.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `videoos` binary with env isolation.
///
/// Clears all `VIDEOOS_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn videoos_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("videoos");
    cmd.env("HOME", "/tmp/videoos-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/videoos-cli-test-nonexistent")
        .env_remove("VIDEOOS_PROFILE")
        .env_remove("VIDEOOS_HOST")
        .env_remove("VIDEOOS_USERNAME")
        .env_remove("VIDEOOS_PASSWORD")
        .env_remove("VIDEOOS_INSECURE")
        .env_remove("VIDEOOS_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so wiremock keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

async fn device_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "session": {"sessionId": "cli-session", "isAuthenticated": true}
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/session"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn mount_mode(server: &MockServer, persona: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/system/mode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activePersona": persona,
            "app": "videoos",
            "ecoMode": "off",
            "mode": "NORMAL"
        })))
        .mount(server)
        .await;
}

fn device_cmd(server: &MockServer, args: &[&str]) -> assert_cmd::Command {
    let mut cmd = videoos_cmd();
    cmd.args(args)
        .args(["--host", &server.uri(), "--username", "admin"])
        .env("VIDEOOS_PASSWORD", "secret");
    cmd
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = videoos_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    videoos_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("VideoOS")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("device-mode"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    videoos_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("videoos"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    videoos_cmd().arg("frobnicate").assert().code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    videoos_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_defaults() {
    videoos_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile"));
}

#[test]
fn test_config_show_redacts_passwords() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join("videoos");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[profiles.default]\nhost = \"10.0.0.20\"\nusername = \"admin\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    let output = videoos_cmd()
        .env("XDG_CONFIG_HOME", home.path())
        .args(["config", "show"])
        .output()
        .unwrap();
    let text = combined_output(&output);
    assert!(!text.contains("hunter2"), "password leaked:\n{text}");
}

// ── Errors without a device ─────────────────────────────────────────

#[test]
fn test_status_without_host_reports_missing_config() {
    let output = videoos_cmd().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("No device configured"));
}

#[test]
fn test_unknown_profile() {
    let output = videoos_cmd()
        .args(["status", "--profile", "nope"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("not found"));
}

#[test]
fn test_missing_username_is_auth_error() {
    videoos_cmd()
        .args(["status", "--host", "10.0.0.20"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No credentials"));
}

#[test]
fn test_unreachable_device_is_connection_error() {
    videoos_cmd()
        .args(["status", "--host", "http://127.0.0.1:1", "-u", "admin"])
        .env("VIDEOOS_PASSWORD", "secret")
        .assert()
        .code(7);
}

// ── Against a device ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_status_prints_session_and_mode() {
    let server = device_server().await;
    mount_mode(&server, "camuvc").await;

    let output = run(device_cmd(&server, &["status"])).await;

    let text = combined_output(&output);
    assert_eq!(output.status.code(), Some(0), "{text}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Logged In (code 1)"), "{stdout}");
    assert!(stdout.contains("device_mode=on"), "{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_json() {
    let server = device_server().await;
    mount_mode(&server, "tc8").await;

    let output = run(device_cmd(&server, &["status", "-o", "json"])).await;

    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["session"]["state"], "LOGGED_IN");
    assert_eq!(value["system_mode"]["active_persona"], "tc8");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_login_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/session"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"LoginResult": "INVALID_CREDENTIALS"})),
        )
        .mount(&server)
        .await;

    let output = run(device_cmd(&server, &["status"])).await;

    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("Login rejected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_mode_start() {
    let server = device_server().await;
    mount_mode(&server, "camuvc").await;
    Mock::given(method("POST"))
        .and(path("/rest/system/mode/device"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(device_cmd(&server, &["device-mode", "start"])).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("device mode: on"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reboot() {
    let server = device_server().await;
    mount_mode(&server, "tc8").await;
    Mock::given(method("POST"))
        .and(path("/rest/system/reboot"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(device_cmd(&server, &["reboot"])).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("reboot requested"));
}
