use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[session]
command_timeout_ms = 500
reset_settle_ms = 5000
step_settle_ms = 2000

[[doors]]
actuator_pin = 17
down_state_pin = 27
up_state_pin = 22
actuator_pulse_duration_ms = 10

[doors.tf_luna]
serial_port = "/dev/sim0"
"#;
    let path = dir.path().join("carport.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Each response on stdout is one JSON object with the envelope keys.
#[rstest]
#[case("actuate", "actuate")]
#[case("get-measurement", "getMeasurement")]
#[case("stop-measurement", "stopMeasurement")]
fn envelope_schema(#[case] arg: &str, #[case] wire_name: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("carport").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["control", "--door", "0", "--action", arg]);

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().next().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"));

    assert_eq!(v["succeeded"], true);
    assert_eq!(v["statusCode"], 201);
    assert!(v["message"].is_string());
    assert!(v["data"]["status"].is_string());
    if wire_name == "actuate" {
        assert_eq!(
            v["message"],
            "Carport request for garageDoorId 0, action actuate was processed with status unknown"
        );
    }
}

/// With --json, every console log line on stderr is a JSON object.
#[rstest]
fn console_logs_are_json_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("carport").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("debug")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .env_remove("RUST_LOG");

    let out = cmd.assert().success().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&out);
    let mut seen = 0;
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        let v: serde_json::Value = serde_json::from_str(line)
            .unwrap_or_else(|e| panic!("log line is not JSON ({e}): {line}"));
        assert!(v.get("level").is_some(), "missing level: {line}");
        assert!(v.get("fields").is_some(), "missing fields: {line}");
        seen += 1;
    }
    assert!(seen > 0, "expected at least the config-loaded line");
}
