use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Build a minimal valid TOML config for the simulated board
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[station]
mains_hz = 50
policy = "interleave"
refresh_every = 25
report_every = 100

[timing]
settle_plain_us = 50
settle_bias_us = 300
settle_gain_us = 500
conversion_timeout_ms = 2

[pid]
kp = 8.0
ki = 0.4
kd = 0.0
i_limit = 60.0

[[channel]]
sensor = "thermocouple"
control = "pid"
presets = [300, 350, 400]

[[channel]]
sensor = "thermocouple"
control = "bangbang"

[idle]
setback_c = 100
setback_after_ms = 120000
standby_after_ms = 600000

[safety]
overcurrent_debounce_n = 2
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--cycles", "40"], 0, "run complete", "stdout")]
#[case(&["run", "--cycles", "40", "--temp1", "350", "--temp2", "300"], 0, "run complete", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["health"], 0, "ok", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("station").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream {other}"),
    }
}

#[test]
fn rejects_out_of_range_mains_frequency() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[station]\nmains_hz = 30\n").unwrap();

    Command::cargo_bin("station")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["run", "--cycles", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mains_hz"));
}

#[test]
fn missing_config_file_fails_with_path_in_message() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");

    Command::cargo_bin("station")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn json_run_reports_completed_cycles() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("station")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["run", "--cycles", "20"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let line = String::from_utf8(out).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["status"], "complete");
    assert!(v["cycles_completed"].as_u64().unwrap() >= 20);
}

#[test]
fn calibration_csv_with_wrong_headers_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "mv,degc\n4.64,221.77\n5.81,296.06\n6.64,369.61\n").unwrap();

    Command::cargo_bin("station")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .args(["run", "--cycles", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("measured,temperature"));
}
