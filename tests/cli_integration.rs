//! CLI smoke tests against the built `ssm` binary.

mod common;

use std::fs;

use common::run_cli_case;
use serde_json::Value;

fn parse_json(stdout: &str) -> Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn check_small_artifact_reports_ok() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().to_string_lossy().to_string();
    let result = run_cli_case(
        "check_small_artifact_reports_ok",
        home.path(),
        &["check", "--size", "1", "--path", &path, "--json"],
    );

    assert!(
        result.status.success(),
        "log: {}",
        result.log_path.display()
    );
    let json = parse_json(&result.stdout);
    assert_eq!(json["isOk"], true);
    assert_eq!(json["message"], "");
    assert_eq!(json["skipped"], false);
    assert!(json["freeDiskStorage"].as_u64().is_some());
}

#[test]
fn check_impossible_artifact_exits_with_runtime_code() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().to_string_lossy().to_string();
    let result = run_cli_case(
        "check_impossible_artifact",
        home.path(),
        &["check", "--size", &u64::MAX.to_string(), "--path", &path, "--json"],
    );

    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    let json = parse_json(&result.stdout);
    assert_eq!(json["isOk"], false);
    let message = json["message"].as_str().unwrap();
    assert!(message.starts_with("Storage low! Model 18.45 EB > "), "{message}");
    assert!(result.stderr.contains("storage not ok"));
}

#[test]
fn downloaded_model_file_is_skipped() {
    let home = tempfile::tempdir().unwrap();
    let model = home.path().join("model.json");
    fs::write(
        &model,
        r#"{"id":"qwen","name":"Qwen","size":99999999999999,"isDownloaded":true}"#,
    )
    .unwrap();
    let path = home.path().to_string_lossy().to_string();
    let model_arg = model.to_string_lossy().to_string();
    let result = run_cli_case(
        "downloaded_model_file_is_skipped",
        home.path(),
        &["check", "--model", &model_arg, "--path", &path, "--json"],
    );

    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json = parse_json(&result.stdout);
    assert_eq!(json["artifact"], "qwen");
    assert_eq!(json["skipped"], true);
    assert_eq!(json["isOk"], true);
}

#[test]
fn malformed_model_file_is_a_user_error() {
    let home = tempfile::tempdir().unwrap();
    let model = home.path().join("model.json");
    fs::write(&model, "{not json").unwrap();
    let model_arg = model.to_string_lossy().to_string();
    let result = run_cli_case(
        "malformed_model_file",
        home.path(),
        &["check", "--model", &model_arg],
    );

    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("invalid model file"));
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let home = tempfile::tempdir().unwrap();
    let missing = home.path().join("nope.toml");
    let missing_arg = missing.to_string_lossy().to_string();
    let result = run_cli_case(
        "missing_explicit_config",
        home.path(),
        &["--config", &missing_arg, "config"],
    );

    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("SSM-1002"));
}

#[test]
fn config_json_reports_defaults_and_hash() {
    let home = tempfile::tempdir().unwrap();
    let result = run_cli_case("config_json", home.path(), &["config", "--json"]);

    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json = parse_json(&result.stdout);
    assert_eq!(json["config"]["monitor"]["poll_interval_ms"], 5_000);
    assert_eq!(json["config"]["monitor"]["evaluate_interval_ms"], 30_000);
    assert_eq!(json["hash"].as_str().map(str::len), Some(16));
}

#[test]
fn config_file_values_are_applied() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("ssm.toml");
    fs::write(
        &config,
        "[monitor]\npoll_interval_ms = 1000\nevaluate_interval_ms = 2000\nstorage_mode = \"include_reserved\"\n",
    )
    .unwrap();
    let config_arg = config.to_string_lossy().to_string();
    let result = run_cli_case(
        "config_file_values",
        home.path(),
        &["--config", &config_arg, "config", "--json"],
    );

    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json = parse_json(&result.stdout);
    assert_eq!(json["config"]["monitor"]["poll_interval_ms"], 1_000);
    assert_eq!(json["config"]["monitor"]["storage_mode"], "include_reserved");
}

#[test]
fn watch_with_duration_exits_cleanly_and_writes_activity_log() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().to_string_lossy().to_string();
    let result = run_cli_case(
        "watch_with_duration",
        home.path(),
        &["watch", "--size", "1", "--path", &path, "--duration", "1", "--json"],
    );

    assert!(result.status.success(), "log: {}", result.log_path.display());
    let first: Value = serde_json::from_str(result.stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["event"], "free_disk_storage");

    let log = home
        .path()
        .join(".local")
        .join("share")
        .join("ssm")
        .join("activity.jsonl");
    let events: Vec<Value> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().map(|e| e["event"].clone()), Some("config_load".into()));
    assert!(events.iter().any(|e| e["event"] == "monitor_start"));
    assert!(events.iter().any(|e| e["event"] == "monitor_stop"));
}

#[test]
fn completions_emit_a_script() {
    let home = tempfile::tempdir().unwrap();
    let result = run_cli_case("completions_bash", home.path(), &["completions", "bash"]);
    assert!(result.status.success());
    assert!(result.stdout.contains("ssm"));
}
