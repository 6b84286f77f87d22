use std::path::Path;
use std::process::{Command, Output};

fn write_event(dir: &Path, payload: &str) -> std::path::PathBuf {
    let path = dir.join("event.json");
    std::fs::write(&path, payload).unwrap();
    path
}

fn classify(dir: &Path, event_name: &str, payload: &str, extra: &[&str]) -> Output {
    let path = write_event(dir, payload);
    Command::new(env!("CARGO_BIN_EXE_ai-issue-resolver"))
        .arg("classify")
        .arg("--event-name")
        .arg(event_name)
        .arg("--event-path")
        .arg(&path)
        .args(extra)
        .current_dir(dir)
        .env_remove("GITHUB_EVENT_NAME")
        .env_remove("GITHUB_EVENT_PATH")
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "classify failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

const LABELED_ISSUE: &str = r#"{
    "action": "labeled",
    "issue": {"number": 3, "title": "Crash", "body": null, "labels": [{"name": "ai-fix"}]},
    "repository": {"full_name": "octo/app", "default_branch": "main"}
}"#;

#[test]
fn labelled_issue_generates_pr() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_json(&classify(dir.path(), "issues", LABELED_ISSUE, &["--json"]));
    assert_eq!(out["workflow"], "generate-pr");
    assert_eq!(out["issue"], 3);
}

#[test]
fn change_comment_carries_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let payload = r#"{
        "action": "created",
        "comment": {
            "body": "/ai-issue-resolver-change add null check",
            "issue_url": "https://api.github.com/repos/octo/app/issues/9"
        }
    }"#;
    let out = stdout_json(&classify(dir.path(), "issue_comment", payload, &["--json"]));
    assert_eq!(out["workflow"], "apply-feedback");
    assert_eq!(out["feedback"], "add null check");
    assert_eq!(out["issue"], 9);
}

#[test]
fn unrelated_comment_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let payload = r#"{"action": "created", "comment": {"body": "LGTM", "issue_url": "https://api.github.com/repos/o/r/issues/1"}}"#;
    let output = classify(dir.path(), "issue_comment", payload, &[]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ignore");
}

#[test]
fn config_file_changes_the_trigger_label() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".ai-issue-resolver.toml"),
        "[commands]\ntrigger_label = \"bot\"\n",
    )
    .unwrap();
    let out = stdout_json(&classify(dir.path(), "issues", LABELED_ISSUE, &["--json"]));
    assert_eq!(out["workflow"], "ignore");
}

#[test]
fn malformed_payload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(dir.path(), "issues", "{not json", &[]);
    assert!(!output.status.success());
}

#[test]
fn ignored_event_runs_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_event(
        dir.path(),
        r#"{"action": "opened", "issue": {"number": 1, "title": "t", "body": "", "labels": []}}"#,
    );
    let output = Command::new(env!("CARGO_BIN_EXE_ai-issue-resolver"))
        .args(["run", "--event-name", "issues", "--event-path"])
        .arg(&path)
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("INPUT_GITHUB-TOKEN")
        .env_remove("INPUT_MODEL-API-KEY")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stdout)
    );
}

#[test]
fn run_without_credentials_reports_an_action_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_event(dir.path(), LABELED_ISSUE);
    let output = Command::new(env!("CARGO_BIN_EXE_ai-issue-resolver"))
        .args(["run", "--event-name", "issues", "--event-path"])
        .arg(&path)
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("INPUT_GITHUB-TOKEN")
        .env_remove("INPUT_MODEL-API-KEY")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("::error::"), "stdout was: {stdout}");
    assert!(stdout.contains("github-token is required"));
}

#[test]
fn run_with_unreadable_config_reports_an_action_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".ai-issue-resolver.toml"), "[commands\n").unwrap();
    let path = write_event(dir.path(), LABELED_ISSUE);
    let output = Command::new(env!("CARGO_BIN_EXE_ai-issue-resolver"))
        .args(["run", "--event-name", "issues", "--event-path"])
        .arg(&path)
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("::error::"), "stdout was: {stdout}");
    assert_eq!(stdout.trim_end().lines().count(), 1, "annotation must be one line");
}
