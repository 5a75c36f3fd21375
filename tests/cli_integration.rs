// CLI integration tests for scripted replay flows.
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_bulkwrite");
    Command::new(exe)
}

fn parse_lines(output: &[u8]) -> Vec<Value> {
    let text = String::from_utf8_lossy(output);
    text.lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

fn write_fixture(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path.to_str().expect("utf8 path").to_string()
}

#[test]
fn replay_retries_until_every_document_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let docs = write_fixture(
        temp.path(),
        "docs.jsonl",
        "{\"id\":0}\n{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n{\"id\":4}\n",
    );
    let rounds = write_fixture(
        temp.path(),
        "rounds.json",
        r#"[{"http_status":200,"elapsed_ms":340,"failures":[
            {"position":1,"status":429,"message":"es_rejected_execution_exception"},
            {"position":3,"status":429,"message":"es_rejected_execution_exception"}]}]"#,
    );

    let output = cmd()
        .args(["replay", "--docs", docs.as_str(), "--rounds", rounds.as_str()])
        .output()
        .expect("replay");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = parse_lines(&output.stdout);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["round"], 1);
    assert_eq!(lines[0]["outcome"]["status"], "partial");
    assert_eq!(lines[0]["outcome"]["errors_sample"][1]["original_position"], 3);
    assert_eq!(lines[0]["outcome"]["errors_sample"][1]["document"], "{\"id\":3}");
    assert_eq!(lines[1]["round"], 2);
    assert_eq!(lines[1]["outcome"]["status"], "complete");
    assert_eq!(lines[1]["outcome"]["total_documents"], 2);
    assert_eq!(lines[2]["summary"]["succeeded"], 5);
    assert_eq!(lines[2]["summary"]["settled"], true);
}

#[test]
fn replay_exits_nonzero_when_documents_stay_failed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let docs = write_fixture(temp.path(), "docs.jsonl", "{\"a\":1}\n{\"a\":2}\n");
    let rounds = write_fixture(
        temp.path(),
        "rounds.json",
        r#"[{"failures":[{"position":0,"status":400,"message":"mapper_parsing_exception"}]}]"#,
    );

    let output = cmd()
        .args(["replay", "--docs", docs.as_str(), "--rounds", rounds.as_str()])
        .output()
        .expect("replay");
    assert_eq!(output.status.code(), Some(9));

    let lines = parse_lines(&output.stdout);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["summary"]["failed"], 1);
    assert_eq!(lines[1]["summary"]["failures_sample"][0]["retryable"], false);
}

#[test]
fn replay_reads_documents_from_stdin() {
    let temp = tempfile::tempdir().expect("tempdir");
    let rounds = write_fixture(temp.path(), "rounds.json", "[]");

    let mut child = cmd()
        .args(["replay", "--docs", "-", "--rounds", rounds.as_str()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"{\"x\":1}\n\n{\"x\":2}\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());

    let lines = parse_lines(&output.stdout);
    assert_eq!(lines[0]["outcome"]["total_documents"], 2);
    assert_eq!(lines[0]["outcome"]["status"], "complete");
}

#[test]
fn invalid_script_reports_usage_error_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let docs = write_fixture(temp.path(), "docs.jsonl", "{\"a\":1}\n");
    let rounds = write_fixture(
        temp.path(),
        "rounds.json",
        r#"[{"failures":[{"position":4,"status":409}]}]"#,
    );

    let output = cmd()
        .args(["replay", "--docs", docs.as_str(), "--rounds", rounds.as_str()])
        .output()
        .expect("replay");
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    let err = stderr
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|value| value.get("error").is_some())
        .expect("error json");
    assert_eq!(err["error"]["kind"], "Usage");
    assert_eq!(err["error"]["position"], 4);
}

#[test]
fn missing_docs_file_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let rounds = write_fixture(temp.path(), "rounds.json", "[]");
    let missing = temp.path().join("absent.jsonl");

    let output = cmd()
        .args([
            "replay",
            "--docs",
            missing.to_str().expect("utf8"),
            "--rounds",
            rounds.as_str(),
        ])
        .output()
        .expect("replay");
    assert_eq!(output.status.code(), Some(2));
}
