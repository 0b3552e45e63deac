use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn counterpoint(state_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("counterpoint").unwrap();
    cmd.arg("--state-dir").arg(state_dir.path()).env_remove("RUST_LOG");
    cmd
}

fn save_session(state_dir: &TempDir) {
    let session = json!({
        "topic": "Remote work is better than office work",
        "userViewpoint": "Remote work offers better work-life balance",
        "messages": [
            {"id": "1700000000000", "role": "ai", "content": "Office work fosters collaboration.", "timestamp": 1700000000000_i64},
            {"id": "1700000000001", "role": "user", "content": "Video calls work fine.", "timestamp": 1700000000001_i64}
        ],
        "unanswered": "1700000000001"
    });
    std::fs::write(
        state_dir.path().join("exploration-session.json"),
        serde_json::to_string_pretty(&session).unwrap(),
    )
    .unwrap();
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("counterpoint").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: counterpoint [OPTIONS] <COMMAND>"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("reset"))
        .stdout(predicate::str::contains("--provider <PROVIDER>"))
        .stdout(predicate::str::contains("--ephemeral"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_start_help() {
    let mut cmd = Command::cargo_bin("counterpoint").unwrap();
    cmd.arg("start")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: counterpoint start"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("9900"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("counterpoint").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: counterpoint [OPTIONS] <COMMAND>"));
}

#[test]
fn test_cli_rejects_unknown_provider() {
    let mut cmd = Command::cargo_bin("counterpoint").unwrap();
    cmd.args(["--provider", "nope", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ollama").and(predicate::str::contains("openai")));
}

#[test]
fn test_show_without_session() {
    let dir = TempDir::new().unwrap();
    counterpoint(&dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active exploration."));
}

#[test]
fn test_show_prints_saved_transcript() {
    let dir = TempDir::new().unwrap();
    save_session(&dir);
    counterpoint(&dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Topic: Remote work is better than office work"))
        .stdout(predicate::str::contains("AI: Office work fosters collaboration."))
        .stdout(predicate::str::contains("You: Video calls work fine.\n   (no reply yet)"));
}

#[test]
fn test_reset_asks_before_clearing() {
    let dir = TempDir::new().unwrap();
    save_session(&dir);

    counterpoint(&dir)
        .arg("reset")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset cancelled."));
    assert!(dir.path().join("exploration-session.json").exists());

    counterpoint(&dir)
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready for a new exploration!"));
    assert!(!dir.path().join("exploration-session.json").exists());

    counterpoint(&dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active exploration."));
}

#[test]
fn test_chat_exits_cleanly_on_eof() {
    let dir = TempDir::new().unwrap();
    counterpoint(&dir)
        .args(["--ephemeral", "chat"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("What topic would you like to explore?"));
}
