use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_ANSWER_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

fn workspace(prefix: &str) -> (PathBuf, PathBuf) {
    let temp = unique_temp_dir(prefix);
    let home_dir = temp.join("home");
    let cwd = temp.join("cwd");
    std::fs::create_dir_all(&home_dir).expect("home dir should be creatable");
    std::fs::create_dir_all(&cwd).expect("cwd dir should be creatable");
    (home_dir, cwd)
}

fn chatbi(home_dir: &Path, cwd: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_chatbi"));
    command
        .env_remove("RUST_LOG")
        .arg("--home-dir")
        .arg(home_dir)
        .arg("--cwd")
        .arg(cwd);
    command
}

fn stdout_envelope(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should hold one JSON envelope")
}

fn write_frames(dir: &Path, frames: &[&str]) -> PathBuf {
    let path = dir.join("frames.txt");
    std::fs::write(&path, format!("{}\n", frames.join("\n"))).expect("frames should be writable");
    path
}

#[test]
fn missing_required_args_exits_with_usage_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_chatbi"))
        .arg("replay")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn runtime_path_resolution_failures_exit_with_runtime_code() {
    let output = Command::new(env!("CARGO_BIN_EXE_chatbi"))
        .args(["--home-dir", "relative", "conversations", "list"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "runtime_failure");
}

#[test]
fn completed_replay_exits_successfully_and_persists_the_answer() {
    let (home_dir, cwd) = workspace("chatbi-exit-replay-ok");
    let frames = write_frames(
        &cwd,
        &[
            "processing query request",
            "Sales by region:",
            "```sql",
            "SELECT region, SUM(total) AS total FROM sales GROUP BY region",
            "```",
            r#"{"status":"success","result":[{"region":"north","total":10},{"region":"south","total":7}]}"#,
            "DONE",
            "FLAG_DONE",
        ],
    );

    let output = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "total sales by region"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["ok"], Value::Bool(true));
    assert_eq!(envelope["command"], "replay");
    let answer = &envelope["data"]["answer"];
    assert_eq!(answer["status"], "completed");
    assert_eq!(answer["content"], "Sales by region:");
    assert_eq!(
        answer["sqlQuery"],
        "SELECT region, SUM(total) AS total FROM sales GROUP BY region"
    );
    assert_eq!(envelope["data"]["title"], "total sales by region");
    assert!(
        envelope["warnings"]
            .as_array()
            .is_some_and(|warnings| warnings.is_empty())
    );
    assert!(home_dir.join(".chatbi").join("chatbi.sqlite").is_file());

    let conversation_id = envelope["data"]["conversation_id"]
        .as_str()
        .expect("conversation id should be a string")
        .to_string();
    let shown = chatbi(&home_dir, &cwd)
        .args(["conversations", "show"])
        .arg(&conversation_id)
        .output()
        .expect("command should execute");
    assert_eq!(shown.status.code(), Some(EXIT_SUCCESS));
    let shown = stdout_envelope(&shown);
    let messages = shown["data"]["conversation"]["messages"]
        .as_array()
        .expect("messages should be listed");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["status"], "completed");
}

#[test]
fn follow_up_replay_loads_the_conversation_history() {
    let (home_dir, cwd) = workspace("chatbi-exit-replay-follow-up");
    let frames = write_frames(&cwd, &["Top regions", "DONE", "FLAG_DONE"]);

    let first = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "top regions"])
        .output()
        .expect("command should execute");
    assert_eq!(first.status.code(), Some(EXIT_SUCCESS));
    let first = stdout_envelope(&first);
    assert_eq!(first["data"]["history_messages"], 0);
    let conversation_id = first["data"]["conversation_id"]
        .as_str()
        .expect("conversation id should be a string")
        .to_string();

    let second = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "and last year?", "--conversation"])
        .arg(&conversation_id)
        .output()
        .expect("command should execute");
    assert_eq!(second.status.code(), Some(EXIT_SUCCESS));
    let second = stdout_envelope(&second);
    assert_eq!(second["data"]["history_messages"], 2);
    assert_eq!(second["data"]["conversation_id"], conversation_id.as_str());
    assert_eq!(second["data"]["created_conversation"], false);
}

#[test]
fn failed_answers_exit_with_answer_failure_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-replay-fail");
    let frames = write_frames(
        &cwd,
        &["executing SQL query", "Query failed: relation \"sales\" does not exist"],
    );

    let output = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "total sales"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_ANSWER_FAILURE));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "answer_failed");
    assert_eq!(
        envelope["error"]["details"]["answer"]["status"],
        "error"
    );
}

#[test]
fn interrupted_stream_exits_with_answer_failure_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-replay-transport");
    let frames = write_frames(&cwd, &["processing query request", "partial answer"]);

    let output = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "total sales", "--transport-error", "socket reset"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_ANSWER_FAILURE));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["error"]["message"], "socket reset");
}

#[test]
fn unreadable_frames_exit_with_runtime_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-frames-missing");

    let output = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(cwd.join("missing.txt"))
        .args(["--question", "total sales"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    assert_eq!(stdout_envelope(&output)["error"]["code"], "frames_unreadable");
}

#[test]
fn unknown_conversation_exits_with_runtime_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-show-missing");

    let output = chatbi(&home_dir, &cwd)
        .args(["conversations", "show", "does-not-exist"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["error"]["code"], "conversation_not_found");
    assert_eq!(envelope["error"]["details"]["id"], "does-not-exist");
}

#[test]
fn chart_for_unknown_message_exits_with_runtime_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-chart-missing");

    let output = chatbi(&home_dir, &cwd)
        .env_remove("CHATBI_MODEL_API_URL")
        .args(["generate-chart", "missing", "--model-api-url", "http://127.0.0.1:9"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    let envelope = stdout_envelope(&output);
    assert_eq!(envelope["command"], "generate-chart");
    assert_eq!(envelope["error"]["code"], "message_not_found");
    assert_eq!(envelope["error"]["details"]["id"], "missing");
}

#[test]
fn chart_without_a_query_result_exits_with_runtime_code() {
    let (home_dir, cwd) = workspace("chatbi-exit-chart-no-result");
    let frames = write_frames(&cwd, &["Top regions", "DONE", "FLAG_DONE"]);
    let replayed = chatbi(&home_dir, &cwd)
        .arg("replay")
        .arg(&frames)
        .args(["--question", "top regions"])
        .output()
        .expect("command should execute");
    assert_eq!(replayed.status.code(), Some(EXIT_SUCCESS));
    let answer_id = stdout_envelope(&replayed)["data"]["answer"]["id"]
        .as_str()
        .expect("answer id should be a string")
        .to_string();

    let output = chatbi(&home_dir, &cwd)
        .env_remove("CHATBI_MODEL_API_URL")
        .args(["generate-chart", &answer_id])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    assert_eq!(stdout_envelope(&output)["error"]["code"], "no_query_result");
}

#[test]
fn schema_command_exits_successfully() {
    let output = Command::new(env!("CARGO_BIN_EXE_chatbi"))
        .args(["schema", "--raw"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let schema = stdout_envelope(&output);
    assert!(schema.is_object());
}
