#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use claude_sdk::{
    continue_conversation, query, query_turns, resume_conversation, run, user_turn,
    ClaudeSdkError, ContentBlock, Message, QueryOptions, QueryStream,
};
use futures::StreamExt;
use tempfile::TempDir;

fn mock_cli(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("claude");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn opts_for(cli: &Path) -> QueryOptions {
    QueryOptions {
        path_to_executable: Some(cli.to_path_buf()),
        ..Default::default()
    }
}

async fn drain(stream: QueryStream) -> Vec<Result<Message, ClaudeSdkError>> {
    tokio::time::timeout(Duration::from_secs(20), stream.collect())
        .await
        .expect("query stream must finish")
}

const CONVERSATION: &str = r#"cat <<'EOF'
{"type":"system","subtype":"init","session_id":"sess-9","model":"m","tools":["Read"]}
{"type":"rate_limit_event","data":"x"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Reading."},{"type":"unknown_type"},{"type":"tool_use","id":"tu_1","name":"Read","input":{"file_path":"/tmp/a"}}]}}
{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu_1","content":"data"}]}}
{"type":"unknown","data":"x"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Done."}]}}
{"type":"result","subtype":"success","session_id":"sess-9","num_turns":2,"duration_ms":40,"duration_api_ms":30,"is_error":false,"total_cost_usd":0.01,"result":"Done."}
EOF"#;

#[tokio::test]
async fn single_prompt_yields_typed_messages_in_order() {
    let dir = TempDir::new().unwrap();
    let cli = mock_cli(&dir, CONVERSATION);

    let items = drain(query("read /tmp/a", opts_for(&cli))).await;
    let messages: Vec<Message> = items.into_iter().map(Result::unwrap).collect();

    // Unknown message types are skipped silently.
    assert_eq!(messages.len(), 5);

    let Message::System(sys) = &messages[0] else {
        panic!("expected System")
    };
    assert_eq!(sys.subtype, "init");
    assert_eq!(sys.data["tools"][0], "Read");

    let Message::Assistant(first) = &messages[1] else {
        panic!("expected Assistant")
    };
    // The unknown block is dropped, its neighbours kept.
    assert_eq!(first.content.len(), 2);
    assert!(matches!(first.content[0], ContentBlock::Text(_)));
    assert_eq!(first.tool_uses().next().map(|t| t.name.as_str()), Some("Read"));

    let Message::User(user) = &messages[2] else {
        panic!("expected User")
    };
    assert_eq!(user.content[0]["tool_use_id"], "tu_1");

    assert_eq!(
        messages[3].as_assistant().map(|a| a.text()),
        Some("Done.".to_string())
    );

    let result = messages[4].as_result().unwrap();
    assert!(result.is_success());
    assert_eq!(result.session_id, "sess-9");
    assert_eq!(result.duration_api_ms, Some(30));
}

#[tokio::test]
async fn run_summarises_the_conversation() {
    let dir = TempDir::new().unwrap();
    let cli = mock_cli(&dir, CONVERSATION);

    let result = run("read /tmp/a", opts_for(&cli)).await.unwrap();
    assert_eq!(result.session_id, "sess-9");
    assert_eq!(result.result_text, "Done.");
    assert_eq!(result.num_turns, 2);
    assert!(!result.is_error);
    assert_eq!(result.messages.len(), 5);
}

#[tokio::test]
async fn failed_process_ends_the_stream_with_process_error() {
    let dir = TempDir::new().unwrap();
    let cli = mock_cli(&dir, "echo 'Error: boom' >&2\nexit 1");

    let items = drain(query("hi", opts_for(&cli))).await;
    assert_eq!(items.len(), 1);
    let Err(ClaudeSdkError::Process { exit_code, stderr }) = &items[0] else {
        panic!("expected Process error, got {:?}", items[0])
    };
    assert_eq!(*exit_code, Some(1));
    assert!(stderr.contains("Error: boom"));

    let err = run("hi", opts_for(&cli)).await.unwrap_err();
    assert!(err.is_process());
}

#[tokio::test]
async fn missing_executable_is_reported_through_the_stream() {
    let dir = TempDir::new().unwrap();
    let opts = opts_for(&dir.path().join("absent"));

    let items = drain(query("hi", opts)).await;
    assert_eq!(items.len(), 1);
    assert!(items[0].as_ref().unwrap_err().is_cli_not_found());
}

#[tokio::test]
async fn streamed_turns_are_written_before_reading() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("turns.jsonl");
    let args = dir.path().join("args.txt");
    let cli = mock_cli(
        &dir,
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\ncat > '{}'\n{CONVERSATION}",
            args.display(),
            out.display()
        ),
    );

    let turns = vec![user_turn("one"), user_turn("two"), user_turn("three")];
    let items = drain(query_turns(turns.clone(), opts_for(&cli))).await;
    assert!(items.iter().all(Result::is_ok));
    assert_eq!(items.len(), 5);

    let written: Vec<serde_json::Value> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(written, turns);

    let args = std::fs::read_to_string(&args).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(&args[args.len() - 3..], &["--input-format", "stream-json", "--print"]);
}

#[tokio::test]
async fn continue_and_resume_add_their_flags() {
    let dir = TempDir::new().unwrap();
    let args = dir.path().join("args.txt");
    let cli = mock_cli(
        &dir,
        &format!("printf '%s\\n' \"$@\" >> '{}'\n{CONVERSATION}", args.display()),
    );

    drain(continue_conversation("again", opts_for(&cli))).await;
    drain(resume_conversation("sess-9", "more", opts_for(&cli))).await;

    let seen = std::fs::read_to_string(&args).unwrap();
    let seen: Vec<&str> = seen.lines().collect();
    assert!(seen.contains(&"--continue"));
    let i = seen.iter().position(|a| *a == "--resume").unwrap();
    assert_eq!(seen[i + 1], "sess-9");
    assert_eq!(seen.last(), Some(&"more"));
}

#[tokio::test]
async fn dropping_the_stream_early_terminates_the_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let cli = mock_cli(
        &dir,
        &format!(
            "echo $$ > '{}'\necho '{{\"type\":\"system\",\"subtype\":\"init\"}}'\nexec sleep 30",
            pid_file.display()
        ),
    );

    let mut stream = query("hi", opts_for(&cli));
    let first = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(first, Message::System(_)));
    drop(stream);

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    assert!(exits_soon(&pid).await, "subprocess {pid} outlived its stream");
}

#[tokio::test]
async fn dropping_the_stream_while_turns_are_blocked_terminates_the_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    // Never reads stdin, so a turn larger than the pipe buffer blocks the write.
    let cli = mock_cli(
        &dir,
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );

    let stream = query_turns(vec![user_turn("x".repeat(512 * 1024))], opts_for(&cli));
    let mut waited = Duration::ZERO;
    while std::fs::read_to_string(&pid_file).map_or(true, |p| p.trim().is_empty()) {
        assert!(waited < Duration::from_secs(10), "mock CLI never started");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(stream);

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    assert!(exits_soon(&pid).await, "subprocess {pid} outlived its stream");
}

/// Poll `kill -0` for up to five seconds.
async fn exits_soon(pid: &str) -> bool {
    for _ in 0..50 {
        let status = std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap();
        if !status.success() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
