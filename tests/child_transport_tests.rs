//! Client-side process transport: spawning, exit reporting, shutdown, and a
//! full round trip against the real server binary

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use testrun_mcp::internal::client::McpClient;
use testrun_mcp::internal::rpc::{Dispatcher, RpcError};
use testrun_mcp::internal::transport::{
    ChildProcessConfig, ChildProcessTransport, CloseReason, ExitInfo, LifecycleState, Transport,
    TransportError, TransportEvent, TransportRunner,
};

const SERVER_BIN: &str = env!("CARGO_BIN_EXE_testrun-mcp");
const CALL_BIN: &str = env!("CARGO_BIN_EXE_testrun-mcp-call");

fn sh(script: &str) -> ChildProcessConfig {
    ChildProcessConfig::new("sh").arg("-c").arg(script)
}

/// Server config whose runner prints a failure and exits 2
fn failing_runner_config(dir: &tempfile::TempDir) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile_in(dir.path())
        .unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"
color = false

[runner]
command = "sh"
test_args = ["-c", "echo 'FAIL: 1 failed' >&2; exit 2", "runner"]
coverage_args = ["-c", "echo 'All files | 100'", "runner"]
working_dir = "{}"
"#,
        dir.path().display()
    )
    .unwrap();
    file
}

#[tokio::test]
async fn launch_failure_is_reported() {
    let transport = ChildProcessTransport::new(ChildProcessConfig::new(
        "/definitely/not/a/real/testrun-mcp",
    ));

    let error = transport.start().await.err().expect("spawn should fail");
    assert!(matches!(error, TransportError::Launch { .. }));
    assert!(error.to_string().contains("/definitely/not/a/real/testrun-mcp"));
    assert!(matches!(
        transport.lifecycle().close_reason(),
        Some(CloseReason::LaunchFailed(_))
    ));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn unexpected_exit_rejects_pending_requests() {
    let transport = Arc::new(ChildProcessTransport::new(sh("read line; exit 3")));
    let (sender, reader) = transport.start().await.unwrap().split();
    let dispatcher = Arc::new(Dispatcher::new(sender));
    let run = tokio::spawn(
        TransportRunner::new(Arc::clone(&transport), Arc::clone(&dispatcher)).run(reader),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), dispatcher.request("work", None))
        .await
        .expect("pending request was not rejected");
    assert!(matches!(result, Err(RpcError::ChannelClosed)));

    let reason = run.await.unwrap().unwrap();
    assert_eq!(
        reason,
        CloseReason::Exited(ExitInfo {
            code: Some(3),
            signal: None
        })
    );
    assert_eq!(transport.lifecycle().state(), LifecycleState::Closed);

    assert!(matches!(
        dispatcher.request("later", None).await,
        Err(RpcError::ChannelClosed)
    ));
}

#[tokio::test]
async fn close_twice_fires_one_closed_event() {
    let transport = ChildProcessTransport::new(sh("cat > /dev/null"));
    let mut events = transport.lifecycle().subscribe();
    let _channel = transport.start().await.unwrap();

    transport.close().await.unwrap();
    transport.close().await.unwrap();

    let mut closed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TransportEvent::Closed(reason) = event {
            closed.push(reason);
        }
    }
    assert_eq!(
        closed,
        vec![CloseReason::Exited(ExitInfo {
            code: Some(0),
            signal: None
        })]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn child_ignoring_stdin_is_killed_after_grace_period() {
    let config = ChildProcessConfig::new("sleep")
        .arg("30")
        .grace_period(Duration::from_millis(100));
    let transport = ChildProcessTransport::new(config);
    let _channel = transport.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), transport.close())
        .await
        .expect("close did not finish")
        .unwrap();

    match transport.lifecycle().close_reason() {
        Some(CloseReason::Exited(info)) => {
            assert_eq!(info.code, None);
            assert_eq!(info.signal, Some(9));
        }
        other => panic!("unexpected close reason: {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn close_finishes_while_a_send_is_stuck_on_a_full_stdin_pipe() {
    let config = ChildProcessConfig::new("sleep")
        .arg("30")
        .grace_period(Duration::from_millis(100));
    let transport = Arc::new(ChildProcessTransport::new(config));
    let (sender, _reader) = transport.start().await.unwrap().split();
    let dispatcher = Arc::new(Dispatcher::new(sender));

    // Far larger than a pipe buffer; the child never reads it
    let blob = "x".repeat(1024 * 1024);
    let stuck = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.request("work", Some(json!({ "blob": blob }))).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), transport.close())
        .await
        .expect("close waited on the blocked writer")
        .unwrap();

    match transport.lifecycle().close_reason() {
        Some(CloseReason::Exited(info)) => assert_eq!(info.signal, Some(9)),
        other => panic!("unexpected close reason: {:?}", other),
    }

    let result = tokio::time::timeout(Duration::from_secs(5), stuck)
        .await
        .expect("blocked send never failed")
        .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn client_runs_tools_on_the_server_binary() {
    let dir = tempfile::tempdir().unwrap();
    let config = failing_runner_config(&dir);
    let server = ChildProcessConfig::new(SERVER_BIN)
        .arg("--config")
        .arg(config.path().to_string_lossy());

    let client = McpClient::spawn(server, Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(client.server_info()["serverInfo"]["name"], "testrun-mcp");

    let tools = client.list_tools().await.unwrap();
    let names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
    assert_eq!(names, vec!["run_tests", "show_coverage"]);

    let failed = client.call_tool("run_tests", None).await.unwrap();
    assert_eq!(failed.is_error, Some(true));
    let text = failed.content[0].raw.as_text().unwrap().text.clone();
    assert!(text.contains("FAIL: 1 failed"), "unexpected text: {}", text);

    let arguments = json!({ "files": ["a.test.ts"] });
    let coverage = client
        .call_tool("show_coverage", arguments.as_object().cloned())
        .await
        .unwrap();
    assert_eq!(coverage.is_error, Some(false));

    let reason = client.close().await;
    assert_eq!(
        reason,
        CloseReason::Exited(ExitInfo {
            code: Some(0),
            signal: None
        })
    );
}

#[tokio::test]
async fn call_binary_prints_output_and_fails_on_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = failing_runner_config(&dir);

    let output = tokio::process::Command::new(CALL_BIN)
        .args(["--server", SERVER_BIN, "--server-arg", "--config", "--server-arg"])
        .arg(config.path())
        .args(["--tool", "run_tests"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL: 1 failed"), "stdout: {}", stdout);
}

#[tokio::test]
async fn call_binary_lists_tools() {
    let dir = tempfile::tempdir().unwrap();
    let config = failing_runner_config(&dir);

    let output = tokio::process::Command::new(CALL_BIN)
        .args(["--server", SERVER_BIN, "--server-arg", "--config", "--server-arg"])
        .arg(config.path())
        .arg("--list")
        .output()
        .await
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run_tests"));
    assert!(stdout.contains("show_coverage"));
}
