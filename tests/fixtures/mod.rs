//! Test fixtures for MCP protocol testing

#![allow(dead_code)]

pub mod requests;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use testrun_mcp::internal::config::{AppConfig, RunnerConfig};
use testrun_mcp::internal::server::Server;
use testrun_mcp::internal::transport::{CloseReason, MemoryTransport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// App config whose runner is `sh -c <script>`; tool arguments land in `$@`
pub fn shell_runner_config(script: &str) -> AppConfig {
    let shell_args = vec!["-c".to_string(), script.to_string(), "runner".to_string()];
    AppConfig {
        runner: RunnerConfig {
            command: "sh".to_string(),
            test_args: shell_args.clone(),
            coverage_args: shell_args,
            ..RunnerConfig::default()
        },
        ..AppConfig::default()
    }
}

pub fn test_server(script: &str) -> Server {
    let server = Server::new(shell_runner_config(script)).unwrap();
    server.setup_tools().unwrap();
    server
}

/// Write `input` to a server over an in-memory transport, close the input
/// and collect every frame the server writes back until it hangs up.
pub async fn exchange(server: Server, input: &[u8]) -> (Vec<Value>, CloseReason) {
    let (transport, peer) = MemoryTransport::with_peer();
    let serving = tokio::spawn(async move { server.serve(Arc::new(transport)).await });

    let (mut peer_read, mut peer_write) = tokio::io::split(peer);
    peer_write.write_all(input).await.unwrap();
    peer_write.shutdown().await.unwrap();

    let mut output = Vec::new();
    peer_read.read_to_end(&mut output).await.unwrap();
    let reason = serving.await.unwrap().unwrap();

    let frames = output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).expect("server wrote invalid JSON"))
        .collect();
    (frames, reason)
}

/// Join request values into newline-delimited wire bytes
pub fn lines(messages: &[Value]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for message in messages {
        bytes.extend(serde_json::to_vec(message).unwrap());
        bytes.push(b'\n');
    }
    bytes
}

/// Responses keyed by their numeric id
pub fn by_id(frames: &[Value]) -> HashMap<i64, Value> {
    frames
        .iter()
        .filter_map(|frame| frame["id"].as_i64().map(|id| (id, frame.clone())))
        .collect()
}

/// Concatenated text blocks of a `tools/call` result
pub fn tool_text(result: &Value) -> String {
    result["content"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
