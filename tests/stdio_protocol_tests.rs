//! Protocol tests - serve MCP over an in-memory transport, no real stdio

use serde_json::json;
use testrun_mcp::internal::transport::CloseReason;

mod fixtures;

use fixtures::requests;

/// Test: Initialize handshake
#[tokio::test]
async fn test_initialize_handshake() {
    let server = fixtures::test_server("exit 0");
    let input = fixtures::lines(&[
        requests::initialize_request(1),
        requests::initialized_notification(),
    ]);

    let (frames, reason) = fixtures::exchange(server, &input).await;
    assert_eq!(reason, CloseReason::EndOfStream);
    assert_eq!(
        frames.len(),
        1,
        "Expected 1 response (initialize only, not notification)"
    );

    let response = &frames[0];
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert!(response.get("error").is_none(), "Initialize should not have error");

    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "testrun-mcp");
    assert!(result["capabilities"].get("tools").is_some(), "Should advertise tools");
}

/// Test: List tools returns both runner tools with their schemas
#[tokio::test]
async fn test_list_tools() {
    let server = fixtures::test_server("exit 0");
    let registered = server.tool_count();
    let input = fixtures::lines(&[requests::list_tools_request(1)]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames.len(), 1, "Expected 1 response");

    let tools = frames[0]["result"]["tools"]
        .as_array()
        .expect("tools should be array");
    assert_eq!(tools.len(), registered, "Tool count mismatch");

    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(names, vec!["run_tests", "show_coverage"]);
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

/// Test: A failing test run is a successful response flagged as an error
#[tokio::test]
async fn test_call_tool_failing_run() {
    let server = fixtures::test_server("echo 'FAIL: 1 failed' >&2; exit 2");
    let input = fixtures::lines(&[requests::call_tool_request(7, "run_tests", json!({}))]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], 7);

    let result = &frames[0]["result"];
    assert_eq!(result["isError"], true);
    assert!(fixtures::tool_text(result).contains("FAIL: 1 failed"));
}

/// Test: Tool arguments reach the runner command line
#[tokio::test]
async fn test_call_tool_forwards_arguments() {
    let server = fixtures::test_server("echo \"ran: $*\"");
    let input = fixtures::lines(&[
        requests::call_tool_request(
            1,
            "run_tests",
            json!({ "files": ["math.test.ts"], "filter": "adds" }),
        ),
        requests::call_tool_request(2, "show_coverage", json!({ "extra_args": ["--silent"] })),
    ]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    let responses = fixtures::by_id(&frames);
    assert_eq!(responses.len(), 2);

    let run = &responses[&1]["result"];
    assert_eq!(run["isError"], false);
    assert_eq!(fixtures::tool_text(run), "ran: math.test.ts -t adds");

    let coverage = &responses[&2]["result"];
    assert_eq!(fixtures::tool_text(coverage), "ran: --silent");
}

/// Test: Bad tool arguments are rejected with invalid params
#[tokio::test]
async fn test_call_tool_invalid_arguments() {
    let server = fixtures::test_server("exit 0");
    let input = fixtures::lines(&[requests::call_tool_request(
        3,
        "run_tests",
        json!({ "files": 42 }),
    )]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames[0]["error"]["code"], -32602);
}

/// Test: Call nonexistent tool returns error
#[tokio::test]
async fn test_call_tool_not_found() {
    let server = fixtures::test_server("exit 0");
    let input = fixtures::lines(&[requests::call_tool_request(
        1,
        "nonexistent_tool_xyz",
        json!({}),
    )]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames.len(), 1);
    let error = &frames[0]["error"];
    assert_eq!(error["code"], -32601);
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("nonexistent_tool_xyz"));
}

/// Test: Unknown method returns method not found
#[tokio::test]
async fn test_unknown_method() {
    let server = fixtures::test_server("exit 0");
    let input = fixtures::lines(&[requests::unknown_method_request(1)]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], 1);
    assert_eq!(frames[0]["error"]["code"], -32601);
    assert_eq!(frames[0]["error"]["message"], "Method not found");
}

/// Test: Malformed lines get a parse error with a null id and the
/// connection keeps working
#[tokio::test]
async fn test_malformed_line_then_valid_request() {
    let server = fixtures::test_server("exit 0");
    let mut input = b"{not json\n".to_vec();
    input.extend(fixtures::lines(&[requests::ping_request(5)]));

    let (frames, _) = fixtures::exchange(server, &input).await;
    assert_eq!(frames.len(), 2);

    let parse_error = frames
        .iter()
        .find(|f| f.get("error").is_some())
        .expect("parse error response");
    assert_eq!(parse_error["error"]["code"], -32700);
    assert!(parse_error["id"].is_null());

    let pong = fixtures::by_id(&frames).remove(&5).expect("ping response");
    assert_eq!(pong["result"], json!({}));
}

/// Test: Windows line endings, blank lines and an unterminated last line
#[tokio::test]
async fn test_lenient_framing() {
    let server = fixtures::test_server("exit 0");
    let input = b"\r\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n\n   \n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}";

    let (frames, _) = fixtures::exchange(server, input).await;
    let responses = fixtures::by_id(&frames);
    assert_eq!(responses.len(), 2);
    assert!(responses.contains_key(&1));
    assert!(responses.contains_key(&2));
}

/// Test: Notifications never produce a response
#[tokio::test]
async fn test_notifications_are_silent() {
    let server = fixtures::test_server("exit 0");
    let input = fixtures::lines(&[
        requests::initialized_notification(),
        json!({ "jsonrpc": "2.0", "method": "notifications/cancelled", "params": { "requestId": 1 } }),
    ]);

    let (frames, reason) = fixtures::exchange(server, &input).await;
    assert!(frames.is_empty(), "unexpected frames: {:?}", frames);
    assert_eq!(reason, CloseReason::EndOfStream);
}

/// Test: A slow tool call still answers after the client stops writing
#[tokio::test]
async fn test_in_flight_call_finishes_after_input_ends() {
    let server = fixtures::test_server("sleep 0.3; echo done");
    let input = fixtures::lines(&[
        requests::call_tool_request(1, "run_tests", json!({})),
        requests::ping_request(2),
    ]);

    let (frames, _) = fixtures::exchange(server, &input).await;
    let responses = fixtures::by_id(&frames);
    assert_eq!(responses.len(), 2);
    assert_eq!(fixtures::tool_text(&responses[&1]["result"]), "done");

    // The ping answers first; responses follow completion order
    assert_eq!(frames[0]["id"], 2);
}
