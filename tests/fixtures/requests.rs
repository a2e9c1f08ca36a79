//! Wire messages a client would send

use serde_json::{json, Value};

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

/// MCP initialize request from a client calling itself `test-client`
pub fn initialize_request(id: i64) -> Value {
    request(
        id,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0.0" }
        }),
    )
}

pub fn initialized_notification() -> Value {
    json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
}

pub fn list_tools_request(id: i64) -> Value {
    request(id, "tools/list", json!({}))
}

pub fn call_tool_request(id: i64, tool_name: &str, arguments: Value) -> Value {
    request(
        id,
        "tools/call",
        json!({ "name": tool_name, "arguments": arguments }),
    )
}

/// Ping without params, as most clients send it
pub fn ping_request(id: i64) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": "ping" })
}

pub fn unknown_method_request(id: i64) -> Value {
    request(id, "unknown/method", json!({}))
}
