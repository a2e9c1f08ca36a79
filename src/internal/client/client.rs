// src/internal/client/client.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rmcp::model::{CallToolResult, JsonObject, ProtocolVersion, Tool};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::internal::config::VERSION;
use crate::internal::mcp::protocol::McpMethod;
use crate::internal::rpc::Dispatcher;
use crate::internal::transport::{
    ChildProcessConfig, ChildProcessTransport, CloseReason, Transport, TransportError,
    TransportRunner,
};

#[derive(Deserialize)]
struct ListToolsResponse {
    tools: Vec<Tool>,
}

/// Client end of an MCP connection to a spawned server process
pub struct McpClient {
    transport: Arc<ChildProcessTransport>,
    dispatcher: Arc<Dispatcher>,
    runner: JoinHandle<Result<CloseReason, TransportError>>,
    server_info: Value,
}

impl McpClient {
    /// Spawn the server, then run the `initialize` handshake.
    pub async fn spawn(config: ChildProcessConfig, timeout: Option<Duration>) -> Result<Self> {
        let transport = Arc::new(ChildProcessTransport::new(config));
        let (sender, reader) = transport
            .start()
            .await
            .context("Failed to start MCP server process")?
            .split();

        let dispatcher = Arc::new(Dispatcher::new(sender).with_timeout(timeout));
        let runner = tokio::spawn(
            TransportRunner::new(Arc::clone(&transport), Arc::clone(&dispatcher)).run(reader),
        );

        let mut client = Self {
            transport,
            dispatcher,
            runner,
            server_info: Value::Null,
        };

        match client.initialize().await {
            Ok(()) => Ok(client),
            Err(error) => {
                client.close().await;
                Err(error)
            }
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        let protocol_version = serde_json::to_value(ProtocolVersion::V_2024_11_05)?;
        let params = json!({
            "protocolVersion": protocol_version,
            "capabilities": {},
            "clientInfo": { "name": "testrun-mcp-call", "version": VERSION },
        });

        self.server_info = self
            .dispatcher
            .request(McpMethod::Initialize.as_str(), Some(params))
            .await
            .context("initialize request failed")?;
        info!(server = %self.server_info["serverInfo"], "connected to MCP server");

        self.dispatcher
            .notify(McpMethod::Initialized.as_str(), None)
            .await
            .context("Failed to send initialized notification")?;
        Ok(())
    }

    /// The `initialize` result reported by the server
    pub fn server_info(&self) -> &Value {
        &self.server_info
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result = self
            .dispatcher
            .request(McpMethod::ToolsList.as_str(), None)
            .await
            .context("tools/list request failed")?;
        let response: ListToolsResponse =
            serde_json::from_value(result).context("Malformed tools/list result")?;
        Ok(response.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult> {
        debug!(tool = name, "calling tool");
        let params = json!({ "name": name, "arguments": arguments.unwrap_or_default() });
        let result = self
            .dispatcher
            .request(McpMethod::ToolsCall.as_str(), Some(params))
            .await
            .with_context(|| format!("tools/call `{}` failed", name))?;
        serde_json::from_value(result).context("Malformed tools/call result")
    }

    /// Close stdin, wait for the server to exit and return how it ended
    pub async fn close(self) -> CloseReason {
        if let Err(error) = self.transport.close().await {
            warn!(%error, "error while closing the MCP server transport");
        }
        match self.runner.await {
            Ok(Ok(reason)) => reason,
            Ok(Err(error)) => CloseReason::Failed(error.to_string()),
            Err(error) => CloseReason::Failed(error.to_string()),
        }
    }
}
