use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, ProtocolVersion, ServerCapabilities};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::internal::mcp::protocol::{JsonRpcError, McpMethod, METHOD_NOT_FOUND};
use crate::internal::mcp::registry::ToolRegistry;
use crate::internal::rpc::Dispatcher;

/// Name, version and usage hint reported in the `initialize` result
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

/// MCP method handling on top of the dispatcher - no I/O of its own
pub struct McpProcessor {
    identity: ServerIdentity,
    tool_registry: Arc<ToolRegistry>,
    initialized: AtomicBool,
}

impl McpProcessor {
    pub fn new(identity: ServerIdentity, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            identity,
            tool_registry,
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether the client has sent `notifications/initialized`
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn server_info(&self) -> Result<Value, JsonRpcError> {
        let capabilities = serde_json::to_value(ServerCapabilities::builder().enable_tools().build())
            .map_err(JsonRpcError::internal)?;
        let protocol_version =
            serde_json::to_value(ProtocolVersion::V_2024_11_05).map_err(JsonRpcError::internal)?;

        let mut info = json!({
            "protocolVersion": protocol_version,
            "capabilities": capabilities,
            "serverInfo": {
                "name": self.identity.name,
                "version": self.identity.version,
            },
        });
        if let Some(instructions) = &self.identity.instructions {
            info["instructions"] = Value::String(instructions.clone());
        }
        Ok(info)
    }

    /// Process one MCP request and return its result.
    /// This is the core testable unit.
    pub async fn process_request(
        &self,
        method: &McpMethod,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        debug!("Processing request for method: {:?}", method);

        match method {
            McpMethod::Initialize => {
                let client = params
                    .as_ref()
                    .and_then(|p| p.get("clientInfo"))
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                info!(client, "initialize handshake");
                self.server_info()
            }
            McpMethod::ToolsList => {
                let tools = serde_json::to_value(self.tool_registry.list_metadata())
                    .map_err(JsonRpcError::internal)?;
                Ok(json!({ "tools": tools }))
            }
            McpMethod::ToolsCall => self.call_tool(params).await,
            McpMethod::Ping => Ok(json!({})),
            McpMethod::Initialized | McpMethod::Unknown(_) => {
                Err(JsonRpcError::method_not_found(method.as_str()))
            }
        }
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolRequestParam =
            serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(JsonRpcError::invalid_params)?;

        let tool = self.tool_registry.get(&params.name).ok_or_else(|| {
            JsonRpcError::new(METHOD_NOT_FOUND, format!("Tool not found: {}", params.name))
        })?;

        info!(tool = %params.name, "calling tool");
        let result = (tool.executor)(params).await.map_err(|error| {
            // Executors signal argument problems with a typed JSON-RPC error
            match error.downcast::<JsonRpcError>() {
                Ok(rpc_error) => rpc_error,
                Err(other) => JsonRpcError::internal(format!("{:#}", other)),
            }
        })?;

        serde_json::to_value(result).map_err(JsonRpcError::internal)
    }

    /// Register the MCP methods on a dispatcher
    pub fn install(self: &Arc<Self>, dispatcher: &Dispatcher) {
        for method in [
            McpMethod::Initialize,
            McpMethod::ToolsList,
            McpMethod::ToolsCall,
            McpMethod::Ping,
        ] {
            let processor = Arc::clone(self);
            let name = method.as_str().to_string();
            dispatcher.on_request(name, move |params| {
                let processor = Arc::clone(&processor);
                let method = method.clone();
                async move { processor.process_request(&method, params).await }
            });
        }

        let processor = Arc::clone(self);
        dispatcher.on_notification(McpMethod::Initialized.as_str(), move |_| {
            processor.initialized.store(true, Ordering::Release);
            info!("client finished initialization");
        });
    }
}
