// src/internal/server/tool/handler.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content, JsonObject, Tool};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::params::{input_schema, RunTestsParams, ShowCoverageParams};
use crate::internal::mcp::protocol::JsonRpcError;
use crate::internal::mcp::registry::{RegisteredTool, ToolRegistry};
use crate::internal::runner::{CommandOutput, CommandRunner};

pub type ToolExecutor = Arc<
    dyn Fn(CallToolRequestParam) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send>>
        + Send
        + Sync,
>;

/// The runner operations exposed as tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTool {
    RunTests,
    ShowCoverage,
}

impl TestTool {
    pub const ALL: [TestTool; 2] = [TestTool::RunTests, TestTool::ShowCoverage];

    pub fn name(self) -> &'static str {
        match self {
            TestTool::RunTests => "run_tests",
            TestTool::ShowCoverage => "show_coverage",
        }
    }

    fn description(self) -> &'static str {
        match self {
            TestTool::RunTests => {
                "Run the project's tests, optionally limited to some files or a test name pattern"
            }
            TestTool::ShowCoverage => "Run the tests with coverage enabled and return the report",
        }
    }

    pub fn metadata(self) -> Result<Tool> {
        let schema = match self {
            TestTool::RunTests => input_schema::<RunTestsParams>()?,
            TestTool::ShowCoverage => input_schema::<ShowCoverageParams>()?,
        };
        Ok(Tool::new(self.name(), self.description(), Arc::new(schema)))
    }

    /// Full runner argument list for one call
    fn command_args(
        self,
        runner: &CommandRunner,
        arguments: Option<JsonObject>,
    ) -> Result<Vec<String>, JsonRpcError> {
        match self {
            TestTool::RunTests => {
                let params: RunTestsParams = decode_arguments(self, arguments)?;
                Ok(runner.test_args(params.to_args(&runner.config().filter_flag)))
            }
            TestTool::ShowCoverage => {
                let params: ShowCoverageParams = decode_arguments(self, arguments)?;
                Ok(runner.coverage_args(params.to_args()))
            }
        }
    }
}

fn decode_arguments<P: DeserializeOwned>(
    tool: TestTool,
    arguments: Option<JsonObject>,
) -> Result<P, JsonRpcError> {
    let arguments = serde_json::Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(arguments).map_err(|error| {
        JsonRpcError::invalid_params(format!("Invalid arguments for {}: {}", tool.name(), error))
    })
}

/// Turn a finished runner process into a tool result
pub fn tool_result(output: &CommandOutput) -> CallToolResult {
    let text = output.combined_text();
    if output.success() {
        let text = if text.is_empty() {
            "Test runner finished without output".to_string()
        } else {
            text
        };
        return CallToolResult::success(vec![Content::text(text)]);
    }

    let status = match output.exit_code {
        Some(code) => format!("Test runner exited with code {}", code),
        None => "Test runner was terminated".to_string(),
    };
    CallToolResult::error(vec![Content::text(format!("{}\n{}", status, text))])
}

async fn execute(
    tool: TestTool,
    runner: Arc<CommandRunner>,
    request: CallToolRequestParam,
) -> Result<CallToolResult> {
    let args = tool.command_args(&runner, request.arguments)?;
    debug!(tool = tool.name(), ?args, "running tool");

    match runner.run(&args).await {
        Ok(output) => Ok(tool_result(&output)),
        Err(error) => {
            warn!(tool = tool.name(), "test runner failed to start: {:#}", error);
            Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to run the test runner: {:#}",
                error
            ))]))
        }
    }
}

/// Builds tool executors on top of the command runner and keeps them in
/// the shared registry
pub struct ToolHandler {
    registry: Arc<ToolRegistry>,
    runner: Arc<CommandRunner>,
}

impl ToolHandler {
    pub fn new(registry: Arc<ToolRegistry>, runner: CommandRunner) -> Self {
        Self {
            registry,
            runner: Arc::new(runner),
        }
    }

    /// Register a tool with its metadata and executor
    pub fn register_tool(&self, metadata: Tool, executor: ToolExecutor) {
        let name = metadata.name.to_string();
        self.registry
            .register(name, RegisteredTool { metadata, executor });
    }

    /// Register every runner tool
    pub fn register_test_tools(&self) -> Result<()> {
        for tool in TestTool::ALL {
            self.register_tool(tool.metadata()?, self.create_handler(tool));
        }
        Ok(())
    }

    /// Create the executor for one runner tool.
    ///
    /// Bad arguments fail the call with `-32602`. Everything that happens
    /// once the runner is involved, including failing to start it, is a
    /// tool result with `isError` set.
    pub fn create_handler(&self, tool: TestTool) -> ToolExecutor {
        let runner = Arc::clone(&self.runner);

        Arc::new(move |request: CallToolRequestParam| {
            execute(tool, Arc::clone(&runner), request).boxed()
        })
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn tool_count(&self) -> usize {
        self.registry.count()
    }
}
