// src/internal/server/server.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use crate::internal::config::AppConfig;
use crate::internal::mcp::processor::ServerIdentity;
use crate::internal::mcp::registry::ToolRegistry;
use crate::internal::mcp::McpProcessor;
use crate::internal::rpc::Dispatcher;
use crate::internal::runner::CommandRunner;
use crate::internal::server::tool::ToolHandler;
use crate::internal::transport::{CloseReason, StdioTransport, Transport, TransportRunner};

const INSTRUCTIONS: &str =
    "Runs the project's test suite. Use run_tests to execute tests and show_coverage for a coverage report.";

/// Server represents the MCP server instance: the tool set plus the
/// protocol plumbing that serves it over one transport.
#[derive(Clone)]
pub struct Server {
    pub config: AppConfig,
    pub tool_handler: Arc<ToolHandler>,
}

impl Server {
    /// Create a new MCP server instance with the provided configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid server configuration")?;

        let registry = Arc::new(ToolRegistry::new());
        let runner = CommandRunner::new(&config.runner);
        let tool_handler = ToolHandler::new(registry, runner);

        Ok(Self {
            config,
            tool_handler: Arc::new(tool_handler),
        })
    }

    /// Register the test-runner tools
    pub fn setup_tools(&self) -> Result<()> {
        self.tool_handler
            .register_test_tools()
            .context("Failed to register tools")?;

        info!(
            command = %self.config.runner.command,
            "Successfully registered {} tools",
            self.tool_count()
        );
        Ok(())
    }

    /// Get the number of registered tools
    pub fn tool_count(&self) -> usize {
        self.tool_handler.tool_count()
    }

    /// Get the underlying tool registry.
    pub fn tool_registry(&self) -> Arc<ToolRegistry> {
        self.tool_handler.registry()
    }

    pub fn processor(&self) -> Arc<McpProcessor> {
        let identity = ServerIdentity {
            name: self.config.server.name.clone(),
            version: self.config.server.version.clone(),
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        Arc::new(McpProcessor::new(identity, self.tool_registry()))
    }

    /// Serve MCP over `transport` until the peer goes away or the transport
    /// is closed. Returns why the connection ended.
    pub async fn serve<T>(&self, transport: Arc<T>) -> Result<CloseReason>
    where
        T: Transport + ?Sized + 'static,
    {
        let channel = transport
            .start()
            .await
            .context("Failed to start transport")?;
        let (sender, reader) = channel.split();

        let dispatcher = Arc::new(Dispatcher::new(sender).reply_to_malformed(true));
        self.processor().install(&dispatcher);

        info!("MCP Server ready! Tools available: {}", self.tool_count());

        let reason = TransportRunner::new(transport, dispatcher)
            .run(reader)
            .await
            .context("Transport failed")?;

        info!(%reason, "Connection closed");
        Ok(reason)
    }

    /// Serve on stdio until stdin closes or Ctrl-C arrives. Ctrl-C closes
    /// the transport so in-flight work is abandoned cleanly.
    pub async fn start_with_graceful_shutdown(&self) -> Result<()> {
        self.setup_tools()?;
        info!(
            "Starting STDIO server, version: {} with {} tools",
            self.config.server.version,
            self.tool_count()
        );

        let transport = Arc::new(StdioTransport::new());
        let shutdown_transport = Arc::clone(&transport);

        let shutdown = tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal");
                    if let Err(error) = shutdown_transport.close().await {
                        error!(%error, "Failed to close transport");
                    }
                }
                Err(error) => error!(%error, "Failed to install CTRL+C signal handler"),
            }
        });

        let result = self.serve(transport).await;
        shutdown.abort();

        info!("Server shutdown complete");
        result.map(|_| ())
    }
}

/// Helper function to create server with dependencies
pub fn create_server(config: AppConfig) -> Result<Server> {
    Server::new(config)
}
