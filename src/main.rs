use tracing::{error, info};
use testrun_mcp::cli::{build_cli, parse_config};
use testrun_mcp::internal::server::create_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments first
    let matches = build_cli().get_matches();
    let config = match parse_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = testrun_mcp::internal::logger::init_logger(&config.logging) {
        eprintln!("Failed to initialize logger: {:#}", e);
        std::process::exit(1);
    }

    info!("Starting test runner MCP server");
    info!("Version: {}", testrun_mcp::internal::config::VERSION);
    info!(
        "Runner: {} (working dir: {})",
        config.runner.command,
        config.runner.working_dir.as_deref().unwrap_or(".")
    );

    let server = match create_server(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start_with_graceful_shutdown().await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    // The blocking stdin reader may still be parked after Ctrl-C
    std::process::exit(0);
}
