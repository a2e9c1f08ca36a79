use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use serde_json::Value;
use testrun_mcp::internal::client::McpClient;
use testrun_mcp::internal::config::{get_version_info, LoggingConfig};
use testrun_mcp::internal::logger::init_logger;
use testrun_mcp::internal::transport::ChildProcessConfig;

fn build_cli() -> Command {
    // Leak the version string to get a 'static lifetime
    let version: &'static str = Box::leak(get_version_info().into_boxed_str());

    Command::new("testrun-mcp-call")
        .version(version)
        .about("Spawn a testrun-mcp server, call one of its tools and print the result")
        .arg(
            Arg::new("server")
                .long("server")
                .default_value("testrun-mcp")
                .help("Server executable to spawn"),
        )
        .arg(
            Arg::new("server-arg")
                .long("server-arg")
                .action(ArgAction::Append)
                .allow_hyphen_values(true)
                .help("Argument passed to the server (repeatable)"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .conflicts_with("tool")
                .help("List the server's tools instead of calling one"),
        )
        .arg(
            Arg::new("tool")
                .long("tool")
                .short('t')
                .required_unless_present("list")
                .help("Name of the tool to call, e.g. run_tests"),
        )
        .arg(
            Arg::new("arguments")
                .long("arguments")
                .short('a')
                .help("Tool arguments as a JSON object"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_parser(clap::value_parser!(u64))
                .default_value("600")
                .help("Request timeout in seconds, 0 disables it"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("warn")
                .help("Log level for this client"),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let logging = LoggingConfig {
        level: matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| "warn".to_string()),
        ..LoggingConfig::default()
    };
    init_logger(&logging)?;

    let server = matches
        .get_one::<String>("server")
        .cloned()
        .unwrap_or_else(|| "testrun-mcp".to_string());
    let server_args = matches
        .get_many::<String>("server-arg")
        .into_iter()
        .flatten()
        .cloned();
    let timeout = matches
        .get_one::<u64>("timeout")
        .copied()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let arguments = match matches.get_one::<String>("arguments") {
        Some(raw) => match serde_json::from_str(raw).context("--arguments is not valid JSON")? {
            Value::Object(object) => Some(object),
            _ => bail!("--arguments must be a JSON object"),
        },
        None => None,
    };

    let client = McpClient::spawn(ChildProcessConfig::new(server).args(server_args), timeout).await?;

    let outcome = if matches.get_flag("list") {
        list_tools(&client).await.map(|()| true)
    } else {
        let tool = matches
            .get_one::<String>("tool")
            .context("--tool is required")?;
        call_tool(&client, tool, arguments).await
    };

    client.close().await;

    if !outcome? {
        std::process::exit(1);
    }
    Ok(())
}

async fn list_tools(client: &McpClient) -> anyhow::Result<()> {
    for tool in client.list_tools().await? {
        match &tool.description {
            Some(description) => println!("{}\t{}", tool.name, description),
            None => println!("{}", tool.name),
        }
    }
    Ok(())
}

/// Print the tool's text output; `false` when the tool reported an error
async fn call_tool(
    client: &McpClient,
    tool: &str,
    arguments: Option<serde_json::Map<String, Value>>,
) -> anyhow::Result<bool> {
    let result = client.call_tool(tool, arguments).await?;
    for content in &result.content {
        if let Some(text) = content.raw.as_text() {
            println!("{}", text.text);
        }
    }
    Ok(!result.is_error.unwrap_or(false))
}
