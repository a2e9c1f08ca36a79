use anyhow::Context;
use clap::{Arg, ArgMatches, Command};

use crate::internal::config::{get_version_info, AppConfig};

pub fn build_cli() -> Command {
    // Leak the version string to get a 'static lifetime
    let version: &'static str = Box::leak(get_version_info().into_boxed_str());

    Command::new("testrun-mcp")
        .version(version)
        .about("Exposes a test runner's test and coverage commands as MCP tools over stdio")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to config file (default: ./config.{yaml,toml,json}, /etc/testrun-mcp/config)"),
        )
        .arg(
            Arg::new("runner")
                .long("runner")
                .short('r')
                .help("Test runner executable (overrides runner.command)"),
        )
        .arg(
            Arg::new("working-dir")
                .long("working-dir")
                .short('C')
                .help("Directory the test runner is started in"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log level or filter directive, e.g. debug or testrun_mcp=trace"),
        )
}

/// Load the configuration and apply command line overrides
pub fn parse_config(matches: &ArgMatches) -> anyhow::Result<AppConfig> {
    let config_file = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load_with(config_file).context("Failed to load configuration")?;

    if let Some(runner) = matches.get_one::<String>("runner") {
        config.runner.command = runner.clone();
    }
    if let Some(dir) = matches.get_one::<String>("working-dir") {
        config.runner.working_dir = Some(dir.clone());
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
