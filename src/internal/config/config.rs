use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variables use `TESTRUN_MCP__SECTION__KEY`
pub const ENV_PREFIX: &str = "TESTRUN_MCP";

/// Get version information
pub fn get_version_info() -> String {
    let build_timestamp = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");
    let build_date = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let rustc_semver = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");
    let cargo_target_triple = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let cargo_debug = option_env!("VERGEN_CARGO_DEBUG").unwrap_or("unknown");

    format!(
        "testrun-mcp version {}\n\
         Built: {} ({})\n\
         Rust: {}\n\
         Target: {} (debug: {})",
        VERSION, build_date, build_timestamp, rustc_semver, cargo_target_triple, cargo_debug
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "testrun-mcp".to_string(),
            version: VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub color: bool,
    pub output_path: Option<String>,
    pub append_to_file: bool,
    pub disable_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            color: true,
            output_path: None,
            append_to_file: false,
            disable_console: false,
        }
    }
}

/// The wrapped test-runner CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub command: String,
    /// Arguments that start every `run_tests` invocation
    pub test_args: Vec<String>,
    /// Arguments that start every `show_coverage` invocation
    pub coverage_args: Vec<String>,
    /// Flag placed before the `filter` argument of `run_tests`
    pub filter_flag: String,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
    /// Set `NO_COLOR=1` and `FORCE_COLOR=0` for the runner
    pub no_color: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            test_args: vec!["vitest".to_string(), "run".to_string()],
            coverage_args: vec![
                "vitest".to_string(),
                "run".to_string(),
                "--coverage".to_string(),
            ],
            filter_flag: "-t".to_string(),
            working_dir: None,
            env: HashMap::new(),
            no_color: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub runner: RunnerConfig,
}

impl AppConfig {
    /// Load from the default locations, then `config_file` if given, then
    /// the environment. An explicit file must exist.
    pub fn load_with(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("/etc/testrun-mcp/config").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("runner.test_args")
                    .with_list_parse_key("runner.coverage_args"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.command.trim().is_empty() {
            return Err(ConfigError::Message(
                "runner.command must not be empty".to_string(),
            ));
        }
        if self.runner.filter_flag.trim().is_empty() {
            return Err(ConfigError::Message(
                "runner.filter_flag must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "testrun-mcp");
        assert_eq!(config.server.version, VERSION);
        assert!(config.runner.no_color);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
name = "vitest-mcp"

[runner]
command = "cargo"
test_args = ["test"]
coverage_args = ["llvm-cov"]
filter_flag = "--"
working_dir = "/tmp"

[runner.env]
RUST_BACKTRACE = "1"
"#
        )
        .unwrap();

        let config = AppConfig::load_with(file.path().to_str()).unwrap();
        assert_eq!(config.server.name, "vitest-mcp");
        assert_eq!(config.server.version, VERSION);
        assert_eq!(config.runner.command, "cargo");
        assert_eq!(config.runner.test_args, vec!["test"]);
        assert_eq!(config.runner.filter_flag, "--");
        assert_eq!(config.runner.working_dir.as_deref(), Some("/tmp"));
        assert_eq!(config.runner.env.get("RUST_BACKTRACE").map(String::as_str), Some("1"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load_with(path.to_str()).is_err());
    }

    #[test]
    fn empty_runner_command_is_rejected() {
        let mut config = AppConfig::default();
        config.runner.command = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
