// src/internal/runner/command_runner.rs

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::internal::config::RunnerConfig;
use crate::internal::runner::CommandOutput;

/// Runs the wrapped test-runner CLI as a subprocess
#[derive(Debug, Clone)]
pub struct CommandRunner {
    config: RunnerConfig,
}

impl CommandRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Arguments for a test run: configured prefix, then `extra`
    pub fn test_args(&self, extra: impl IntoIterator<Item = String>) -> Vec<String> {
        self.config.test_args.iter().cloned().chain(extra).collect()
    }

    /// Arguments for a coverage report: configured prefix, then `extra`
    pub fn coverage_args(&self, extra: impl IntoIterator<Item = String>) -> Vec<String> {
        self.config.coverage_args.iter().cloned().chain(extra).collect()
    }

    /// Run the configured command with `args` and capture its output.
    ///
    /// A non-zero exit is not an error here; only failing to run the
    /// process at all is.
    pub async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        let mut command = Command::new(&self.config.command);
        command
            .args(args)
            .envs(&self.config.env)
            // stdin of this process carries the protocol
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.config.no_color {
            command.env("NO_COLOR", "1").env("FORCE_COLOR", "0");
        }
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        info!(command = %self.config.command, ?args, "Executing test command");

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run `{}`", self.config.command))?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            exit_code = ?result.exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Test command finished"
        );
        Ok(result)
    }
}
