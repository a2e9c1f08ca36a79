use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::channel::{FramedChannel, MessageSender};
use super::lifecycle::{CloseReason, ExitInfo, Lifecycle, LifecycleState};
use super::{Transport, TransportError};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How to launch the peer process
#[derive(Debug, Clone)]
pub struct ChildProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Time the child gets to exit after its stdin closes before it is killed
    pub grace_period: Duration,
}

impl ChildProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

struct ChildHandles {
    sender: MessageSender,
    terminate: Option<oneshot::Sender<()>>,
}

/// Client-side transport: spawns the peer and speaks over its stdin/stdout.
///
/// A supervisor task owns the `Child`. It records the exit status as the
/// close reason whether the child exits on its own or is terminated by
/// `close()`, so the `Closed` event always carries exit information.
pub struct ChildProcessTransport {
    config: ChildProcessConfig,
    lifecycle: Arc<Lifecycle>,
    handles: Mutex<Option<ChildHandles>>,
}

impl ChildProcessTransport {
    pub fn new(config: ChildProcessConfig) -> Self {
        Self {
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            handles: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ChildProcessConfig {
        &self.config
    }

    fn spawn_child(&self) -> Result<Child, TransportError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        command.spawn().map_err(|source| TransportError::Launch {
            command: self.config.command.clone(),
            source,
        })
    }
}

fn missing_pipe(name: &str) -> TransportError {
    TransportError::Io(std::io::Error::other(format!(
        "child {} was not captured",
        name
    )))
}

#[async_trait]
impl Transport for ChildProcessTransport {
    async fn start(&self) -> Result<FramedChannel, TransportError> {
        self.lifecycle.mark_started()?;

        let mut child = match self.spawn_child() {
            Ok(child) => child,
            Err(error) => {
                self.lifecycle
                    .mark_closed(CloseReason::LaunchFailed(error.to_string()));
                return Err(error);
            }
        };

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            (stdin, stdout, _) => {
                let error = if stdin.is_none() {
                    missing_pipe("stdin")
                } else if stdout.is_none() {
                    missing_pipe("stdout")
                } else {
                    missing_pipe("stderr")
                };
                self.lifecycle
                    .mark_closed(CloseReason::LaunchFailed(error.to_string()));
                return Err(error);
            }
        };

        let pid = child.id();
        info!(command = %self.config.command, ?pid, "spawned child process");

        tokio::spawn(drain_stderr(stderr, self.config.command.clone()));

        let channel = FramedChannel::new(stdout, stdin, self.lifecycle.cancellation());
        let (terminate_tx, terminate_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            terminate_rx,
            Arc::clone(&self.lifecycle),
            self.config.grace_period,
        ));

        *self.handles.lock().unwrap_or_else(PoisonError::into_inner) = Some(ChildHandles {
            sender: channel.sender(),
            terminate: Some(terminate_tx),
        });

        Ok(channel)
    }

    async fn shutdown(&self, reason: CloseReason) -> Result<(), TransportError> {
        let first = self.lifecycle.begin_close();
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(mut handles) = handles else {
            // Never started, or an earlier close already took the handles
            if first {
                self.lifecycle.mark_closed(reason);
            }
            return Ok(());
        };

        // Start the grace timer before taking the writer lock. A send blocked
        // on a full stdin pipe holds that lock until the kill breaks the pipe.
        if let Some(terminate) = handles.terminate.take() {
            let _ = terminate.send(());
        }
        // Dropping the write half closes the child's stdin
        if let Err(error) = handles.sender.shutdown().await {
            debug!(%error, "child stdin was already gone");
        }

        self.lifecycle.wait_closed().await;
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

fn exit_info(status: &ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitInfo {
        code: status.code(),
        signal,
    }
}

async fn supervise(
    mut child: Child,
    terminate: oneshot::Receiver<()>,
    lifecycle: Arc<Lifecycle>,
    grace_period: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => {
            if lifecycle.state() < LifecycleState::Closing {
                warn!(pid = ?child.id(), "child process exited unexpectedly");
            }
            status
        }
        // Fires on close() and when the transport is dropped
        _ = terminate => {
            match tokio::time::timeout(grace_period, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(?grace_period, "child did not exit after stdin closed, killing it");
                    if let Err(error) = child.kill().await {
                        warn!(%error, "failed to kill child process");
                    }
                    child.wait().await
                }
            }
        }
    };

    let reason = match status {
        Ok(status) => CloseReason::Exited(exit_info(&status)),
        Err(error) => {
            lifecycle.report_error(error.to_string());
            CloseReason::Failed(error.to_string())
        }
    };
    lifecycle.mark_closed(reason);
}

/// Keep the child's stderr pipe empty so it never blocks writing
/// diagnostics; lines are forwarded to the log.
async fn drain_stderr(stderr: ChildStderr, command: String) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                debug!(target: "testrun_mcp::child_stderr", command = %command, "{}", text.trim_end());
            }
            Err(error) => {
                debug!(%error, "stopped reading child stderr");
                break;
            }
        }
    }
}
