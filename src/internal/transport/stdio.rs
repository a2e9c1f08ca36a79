use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use super::channel::{FramedChannel, MessageSender};
use super::lifecycle::{CloseReason, Lifecycle};
use super::{Transport, TransportError};

/// STDIO transport for a process acting as the protocol server.
///
/// Once started this transport is the only writer to stdout; diagnostics
/// must go to stderr or a log file.
pub struct StdioTransport {
    lifecycle: Lifecycle,
    sender: Mutex<Option<MessageSender>>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            sender: Mutex::new(None),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<FramedChannel, TransportError> {
        self.lifecycle.mark_started()?;

        let channel = FramedChannel::new(
            tokio::io::stdin(),
            tokio::io::stdout(),
            self.lifecycle.cancellation(),
        );
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel.sender());

        info!("STDIO transport connected");
        Ok(channel)
    }

    async fn shutdown(&self, reason: CloseReason) -> Result<(), TransportError> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let flushed = match sender {
            Some(sender) => sender.shutdown().await,
            None => Ok(()),
        };

        self.lifecycle.mark_closed(reason);
        flushed
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}
