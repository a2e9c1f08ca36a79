use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::channel::{FramedChannel, MessageSender};
use super::lifecycle::{CloseReason, Lifecycle};
use super::{Transport, TransportError};

const DUPLEX_BUFFER: usize = 64 * 1024;

/// In-process transport over a tokio duplex pipe.
///
/// Two linked instances behave like a server process and its client
/// without spawning anything; a raw peer stream lets tests write arbitrary
/// bytes in arbitrary chunks.
pub struct MemoryTransport {
    lifecycle: Lifecycle,
    io: Mutex<Option<DuplexStream>>,
    sender: Mutex<Option<MessageSender>>,
}

impl MemoryTransport {
    pub fn new(io: DuplexStream) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            io: Mutex::new(Some(io)),
            sender: Mutex::new(None),
        }
    }

    /// Two transports wired to each other
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(DUPLEX_BUFFER);
        (Self::new(a), Self::new(b))
    }

    /// A transport plus the raw stream of its peer
    pub fn with_peer() -> (Self, DuplexStream) {
        let (local, remote) = tokio::io::duplex(DUPLEX_BUFFER);
        (Self::new(local), remote)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&self) -> Result<FramedChannel, TransportError> {
        self.lifecycle.mark_started()?;

        let io = self
            .io
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::Closed)?;
        let (read_half, write_half) = tokio::io::split(io);

        let channel = FramedChannel::new(read_half, write_half, self.lifecycle.cancellation());
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel.sender());
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
        self.io.lock().unwrap_or_else(PoisonError::into_inner).take();

        self.lifecycle.mark_closed(reason);
        flushed
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}
