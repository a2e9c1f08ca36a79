use async_trait::async_trait;

pub mod channel;
pub mod child;
pub mod codec;
pub mod lifecycle;
pub mod memory;
pub mod runner;
pub mod stdio;

pub use channel::{FramedChannel, MessageReader, MessageSender};
pub use child::{ChildProcessConfig, ChildProcessTransport};
pub use codec::{FrameError, LineCodec};
pub use lifecycle::{CloseReason, ExitInfo, Lifecycle, LifecycleState, TransportEvent};
pub use memory::MemoryTransport;
pub use runner::TransportRunner;
pub use stdio::StdioTransport;

/// Owner of the physical stream endpoints of one protocol connection.
///
/// `start` hands out the framed channel exactly once; `close` is idempotent
/// and fires [`TransportEvent::Closed`] exactly once over the transport's
/// lifetime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wire up both stream directions and return the framed channel
    async fn start(&self) -> Result<FramedChannel, TransportError>;

    /// Tear the connection down, recording `reason` unless the transport
    /// has better information (a child's exit status)
    async fn shutdown(&self, reason: CloseReason) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown(CloseReason::Requested).await
    }

    fn lifecycle(&self) -> &Lifecycle;

    /// Check if transport is still connected
    fn is_connected(&self) -> bool {
        self.lifecycle().state() == LifecycleState::Running
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    Closed,
    #[error("Transport already started")]
    AlreadyStarted,
    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
