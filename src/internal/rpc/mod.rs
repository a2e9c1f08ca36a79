use std::time::Duration;

pub mod dispatcher;
pub mod pending;

pub use dispatcher::{Dispatcher, NotificationHandler, RequestHandler};
pub use pending::PendingTable;

use crate::internal::mcp::protocol::{JsonRpcError, RequestId};
use crate::internal::transport::TransportError;

/// Why an outgoing request did not produce a result
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The peer answered with an error response
    #[error("{}", .0.message)]
    Remote(JsonRpcError),
    #[error("channel closed")]
    ChannelClosed,
    #[error("request `{method}` timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("request id {0} is already pending")]
    DuplicateId(RequestId),
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for RpcError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Closed => RpcError::ChannelClosed,
            other => RpcError::Transport(other),
        }
    }
}
