use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::codec::{decode_message, FrameError, LineCodec};
use super::TransportError;
use crate::internal::mcp::protocol::JsonRpcMessage;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type ErrorListener = Box<dyn FnMut(&FrameError) + Send>;

/// A byte stream pair that speaks whole messages.
pub struct FramedChannel {
    sender: MessageSender,
    reader: MessageReader,
}

impl FramedChannel {
    /// `cancel` stops the inbound side; it is normally the owning
    /// transport's lifecycle token.
    pub fn new<R, W>(reader: R, writer: W, cancel: CancellationToken) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            sender: MessageSender {
                writer: Arc::new(Mutex::new(Some(FramedWrite::new(writer, LineCodec::new())))),
            },
            reader: MessageReader {
                frames: FramedRead::new(reader, LineCodec::new()),
                cancel,
                listeners: Vec::new(),
            },
        }
    }

    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    pub fn split(self) -> (MessageSender, MessageReader) {
        (self.sender, self.reader)
    }
}

/// Outbound half. Clones share one writer; each `send` writes and flushes
/// its whole frame while holding the writer lock.
#[derive(Clone)]
pub struct MessageSender {
    writer: Arc<Mutex<Option<FramedWrite<BoxedWriter, LineCodec>>>>,
}

impl MessageSender {
    pub async fn send(&self, message: impl Into<JsonRpcMessage>) -> Result<(), TransportError> {
        let message = message.into();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        trace!(method = ?message.method(), "sending frame");
        writer.send(message).await
    }

    /// Flush and release the write half. Later sends fail with `Closed`.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => writer.close().await,
            None => Ok(()),
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

/// Inbound half. Yields messages in the order their frames completed on
/// the wire; malformed frames go to the error listeners and are skipped.
pub struct MessageReader {
    frames: FramedRead<BoxedReader, LineCodec>,
    cancel: CancellationToken,
    listeners: Vec<ErrorListener>,
}

impl MessageReader {
    pub fn on_error<F>(&mut self, listener: F)
    where
        F: FnMut(&FrameError) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Next message, or `None` at end of stream or once cancelled.
    pub async fn next_message(&mut self) -> Result<Option<JsonRpcMessage>, TransportError> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                frame = self.frames.next() => frame,
            };

            let frame = match frame {
                Some(frame) => frame?,
                None => return Ok(None),
            };

            match decode_message(&frame) {
                Ok(message) => {
                    trace!(method = ?message.method(), "received frame");
                    return Ok(Some(message));
                }
                Err(error) => {
                    warn!(%error, "skipping malformed frame");
                    for listener in self.listeners.iter_mut() {
                        listener(&error);
                    }
                }
            }
        }
    }
}
