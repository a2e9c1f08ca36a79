use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::internal::rpc::Dispatcher;
use crate::internal::transport::{CloseReason, MessageReader, Transport, TransportError};

/// Drives one connection: feeds inbound messages to the dispatcher until
/// the stream ends or the transport closes underneath it, then tears both
/// down so that no pending request is left waiting.
pub struct TransportRunner<T: Transport + ?Sized> {
    transport: Arc<T>,
    dispatcher: Arc<Dispatcher>,
}

impl<T: Transport + ?Sized> TransportRunner<T> {
    pub fn new(transport: Arc<T>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }

    pub async fn run(self, reader: MessageReader) -> Result<CloseReason, TransportError> {
        debug!("[TransportRunner] Starting run loop");
        let lifecycle = self.transport.lifecycle();

        let outcome = tokio::select! {
            served = self.dispatcher.serve(reader) => served.map(|()| CloseReason::EndOfStream),
            reason = lifecycle.wait_closed() => {
                info!(%reason, "transport closed while serving");
                Ok(reason)
            }
        };

        // Rejects whatever is still pending before the writer goes away
        self.dispatcher.close();

        let reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(error) => {
                warn!(%error, "transport error");
                lifecycle.report_error(error.to_string());
                CloseReason::Failed(error.to_string())
            }
        };

        if let Err(error) = self.transport.shutdown(reason).await {
            debug!(%error, "error while shutting the transport down");
        }

        let final_reason = lifecycle.wait_closed().await;
        debug!(reason = %final_reason, "[TransportRunner] Run loop finished");
        outcome.map(|_| final_reason)
    }
}
