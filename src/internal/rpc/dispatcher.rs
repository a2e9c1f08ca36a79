use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::pending::PendingTable;
use super::RpcError;
use crate::internal::mcp::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    JSONRPC_VERSION,
};
use crate::internal::transport::{MessageReader, MessageSender, TransportError};

pub type RequestHandler = Arc<
    dyn Fn(Option<Value>) -> Pin<Box<dyn Future<Output = Result<Value, JsonRpcError>> + Send>>
        + Send
        + Sync,
>;

pub type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Retires a request id when the waiting call finishes, times out or is
/// dropped. Retiring an id that was already answered is a no-op.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.retire(&self.id) {
            debug!(id = %self.id, "retired request id without a response");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// One JSON-RPC peer on a framed channel.
///
/// Correlates outgoing requests with their responses (matching strictly by
/// id, never by order) and routes incoming requests and notifications to
/// registered handlers. Each incoming request is handled on its own task,
/// so responses leave in completion order.
pub struct Dispatcher {
    sender: MessageSender,
    pending: PendingTable,
    next_id: AtomicU64,
    default_timeout: Option<Duration>,
    reply_to_malformed: bool,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    notification_handlers: RwLock<HashMap<String, NotificationHandler>>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(sender: MessageSender) -> Self {
        Self {
            sender,
            pending: PendingTable::new(),
            next_id: AtomicU64::new(1),
            default_timeout: None,
            reply_to_malformed: false,
            request_handlers: RwLock::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            tasks: TaskTracker::new(),
        }
    }

    /// Timeout applied by `request`; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Answer malformed inbound frames with a `-32700` response carrying a
    /// null id. Servers want this; clients usually do not.
    pub fn reply_to_malformed(mut self, enabled: bool) -> Self {
        self.reply_to_malformed = enabled;
        self
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    pub fn on_request<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JsonRpcError>> + Send + 'static,
    {
        let handler: RequestHandler =
            Arc::new(move |params: Option<Value>| handler(params).boxed());
        self.request_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), handler);
    }

    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.notification_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), Arc::new(handler));
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        self.request_with_timeout(method, params, self.default_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let id = RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let response = self.pending.register(id.clone())?;
        let _guard = PendingGuard {
            table: &self.pending,
            id: id.clone(),
        };

        debug!(%id, method, "sending request");
        self.sender
            .send(JsonRpcRequest::new(id.clone(), method, params))
            .await?;

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| RpcError::Timeout {
                    method: method.to_string(),
                    timeout: limit,
                })?,
            None => response.await,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(RpcError::Remote(error)),
            // Completion handle dropped by `close`
            Err(_) => Err(RpcError::ChannelClosed),
        }
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::ChannelClosed);
        }
        self.sender
            .send(JsonRpcNotification::new(method, params))
            .await
            .map_err(RpcError::from)
    }

    /// Route one inbound message
    pub fn dispatch(&self, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Request(request) => self.handle_request(request),
            JsonRpcMessage::Notification(notification) => self.handle_notification(notification),
            JsonRpcMessage::Response(response) => self.handle_response(response),
        }
    }

    fn handle_request(&self, request: JsonRpcRequest) {
        let handler = self
            .request_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.method)
            .cloned();
        let sender = self.sender.clone();

        self.tasks.spawn(async move {
            let JsonRpcRequest {
                jsonrpc,
                id,
                method,
                params,
            } = request;

            let response = match handler {
                _ if jsonrpc != JSONRPC_VERSION => {
                    debug!(%method, %jsonrpc, "unsupported protocol version");
                    JsonRpcResponse::failure(
                        Some(id),
                        JsonRpcError::invalid_request(format!(
                            "unsupported jsonrpc version `{}`",
                            jsonrpc
                        )),
                    )
                }
                None => {
                    debug!(%method, "no handler registered");
                    JsonRpcResponse::failure(Some(id), JsonRpcError::method_not_found(&method))
                }
                Some(handler) => {
                    let call = AssertUnwindSafe(async move { handler(params).await })
                        .catch_unwind()
                        .await;
                    match call {
                        Ok(Ok(result)) => JsonRpcResponse::success(id, result),
                        Ok(Err(error)) => {
                            debug!(%method, %error, "request handler failed");
                            JsonRpcResponse::failure(Some(id), error)
                        }
                        Err(panic) => {
                            let detail = panic_message(panic.as_ref());
                            error!(%method, %detail, "request handler panicked");
                            JsonRpcResponse::failure(Some(id), JsonRpcError::internal(detail))
                        }
                    }
                }
            };

            if let Err(error) = sender.send(response).await {
                warn!(%method, %error, "failed to send response");
            }
        });
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        let handler = self
            .notification_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notification.method)
            .cloned();

        let Some(handler) = handler else {
            debug!(method = %notification.method, "ignoring unhandled notification");
            return;
        };

        let params = notification.params;
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            error!(
                method = %notification.method,
                detail = %panic_message(panic.as_ref()),
                "notification handler panicked"
            );
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            warn!(error = ?response.error, "peer reported an error without a request id");
            return;
        };

        if !self.pending.complete(&id, response.into_result()) {
            debug!(%id, "discarding response for unknown or retired request id");
        }
    }

    /// Feed inbound messages until the stream ends or is cancelled. On a
    /// clean end of stream, in-flight request handlers get to send their
    /// responses first. Pending outgoing requests are rejected either way.
    pub async fn serve(&self, mut reader: MessageReader) -> Result<(), TransportError> {
        if self.reply_to_malformed {
            let sender = self.sender.clone();
            let tasks = self.tasks.clone();
            reader.on_error(move |error| {
                let sender = sender.clone();
                let response = JsonRpcResponse::failure(None, JsonRpcError::parse_error(error));
                tasks.spawn(async move {
                    if let Err(error) = sender.send(response).await {
                        warn!(%error, "failed to send parse error response");
                    }
                });
            });
        }

        loop {
            match reader.next_message().await {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => break,
                Err(error) => {
                    self.close();
                    return Err(error);
                }
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
        self.close();
        Ok(())
    }

    /// Reject every pending request with `ChannelClosed`; later requests
    /// fail immediately.
    pub fn close(&self) {
        let abandoned = self.pending.close();
        if abandoned > 0 {
            debug!(abandoned, "rejected pending requests: channel closed");
        }
    }
}
