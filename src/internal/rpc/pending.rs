use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

use super::RpcError;
use crate::internal::mcp::protocol::{JsonRpcError, RequestId};

pub type Outcome = Result<Value, JsonRpcError>;

#[derive(Default)]
struct PendingState {
    entries: HashMap<RequestId, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// Requests awaiting a response, keyed by correlation id.
///
/// Every entry is consumed exactly once: by its response, by retirement
/// (timeout or caller gone), or by `close`, which drops the completion
/// handle so the waiter observes a closed channel.
#[derive(Default)]
pub struct PendingTable {
    state: Mutex<PendingState>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, id: RequestId) -> Result<oneshot::Receiver<Outcome>, RpcError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RpcError::ChannelClosed);
        }
        if state.entries.contains_key(&id) {
            return Err(RpcError::DuplicateId(id));
        }

        let (tx, rx) = oneshot::channel();
        state.entries.insert(id, tx);
        Ok(rx)
    }

    /// Deliver a response. Returns false when no entry matches the id.
    pub fn complete(&self, id: &RequestId, outcome: Outcome) -> bool {
        let sender = self.lock().entries.remove(id);
        match sender {
            // The waiter may have given up in the meantime; that is fine
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget an entry without resolving it
    pub fn retire(&self, id: &RequestId) -> bool {
        self.lock().entries.remove(id).is_some()
    }

    /// Reject everything pending and refuse new entries. Returns how many
    /// requests were abandoned.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.entries.drain().collect()
        };
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
