use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::TransportError;

const EVENT_CAPACITY: usize = 16;

/// Transport lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Unstarted,
    Running,
    Closing,
    Closed,
}

/// Exit status of a child process, as far as the platform reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called locally
    Requested,
    /// The peer closed its output stream
    EndOfStream,
    /// The child process exited
    Exited(ExitInfo),
    LaunchFailed(String),
    Failed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "closed by request"),
            CloseReason::EndOfStream => write!(f, "peer closed the stream"),
            CloseReason::Exited(info) => write!(f, "process exited with {}", info),
            CloseReason::LaunchFailed(e) => write!(f, "launch failed: {}", e),
            CloseReason::Failed(e) => write!(f, "transport failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Started,
    Error(String),
    Closed(CloseReason),
}

/// Shared lifecycle bookkeeping for every transport kind.
///
/// The close reason slot doubles as the exactly-once guard for the
/// `Closed` event.
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    reason: Mutex<Option<CloseReason>>,
    events: broadcast::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Unstarted);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            reason: Mutex::new(None),
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Token cancelled once the transport is closed; readers stop on it
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn mark_started(&self) -> Result<(), TransportError> {
        let mut previous = LifecycleState::Unstarted;
        let started = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == LifecycleState::Unstarted {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });

        if !started {
            return Err(match previous {
                LifecycleState::Running => TransportError::AlreadyStarted,
                _ => TransportError::Closed,
            });
        }

        let _ = self.events.send(TransportEvent::Started);
        Ok(())
    }

    /// Move to `Closing`. Returns false when a close is already under way.
    pub fn begin_close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state < LifecycleState::Closing {
                *state = LifecycleState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Record the final state. Only the first call has any effect.
    pub fn mark_closed(&self, reason: CloseReason) -> bool {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
        }

        self.state.send_replace(LifecycleState::Closed);
        self.cancel.cancel();
        debug!(%reason, "transport closed");
        let _ = self.events.send(TransportEvent::Closed(reason));
        true
    }

    pub fn report_error(&self, message: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(message.into()));
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn wait_closed(&self) -> CloseReason {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so this only returns once closed
        let _ = state.wait_for(|s| *s == LifecycleState::Closed).await;
        self.close_reason().unwrap_or(CloseReason::Requested)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
