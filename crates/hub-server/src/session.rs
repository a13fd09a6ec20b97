//! Per-agent session state: id, mailbox, lifecycle and eviction.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use cmdrelay_protocol::Command;

use crate::SessionError;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, WebSocket handshake still in progress.
    Handshaking,
    /// Handshake done, commands are being forwarded.
    Active,
    /// Terminal. Reached at most once.
    Closed,
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    eviction: Option<String>,
}

/// The hub's record for one connected agent.
///
/// Producers enqueue through [`try_enqueue`](Self::try_enqueue); the receiving
/// half of the mailbox belongs to the session task. The session lock guards
/// only the lifecycle, never the registry.
#[derive(Debug)]
pub struct AgentSession {
    id: String,
    mailbox: mpsc::Sender<Command>,
    lifecycle: Mutex<Lifecycle>,
    evicted: CancellationToken,
}

impl AgentSession {
    /// Creates a session in [`SessionState::Handshaking`] along with the
    /// receiving half of its mailbox. A capacity of zero is treated as one.
    pub fn new(id: impl Into<String>, mailbox_capacity: usize) -> (Arc<Self>, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let session = Arc::new(Self {
            id: id.into(),
            mailbox: tx,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Handshaking,
                eviction: None,
            }),
            evicted: CancellationToken::new(),
        });
        (session, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Number of commands waiting in the mailbox.
    pub fn queued(&self) -> usize {
        self.mailbox.max_capacity() - self.mailbox.capacity()
    }

    /// Enqueues without waiting. Fails with `Full` when the agent is not
    /// keeping up and `Closed` once the session task has stopped reading.
    pub fn try_enqueue(&self, command: Command) -> Result<(), TrySendError<Command>> {
        self.mailbox.try_send(command)
    }

    /// Forces the session closed with a policy-violation status.
    ///
    /// Only flips the lifecycle and wakes the session task, which sends the
    /// close frame itself; callers never wait on transport I/O. A session
    /// evicted while still handshaking never becomes active.
    ///
    /// Returns `false` if the session was already closed.
    pub fn evict(&self, reason: impl Into<String>) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.state == SessionState::Closed {
            return false;
        }
        lifecycle.state = SessionState::Closed;
        lifecycle.eviction = Some(reason.into());
        drop(lifecycle);

        self.evicted.cancel();
        true
    }

    /// Reason passed to [`evict`](Self::evict), if the session was evicted.
    pub fn eviction_reason(&self) -> Option<String> {
        self.lock().eviction.clone()
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Resolves once the session has been evicted.
    pub fn evicted(&self) -> WaitForCancellationFuture<'_> {
        self.evicted.cancelled()
    }

    /// `Handshaking -> Active`. Fails if the session was evicted meanwhile.
    pub(crate) fn activate(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lock();
        match lifecycle.state {
            SessionState::Handshaking => {
                lifecycle.state = SessionState::Active;
                Ok(())
            }
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(SessionError::EvictedDuringHandshake(self.id.clone())),
        }
    }

    /// Marks the session closed on a normal exit so later evictions are no-ops.
    pub(crate) fn mark_closed(&self) {
        self.lock().state = SessionState::Closed;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
