//! The set of live agent sessions.
//!
//! One async mutex guards membership. The dispatcher holds it for the whole
//! of a dispatch so that "who is registered" and "who receives this command"
//! are atomic with respect to connects and disconnects.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, mpsc};

use cmdrelay_protocol::Command;

use crate::session::AgentSession;

/// Registered sessions. Only reachable through [`Registry::lock`].
#[derive(Debug, Default)]
pub struct Agents {
    sessions: Vec<Arc<AgentSession>>,
}

impl Agents {
    /// Smallest positive integer not used as a session id, as a string.
    ///
    /// Ids that do not parse as integers are ignored.
    pub fn allocate_id(&self) -> String {
        let used: HashSet<u64> = self
            .sessions
            .iter()
            .filter_map(|s| s.id().parse().ok())
            .collect();
        let free = (1u64..)
            .find(|n| !used.contains(n))
            .unwrap_or(u64::MAX);
        free.to_string()
    }

    pub fn add(&mut self, session: Arc<AgentSession>) {
        self.sessions.push(session);
    }

    /// Removes this exact session (by identity, not id).
    pub fn remove(&mut self, session: &Arc<AgentSession>) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| !Arc::ptr_eq(s, session));
        self.sessions.len() != before
    }

    /// Sessions whose id equals `id`.
    ///
    /// Ids are allocated uniquely, so this is normally zero or one session;
    /// duplicates are returned as-is rather than rejected.
    pub fn resolve(&self, id: &str) -> Vec<Arc<AgentSession>> {
        self.sessions
            .iter()
            .filter(|s| s.id() == id)
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.id().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Shared agent registry, injected into the server and the dispatcher.
#[derive(Debug, Default)]
pub struct Registry {
    agents: Mutex<Agents>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, Agents> {
        self.agents.lock().await
    }

    /// Allocates an id and registers a new session under a single lock
    /// acquisition, so concurrent connects never share an id.
    pub async fn register(&self, mailbox_capacity: usize) -> (Arc<AgentSession>, mpsc::Receiver<Command>) {
        let mut agents = self.agents.lock().await;
        let id = agents.allocate_id();
        let (session, mailbox) = AgentSession::new(id, mailbox_capacity);
        agents.add(Arc::clone(&session));
        tracing::debug!(agent_id = session.id(), registered = agents.len(), "agent registered");
        (session, mailbox)
    }

    pub async fn remove(&self, session: &Arc<AgentSession>) -> bool {
        let mut agents = self.agents.lock().await;
        let removed = agents.remove(session);
        if removed {
            tracing::debug!(agent_id = session.id(), registered = agents.len(), "agent removed");
        }
        removed
    }

    pub async fn resolve(&self, id: &str) -> Vec<Arc<AgentSession>> {
        self.agents.lock().await.resolve(id)
    }

    pub async fn len(&self) -> usize {
        self.agents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.lock().await.is_empty()
    }
}
