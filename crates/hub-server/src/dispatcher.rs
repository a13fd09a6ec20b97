//! Operator command dispatch: rate limit, parse, route, enqueue or evict.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cmdrelay_protocol::Command;
use cmdrelay_protocol::constants::CLOSE_REASON_TOO_SLOW;
use cmdrelay_transport::TokenBucket;

use crate::command::{ParseError, parse_line};
use crate::registry::Registry;

/// What happened to one matching session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Command is in the agent's mailbox.
    Queued,
    /// Mailbox was full; the agent was evicted and the command dropped.
    Evicted,
    /// Session was already shutting down; the command was dropped.
    Closed,
}

/// Result of [`Dispatcher::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one session matched the agent id.
    Routed {
        command: Command,
        deliveries: Vec<(String, Delivery)>,
    },
    /// No registered session has this id. Nothing was enqueued.
    NoMatchingAgent { agent_id: String },
    /// The line does not follow the command grammar. Nothing was enqueued.
    Malformed(ParseError),
    /// The hub is shutting down.
    Cancelled,
}

/// Routes operator lines to agent mailboxes.
pub struct Dispatcher {
    registry: Arc<Registry>,
    limiter: TokenBucket,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, limiter: TokenBucket, cancel: CancellationToken) -> Self {
        Self {
            registry,
            limiter,
            cancel,
        }
    }

    /// Dispatches one operator line.
    ///
    /// The registry lock is held for the whole call, which also serializes
    /// concurrent callers. The rate-limit token is taken before parsing, so a
    /// malformed line still spends one. Enqueueing never waits: a full
    /// mailbox evicts its agent instead of stalling the operator or other
    /// agents.
    // The limiter wait could move in front of the lock if connects ever
    // contend with a throttled operator; with a single operator stream the
    // behaviour is the same either way.
    pub async fn submit(&self, line: &str) -> DispatchOutcome {
        let agents = self.registry.lock().await;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return DispatchOutcome::Cancelled,
            _ = self.limiter.acquire() => {}
        }

        let command = match parse_line(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{e}");
                return DispatchOutcome::Malformed(e);
            }
        };

        let targets = agents.resolve(&command.agent_id);
        if targets.is_empty() {
            info!(agent_id = %command.agent_id, "no agents registered for given id, doing nothing");
            return DispatchOutcome::NoMatchingAgent {
                agent_id: command.agent_id,
            };
        }

        let mut deliveries = Vec::with_capacity(targets.len());
        for session in targets {
            let delivery = match session.try_enqueue(command.clone()) {
                Ok(()) => {
                    debug!(agent_id = session.id(), queued = session.queued(), "command queued");
                    Delivery::Queued
                }
                Err(TrySendError::Full(_)) => {
                    warn!(agent_id = session.id(), "agent mailbox full, evicting slow agent");
                    session.evict(CLOSE_REASON_TOO_SLOW);
                    Delivery::Evicted
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(agent_id = session.id(), "agent session closing, command dropped");
                    Delivery::Closed
                }
            };
            deliveries.push((session.id().to_owned(), delivery));
        }

        DispatchOutcome::Routed {
            command,
            deliveries,
        }
    }
}
