//! Hub side of cmdrelay.
//!
//! Agents connect over WebSocket on `/subscribe` and are registered under the
//! smallest free numeric id. Operator lines go through the [`Dispatcher`],
//! which rate-limits, parses and routes each one to the matching agent's
//! bounded mailbox. Agents that let their mailbox fill up are evicted with a
//! policy-violation close instead of slowing everyone else down.

pub mod command;
mod config;
mod connection;
mod dispatcher;
mod registry;
mod server;
mod session;

use std::time::Duration;

pub use command::{ParseError, parse_line};
pub use config::ServerConfig;
pub use connection::SessionEnd;
pub use dispatcher::{Delivery, DispatchOutcome, Dispatcher};
pub use registry::{Agents, Registry};
pub use server::HubServer;
pub use session::{AgentSession, SessionState};

use cmdrelay_transport::{HandshakeError, IngressError};

/// Errors produced by the hub server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sessions still open {0:?} after shutdown")]
    ShutdownTimeout(Duration),
}

/// Errors that end a single agent session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("agent {0} was evicted before the handshake completed")]
    EvictedDuringHandshake(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Ingress(#[from] IngressError),
}
