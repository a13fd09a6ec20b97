//! Agent side of cmdrelay.
//!
//! Two ways to run an agent:
//! - [`connect`] + [`run_agent`]: dial a hub and log every command it sends.
//! - [`AgentListener`]: accept operator consoles directly and print the
//!   messages they send.

mod client;
mod listener;

use std::time::Duration;

pub use client::{connect, run_agent};
pub use listener::AgentListener;

use cmdrelay_transport::{HandshakeError, IngressError};

/// Errors produced on the agent side.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connections still open {0:?} after shutdown")]
    ShutdownTimeout(Duration),
}
