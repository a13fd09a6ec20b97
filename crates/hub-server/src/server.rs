//! Hub WebSocket server.
//!
//! Accepts agent connections on `/subscribe`, registers each one before its
//! handshake completes and runs its session until it ends.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use cmdrelay_protocol::Command;
use cmdrelay_protocol::constants::SUBSCRIBE_PATH;
use cmdrelay_transport::handshake::close_frame;
use cmdrelay_transport::{LogSink, TokenBucket, accept_subscriber};

use crate::config::ServerConfig;
use crate::connection::{SessionEnd, run_session};
use crate::dispatcher::Dispatcher;
use crate::registry::Registry;
use crate::session::AgentSession;
use crate::{ServerError, SessionError};

/// The hub server.
///
/// Owns the accept loop and every session task. The [`Registry`] is shared
/// with the dispatchers handed out by [`dispatcher`](Self::dispatcher).
pub struct HubServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    reports: LogSink,
}

impl HubServer {
    pub fn new(config: ServerConfig, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            reports: LogSink::new("agent"),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A dispatcher with its own operator rate limiter. It stops waiting for
    /// tokens once the server shuts down.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.registry),
            TokenBucket::new(self.config.rate_interval(), self.config.rate_burst),
            self.cancel.child_token(),
        )
    }

    /// Starts graceful shutdown. [`serve`](Self::serve) returns once every
    /// session has closed or the grace period runs out.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts agents on `listener` until [`shutdown`](Self::shutdown).
    ///
    /// After shutdown no new connections are accepted; open sessions are
    /// closed with a going-away status and given the configured grace period
    /// to finish.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("hub listening on ws://{local_addr}{SUBSCRIBE_PATH}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("hub shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            self.tracker.spawn(async move {
                                server.handle_connection(stream, peer_addr).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
        drop(listener);

        self.tracker.close();
        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::error!(open = self.tracker.len(), "sessions did not close within {grace:?}");
            return Err(ServerError::ShutdownTimeout(grace));
        }

        tracing::info!("hub stopped");
        Ok(())
    }

    /// Runs one agent from TCP accept to removal. Errors stay here.
    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let (session, mailbox) = self.registry.register(self.config.mailbox_capacity).await;
        let agent_id = session.id().to_owned();

        let result = self.run_agent(stream, &session, mailbox).await;

        session.mark_closed();
        self.registry.remove(&session).await;

        match result {
            Ok(SessionEnd::PeerClosed) => {
                tracing::info!(%peer_addr, %agent_id, "agent disconnected");
            }
            Ok(SessionEnd::Evicted) => {
                let reason = session.eviction_reason().unwrap_or_default();
                tracing::warn!(%peer_addr, %agent_id, "agent evicted: {reason}");
            }
            Ok(SessionEnd::Shutdown) => {
                tracing::debug!(%peer_addr, %agent_id, "agent closed for shutdown");
            }
            Err(e) => {
                tracing::warn!(%peer_addr, %agent_id, "agent session ended: {e}");
            }
        }
    }

    async fn run_agent(
        &self,
        stream: TcpStream,
        session: &AgentSession,
        mailbox: mpsc::Receiver<Command>,
    ) -> Result<SessionEnd, SessionError> {
        // A peer that never finishes its upgrade must not hold up shutdown.
        let handshake = accept_subscriber(stream, self.config.handshake_timeout());
        let mut ws = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Shutdown),
            result = handshake => result?,
        };

        if let Err(e) = session.activate() {
            let reason = session.eviction_reason().unwrap_or_default();
            let close = ws.send(close_frame(CloseCode::Policy, &reason));
            let _ = tokio::time::timeout(self.config.send_timeout(), close).await;
            return Err(e);
        }
        tracing::info!(agent_id = session.id(), "agent connected");

        run_session(ws, session, mailbox, &self.config, &self.cancel, &self.reports).await
    }
}
