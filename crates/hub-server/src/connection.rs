//! Session loop: forwards an agent's mailbox to its WebSocket.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;

use cmdrelay_protocol::constants::CLOSE_REASON_SHUTDOWN;
use cmdrelay_protocol::{AgentReport, Command};
use cmdrelay_transport::handshake::close_frame;
use cmdrelay_transport::{FrameSink, TokenBucket, receive_frames};

use crate::SessionError;
use crate::config::ServerConfig;
use crate::session::AgentSession;

/// Why an active session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The agent closed the connection (normal or going-away).
    PeerClosed,
    /// The agent was evicted for falling behind.
    Evicted,
    /// The hub is shutting down.
    Shutdown,
}

/// Runs an active session until the agent leaves, is evicted, the hub shuts
/// down, or the transport fails.
///
/// Each mailbox command becomes one JSON text frame, sent under
/// `send_timeout`. The read half runs the rate-limited ingress loop for
/// [`AgentReport`] frames; its end is how a peer close is noticed. Agents
/// that never send anything are normal, so the read half has no deadline.
/// The session is marked closed on every exit path.
pub(crate) async fn run_session<S, K>(
    ws: S,
    session: &AgentSession,
    mut mailbox: mpsc::Receiver<Command>,
    config: &ServerConfig,
    shutdown: &CancellationToken,
    reports: &K,
) -> Result<SessionEnd, SessionError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>,
    K: FrameSink<AgentReport> + ?Sized,
{
    let (mut sink, mut stream) = ws.split();
    let limiter = TokenBucket::new(config.rate_interval(), config.rate_burst);
    let send_timeout = config.send_timeout();

    let ingress = receive_frames::<_, AgentReport, _>(&mut stream, &limiter, None, reports);
    tokio::pin!(ingress);

    let result = loop {
        tokio::select! {
            biased;

            _ = session.evicted() => {
                let reason = session.eviction_reason().unwrap_or_default();
                send_close(&mut sink, CloseCode::Policy, &reason, send_timeout).await;
                break Ok(SessionEnd::Evicted);
            }

            _ = shutdown.cancelled() => {
                send_close(&mut sink, CloseCode::Away, CLOSE_REASON_SHUTDOWN, send_timeout).await;
                break Ok(SessionEnd::Shutdown);
            }

            received = &mut ingress => {
                break received.map(|()| SessionEnd::PeerClosed).map_err(SessionError::from);
            }

            Some(command) = mailbox.recv() => {
                if let Err(e) = send_command(&mut sink, &command, send_timeout).await {
                    break Err(e);
                }
                tracing::debug!(agent_id = session.id(), ip = %command.ip, "command sent");
            }
        }
    };

    session.mark_closed();
    result
}

async fn send_command<K>(sink: &mut K, command: &Command, timeout: Duration) -> Result<(), SessionError>
where
    K: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(command)?;
    tokio::time::timeout(timeout, sink.send(WsMessage::Text(json.into())))
        .await
        .map_err(|_| SessionError::SendTimeout(timeout))??;
    Ok(())
}

/// Best-effort close frame; the session is ending either way.
async fn send_close<K>(sink: &mut K, code: CloseCode, reason: &str, timeout: Duration)
where
    K: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(timeout, sink.send(close_frame(code, reason))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("close frame not sent: {e}"),
        Err(_) => tracing::debug!("close frame timed out"),
    }
}
