//! WebSocket upgrade on the `/subscribe` path, server and client side.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use cmdrelay_protocol::constants::{SUBSCRIBE_PATH, WS_MAX_MESSAGE_SIZE, subscribe_url};

/// Server-side stream for an accepted connection.
pub type ServerStream = WebSocketStream<TcpStream>;

/// Client-side stream returned by [`dial_subscriber`].
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("WebSocket handshake failed: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("WebSocket handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// Size limits shared by every connection.
pub fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    config
}

/// Upgrades an accepted TCP stream, refusing any path other than `/subscribe`.
pub async fn accept_subscriber(
    stream: TcpStream,
    timeout: Duration,
) -> Result<ServerStream, HandshakeError> {
    let upgrade =
        tokio_tungstenite::accept_hdr_async_with_config(stream, subscribe_only, Some(ws_config()));
    let ws = tokio::time::timeout(timeout, upgrade)
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))??;
    Ok(ws)
}

/// Dials `<base>/subscribe`.
pub async fn dial_subscriber(base: &str, timeout: Duration) -> Result<ClientStream, HandshakeError> {
    let url = subscribe_url(base);
    let connect = tokio_tungstenite::connect_async_with_config(url, Some(ws_config()), false);
    let (ws, _) = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))??;
    Ok(ws)
}

/// Builds a close frame.
pub fn close_frame(code: CloseCode, reason: &str) -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code,
        reason: reason.to_owned().into(),
    }))
}

fn subscribe_only(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == SUBSCRIBE_PATH {
        return Ok(response);
    }

    tracing::debug!(path, "refusing upgrade on unknown path");
    let mut refusal = ErrorResponse::new(Some(format!("no route for {path}")));
    *refusal.status_mut() = StatusCode::NOT_FOUND;
    Err(refusal)
}
