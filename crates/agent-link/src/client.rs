//! Agent that dials the hub and receives commands.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;

use cmdrelay_protocol::Command;
use cmdrelay_protocol::constants::{
    CLOSE_REASON_PEER_EXIT, CONNECT_TIMEOUT, RATE_LIMIT_BURST, RATE_LIMIT_INTERVAL,
    RECEIVE_TIMEOUT, SEND_TIMEOUT,
};
use cmdrelay_transport::handshake::close_frame;
use cmdrelay_transport::{ClientStream, FrameSink, TokenBucket, dial_subscriber, receive_frames};

use crate::LinkError;

/// Dials `<base>/subscribe`, giving up after one minute.
pub async fn connect(base: &str) -> Result<ClientStream, LinkError> {
    let ws = dial_subscriber(base, CONNECT_TIMEOUT).await?;
    tracing::info!(url = base, "connected to hub");
    Ok(ws)
}

/// Receives commands from the hub until it closes the connection or
/// `shutdown` fires.
///
/// On shutdown the agent sends a normal close. If the receive loop fails, a
/// best-effort internal-error close is sent before the error is returned.
pub async fn run_agent<S, K>(ws: S, sink: &K, shutdown: &CancellationToken) -> Result<(), LinkError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>,
    K: FrameSink<Command> + ?Sized,
{
    let (mut write, mut read) = ws.split();
    let limiter = TokenBucket::new(RATE_LIMIT_INTERVAL, RATE_LIMIT_BURST);

    let result = tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::info!("closing hub connection");
            send_close(&mut write, CloseCode::Normal, "").await;
            return Ok(());
        }
        result = receive_frames::<_, Command, _>(
            &mut read,
            &limiter,
            Some(RECEIVE_TIMEOUT),
            sink,
        ) => result,
    };

    match result {
        Ok(()) => {
            tracing::info!("hub closed the connection");
            Ok(())
        }
        Err(e) => {
            send_close(&mut write, CloseCode::Error, CLOSE_REASON_PEER_EXIT).await;
            Err(e.into())
        }
    }
}

async fn send_close<K>(write: &mut K, code: CloseCode, reason: &str)
where
    K: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(SEND_TIMEOUT, write.send(close_frame(code, reason))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("close frame not sent: {e}"),
        Err(_) => tracing::debug!("close frame timed out"),
    }
}
