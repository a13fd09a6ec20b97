//! Rate-limited receive loop for inbound JSON frames.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use crate::limiter::TokenBucket;
use crate::sink::FrameSink;

/// Errors that end a receive loop.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid frame payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    #[error("connection closed with status {code}: {reason}")]
    Closed { code: u16, reason: String },
}

/// Returns `true` for close codes that mark an expected disconnect.
pub fn is_expected_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away)
}

/// Reads data frames from `stream`, decodes each as `T` and hands it to `sink`.
///
/// A token is taken from `limiter` before each data frame is accepted.
/// Control frames are skipped (tungstenite answers pings itself).
///
/// Returns `Ok(())` when the peer ends the stream or closes with a normal or
/// going-away status. Any other close, a transport error, a read exceeding
/// `receive_timeout`, or a frame that does not decode ends the loop with an
/// error. Nothing is retried.
///
/// With `receive_timeout` set to `None` the loop waits for frames
/// indefinitely.
pub async fn receive_frames<S, T, K>(
    stream: &mut S,
    limiter: &TokenBucket,
    receive_timeout: Option<Duration>,
    sink: &K,
) -> Result<(), IngressError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    T: DeserializeOwned,
    K: FrameSink<T> + ?Sized,
{
    loop {
        limiter.acquire().await;

        let frame: T = loop {
            let next = match receive_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| IngressError::Timeout(limit))?,
                None => stream.next().await,
            };

            match next {
                Some(Ok(WsMessage::Text(text))) => break serde_json::from_str(text.as_str())?,
                Some(Ok(WsMessage::Binary(data))) => break serde_json::from_slice(&data)?,
                Some(Ok(WsMessage::Close(frame))) => return close_outcome(frame),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        };

        sink.deliver(frame);
    }
}

fn close_outcome(frame: Option<CloseFrame>) -> Result<(), IngressError> {
    match frame {
        None => Ok(()),
        Some(f) if is_expected_close(f.code) => Ok(()),
        Some(f) => Err(IngressError::Closed {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned(),
        }),
    }
}
