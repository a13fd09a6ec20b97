//! Listening agent: operator consoles connect to it directly.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use cmdrelay_protocol::AgentMessage;
use cmdrelay_protocol::constants::{
    HANDSHAKE_TIMEOUT, RATE_LIMIT_BURST, RATE_LIMIT_INTERVAL, RECEIVE_TIMEOUT, SEND_TIMEOUT,
    SHUTDOWN_GRACE, SUBSCRIBE_PATH,
};
use cmdrelay_transport::handshake::close_frame;
use cmdrelay_transport::{FrameSink, IngressError, TokenBucket, accept_subscriber, receive_frames};

use crate::LinkError;

/// Accepts WebSocket connections on `/subscribe` and feeds every
/// `{"Message": ...}` frame to a sink.
///
/// Each connection gets its own rate limiter and receive loop; a failing
/// connection never affects the others.
pub struct AgentListener<K> {
    sink: Arc<K>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<K> AgentListener<K>
where
    K: FrameSink<AgentMessage> + 'static,
{
    pub fn new(sink: K) -> Arc<Self> {
        Arc::new(Self {
            sink: Arc::new(sink),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Stops accepting and closes open connections with a going-away status.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts connections on `listener` until [`shutdown`](Self::shutdown).
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), LinkError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("agent listening on ws://{local_addr}{SUBSCRIBE_PATH}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("listener shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let this = Arc::clone(self);
                            self.tracker.spawn(async move {
                                match this.handle_connection(stream, peer_addr).await {
                                    Ok(()) => tracing::debug!(%peer_addr, "connection closed"),
                                    Err(e) => tracing::warn!(%peer_addr, "connection error: {e}"),
                                }
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
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait()).await.is_err() {
            return Err(LinkError::ShutdownTimeout(SHUTDOWN_GRACE));
        }
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<(), LinkError> {
        let ws = accept_subscriber(stream, HANDSHAKE_TIMEOUT).await?;
        tracing::info!(%peer_addr, "operator connected");

        let (mut write, mut read) = ws.split();
        let limiter = TokenBucket::new(RATE_LIMIT_INTERVAL, RATE_LIMIT_BURST);

        let result: Result<(), IngressError> = tokio::select! {
            _ = self.cancel.cancelled() => {
                let close = write.send(close_frame(CloseCode::Away, "agent shutting down"));
                let _ = tokio::time::timeout(SEND_TIMEOUT, close).await;
                Ok(())
            }
            result = receive_frames::<_, AgentMessage, _>(
                &mut read,
                &limiter,
                Some(RECEIVE_TIMEOUT),
                self.sink.as_ref(),
            ) => result,
        };

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl FrameSink<AgentMessage> for Collect {
        fn deliver(&self, frame: AgentMessage) {
            self.0.lock().unwrap().push(frame.message);
        }
    }

    impl Collect {
        fn snapshot(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Running {
        listener: Arc<AgentListener<Collect>>,
        base: String,
        handle: tokio::task::JoinHandle<Result<(), LinkError>>,
    }

    async fn start() -> Running {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", socket.local_addr().unwrap());
        let listener = AgentListener::new(Collect::default());
        let handle = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.serve(socket).await })
        };
        Running {
            listener,
            base,
            handle,
        }
    }

    async fn wait_for_messages(sink: &Collect, n: usize) -> Vec<String> {
        for _ in 0..200 {
            let got = sink.snapshot();
            if got.len() >= n {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only got {:?}", sink.snapshot());
    }

    fn message(text: &str) -> WsMessage {
        let json = serde_json::to_string(&AgentMessage::new(text)).unwrap();
        WsMessage::Text(json.into())
    }

    #[tokio::test]
    async fn delivers_messages_from_console() {
        let running = start().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/subscribe", running.base))
            .await
            .unwrap();

        ws.send(message("hello")).await.unwrap();
        ws.send(message("world")).await.unwrap();
        ws.close(None).await.unwrap();

        let got = wait_for_messages(running.listener.sink(), 2).await;
        assert_eq!(got, ["hello", "world"]);

        running.listener.shutdown();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_connection_does_not_affect_others() {
        let running = start().await;
        let url = format!("{}/subscribe", running.base);
        let (mut bad, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut good, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        bad.send(WsMessage::Text("not json".to_owned().into()))
            .await
            .unwrap();
        good.send(message("still here")).await.unwrap();

        let got = wait_for_messages(running.listener.sink(), 1).await;
        assert_eq!(got, ["still here"]);

        running.listener.shutdown();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refuses_other_paths() {
        let running = start().await;
        let result = tokio_tungstenite::connect_async(format!("{}/other", running.base)).await;
        assert!(result.is_err());

        running.listener.shutdown();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_open_connections() {
        let running = start().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/subscribe", running.base))
            .await
            .unwrap();
        // Make sure the handshake finished on the server side.
        ws.send(message("ping")).await.unwrap();
        wait_for_messages(running.listener.sink(), 1).await;

        running.listener.shutdown();
        let code = loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(frame))) => break frame.map(|f| f.code),
                Some(Ok(_)) => continue,
                _ => break None,
            }
        };
        assert_eq!(code, Some(CloseCode::Away));
        running.handle.await.unwrap().unwrap();
    }
}
