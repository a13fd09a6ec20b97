//! Operator console for a listening agent.
//!
//! Sends every stdin line to the agent as a `{"Message": line}` frame and
//! closes the connection normally when input ends.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use futures_util::SinkExt;
use tokio::io::AsyncBufReadExt;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

use cmdrelay_protocol::AgentMessage;
use cmdrelay_protocol::constants::{CONNECT_TIMEOUT, SEND_TIMEOUT};
use cmdrelay_transport::dial_subscriber;
use cmdrelay_transport::handshake::close_frame;

#[derive(Debug, Parser)]
#[command(name = "cmdrelay-console", version, about = "Send messages to a listening agent")]
struct Args {
    /// Agent base URL, e.g. `ws://127.0.0.1:9000`.
    url: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(&args.url));
    rt.shutdown_background();
    result
}

async fn run(url: &str) -> anyhow::Result<()> {
    let mut ws = dial_subscriber(url, CONNECT_TIMEOUT)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;

    println!("Enter message for agent and submit");
    prompt();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let json = serde_json::to_string(&AgentMessage::new(line))?;
        tokio::time::timeout(SEND_TIMEOUT, ws.send(WsMessage::Text(json.into())))
            .await
            .context("timed out sending message")??;
        prompt();
    }

    tracing::info!("input closed, disconnecting");
    tokio::time::timeout(SEND_TIMEOUT, ws.send(close_frame(CloseCode::Normal, "")))
        .await
        .context("timed out closing connection")??;
    Ok(())
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "-> ").and_then(|()| out.flush());
}
