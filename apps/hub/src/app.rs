//! Hub orchestrator: server, operator input and shutdown.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cmdrelay_hub_server::{DispatchOutcome, HubServer, Registry, ServerConfig};

/// Lines read ahead of the dispatcher.
const OPERATOR_BUFFER: usize = 3;

/// Runs the hub until interrupted, operator input ends, or the server fails.
pub async fn run(addr: &str, config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    let server = HubServer::new(config, Arc::new(Registry::new()));
    let mut serve = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    let (line_tx, mut lines) = mpsc::channel(OPERATOR_BUFFER);
    tokio::spawn(read_operator_lines(line_tx));

    let dispatcher = server.dispatcher();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    prompt();
    let finished = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupt received, shutting down");
                break None;
            }

            line = lines.recv() => {
                let Some(line) = line else {
                    tracing::info!("operator input closed, shutting down");
                    break None;
                };
                if !line.trim().is_empty() {
                    let outcome = dispatcher.submit(&line).await;
                    if let DispatchOutcome::Routed { deliveries, .. } = outcome {
                        tracing::debug!(?deliveries, "command dispatched");
                    }
                }
                prompt();
            }

            result = &mut serve => break Some(result),
        }
    };

    server.shutdown();
    let result = match finished {
        Some(result) => result,
        None => serve.await,
    };
    result.context("server task panicked")??;
    Ok(())
}

async fn read_operator_lines(tx: mpsc::Sender<String>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("failed to read operator input: {e}");
                return;
            }
        }
    }
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "-> ").and_then(|()| out.flush());
}
