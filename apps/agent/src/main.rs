//! cmdrelay agent entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cmdrelay_agent_link::{AgentListener, connect, run_agent};
use cmdrelay_transport::{LogSink, StdoutSink};

#[derive(Debug, Parser)]
#[command(name = "cmdrelay-agent", version, about = "cmdrelay agent")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Connect to a hub and log the commands it routes here.
    Connect {
        /// Hub base URL, e.g. `ws://127.0.0.1:8080`.
        url: String,
    },
    /// Listen for operator consoles and print their messages.
    Listen {
        /// Address to listen on, e.g. `0.0.0.0:9000`.
        addr: String,
    },
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
    rt.block_on(async {
        match args.mode {
            Mode::Connect { url } => run_connect(&url).await,
            Mode::Listen { addr } => run_listen(&addr).await,
        }
    })?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}

async fn run_connect(url: &str) -> anyhow::Result<()> {
    let ws = connect(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    run_agent(ws, &LogSink::new("hub"), &shutdown).await?;
    Ok(())
}

async fn run_listen(addr: &str) -> anyhow::Result<()> {
    let socket = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    let listener = AgentListener::new(StdoutSink);
    let mut serve = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move { listener.serve(socket).await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            listener.shutdown();
            serve.await??;
        }
        result = &mut serve => result??,
    }
    Ok(())
}
