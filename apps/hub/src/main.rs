//! cmdrelay hub entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Routes operator commands typed on stdin to connected agents.
#[derive(Debug, Parser)]
#[command(name = "cmdrelay-hub", version)]
struct Args {
    /// Address to listen on for agents, e.g. `0.0.0.0:8080`.
    addr: String,

    /// Optional TOML file overriding server defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the operator prompt.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting cmdrelay hub");

    let config = config::load(args.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(&args.addr, config));
    // The stdin reader may still be blocked on a read.
    rt.shutdown_background();
    result?;

    tracing::info!("hub shut down cleanly");
    Ok(())
}
