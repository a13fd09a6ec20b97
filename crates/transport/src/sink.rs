//! Destinations for decoded inbound frames.

use std::fmt;
use std::io::Write;

/// Receives every frame decoded by [`receive_frames`](crate::receive_frames).
pub trait FrameSink<T>: Send + Sync {
    fn deliver(&self, frame: T);
}

/// Logs each frame as an `info` event tagged with `source`.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    source: &'static str,
}

impl LogSink {
    pub const fn new(source: &'static str) -> Self {
        Self { source }
    }
}

impl<T: fmt::Display> FrameSink<T> for LogSink {
    fn deliver(&self, frame: T) {
        tracing::info!(source = self.source, "{frame}");
    }
}

/// Writes each frame as one line on standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl<T: fmt::Display> FrameSink<T> for StdoutSink {
    fn deliver(&self, frame: T) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{frame}").and_then(|()| out.flush()) {
            tracing::warn!("failed to write frame to stdout: {e}");
        }
    }
}
