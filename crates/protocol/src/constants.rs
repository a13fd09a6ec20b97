use std::time::Duration;

/// The only HTTP path that is upgraded to a WebSocket.
pub const SUBSCRIBE_PATH: &str = "/subscribe";

/// Pending commands an agent may have queued before it is evicted.
pub const MAILBOX_CAPACITY: usize = 16;

/// Time allowed to write one command frame to an agent.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the server side of the WebSocket handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for an agent or console to dial and upgrade.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Token replenish interval for operator commands and inbound frames.
pub const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Token bucket capacity.
pub const RATE_LIMIT_BURST: u32 = 8;

/// Read deadline for inbound frames on the agent side.
///
/// The hub's session loop reads without a deadline.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Time allowed for sessions to wind down after an interrupt.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Maximum message size in bytes (64 KiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Close reason sent to an evicted agent.
pub const CLOSE_REASON_TOO_SLOW: &str = "connection too slow to keep up with commands";

/// Close reason sent to agents when the hub stops.
pub const CLOSE_REASON_SHUTDOWN: &str = "hub shutting down";

/// Close reason sent by an agent or console leaving on error.
pub const CLOSE_REASON_PEER_EXIT: &str = "connection to server closed";

/// Joins a base `ws://host:port` URL with [`SUBSCRIBE_PATH`].
pub fn subscribe_url(base: &str) -> String {
    format!("{}{SUBSCRIBE_PATH}", base.trim_end_matches('/'))
}
