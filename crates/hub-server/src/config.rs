use std::time::Duration;

use serde::{Deserialize, Serialize};

use cmdrelay_protocol::constants::{
    HANDSHAKE_TIMEOUT, MAILBOX_CAPACITY, RATE_LIMIT_BURST, RATE_LIMIT_INTERVAL, SEND_TIMEOUT,
    SHUTDOWN_GRACE,
};

use crate::ServerError;

/// Hub server tuning. Every field has a default, so partial TOML files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Commands an agent may have pending before it is evicted.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Per-command send timeout in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// WebSocket handshake timeout in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Token replenish interval in milliseconds.
    #[serde(default = "default_rate_interval_ms")]
    pub rate_interval_ms: u64,

    /// Token bucket capacity.
    #[serde(default = "default_rate_burst")]
    pub rate_burst: u32,

    /// Time sessions get to close after shutdown starts, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_mailbox_capacity() -> usize {
    MAILBOX_CAPACITY
}

fn default_send_timeout_ms() -> u64 {
    SEND_TIMEOUT.as_millis() as u64
}

fn default_handshake_timeout_ms() -> u64 {
    HANDSHAKE_TIMEOUT.as_millis() as u64
}

fn default_rate_interval_ms() -> u64 {
    RATE_LIMIT_INTERVAL.as_millis() as u64
}

fn default_rate_burst() -> u32 {
    RATE_LIMIT_BURST
}

fn default_shutdown_grace_secs() -> u64 {
    SHUTDOWN_GRACE.as_secs()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            rate_interval_ms: default_rate_interval_ms(),
            rate_burst: default_rate_burst(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Checks values that would otherwise be silently clamped.
    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |msg: &str| Err(ServerError::InvalidConfig(msg.to_owned()));
        if self.mailbox_capacity == 0 {
            return invalid("mailbox_capacity must be at least 1");
        }
        if self.rate_burst == 0 {
            return invalid("rate_burst must be at least 1");
        }
        if self.send_timeout_ms == 0 {
            return invalid("send_timeout_ms must be positive");
        }
        Ok(())
    }
}
