//! WebSocket plumbing shared by the hub and the agents.
//!
//! - [`handshake`]: upgrades restricted to `/subscribe`, dialing, close frames.
//! - [`TokenBucket`]: the rate limiter used for operator commands and for
//!   every connection's inbound frames.
//! - [`receive_frames`]: the rate-limited receive loop that decodes JSON
//!   frames into a [`FrameSink`].

pub mod handshake;
mod limiter;
mod receive;
mod sink;

pub use handshake::{ClientStream, HandshakeError, ServerStream, accept_subscriber, dial_subscriber};
pub use limiter::TokenBucket;
pub use receive::{IngressError, is_expected_close, receive_frames};
pub use sink::{FrameSink, LogSink, StdoutSink};
