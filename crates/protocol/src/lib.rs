pub mod constants;
pub mod messages;

// Re-export primary types for convenience.
pub use messages::{AgentMessage, AgentReport, Command, IpAction};
