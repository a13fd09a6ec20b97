use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Hub -> Agent
// ---------------------------------------------------------------------------

/// A routed operator command, sent to the agent as one JSON text frame.
///
/// Field names and order are fixed by the agents already deployed:
/// `{"AgentId": .., "Command": .., "Ip": ..}`. Missing fields decode as
/// empty strings so that older agents that only know `Command`/`Ip` keep
/// working against the same type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Command {
    /// Id of the agent this command is routed to.
    #[serde(rename = "AgentId")]
    pub agent_id: String,
    /// Free-text action. Opaque to the hub.
    #[serde(rename = "Command")]
    pub action: String,
    /// IP literal supplied by the operator. Opaque to the hub.
    #[serde(rename = "Ip")]
    pub ip: String,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ip: {}, Command: {}", self.ip, self.action)
    }
}

// ---------------------------------------------------------------------------
// Agent -> Hub
// ---------------------------------------------------------------------------

/// Free-text message frame (`{"Message": ..}`).
///
/// Older consoles send the key in lower case alongside extra fields; both
/// are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMessage {
    #[serde(rename = "Message", alias = "message")]
    pub message: String,
}

impl AgentMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Firewall action reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpAction {
    AllowIpAddr,
    BlockIpAddr,
}

/// Structured report frame (`{"Command": "AllowIpAddr"|"BlockIpAddr", "Ip": ..}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    #[serde(rename = "Command")]
    pub action: IpAction,
    #[serde(rename = "Ip")]
    pub ip: String,
}

impl fmt::Display for AgentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command: {:?}, Ip: {}", self.action, self.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_field_names() {
        let cmd = Command {
            agent_id: "1".into(),
            action: "block".into(),
            ip: "10.0.0.5".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"AgentId":"1","Command":"block","Ip":"10.0.0.5"}"#);
    }

    #[test]
    fn command_missing_agent_id() {
        let cmd: Command = serde_json::from_str(r#"{"Command":"allow","Ip":"1.2.3.4"}"#).unwrap();
        assert!(cmd.agent_id.is_empty());
        assert_eq!(cmd.action, "allow");
        assert_eq!(cmd.ip, "1.2.3.4");
    }

    #[test]
    fn command_display() {
        let cmd = Command {
            agent_id: "2".into(),
            action: "drop all".into(),
            ip: "192.168.1.1".into(),
        };
        assert_eq!(cmd.to_string(), "Ip: 192.168.1.1, Command: drop all");
    }

    #[test]
    fn agent_message_field_name() {
        let json = serde_json::to_string(&AgentMessage::new("hello")).unwrap();
        assert_eq!(json, r#"{"Message":"hello"}"#);
    }

    #[test]
    fn agent_message_accepts_lowercase_key() {
        let msg: AgentMessage =
            serde_json::from_str(r#"{"type":"echo","message":"hi there"}"#).unwrap();
        assert_eq!(msg.message, "hi there");
    }

    #[test]
    fn report_rejects_unknown_action() {
        let result: Result<AgentReport, _> =
            serde_json::from_str(r#"{"Command":"Reboot","Ip":"1.2.3.4"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn report_parses_enumerated_action() {
        let report: AgentReport =
            serde_json::from_str(r#"{"Command":"BlockIpAddr","Ip":"10.1.1.1"}"#).unwrap();
        assert_eq!(report.action, IpAction::BlockIpAddr);
        assert_eq!(report.ip, "10.1.1.1");
    }
}
