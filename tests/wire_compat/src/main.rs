fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cmdrelay_protocol::{AgentMessage, AgentReport, Command, IpAction};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_command() {
        let command = roundtrip_test::<Command>("command.json");
        assert_eq!(command.agent_id, "1");
        assert_eq!(command.action, "block");
        assert_eq!(command.ip, "10.0.0.5");
    }

    #[test]
    fn command_key_order_is_stable() {
        let raw = fs::read_to_string(fixtures_dir().join("command.json")).unwrap();
        let command: Command = serde_json::from_str(&raw).unwrap();
        assert_eq!(serde_json::to_string(&command).unwrap(), raw.trim_end());
    }

    #[test]
    fn fixture_command_without_agent_id() {
        // Agents built against the older frame ignore AgentId entirely.
        let command: Command =
            serde_json::from_value(load_fixture("command_without_agent_id.json")).unwrap();
        assert!(command.agent_id.is_empty());
        assert_eq!(command.action, "block for an hour");
        assert_eq!(command.ip, "192.168.1.20");
    }

    #[test]
    fn fixture_agent_message() {
        let message = roundtrip_test::<AgentMessage>("agent_message.json");
        assert_eq!(message.message, "hello agent");
    }

    #[test]
    fn fixture_console_message_lowercase() {
        let message: AgentMessage =
            serde_json::from_value(load_fixture("console_message_lowercase.json")).unwrap();
        assert_eq!(message, AgentMessage::new("hello agent"));
    }

    #[test]
    fn fixture_agent_reports() {
        let allow = roundtrip_test::<AgentReport>("agent_report_allow.json");
        assert_eq!(allow.action, IpAction::AllowIpAddr);
        assert_eq!(allow.ip, "10.0.0.7");

        let block = roundtrip_test::<AgentReport>("agent_report_block.json");
        assert_eq!(block.action, IpAction::BlockIpAddr);
        assert_eq!(block.ip, "10.0.0.8");
    }

    #[test]
    fn all_fixtures_are_covered() {
        let mut names: Vec<String> = fs::read_dir(fixtures_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "agent_message.json",
                "agent_report_allow.json",
                "agent_report_block.json",
                "command.json",
                "command_without_agent_id.json",
                "console_message_lowercase.json",
            ]
        );
    }
}
