//! Hub configuration loading.
//!
//! The hub runs on defaults unless `--config PATH` names a TOML file. Keys
//! missing from the file keep their default values.

use std::path::Path;

use anyhow::Context;
use cmdrelay_hub_server::ServerConfig;

/// Loads and validates the server configuration.
pub fn load(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: ServerConfig = toml::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            tracing::info!(path = %path.display(), "configuration loaded");
            config
        }
        None => ServerConfig::default(),
    };

    config.validate()?;
    Ok(config)
}
