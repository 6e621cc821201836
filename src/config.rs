//! Proxy configuration, loaded from a TOML file.

use crate::forwarding::ForwardingMode;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, path::Path, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A backend server players can be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the proxy listens on.
    pub bind: String,
    pub motd: String,
    pub show_max_players: i32,
    pub online_mode: bool,
    pub forwarding_mode: ForwardingMode,
    /// Shared with backends when forwarding in modern mode.
    pub forwarding_secret: String,
    /// Packets at least this large are compressed. -1 disables compression.
    pub compression_threshold: i32,
    /// zlib level, -1 for the default.
    pub compression_level: i32,
    /// Minimum time between two login attempts from one address. 0 disables.
    pub login_ratelimit_ms: u64,
    pub connection_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Server name to `host:port`.
    pub servers: BTreeMap<String, String>,
    /// Servers tried in order when a player joins or is kicked.
    #[serde(rename = "try")]
    pub try_servers: Vec<String>,
    /// Whether proxy commands are added to the command tree sent to clients.
    pub announce_proxy_commands: bool,
    /// Pass the player's address to the session server.
    pub prevent_client_proxy_connections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25577".to_owned(),
            motd: "A Minecraft proxy".to_owned(),
            show_max_players: 500,
            online_mode: true,
            forwarding_mode: ForwardingMode::None,
            forwarding_secret: String::new(),
            compression_threshold: 256,
            compression_level: -1,
            login_ratelimit_ms: 3000,
            connection_timeout_ms: 5000,
            read_timeout_ms: 30000,
            servers: BTreeMap::new(),
            try_servers: Vec::new(),
            announce_proxy_commands: true,
            prevent_client_proxy_connections: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs_err::read_to_string(path)?;
        let config = Self::parse(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self
            .try_servers
            .iter()
            .find(|name| !self.servers.contains_key(*name))
        {
            return Err(ConfigError::Invalid(format!(
                "try list names unknown server '{name}'"
            )));
        }
        if self.forwarding_mode == ForwardingMode::Modern && self.forwarding_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "modern forwarding needs a forwarding_secret".to_owned(),
            ));
        }
        if !(-1..=9).contains(&self.compression_level) {
            return Err(ConfigError::Invalid(format!(
                "compression_level {} is not between -1 and 9",
                self.compression_level
            )));
        }
        if self.read_timeout_ms == 0 || self.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_owned()));
        }
        Ok(())
    }

    pub fn servers(&self) -> impl Iterator<Item = ServerInfo> + '_ {
        self.servers.iter().map(|(name, address)| ServerInfo {
            name: name.clone(),
            address: address.clone(),
        })
    }

    pub fn compression(&self) -> flate2::Compression {
        match u32::try_from(self.compression_level) {
            Ok(level) => flate2::Compression::new(level),
            Err(_) => flate2::Compression::default(),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn login_ratelimit(&self) -> Duration {
        Duration::from_millis(self.login_ratelimit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_servers_and_try_list() {
        let config = Config::parse(
            r#"
            bind = "127.0.0.1:25577"
            online_mode = false
            forwarding_mode = "legacy"
            try = ["lobby", "fallback"]

            [servers]
            lobby = "127.0.0.1:30066"
            fallback = "127.0.0.1:30067"
            "#,
        )
        .unwrap();
        assert_eq!(config.forwarding_mode, ForwardingMode::Legacy);
        assert_eq!(config.try_servers, ["lobby", "fallback"]);
        assert_eq!(config.servers().count(), 2);
        assert_eq!(config.compression_threshold, 256);
    }

    #[test]
    fn try_entries_must_exist() {
        let err = Config::parse(
            r#"
            try = ["missing"]
            [servers]
            lobby = "127.0.0.1:30066"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn modern_forwarding_needs_a_secret() {
        assert!(matches!(
            Config::parse(r#"forwarding_mode = "modern""#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(Config::parse(
            r#"
            forwarding_mode = "modern"
            forwarding_secret = "hunter2"
            "#
        )
        .is_ok());
    }
}
