//! Configuration module for parley.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::channel::{ChannelDefinition, LOCAL_SPECIAL_TYPE, UNBOUNDED_RANGE};
use crate::chat::{
    ChatSettings, GrantTable, DEFAULT_DM_REPLY_TOKEN, DEFAULT_FALLBACK_LEVEL, DEFAULT_GLOBAL_TOKEN,
    DEFAULT_PREFIX_SEPARATOR, DEFAULT_QUEUE_CAPACITY, DEFAULT_RELAY_MAX_LENGTH,
};
use crate::{ParleyError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Render markup as ANSI escapes instead of plain text.
    #[serde(default = "default_ansi")]
    pub ansi: bool,
    /// Capacity of the chat loop's request queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2424
}

fn default_max_connections() -> usize {
    64
}

fn default_ansi() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_idle_timeout() -> u64 {
    1800
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            ansi: default_ansi(),
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite chat state database. Empty keeps state in memory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/parley.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file, appended to alongside stdout.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// One `[[chat.channels]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub shortcut: String,
    #[serde(default)]
    pub display_prefix: String,
    #[serde(default)]
    pub permission: String,
    #[serde(default = "default_range")]
    pub range: i32,
    #[serde(default = "default_message_color")]
    pub message_color: String,
    /// Defaults to `message_color`.
    #[serde(default)]
    pub name_color: Option<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Defaults to `message_color`.
    #[serde(default)]
    pub separator_color: Option<String>,
    #[serde(default)]
    pub always_on: bool,
    #[serde(default)]
    pub special_type: String,
}

fn default_range() -> i32 {
    UNBOUNDED_RANGE
}

fn default_message_color() -> String {
    "&f".to_string()
}

fn default_separator() -> String {
    ": ".to_string()
}

impl ChannelConfig {
    /// Build the channel definition, or `None` if the entry is unusable.
    pub fn to_definition(&self) -> Option<ChannelDefinition> {
        if self.name.trim().is_empty() || self.shortcut.trim().is_empty() {
            warn!(
                "Skipping channel entry with empty name or shortcut: {:?}",
                self.name
            );
            return None;
        }
        if self.range < UNBOUNDED_RANGE {
            warn!(channel = %self.name, range = self.range, "Skipping channel with invalid range");
            return None;
        }

        let name_color = self.name_color.as_ref().unwrap_or(&self.message_color);
        let separator_color = self
            .separator_color
            .as_ref()
            .unwrap_or(&self.message_color);

        let mut definition =
            ChannelDefinition::new(self.name.trim(), self.shortcut.trim(), &self.display_prefix)
                .with_range(self.range)
                .with_message_color(&self.message_color)
                .with_name_color(name_color)
                .with_separator(&self.separator, separator_color)
                .with_special_type(&self.special_type);
        if self.always_on {
            definition = definition.always_on();
        } else {
            definition = definition.with_permission(&self.permission);
        }
        Some(definition)
    }
}

/// Chat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Channel used when a user has no usable focus.
    #[serde(default = "default_channel")]
    pub default_channel: String,
    /// Prefix that replies to the last direct message.
    #[serde(default = "default_dm_reply_token")]
    pub dm_reply_token: String,
    /// Prefix that targets the default channel.
    #[serde(default = "default_global_token")]
    pub global_token: String,
    /// Separator between a routing prefix and the message.
    #[serde(default = "default_prefix_separator")]
    pub prefix_separator: String,
    /// Channel definitions, in display order.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

fn default_channel() -> String {
    "global".to_string()
}

fn default_dm_reply_token() -> String {
    DEFAULT_DM_REPLY_TOKEN.to_string()
}

fn default_global_token() -> String {
    DEFAULT_GLOBAL_TOKEN.to_string()
}

fn default_prefix_separator() -> String {
    DEFAULT_PREFIX_SEPARATOR.to_string()
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            name: "global".to_string(),
            shortcut: "g".to_string(),
            display_prefix: "&a[G]".to_string(),
            permission: String::new(),
            range: UNBOUNDED_RANGE,
            message_color: "&f".to_string(),
            name_color: Some("&e".to_string()),
            separator: " » ".to_string(),
            separator_color: Some("&7".to_string()),
            always_on: true,
            special_type: String::new(),
        },
        ChannelConfig {
            name: "local".to_string(),
            shortcut: "l".to_string(),
            display_prefix: "&b[L]".to_string(),
            permission: String::new(),
            range: 100,
            message_color: "&7".to_string(),
            name_color: Some("&e".to_string()),
            separator: " » ".to_string(),
            separator_color: Some("&7".to_string()),
            always_on: true,
            special_type: LOCAL_SPECIAL_TYPE.to_string(),
        },
        ChannelConfig {
            name: "staff".to_string(),
            shortcut: "s".to_string(),
            display_prefix: "&c[S]".to_string(),
            permission: "chat.channel.staff".to_string(),
            range: UNBOUNDED_RANGE,
            message_color: "&d".to_string(),
            name_color: Some("&d".to_string()),
            separator: " &m*&r ".to_string(),
            separator_color: Some("&5".to_string()),
            always_on: false,
            special_type: String::new(),
        },
    ]
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_channel: default_channel(),
            dm_reply_token: default_dm_reply_token(),
            global_token: default_global_token(),
            prefix_separator: default_prefix_separator(),
            channels: default_channels(),
        }
    }
}

/// Relay bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Forward messages from `channel` and accept inbound messages.
    #[serde(default)]
    pub enabled: bool,
    /// Channel mirrored to the bridge.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Prefix of inbound lines.
    #[serde(default = "default_inbound_prefix")]
    pub inbound_prefix: String,
    /// Separator between author and content of inbound lines.
    #[serde(default = "default_inbound_separator")]
    pub inbound_separator: String,
    /// Maximum visible length of an inbound line.
    #[serde(default = "default_relay_max_length")]
    pub max_length: usize,
}

fn default_inbound_prefix() -> String {
    "&9[Relay]".to_string()
}

fn default_inbound_separator() -> String {
    "&7: &f".to_string()
}

fn default_relay_max_length() -> usize {
    DEFAULT_RELAY_MAX_LENGTH
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: default_channel(),
            inbound_prefix: default_inbound_prefix(),
            inbound_separator: default_inbound_separator(),
            max_length: default_relay_max_length(),
        }
    }
}

/// Static permission grants.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// Level at or above which a user passes any node check.
    #[serde(default = "default_fallback_level")]
    pub fallback_level: u8,
    /// Granted nodes per user id.
    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
    /// Operator level per user id.
    #[serde(default)]
    pub levels: HashMap<String, u8>,
}

fn default_fallback_level() -> u8 {
    DEFAULT_FALLBACK_LEVEL
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            fallback_level: default_fallback_level(),
            grants: HashMap::new(),
            levels: HashMap::new(),
        }
    }
}

impl PermissionsConfig {
    /// Grants and levels as a table the permission oracle can load.
    pub fn grant_table(&self) -> GrantTable {
        GrantTable {
            grants: self.grants.clone(),
            levels: self.levels.clone(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Chat configuration.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Permission configuration.
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ParleyError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - `PARLEY_DATABASE_PATH`: chat state database path
    /// - `PARLEY_LOG_LEVEL`: log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PARLEY_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(ParleyError::Validation(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        let chat = &self.chat;
        if chat.prefix_separator.is_empty() {
            return Err(ParleyError::Validation(
                "chat.prefix_separator must not be empty".to_string(),
            ));
        }
        if chat.dm_reply_token.is_empty() || chat.global_token.is_empty() {
            return Err(ParleyError::Validation(
                "chat.dm_reply_token and chat.global_token must not be empty".to_string(),
            ));
        }
        if chat.dm_reply_token == chat.global_token {
            return Err(ParleyError::Validation(format!(
                "chat.dm_reply_token and chat.global_token are both '{}'",
                chat.global_token
            )));
        }

        let definitions = self.channel_definitions();
        if definitions.is_empty() {
            warn!("No usable chat channels configured");
        } else if !definitions.iter().any(|d| d.name == chat.default_channel) {
            warn!(
                "Default channel '{}' is not defined, a fallback will be used",
                chat.default_channel
            );
        }
        if self.relay.enabled && !definitions.iter().any(|d| d.name == self.relay.channel) {
            return Err(ParleyError::Validation(format!(
                "relay.channel '{}' is not a configured channel",
                self.relay.channel
            )));
        }
        Ok(())
    }

    /// Usable channel definitions, in configured order.
    pub fn channel_definitions(&self) -> Vec<ChannelDefinition> {
        self.chat
            .channels
            .iter()
            .filter_map(ChannelConfig::to_definition)
            .collect()
    }

    /// Routing and relay settings for the chat core.
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            dm_reply_token: self.chat.dm_reply_token.clone(),
            global_token: self.chat.global_token.clone(),
            prefix_separator: self.chat.prefix_separator.clone(),
            relay_channel: self
                .relay
                .enabled
                .then(|| self.relay.channel.clone()),
            relay_prefix: self.relay.inbound_prefix.clone(),
            relay_separator: self.relay.inbound_separator.clone(),
            relay_max_length: self.relay.max_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 2424);
        assert_eq!(config.server.max_connections, 64);
        assert!(config.server.ansi);
        assert_eq!(config.server.queue_capacity, 256);
        assert_eq!(config.database.path, "data/parley.db");
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert_eq!(config.chat.default_channel, "global");
        assert_eq!(config.chat.dm_reply_token, "d");
        assert_eq!(config.chat.global_token, "g");
        assert_eq!(config.chat.prefix_separator, ":");
        assert!(!config.relay.enabled);
        assert_eq!(config.relay.max_length, 256);
        assert_eq!(config.permissions.fallback_level, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_channels() {
        let defs = Config::default().channel_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["global", "local", "staff"]);

        assert!(defs[0].always_on);
        assert_eq!(defs[0].name_color, "&e");
        assert_eq!(defs[0].separator, " » ");
        assert!(defs[1].is_local());
        assert_eq!(defs[1].range, 100);
        assert_eq!(defs[1].message_color, "&7");
        assert_eq!(defs[2].required_permission(), Some("chat.channel.staff"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 4000
ansi = false

[database]
path = ""

[logging]
level = "debug"
file = "logs/chat.log"

[chat]
default_channel = "lobby"
global_token = "all"

[[chat.channels]]
name = "lobby"
shortcut = "lb"
display_prefix = "[Lobby]"
always_on = true
permission = "ignored.node"

[[chat.channels]]
name = "market"
shortcut = "m"
range = 50
message_color = "&a"
separator_color = "&8"
permission = "chat.market"

[relay]
enabled = true
channel = "lobby"

[permissions]
fallback_level = 3
grants = { alice = ["chat.market"] }
levels = { admin = 4 }
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert!(!config.server.ansi);
        assert!(config.database.path.is_empty());
        assert_eq!(config.logging.file.as_deref(), Some("logs/chat.log"));
        assert_eq!(config.chat.global_token, "all");
        assert_eq!(config.chat.dm_reply_token, "d");
        assert_eq!(config.permissions.fallback_level, 3);
        assert_eq!(config.permissions.grants["alice"], vec!["chat.market"]);
        assert_eq!(config.permissions.levels["admin"], 4);
        let table = config.permissions.grant_table();
        assert_eq!(table.grants["alice"], vec!["chat.market"]);
        assert_eq!(table.levels["admin"], 4);

        let defs = config.channel_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].required_permission(), None);
        assert_eq!(defs[0].message_color, "&f");
        assert_eq!(defs[1].name_color, "&a");
        assert_eq!(defs[1].separator_color, "&8");
        assert_eq!(defs[1].separator, ": ");
        assert_eq!(defs[1].permission.as_deref(), Some("chat.market"));

        let settings = config.chat_settings();
        assert_eq!(settings.relay_channel.as_deref(), Some("lobby"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_channel_entries_skipped() {
        let toml = r#"
[[chat.channels]]
name = ""
shortcut = "x"

[[chat.channels]]
name = "far"
shortcut = "f"
range = -5

[[chat.channels]]
name = "ok"
shortcut = "o"
"#;
        let config = Config::parse(toml).unwrap();
        let defs = config.channel_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "ok");
    }

    #[test]
    fn test_validate_rejects_bad_tokens() {
        let mut config = Config::default();
        config.chat.global_token = "d".to_string();
        assert!(matches!(config.validate(), Err(ParleyError::Validation(_))));

        let mut config = Config::default();
        config.chat.prefix_separator.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relay_channel() {
        let mut config = Config::default();
        config.relay.enabled = true;
        config.relay.channel = "nowhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = Config::parse("[server\nport = ").unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/parley.toml"),
            Err(ParleyError::Io(_))
        ));
    }
}
