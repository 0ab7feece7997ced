use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding the bot credential token. Kept out of the
/// config file so the file can be committed.
pub const TOKEN_ENV: &str = "DROPGATE_BOT_TOKEN";

/// Errors while assembling the bot configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("{TOKEN_ENV} is not set")]
    MissingToken,
}

/// Top-level configuration for the relay bot, loaded from a TOML file.
#[derive(Debug, Deserialize)]
pub struct BotConfig {
    /// Allow-listed uploader user ids.
    #[serde(default)]
    pub uploaders: Vec<i64>,

    /// Public username of the gating channel (without `@`).
    pub gate_channel: String,

    /// Public URL of the gating channel, rendered on the join button.
    pub gate_channel_url: String,

    /// Chat id of the private archive channel.
    pub archive_chat: i64,

    /// Public handle of the bot itself, used only to render links.
    pub bot_username: String,

    /// How long delivered copies live, in seconds.
    #[serde(default = "default_retraction_delay")]
    pub retraction_delay_secs: u64,

    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Configuration for the archive store backend.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Table name prefix.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            table_prefix: default_table_prefix(),
        }
    }
}

fn default_retraction_delay() -> u64 {
    600
}

fn default_store_url() -> String {
    String::from("sqlite://dropgate.db")
}

fn default_table_prefix() -> String {
    String::from("dropgate_")
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Read the bot token from the environment.
    pub fn token_from_env() -> Result<String, ConfigError> {
        std::env::var(TOKEN_ENV).map_err(|_| ConfigError::MissingToken)
    }

    /// The shareable link for a batch.
    #[must_use]
    pub fn batch_link(&self, batch_id: &str) -> String {
        format!("https://t.me/{}?start={batch_id}", self.bot_username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: BotConfig = toml::from_str(
            r#"
            gate_channel = "my_channel"
            gate_channel_url = "https://t.me/my_channel"
            archive_chat = -1003893001355
            bot_username = "MyRelayBot"
            "#,
        )
        .unwrap();

        assert!(config.uploaders.is_empty());
        assert_eq!(config.retraction_delay_secs, 600);
        assert_eq!(config.store.url, "sqlite://dropgate.db");
        assert_eq!(config.store.table_prefix, "dropgate_");
    }

    #[test]
    fn full_config_parses() {
        let config: BotConfig = toml::from_str(
            r#"
            uploaders = [8295342154, 7025490921]
            gate_channel = "c"
            gate_channel_url = "https://t.me/c"
            archive_chat = -1
            bot_username = "B"
            retraction_delay_secs = 60

            [store]
            url = "sqlite://relay.db"
            table_prefix = "relay_"
            "#,
        )
        .unwrap();

        assert_eq!(config.uploaders.len(), 2);
        assert_eq!(config.retraction_delay_secs, 60);
        assert_eq!(config.store.url, "sqlite://relay.db");
    }

    #[test]
    fn batch_link_rendering() {
        let config: BotConfig = toml::from_str(
            r#"
            gate_channel = "c"
            gate_channel_url = "https://t.me/c"
            archive_chat = -1
            bot_username = "MyRelayBot"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.batch_link("abc123"),
            "https://t.me/MyRelayBot?start=abc123"
        );
    }
}
