//! Application configuration loaded from an optional TOML file and
//! environment variables.

use anyhow::{Context, Result};
use chat_client::Snowflake;
use secrecy::SecretString;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use stream_notifier::NotifierConfig;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chat platform configuration
    pub chat: ChatConfig,

    /// Bot behavior
    #[serde(default)]
    pub bot: BotConfig,

    /// Follow and notification persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Twitch API credentials
    #[serde(default)]
    pub twitch: TwitchConfig,

    /// Stream poller timing
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Third-party APIs used by commands
    #[serde(default)]
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// REST API base URL
    #[serde(default = "default_chat_api")]
    pub api_url: String,

    /// Bot token
    pub token: SecretString,

    /// Channels to listen for commands in
    #[serde(default, deserialize_with = "comma_list")]
    pub channels: Vec<Snowflake>,

    /// Poll interval for new messages
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Command prefixes, first match wins
    #[serde(default = "default_prefixes", deserialize_with = "comma_list")]
    pub prefixes: Vec<String>,

    /// Prefixes per guild (or per channel for direct messages)
    #[serde(default)]
    pub prefix_overrides: HashMap<String, Vec<String>>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    #[serde(default, deserialize_with = "comma_list")]
    pub owner_ids: Vec<Snowflake>,

    #[serde(default, deserialize_with = "comma_list")]
    pub blocked_ids: Vec<Snowflake>,

    #[serde(default, deserialize_with = "comma_list")]
    pub permitted_ids: Vec<Snowflake>,

    /// Wall-clock limit for a single command
    #[serde(default = "default_handler_timeout", with = "humantime_serde")]
    pub handler_timeout: Duration,

    /// Limit for CPU-bound work such as dice rolls
    #[serde(default = "default_compute_timeout", with = "humantime_serde")]
    pub compute_timeout: Duration,

    #[serde(default = "default_compute_workers")]
    pub compute_workers: usize,

    /// CSV file whose first column holds one joke per row
    #[serde(default)]
    pub jokes_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:` for a non-persistent store
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    #[serde(default = "default_twitch_api")]
    pub api_url: String,

    #[serde(default)]
    pub client_id: Option<String>,

    /// App access token
    #[serde(default)]
    pub token: Option<SecretString>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl TwitchConfig {
    pub fn has_credentials(&self) -> bool {
        self.client_id.as_deref().map_or(false, |id| !id.is_empty()) && self.token.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "default_numbers_api")]
    pub numbers_api_url: String,

    #[serde(default = "default_colors_api")]
    pub colors_api_url: String,

    #[serde(default = "default_horoscope_api")]
    pub horoscope_api_url: String,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

// Default implementations
impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
            prefix_overrides: HashMap::new(),
            log_level: default_log_level(),
            log_json: false,
            owner_ids: Vec::new(),
            blocked_ids: Vec::new(),
            permitted_ids: Vec::new(),
            handler_timeout: default_handler_timeout(),
            compute_timeout: default_compute_timeout(),
            compute_workers: default_compute_workers(),
            jokes_path: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            api_url: default_twitch_api(),
            client_id: None,
            token: None,
            timeout: default_timeout(),
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            numbers_api_url: default_numbers_api(),
            colors_api_url: default_colors_api(),
            horoscope_api_url: default_horoscope_api(),
            request_timeout: default_timeout(),
        }
    }
}

// Default value functions
fn default_chat_api() -> String {
    "https://discord.com/api/v10".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_prefixes() -> Vec<String> {
    vec!["!".into()]
}

fn default_log_level() -> String {
    "info".into()
}

fn default_handler_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_compute_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_compute_workers() -> usize {
    2
}

fn default_database_url() -> String {
    "data/harmon.db".into()
}

fn default_twitch_api() -> String {
    "https://api.twitch.tv".into()
}

fn default_numbers_api() -> String {
    "http://numbersapi.com".into()
}

fn default_colors_api() -> String {
    "http://www.colourlovers.com/api".into()
}

fn default_horoscope_api() -> String {
    "http://theastrologer-api.herokuapp.com/api".into()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    Joined(String),
}

/// Accept either a real list (TOML) or a comma separated string (env).
fn comma_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    match OneOrMany::<T>::deserialize(deserializer)? {
        OneOrMany::Many(items) => Ok(items),
        OneOrMany::Joined(text) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse().map_err(de::Error::custom))
            .collect(),
    }
}

impl Config {
    /// Load configuration from `harmon.toml` (or `$HARMON_CONFIG`) and the
    /// environment.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let path = std::env::var("HARMON_CONFIG").unwrap_or_else(|_| "harmon.toml".into());
        let builder = config::Config::builder()
            .add_source(config::File::from(Path::new(&path)).required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // Snowflakes overflow i64 parsing; keep strings as strings.
                    .try_parsing(false),
            );

        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parse configuration from TOML text alone.
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::from_str(text, config::FileFormat::Toml)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [chat]
            token = "bot-token"
            "#,
        )
        .unwrap();

        assert_eq!(config.chat.token.expose_secret(), "bot-token");
        assert_eq!(config.bot.prefixes, vec!["!"]);
        assert_eq!(config.bot.handler_timeout, Duration::from_secs(30));
        assert_eq!(config.bot.compute_timeout, Duration::from_secs(10));
        assert_eq!(config.store.database_url, "data/harmon.db");
        assert_eq!(config.notifier.interval, Duration::from_secs(60));
        assert_eq!(config.notifier.max_batch, 100);
        assert!(!config.twitch.has_credentials());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [chat]
            token = "bot-token"
            channels = [100, 200]
            poll_interval = "500ms"

            [bot]
            prefixes = ["!", "?"]
            owner_ids = [1]
            jokes_path = "data/jokes.csv"

            [bot.prefix_overrides]
            "7" = [">"]

            [twitch]
            client_id = "abc"
            token = "secret"

            [notifier]
            interval = "2m"
            request_pause = "0s"
            "#,
        )
        .unwrap();

        assert_eq!(config.chat.channels, vec![100, 200]);
        assert_eq!(config.chat.poll_interval, Duration::from_millis(500));
        assert_eq!(config.bot.prefixes, vec!["!", "?"]);
        assert_eq!(config.bot.owner_ids, vec![1]);
        assert_eq!(config.bot.prefix_overrides["7"], vec![">"]);
        assert!(config.twitch.has_credentials());
        assert_eq!(config.notifier.interval, Duration::from_secs(120));
        assert_eq!(config.notifier.request_pause, Duration::ZERO);
    }

    #[test]
    fn test_comma_separated_lists() {
        let config = Config::from_toml(
            r#"
            [chat]
            token = "t"
            channels = "100, 200"

            [bot]
            prefixes = "!,?"
            blocked_ids = "5"
            "#,
        )
        .unwrap();

        assert_eq!(config.chat.channels, vec![100, 200]);
        assert_eq!(config.bot.prefixes, vec!["!", "?"]);
        assert_eq!(config.bot.blocked_ids, vec![5]);
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(Config::from_toml("[bot]\nlog_level = \"debug\"").is_err());
    }
}
