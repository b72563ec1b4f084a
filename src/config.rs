use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What to do with plain text that is not a slash-command.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Store the message, reply with nothing.
    #[default]
    Silent,
    /// Reply with the message text verbatim.
    Echo,
}

/// How the daily digest is composed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DigestMode {
    /// List pending tasks; users with none are skipped.
    #[default]
    TaskAware,
    /// Fixed greeting to everyone, task state ignored.
    GreetingOnly,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub line: LineConfig,
    #[serde(default = "default_bot_config")]
    pub bot: BotConfig,
    #[serde(default = "default_digest_config")]
    pub digest: DigestConfig,
    #[serde(default = "default_store_config")]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    /// Shared secret used to verify webhook signatures.
    pub channel_secret: String,
    /// Bearer token for the Messaging API.
    pub channel_access_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-request budget for reply/push/profile calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default)]
    pub reply_mode: ReplyMode,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default)]
    pub mode: DigestMode,
    /// Six-field cron expression; defaults to 09:00 every day.
    #[serde(default = "default_digest_cron")]
    pub cron: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_base_url() -> String {
    "https://api.line.me".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_digest_cron() -> String {
    "0 0 9 * * *".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskline.db")
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_bot_config() -> BotConfig {
    BotConfig {
        reply_mode: ReplyMode::default(),
        default_timezone: default_timezone(),
    }
}

fn default_digest_config() -> DigestConfig {
    DigestConfig {
        mode: DigestMode::default(),
        cron: default_digest_cron(),
    }
}

fn default_store_config() -> StoreConfig {
    StoreConfig {
        database_path: default_db_path(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
