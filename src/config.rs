//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_DB_PATH: &str = "./data/post-relay.db";

/// Relay configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// Operators allowed to use the bot (Telegram user ids).
    pub admin_ids: Vec<i64>,
    /// Anthropic API key. Rewriting is disabled without it.
    pub anthropic_api_key: Option<SecretString>,
    /// Anthropic API base URL.
    pub anthropic_base_url: String,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Quiet period after the last album member before the album is flushed.
    pub album_debounce: Duration,
    /// How long the channel registry serves its cache before rebuilding.
    pub registry_ttl: Duration,
    /// How long shutdown waits for in-flight tasks.
    pub shutdown_grace: Duration,
    /// Directory for daily-rotated log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Build the config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = non_empty("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let admin_ids = parse_admin_ids(
            &non_empty("RELAY_ADMIN_IDS")
                .ok_or_else(|| ConfigError::MissingEnvVar("RELAY_ADMIN_IDS".into()))?,
        )?;

        let album_debounce_ms = parse_number(&non_empty, "RELAY_ALBUM_DEBOUNCE_MS", 2500)?;
        let registry_ttl_secs = parse_number(&non_empty, "RELAY_REGISTRY_TTL_SECS", 30)?;
        let shutdown_grace_secs = parse_number(&non_empty, "RELAY_SHUTDOWN_GRACE_SECS", 10)?;

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            admin_ids,
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY").map(SecretString::from),
            anthropic_base_url: non_empty("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            db_path: non_empty("RELAY_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            album_debounce: Duration::from_millis(album_debounce_ms),
            registry_ttl: Duration::from_secs(registry_ttl_secs),
            shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            log_dir: non_empty("RELAY_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Whether rewriting can run at all.
    pub fn rewrite_enabled(&self) -> bool {
        self.anthropic_api_key.is_some()
    }
}

fn parse_number<F>(non_empty: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got {raw:?}"),
        }),
    }
}

/// Parse a comma-separated list of operator ids. At least one id is required.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id: i64 = part.parse().map_err(|_| ConfigError::InvalidValue {
            key: "RELAY_ADMIN_IDS".into(),
            message: format!("{part:?} is not a user id"),
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "RELAY_ADMIN_IDS".into(),
            message: "no operator ids given".into(),
        });
    }
    Ok(ids)
}
