use std::env;
use std::time::Duration;

use thiserror::Error;

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_CHANNEL_ID: &str = "TALLY_CHANNEL_ID";
pub const ENV_TITLE_PREFIX: &str = "TALLY_TITLE_PREFIX";
pub const ENV_WEBHOOK: &str = "TALLY_WEBHOOK";
pub const ENV_BASE_URL: &str = "TALLY_BASE_URL";
pub const ENV_LISTEN_ADDR: &str = "TALLY_LISTEN_ADDR";
pub const ENV_POLL_INTERVAL_MS: &str = "TALLY_POLL_INTERVAL_MS";
pub const ENV_DEBUG: &str = "TALLY_DEBUG";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    LongPolling,
    Webhook,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongPolling => "long-polling",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub channel_id: i64,
    pub title_prefix: String,
    pub delivery: DeliveryMode,
    pub base_url: Option<String>,
    pub listen_addr: String,
    pub poll_interval: Duration,
    pub debug: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {key}")]
    Missing { key: &'static str },
    #[error("{key} has invalid value {value:?}: {detail}")]
    Invalid {
        key: &'static str,
        value: String,
        detail: String,
    },
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = require(&lookup, ENV_BOT_TOKEN)?;

        let raw_channel = require(&lookup, ENV_CHANNEL_ID)?;
        let channel_id: i64 =
            raw_channel
                .trim()
                .parse()
                .map_err(|err| ConfigError::Invalid {
                    key: ENV_CHANNEL_ID,
                    value: raw_channel.clone(),
                    detail: format!("expected a numeric channel id: {err}"),
                })?;

        let title_prefix = lookup(ENV_TITLE_PREFIX).unwrap_or_default();

        // Absent or "0" selects long-polling; any other value selects webhook.
        let delivery = match lookup(ENV_WEBHOOK) {
            Some(flag) if flag != "0" => DeliveryMode::Webhook,
            _ => DeliveryMode::LongPolling,
        };

        let base_url = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty());
        if delivery == DeliveryMode::Webhook && base_url.is_none() {
            return Err(ConfigError::Missing { key: ENV_BASE_URL });
        }

        let listen_addr = lookup(ENV_LISTEN_ADDR)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let raw_interval = require(&lookup, ENV_POLL_INTERVAL_MS)?;
        let interval_ms: u64 =
            raw_interval
                .trim()
                .parse()
                .map_err(|err| ConfigError::Invalid {
                    key: ENV_POLL_INTERVAL_MS,
                    value: raw_interval.clone(),
                    detail: format!("expected milliseconds: {err}"),
                })?;

        let debug = matches!(lookup(ENV_DEBUG), Some(flag) if flag != "0");

        Ok(Self {
            token,
            channel_id,
            title_prefix,
            delivery,
            base_url,
            listen_addr,
            poll_interval: Duration::from_millis(interval_ms),
            debug,
        })
    }

    /// Server-side long-poll timeout, derived from the tick period.
    pub fn poll_timeout_secs(&self) -> u64 {
        self.poll_interval.as_secs()
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing { key })
}
