//! Process configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use questline_infra::config::QueueSettings;
use questline_infra::issuer::shopify::DEFAULT_API_VERSION;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Shared secret for webhook and app-proxy signatures.
    pub shopify_api_secret: String,
    pub host: String,
    pub port: u16,
    /// Bearer token for `/admin`; admin routes reject everything when unset.
    pub admin_token: Option<String>,
    pub shopify_api_version: String,
    pub order_concurrency: usize,
    pub reward_concurrency: usize,
    pub queue_poll_interval: Duration,
    /// redb file for shops, quests, progress, redemptions and jobs. Everything
    /// is kept in memory when unset.
    pub database_path: Option<PathBuf>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let shopify_api_secret = get("SHOPIFY_API_SECRET").ok_or(ConfigError::Missing("SHOPIFY_API_SECRET"))?;
        let defaults = QueueSettings::default();

        Ok(Self {
            shopify_api_secret,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 3000)?,
            admin_token: get("ADMIN_TOKEN"),
            shopify_api_version: get("SHOPIFY_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            order_concurrency: positive(parse_or(
                get("ORDER_QUEUE_CONCURRENCY"),
                "ORDER_QUEUE_CONCURRENCY",
                defaults.order.concurrency,
            )?, "ORDER_QUEUE_CONCURRENCY")?,
            reward_concurrency: positive(parse_or(
                get("REWARD_QUEUE_CONCURRENCY"),
                "REWARD_QUEUE_CONCURRENCY",
                defaults.reward.concurrency,
            )?, "REWARD_QUEUE_CONCURRENCY")?,
            queue_poll_interval: Duration::from_millis(parse_or(
                get("QUEUE_POLL_INTERVAL_MS"),
                "QUEUE_POLL_INTERVAL_MS",
                100u64,
            )?),
            database_path: get("DATABASE_PATH").map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        let mut settings = QueueSettings::default().with_poll_interval(self.queue_poll_interval);
        settings.order.concurrency = self.order_concurrency;
        settings.reward.concurrency = self.reward_concurrency;
        settings
    }
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("shopify_api_version", &self.shopify_api_version)
            .field("order_concurrency", &self.order_concurrency)
            .field("reward_concurrency", &self.reward_concurrency)
            .field("queue_poll_interval", &self.queue_poll_interval)
            .field("database_path", &self.database_path)
            .finish_non_exhaustive()
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}
