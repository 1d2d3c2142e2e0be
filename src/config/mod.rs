//! Configuration module for floodwarden.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::events::antiflood::{DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};

/// Bot running mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    /// Owner user IDs (comma-separated).
    /// Exempt from flood protection in every chat.
    pub owner_ids: Vec<u64>,

    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    // Antiflood
    pub sweep_interval: Duration,
    pub retention: Duration,
    pub exempt_cache_ttl: Duration,
    pub settings_cache_ttl: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// or `None` when unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_mode = match var("BOT_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("polling") => BotMode::Polling,
            Some("webhook") => BotMode::Webhook,
            Some(other) => bail!("BOT_MODE must be polling or webhook, got {other:?}"),
        };

        let webhook_url = var("WEBHOOK_URL");

        // Validate webhook URL is set if mode is webhook
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            bail!("WEBHOOK_URL must be set when BOT_MODE is webhook");
        }

        let webhook_secret = var("WEBHOOK_SECRET");
        if let Some(secret) = &webhook_secret
            && !is_valid_secret(secret)
        {
            bail!("WEBHOOK_SECRET must be 1-256 characters of A-Z, a-z, 0-9, _ and -");
        }

        // Parse owner IDs
        let owner_ids = var("OWNER_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .collect();

        let secs = |key: &str, default: u64| -> Result<Duration> {
            parse_or(var(key), key, default).map(Duration::from_secs)
        };

        let sweep_interval = secs("FLOOD_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL.as_secs())?;
        if sweep_interval.is_zero() {
            bail!("FLOOD_SWEEP_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            bot_token: var("BOT_TOKEN").context("BOT_TOKEN must be set")?,
            bot_mode,
            webhook_url,
            webhook_port: parse_or(var("WEBHOOK_PORT"), "WEBHOOK_PORT", 8080)?,
            webhook_secret,
            owner_ids,
            mongodb_uri: var("MONGODB_URI").context("MONGODB_URI must be set")?,
            mongodb_database: var("MONGODB_DATABASE").unwrap_or_else(|| "floodwarden".to_string()),
            sweep_interval,
            retention: secs("FLOOD_RETENTION_SECS", DEFAULT_RETENTION.as_secs())?,
            exempt_cache_ttl: secs("EXEMPT_CACHE_TTL_SECS", 3)?,
            settings_cache_ttl: secs("SETTINGS_CACHE_TTL_SECS", 600)?,
        })
    }
}

/// Telegram only accepts `[A-Za-z0-9_-]{1,256}` as a webhook secret.
fn is_valid_secret(secret: &str) -> bool {
    (1..=256).contains(&secret.len())
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.parse().with_context(|| format!("{key} has invalid value {v:?}")),
        None => Ok(default),
    }
}
