// src/config.rs
use chrono_tz::Tz;
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BotError, Result};

pub const DEFAULT_MAS_API_BASE: &str =
    "https://eservices.mas.gov.sg/statistics/api/v1/bondsandbills/m";
// MAS answers 403 to default library user agents
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:135.0) Gecko/20100101 Firefox/135.0";
pub const DEFAULT_TIMEZONE: &str = "Asia/Singapore";

/// Settings read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub directus_host: String,
    pub directus_token: String,
    pub allowed_usernames: Vec<String>,
    pub mas_api_base: String,
    pub user_agent: String,
    pub timezone: Tz,
    pub poll_interval: Duration,
    pub max_concurrent_dispatches: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BotError::Config(format!("{} environment variable not set", key)))
        };
        let optional = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                warn!("{} not set, defaulting to {}", key, default);
                default.to_string()
            })
        };

        let timezone_name = optional("TIMEZONE", DEFAULT_TIMEZONE);
        let timezone = Tz::from_str(&timezone_name)
            .map_err(|e| BotError::Config(format!("unknown timezone {}: {}", timezone_name, e)))?;

        let allowed_usernames = lookup("ALLOWED_USERNAMES")
            .map(|raw| {
                raw.split(',')
                    .map(|name| name.trim().trim_start_matches('@').to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AppConfig {
            bot_token: required("TELEGRAM_BOT_TOKEN")?,
            directus_host: required("DIRECTUS_HOST")?.trim_end_matches('/').to_string(),
            directus_token: required("DIRECTUS_TOKEN")?,
            allowed_usernames,
            mas_api_base: optional("MAS_API_BASE", DEFAULT_MAS_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            user_agent: optional("USER_AGENT", DEFAULT_USER_AGENT),
            timezone,
            poll_interval: Duration::from_secs(parse_number(
                "POLL_INTERVAL_SECS",
                &optional("POLL_INTERVAL_SECS", "60"),
            )?),
            max_concurrent_dispatches: parse_number::<usize>(
                "MAX_CONCURRENT_DISPATCHES",
                &optional("MAX_CONCURRENT_DISPATCHES", "8"),
            )?
            .max(1),
            port: parse_number("PORT", &optional("PORT", "3030"))?,
        })
    }

    /// An empty whitelist lets everyone through.
    pub fn is_username_allowed(&self, username: Option<&str>) -> bool {
        if self.allowed_usernames.is_empty() {
            return true;
        }
        username.map_or(false, |name| {
            self.allowed_usernames.iter().any(|allowed| allowed == name)
        })
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| BotError::Config(format!("{} must be a number: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("DIRECTUS_HOST", "https://directus.example.com/"),
        ("DIRECTUS_TOKEN", "secret"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.directus_host, "https://directus.example.com");
        assert_eq!(config.timezone, chrono_tz::Asia::Singapore);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_dispatches, 8);
        assert_eq!(config.port, 3030);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.allowed_usernames.is_empty());
    }

    #[test]
    fn missing_required_is_config_error() {
        let err = AppConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, BotError::Config(msg) if msg.contains("DIRECTUS_TOKEN")));
    }

    #[test]
    fn bad_timezone_is_fatal() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TIMEZONE", "Mars/Olympus"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(BotError::Config(_))
        ));
    }

    #[test]
    fn whitelist_parsing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALLOWED_USERNAMES", "alice, @bob,,"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.allowed_usernames, vec!["alice", "bob"]);
        assert!(config.is_username_allowed(Some("bob")));
        assert!(!config.is_username_allowed(Some("mallory")));
        assert!(!config.is_username_allowed(None));
    }
}
