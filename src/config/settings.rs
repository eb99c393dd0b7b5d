//! Application settings loaded from `config.toml` with environment overrides.
//!
//! Secrets (API keys, database URL) are read from the environment so they can live
//! in `.env` instead of the configuration file. Every section has defaults, so a
//! missing file still produces a usable configuration.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Persistent store settings
    pub database: DatabaseSettings,
    /// Mobile-money payment provider settings
    pub payments: PaymentSettings,
    /// Meeting-link provisioning settings
    pub meetings: MeetingSettings,
}

/// Persistent store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection URL, overridden by `DATABASE_URL`
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: super::database::get_database_url(),
        }
    }
}

/// Mobile-money payment provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    /// Base URL of the provider API
    pub base_url: String,
    /// Application key, overridden by `PAYMENT_APP_KEY`
    pub app_key: String,
    /// Access key, overridden by `PAYMENT_API_KEY`
    pub api_key: String,
    /// Upper bound for a single provider call
    pub timeout_secs: u64,
    /// Currency used when none is given
    pub default_currency: String,
    /// Age after which reconciliation flags an unfinished payment attempt for review
    pub stale_attempt_secs: u64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            base_url: "https://mesomb.hachther.com/api/v1.1".to_string(),
            app_key: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            default_currency: "XAF".to_string(),
            stale_attempt_secs: 900,
        }
    }
}

impl PaymentSettings {
    /// Timeout applied to every payment and payout call
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// How long an in-flight payment attempt may stay unresolved
    #[must_use]
    pub const fn stale_attempt_age(&self) -> Duration {
        Duration::from_secs(self.stale_attempt_secs)
    }
}

/// Meeting-link provisioning settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeetingSettings {
    /// Endpoint creating a meeting for a booking
    pub endpoint: String,
    /// Bearer token, overridden by `MEETING_API_KEY`
    pub api_key: String,
    /// Upper bound for a single provisioning call
    pub timeout_secs: u64,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:54321/functions/v1/create-meet-link".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Parses settings from TOML text without applying environment overrides.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from a TOML file, then applies environment overrides.
///
/// A missing file is not an error; defaults are used instead.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    let mut config = if path_ref.exists() {
        tracing::debug!("Loading configuration from: {:?}", path_ref);
        let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
            message: format!("Failed to read config file {path_ref:?}: {e}"),
        })?;
        parse_config(&contents)?
    } else {
        tracing::info!("No configuration file at {:?}, using defaults", path_ref);
        AppConfig::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Loads settings from `SCHOLARLINK_CONFIG` or `./config.toml`.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("SCHOLARLINK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(key) = std::env::var("PAYMENT_APP_KEY") {
        config.payments.app_key = key;
    }
    if let Ok(key) = std::env::var("PAYMENT_API_KEY") {
        config.payments.api_key = key;
    }
    if let Ok(key) = std::env::var("MEETING_API_KEY") {
        config.meetings.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [database]
            url = "sqlite::memory:"

            [payments]
            base_url = "https://payments.example.com"
            timeout_secs = 12
            default_currency = "XAF"

            [meetings]
            endpoint = "https://meet.example.com/create"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.payments.base_url, "https://payments.example.com");
        assert_eq!(config.payments.timeout(), Duration::from_secs(12));
        assert_eq!(config.meetings.endpoint, "https://meet.example.com/create");
        // Unset fields keep their defaults
        assert_eq!(config.meetings.timeout_secs, 10);
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.payments.timeout_secs, 30);
        assert_eq!(config.payments.default_currency, "XAF");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = parse_config("[payments\ntimeout_secs = ");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load_config("definitely/not/here.toml").unwrap();
        assert_eq!(config.payments.timeout_secs, 30);
    }
}
