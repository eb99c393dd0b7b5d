/// Database configuration and connection management
pub mod database;

/// Application settings from config.toml and the environment
pub mod settings;

pub use settings::{AppConfig, MeetingSettings, PaymentSettings, load_default_config};
