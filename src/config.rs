//! Configuration management.
//!
//! Settings are loaded from `config/application.yml` and overridden by
//! `APP_`-prefixed environment variables (`__` as the section separator,
//! e.g. `APP_AUTH__JWT_SECRET`).

use config::{Config as ConfigFile, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::twilio::GatewayMode;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    /// HS256 signing secret for session tokens.
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioSettings {
    /// `live` calls Twilio Verify; `test` simulates delivery.
    pub mode: GatewayMode,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub verify_service_sid: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DynamoDbSettings {
    pub table_name: String,
    pub region: String,
    /// Endpoint override for local development.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            block_secs: default_block_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_token_ttl_days() -> i64 {
    7
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_window_secs() -> u64 {
    60
}

fn default_block_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub twilio: TwilioSettings,
    pub dynamodb: DynamoDbSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Missing required config value: {0}")]
    MissingConfig(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl Settings {
    /// Loads settings from `config/application.yml` merged with `APP_`
    /// environment variables (environment wins).
    pub fn new() -> Result<Self, ConfigError> {
        let builder = ConfigFile::builder()
            .add_source(File::with_name("config/application.yml"))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingConfig("auth.jwt_secret".to_string()));
        }
        Ok(())
    }
}
