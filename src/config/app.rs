//! Process configuration loaded from `config.toml` and the environment.
//!
//! Only deployment concerns live here (database, listener, transport gateway, scheduler
//! polling). Business settings such as the message template are stored in the
//! `notification_settings` row and edited through the admin API.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "BIRTHDAY_NOTIFIER_CONFIG";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `SeaORM` connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Address the admin API listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Outbound messaging gateway
    #[serde(default)]
    pub transport: TransportConfig,
    /// Background trigger
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Which transport implementation to build and how to reach it.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// `"http"` for the messaging gateway, `"log"` to only log messages
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,
    /// Gateway endpoint receiving `POST` requests
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token for the gateway
    #[serde(default)]
    pub api_token: Option<String>,
    /// Upper bound for a single send
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Transport implementations available at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// JSON over HTTP to a messaging gateway
    Http,
    /// Log the message and report success
    Log,
}

/// Background scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether `main` spawns the trigger loop at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the loop re-evaluates the cron expression
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

const fn default_transport_kind() -> TransportKind {
    TransportKind::Log
}

const fn default_timeout_secs() -> u64 {
    15
}

const fn default_true() -> bool {
    true
}

const fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            endpoint: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            bind_address: default_bind_address(),
            transport: TransportConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Timeout applied around every transport call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Rejects combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.transport.kind == TransportKind::Http && self.transport.endpoint.is_none() {
            return Err(Error::Config {
                message: "transport.endpoint is required when transport.kind = \"http\""
                    .to_string(),
            });
        }
        if self.transport.timeout_secs == 0 {
            return Err(Error::Config {
                message: "transport.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(Error::Config {
                message: "scheduler.poll_interval_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Applies `DATABASE_URL`, `BIND_ADDRESS` and `TRANSPORT_API_TOKEN` overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(address) = std::env::var("BIND_ADDRESS") {
            self.bind_address = address;
        }
        if let Ok(token) = std::env::var("TRANSPORT_API_TOKEN") {
            self.transport.api_token = Some(token);
        }
    }
}

/// Parses configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads the process configuration.
///
/// Reads the file named by `BIRTHDAY_NOTIFIER_CONFIG` (default `./config.toml`); a missing
/// default file falls back to built-in defaults. Environment overrides are applied last.
pub fn load_app_configuration() -> Result<AppConfig> {
    let explicit_path = std::env::var(CONFIG_PATH_ENV).ok();
    let path = explicit_path
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());

    let mut config = if explicit_path.is_none() && !Path::new(&path).exists() {
        tracing::info!("No config.toml found, using built-in defaults");
        AppConfig::default()
    } else {
        tracing::debug!("Loading configuration from {path}");
        load_config(&path)?
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
