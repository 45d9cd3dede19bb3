/// Process configuration from config.toml and environment variables
pub mod app;

/// Database configuration and connection management
pub mod database;

pub use app::{AppConfig, SchedulerConfig, TransportConfig, TransportKind, load_app_configuration};
