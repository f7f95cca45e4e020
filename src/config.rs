//! Configuration module
//!
//! Loaded from a TOML file; every section and field has a default so an
//! absent or partial file still yields a runnable configuration.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! url = "sqlite://./ocpp-power-manager.db?mode=rwc"
//!
//! [ocpp]
//! heartbeat_interval = 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `database.url` value selecting the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default config location: `~/.config/ocpp-power-manager/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-power-manager")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub ocpp: OcppSettings,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Read and validate `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.heartbeat_interval must be positive".into(),
            ));
        }
        if self.ocpp.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.command_timeout_secs must be positive".into(),
            ));
        }
        if self.ocpp.pending_sweep_secs == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.pending_sweep_secs must be positive".into(),
            ));
        }
        if !matches!(self.logging.format.to_lowercase().as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        if self.metrics.enabled && self.metrics.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "metrics.listen is not a socket address: {}",
                self.metrics.listen
            )));
        }
        Ok(())
    }
}

/// WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SeaORM connection URL, or `"memory"` for the in-memory store.
    pub url: String,
}

impl DatabaseSettings {
    pub fn is_memory(&self) -> bool {
        self.url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://./ocpp-power-manager.db?mode=rwc".to_string(),
        }
    }
}

/// Protocol tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppSettings {
    /// Heartbeat interval returned in BootNotification, seconds.
    pub heartbeat_interval: u32,
    /// Delay before the MeterValues trigger after a connector becomes Available.
    pub meter_trigger_delay_ms: u64,
    /// How long an outbound command waits for the station's answer.
    pub command_timeout_secs: u64,
    /// Period of the stale pending-command sweep.
    pub pending_sweep_secs: u64,
}

impl OcppSettings {
    pub fn meter_trigger_delay(&self) -> Duration {
        Duration::from_millis(self.meter_trigger_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn pending_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_secs)
    }
}

impl Default for OcppSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: 300,
            meter_trigger_delay_ms: 100,
            command_timeout_secs: 30,
            pending_sweep_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape endpoint address.
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ocpp.heartbeat_interval, 300);
        assert_eq!(config.ocpp.meter_trigger_delay(), Duration::from_millis(100));
        assert_eq!(config.ocpp.command_timeout(), Duration::from_secs(30));
        assert!(!config.database.is_memory());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9000

            [database]
            url = "memory"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.database.is_memory());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_toml("[ocpp]\nheartbeat_interval = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[ocpp]\nheartbeat_interval = -5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[logging]\nformat = \"xml\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[metrics]\nenabled = true\nlisten = \"nope\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[server\nport = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("ocpp-power-manager-does-not-exist.toml");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.address(), "0.0.0.0:8080");
    }
}
