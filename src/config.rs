//! Runtime configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the decision engine runtime
///
/// Loaded from environment variables, defaulting to the docker-compose
/// service names.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Broker whose feeds this engine serves (also the directory lookup key)
    pub broker_host: String,
    /// Port for directory entries that do not carry their own
    pub broker_port: u16,

    /// Analytics service: feed directory, cross-sell and probability lookups
    pub pca_base_url: String,

    /// Ad generation service: predefined lookup and dynamic synthesis
    pub aig_base_url: String,

    /// Periodic feed sync switch
    pub sync_enabled: bool,
    pub sync_interval_secs: u64,

    /// Optional JSON preferences file
    pub preferences_path: Option<String>,

    /// Lookups against the analytics service and the feed directory
    pub http_timeout_secs: u64,
    /// Ad generation requests, which render images before replying
    pub generation_timeout_secs: u64,
    pub busy_retry_delay_ms: u64,
    pub queue_poll_interval_ms: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `MQTT_BROKER_HOST` (default: mqtt), `MQTT_BROKER_PORT` (default: 1883)
    /// - `PCA_SERVER_PROTOCOL` / `PCA_SERVER_HOST` / `PCA_SERVER_PORT` (http:// pca-server 5002)
    /// - `AIG_SERVER_PROTOCOL` / `AIG_SERVER_HOST` / `AIG_SERVER_PORT` (http:// aig-server 5003)
    /// - `BOR_SYNC_ENABLED` (default: 1), `BOR_SYNC_INTERVAL` seconds (default: 300)
    /// - `BOR_PREFERENCES_PATH` (default: unset, built-in preferences)
    /// - `HTTP_TIMEOUT_SECS` (10), `AIG_TIMEOUT_SECS` (300)
    /// - `BUSY_RETRY_DELAY_MS` (5000), `QUEUE_POLL_INTERVAL_MS` (5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an arbitrary variable lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let number_or = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                    log::warn!("Invalid {} '{}', defaulting to {}", key, raw, default);
                    default
                }),
                None => default,
            }
        };

        let port = |key: &str, default: u16| -> Result<u16, ConfigError> {
            let Some(raw) = lookup(key) else {
                return Ok(default);
            };
            match raw.trim().parse::<u16>() {
                Ok(p) if p >= 1 => Ok(p),
                _ => Err(ConfigError::InvalidValue(format!(
                    "{} must be a port in 1..=65535, got '{}'",
                    key, raw
                ))),
            }
        };

        let pca_base_url = format!(
            "{}{}:{}",
            string_or("PCA_SERVER_PROTOCOL", "http://"),
            string_or("PCA_SERVER_HOST", "pca-server"),
            port("PCA_SERVER_PORT", 5002)?
        );
        let aig_base_url = format!(
            "{}{}:{}",
            string_or("AIG_SERVER_PROTOCOL", "http://"),
            string_or("AIG_SERVER_HOST", "aig-server"),
            port("AIG_SERVER_PORT", 5003)?
        );

        let sync_enabled = matches!(
            string_or("BOR_SYNC_ENABLED", "1").to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );

        let sync_interval_secs = number_or("BOR_SYNC_INTERVAL", 300);
        if sync_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "BOR_SYNC_INTERVAL must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            broker_host: string_or("MQTT_BROKER_HOST", "mqtt"),
            broker_port: port("MQTT_BROKER_PORT", 1883)?,
            pca_base_url,
            aig_base_url,
            sync_enabled,
            sync_interval_secs,
            preferences_path: lookup("BOR_PREFERENCES_PATH").filter(|p| !p.trim().is_empty()),
            http_timeout_secs: number_or("HTTP_TIMEOUT_SECS", 10),
            generation_timeout_secs: number_or("AIG_TIMEOUT_SECS", 300),
            busy_retry_delay_ms: number_or("BUSY_RETRY_DELAY_MS", 5_000),
            queue_poll_interval_ms: number_or("QUEUE_POLL_INTERVAL_MS", 5_000),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn busy_retry_delay(&self) -> Duration {
        Duration::from_millis(self.busy_retry_delay_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
