//! Server configuration

use condnum_service::CacheConfig;
use condnum_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of every environment variable read by the server
pub const ENV_PREFIX: &str = "CONDNUM";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Default configuration file, without extension
pub const DEFAULT_CONFIG_FILE: &str = "config/condnum";

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for each storage call, in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: None,
        }
    }
}

impl ApiConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Log output encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub db: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl ServerConfig {
    /// Load configuration from `.env`, the default config file and the
    /// process environment
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if exists
        dotenvy::dotenv().ok();

        Self::load_from(DEFAULT_CONFIG_FILE, environment(None))
    }

    /// Load configuration from an optional file and an environment source
    ///
    /// Environment values take precedence over the file.
    pub fn load_from(file: &str, env: config::Environment) -> anyhow::Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(env)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to read config: {}", e))?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize config: {}", e))
    }
}

/// Environment source with the server's prefix and separator
///
/// `vars` replaces the process environment when given.
pub fn environment(vars: Option<HashMap<String, String>>) -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cache.omit_keys")
        .source(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use condnum_storage::StorageBackend;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();

        assert_eq!(config.api.addr(), "0.0.0.0:50051");
        assert!(config.api.request_timeout().is_none());
        assert_eq!(config.db.backend, StorageBackend::Sqlite);
        assert_eq!(config.db.connection_uri(), "sqlite://conditions.db");
        assert_eq!(config.db.table.name, "conditions_number");
        assert!(!config.cache.enabled);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            ServerConfig::load_from("does/not/exist", environment(Some(HashMap::new()))).unwrap();
        assert_eq!(config.api.port, 50051);
        assert_eq!(config.db.connection.max, 10);
    }

    #[test]
    fn test_request_timeout() {
        let api = ApiConfig {
            request_timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(api.request_timeout(), Some(Duration::from_millis(250)));
    }
}
