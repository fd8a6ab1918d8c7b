//! Storage configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which storage backend to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process document collection; contents do not survive a restart
    Memory,
    /// PostgreSQL (or wire-compatible) database
    Postgres,
    /// SQLite database file or in-memory database
    #[default]
    Sqlite,
    /// MongoDB document collection
    Mongodb,
}

impl StorageBackend {
    /// Connection string used when `db.uri` is left empty
    pub fn default_uri(self) -> &'static str {
        match self {
            StorageBackend::Memory => "",
            StorageBackend::Postgres => "postgres://localhost:5432/conditions",
            StorageBackend::Sqlite => "sqlite://conditions.db",
            StorageBackend::Mongodb => "mongodb://localhost:27017",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres => "postgres",
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Mongodb => "mongodb",
        };
        f.write_str(name)
    }
}

/// Table (collection) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name; letters, digits and underscores only
    #[serde(default = "default_table_name")]
    pub name: String,

    /// Request distribution of the table across database nodes
    #[serde(default)]
    pub shard: bool,

    /// Milliseconds after which a create-lock stops blocking reuse
    #[serde(default = "default_create_lock_ttl_ms")]
    pub create_lock_ttl_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: default_table_name(),
            shard: false,
            create_lock_ttl_ms: default_create_lock_ttl_ms(),
        }
    }
}

/// TLS settings for networked databases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Accept any server certificate
    #[serde(default)]
    pub insecure: bool,
}

/// Connection pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_max_connections")]
    pub max: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max: default_max_connections(),
        }
    }
}

/// Storage configuration
///
/// # Examples
///
/// ```rust
/// use condnum_storage::{StorageBackend, StorageConfig};
///
/// let config = StorageConfig::sqlite("sqlite::memory:");
/// assert_eq!(config.backend, StorageBackend::Sqlite);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Connection string; empty selects the backend's default
    #[serde(default)]
    pub uri: String,

    /// Database name for MongoDB when the connection string names none
    #[serde(default = "default_database_name")]
    pub name: String,

    /// Overrides the user from the connection string when non-empty
    #[serde(default)]
    pub username: String,

    /// Overrides the password from the connection string when non-empty
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            uri: String::new(),
            name: default_database_name(),
            username: String::new(),
            password: String::new(),
            table: TableConfig::default(),
            tls: TlsConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl StorageConfig {
    /// In-process document collection
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            ..Self::default()
        }
    }

    /// PostgreSQL database at `uri`
    pub fn postgres(uri: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Postgres,
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// SQLite database at `uri` (e.g. `sqlite::memory:` or `sqlite:/path/to/db`)
    pub fn sqlite(uri: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// MongoDB deployment at `uri`
    pub fn mongodb(uri: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Mongodb,
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table.name = name.into();
        self
    }

    pub fn with_create_lock_ttl(mut self, ttl: Duration) -> Self {
        self.table.create_lock_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn create_lock_ttl(&self) -> Duration {
        Duration::from_millis(self.table.create_lock_ttl_ms)
    }

    /// `uri`, or the backend's default when unset
    pub fn connection_uri(&self) -> &str {
        if self.uri.is_empty() {
            self.backend.default_uri()
        } else {
            &self.uri
        }
    }
}

fn default_database_name() -> String {
    "conditions-number".to_string()
}

fn default_table_name() -> String {
    "conditions_number".to_string()
}

fn default_create_lock_ttl_ms() -> u64 {
    1_000_000
}

fn default_max_connections() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert_eq!(config.connection_uri(), "sqlite://conditions.db");
        assert_eq!(config.name, "conditions-number");
        assert_eq!(config.table.name, "conditions_number");
        assert!(!config.table.shard);
        assert_eq!(config.create_lock_ttl(), Duration::from_secs(1000));
        assert!(!config.tls.enabled);
        assert_eq!(config.connection.max, 10);
    }

    #[test]
    fn test_storage_config_builders() {
        let config = StorageConfig::postgres("postgres://db/conds")
            .with_table_name("conds_test")
            .with_create_lock_ttl(Duration::from_secs(5));
        assert_eq!(config.backend, StorageBackend::Postgres);
        assert_eq!(config.uri, "postgres://db/conds");
        assert_eq!(config.table.name, "conds_test");
        assert_eq!(config.table.create_lock_ttl_ms, 5000);
        assert_eq!(StorageConfig::memory().backend, StorageBackend::Memory);
    }

    #[test]
    fn test_create_lock_ttl_keeps_milliseconds() {
        let config = StorageConfig::sqlite("sqlite::memory:")
            .with_create_lock_ttl(Duration::from_millis(300));
        assert_eq!(config.table.create_lock_ttl_ms, 300);
        assert_eq!(config.create_lock_ttl(), Duration::from_millis(300));
    }

    #[test]
    fn test_connection_uri_falls_back_per_backend() {
        let mut config = StorageConfig::mongodb("");
        assert_eq!(config.connection_uri(), "mongodb://localhost:27017");
        config.uri = "mongodb://db-0:27017/conds".to_string();
        assert_eq!(config.connection_uri(), "mongodb://db-0:27017/conds");
        assert_eq!(
            StorageConfig::postgres("").connection_uri(),
            "postgres://localhost:5432/conditions"
        );
    }

    #[test]
    fn test_storage_config_deserialize_partial() {
        let json = r#"{"backend": "sqlite", "uri": "sqlite::memory:", "table": {"shard": true}}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert!(config.table.shard);
        assert_eq!(config.table.name, "conditions_number");
        assert_eq!(config.connection.max, 10);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
        assert_eq!(StorageBackend::Postgres.to_string(), "postgres");
        assert_eq!(StorageBackend::Sqlite.to_string(), "sqlite");
        assert_eq!(StorageBackend::Mongodb.to_string(), "mongodb");
    }
}
