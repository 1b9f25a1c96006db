//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Postgres,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
}

impl StorageConfig {
    /// SQLite database held in memory, for tests.
    pub fn in_memory() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig {
                path: SQLITE_MEMORY.to_string(),
                ..SqliteConfig::default()
            },
            postgres: PostgresConfig::default(),
        }
    }
}

/// Path value selecting an in-memory SQLite database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: String,
    /// Maximum pool connections for file databases.
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "data/ledger-ingest.db".to_string(),
            max_connections: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

impl SqliteConfig {
    pub fn is_memory(&self) -> bool {
        self.path == SQLITE_MEMORY
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection URI.
    pub uri: String,
    /// Maximum pool connections. One more is taken while the ingest lock is held.
    pub max_connections: u32,
    /// Key of the session advisory lock guarding the single writer.
    pub advisory_lock_key: i64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/ledger_ingest".to_string(),
            max_connections: 8,
            advisory_lock_key: 0x6c65_6467_6572,
        }
    }
}
