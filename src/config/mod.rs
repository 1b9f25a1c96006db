//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod ingest;
mod source;
mod storage;

pub use ingest::{CheckpointConfig, IngestConfig, RetryConfig};
pub use source::{ArchiveConfig, LiveConfig, SourceConfig, SourceType};
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType, SQLITE_MEMORY};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "ledger-ingest.yaml";

/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LEDGER_INGEST_CONFIG";

/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LEDGER_INGEST";

/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LEDGER_INGEST_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// History database.
    pub storage: StorageConfig,
    /// Ledger source.
    pub source: SourceConfig,
    /// Ingestion behaviour.
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `ledger-ingest.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse configuration from YAML text only.
    pub fn from_yaml(yaml: &str) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    /// Create config for testing: in-memory SQLite, default source.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::in_memory(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(config.source.source_type, SourceType::Archive);
        assert_eq!(config.ingest.start_ledger, 0);
        assert!(!config.ingest.skip_txmeta);
        assert!(config.ingest.checkpoint.is_none());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = Config::from_yaml(
            r#"
storage:
  type: postgres
  postgres:
    uri: postgres://db/ledger
source:
  type: live
  live:
    command: node
    args: ["catchup", "{start_ledger}"]
ingest:
  network_passphrase: "Private Network"
  skip_txmeta: true
  checkpoint:
    path: state.bin
    ledger: 63
  retry:
    max_retries: 3
"#,
        )
        .unwrap();

        assert_eq!(config.storage.storage_type, StorageType::Postgres);
        assert_eq!(config.storage.postgres.uri, "postgres://db/ledger");
        assert_eq!(config.storage.postgres.max_connections, 8);
        assert_eq!(config.source.source_type, SourceType::Live);
        assert_eq!(config.source.live.args, vec!["catchup", "{start_ledger}"]);
        assert_eq!(config.ingest.network_passphrase, "Private Network");
        assert!(config.ingest.skip_txmeta);
        assert_eq!(config.ingest.checkpoint.as_ref().unwrap().ledger, 63);
        assert_eq!(config.ingest.retry.max_retries, 3);
        assert_eq!(config.ingest.retry.min_delay_ms, 100);
    }

    #[test]
    fn test_for_test_is_in_memory() {
        assert!(Config::for_test().storage.sqlite.is_memory());
    }
}
