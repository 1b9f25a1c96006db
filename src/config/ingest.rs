//! Ingestion configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Behaviour of the ingestion driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Passphrase of the network the ledgers belong to; part of every
    /// transaction hash.
    pub network_passphrase: String,
    /// First ledger to ingest into an empty database. `0` starts at the first
    /// ledger the source has.
    pub start_ledger: u32,
    /// Store elided transaction meta instead of the full meta.
    pub skip_txmeta: bool,
    /// Check every change against the state known since the last bootstrap.
    pub verify_changes: bool,
    /// Entry fixtures loaded as ledger state when bootstrapping.
    pub checkpoint: Option<CheckpointConfig>,
    pub max_rows_per_statement: usize,
    pub retry: RetryConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            network_passphrase: "Test Ledger Network ; 2024".to_string(),
            start_ledger: 0,
            skip_txmeta: false,
            verify_changes: false,
            checkpoint: None,
            max_rows_per_statement: 1000,
            retry: RetryConfig::default(),
        }
    }
}

/// Ledger state at a checkpoint ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// File of framed ledger entries.
    pub path: String,
    /// Ledger whose closing state the file holds.
    pub ledger: u32,
}

/// Backoff for transient failures while ingesting one ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 10_000,
            max_retries: 10,
        }
    }
}

impl RetryConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
