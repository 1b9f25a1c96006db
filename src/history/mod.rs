//! History database: schema, row types, batch writers and the ingestion queries.
//!
//! Every write of one ledger goes through a single [`IngestTx`]: the derived
//! rows (via [`LedgerBatch`]) and the checkpoint advance commit or roll back
//! together.

use async_trait::async_trait;
use sea_query::{
    PostgresQueryBuilder, QueryStatementWriter, SchemaStatementBuilder, SqliteQueryBuilder,
};

use crate::proto::LedgerKey;

mod batch;
mod lock;
pub mod rows;
pub mod schema;
mod sql;

pub use batch::{AssetStatsBatch, BatchInsertBuilder, LedgerBatch, StateBatch};
pub use lock::IngestLock;
pub use rows::{BatchRow, StateRow};
pub use sql::{connect, SqlHistoryQ, SqlIngestTx};

#[cfg(feature = "postgres")]
pub use sql::postgres::Postgres;
#[cfg(feature = "sqlite")]
pub use sql::sqlite::Sqlite;

/// Errors raised by the history database and its batch writers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid {table} row: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error("Duplicate {table} row in batch: {key}")]
    DuplicateRow { table: &'static str, key: String },

    #[error("Batch builder for {table} was already executed")]
    BuilderConsumed { table: &'static str },

    #[error("Checkpoint conflict: expected last ingested ledger {expected}, found {found}")]
    CheckpointConflict { expected: u32, found: u32 },

    #[error("Ingest lock error: {0}")]
    Lock(String),

    #[error("Storage backend '{0}' is not enabled in this build")]
    UnsupportedBackend(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl StorageError {
    /// Whether the same work may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(e) => is_transient_sqlx(e),
            StorageError::Io(_) => true,
            _ => false,
        }
    }
}

fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            // SQLITE_BUSY, SQLITE_LOCKED
            Some("5") | Some("6")
            // serialization_failure, deadlock_detected, lock_not_available
            | Some("40001") | Some("40P01") | Some("55P03")
        ),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// SQL dialect statements are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn build<S: QueryStatementWriter>(self, stmt: &S) -> String {
        match self {
            Backend::Sqlite => stmt.to_string(SqliteQueryBuilder),
            Backend::Postgres => stmt.to_string(PostgresQueryBuilder),
        }
    }

    pub fn build_schema<S: SchemaStatementBuilder>(self, stmt: &S) -> String {
        match self {
            Backend::Sqlite => stmt.to_string(SqliteQueryBuilder),
            Backend::Postgres => stmt.to_string(PostgresQueryBuilder),
        }
    }
}

/// Executes rendered statements inside an open database transaction.
#[async_trait]
pub trait Session: Send {
    fn backend(&self) -> Backend;

    /// Run one statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;
}

/// Stored configuration of one transaction filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub name: String,
    pub enabled: bool,
    /// Filter-specific rules, as JSON.
    pub rules: serde_json::Value,
}

/// Queries the ingestion driver runs against the history database.
#[async_trait]
pub trait IngestionQ: Send + Sync {
    /// Last ingested ledger, read without taking any lock. `0` when nothing
    /// has been ingested.
    async fn get_last_ledger_ingest_non_blocking(&self) -> Result<u32>;

    /// Version stamped by the last rebuild, `0` if never stamped.
    async fn get_ingest_version(&self) -> Result<u32>;

    /// Highest ledger with a history row, `0` when there is none.
    async fn get_latest_history_ledger(&self) -> Result<u32>;

    async fn get_filter_rules(&self) -> Result<Vec<FilterRule>>;

    /// Keys of every entry held in the state tables: accounts and trust
    /// lines.
    async fn get_state_keys(&self) -> Result<Vec<LedgerKey>>;

    /// Open a write transaction.
    async fn begin(&self) -> Result<Box<dyn IngestTx>>;

    /// Try to become the single writer. `Ok(None)` when another process holds
    /// the lock. The lock is released when the returned guard is dropped.
    async fn try_lock_ingestion(&self) -> Result<Option<IngestLock>>;
}

/// Write transaction for one unit of ingestion work.
#[async_trait]
pub trait IngestTx: Session {
    /// Last ingested ledger as seen by this transaction.
    async fn get_last_ledger_ingest(&mut self) -> Result<u32>;

    /// Move the checkpoint from `expected` to `to`. Fails with
    /// [`StorageError::CheckpointConflict`] if it no longer reads `expected`.
    async fn advance_last_ledger_ingest(&mut self, expected: u32, to: u32) -> Result<()>;

    /// Set the checkpoint to zero and stamp `version`.
    async fn reset_checkpoint(&mut self, version: u32) -> Result<()>;

    /// Delete every row derived from ledgers.
    async fn truncate_derived_tables(&mut self) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
