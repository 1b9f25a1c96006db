//! sqlx-backed history database.
//!
//! One generic [`SqlHistoryQ`] parameterised by a backend marker; a macro
//! generates the query implementations for each enabled backend.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::{Backend, IngestLock, IngestionQ, Result, StorageError};
use crate::config::{StorageConfig, StorageType};

/// SQL database backend.
pub trait SqlDatabase: Send + Sync + 'static {
    type Db: sqlx::Database;

    const BACKEND: Backend;
}

/// How the single-writer lock is taken for a database.
#[derive(Debug, Clone)]
pub enum LockTarget {
    File(PathBuf),
    Process(Arc<Mutex<()>>),
    Advisory(i64),
}

/// History queries over a connection pool.
pub struct SqlHistoryQ<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Db>,
    lock: LockTarget,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlHistoryQ<DB> {
    pub fn new(pool: sqlx::Pool<DB::Db>, lock: LockTarget) -> Self {
        Self {
            pool,
            lock,
            _marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &sqlx::Pool<DB::Db> {
        &self.pool
    }
}

/// Write transaction over one pooled connection.
pub struct SqlIngestTx<DB: SqlDatabase> {
    tx: sqlx::Transaction<'static, DB::Db>,
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::InvalidValue(format!("{} out of range: {}", column, value)))
}

macro_rules! impl_history_q {
    ($db_type:ty, $feature:literal, $begin_sql:expr) => {
        #[cfg(feature = $feature)]
        impl SqlHistoryQ<$db_type> {
            /// Create missing tables and the checkpoint row.
            pub async fn init(&self) -> Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::history::schema::{create_statements, IngestCheckpoint};

                for sql in create_statements(<$db_type as SqlDatabase>::BACKEND) {
                    sqlx::query(&sql).execute(&self.pool).await?;
                }

                let sql = {
                    let stmt = Query::insert()
                        .into_table(IngestCheckpoint::Table)
                        .columns([
                            IngestCheckpoint::Id,
                            IngestCheckpoint::LastIngestedLedger,
                            IngestCheckpoint::IngestVersion,
                            IngestCheckpoint::UpdatedAt,
                        ])
                        .values([
                            1i32.into(),
                            0i64.into(),
                            0i64.into(),
                            chrono::Utc::now().to_rfc3339().into(),
                        ])
                        .map_err(|e| StorageError::InvalidRow {
                            table: "ingest_checkpoint",
                            reason: e.to_string(),
                        })?
                        .on_conflict(OnConflict::column(IngestCheckpoint::Id).do_nothing().to_owned())
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn checkpoint_column(&self, column: crate::history::schema::IngestCheckpoint) -> Result<u32> {
                use sea_query::{Alias, Expr, Query};
                use sqlx::Row;

                use crate::history::schema::IngestCheckpoint;

                let sql = {
                    let stmt = Query::select()
                        .expr_as(Expr::col(column), Alias::new("value"))
                        .from(IngestCheckpoint::Table)
                        .and_where(Expr::col(IngestCheckpoint::Id).eq(1))
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                match sqlx::query(&sql).fetch_optional(&self.pool).await? {
                    Some(row) => to_u32("checkpoint", row.try_get::<i64, _>("value")?),
                    None => Ok(0),
                }
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl IngestionQ for SqlHistoryQ<$db_type> {
            async fn get_last_ledger_ingest_non_blocking(&self) -> Result<u32> {
                self.checkpoint_column(crate::history::schema::IngestCheckpoint::LastIngestedLedger)
                    .await
            }

            async fn get_ingest_version(&self) -> Result<u32> {
                self.checkpoint_column(crate::history::schema::IngestCheckpoint::IngestVersion)
                    .await
            }

            async fn get_latest_history_ledger(&self) -> Result<u32> {
                use sea_query::{Alias, Expr, Query};
                use sqlx::Row;

                use crate::history::schema::HistoryLedgers;

                let sql = {
                    let stmt = Query::select()
                        .expr_as(Expr::col(HistoryLedgers::Sequence).max(), Alias::new("latest"))
                        .from(HistoryLedgers::Table)
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
                match row.try_get::<Option<i64>, _>("latest")? {
                    Some(latest) => to_u32("history_ledgers.sequence", latest),
                    None => Ok(0),
                }
            }

            async fn get_filter_rules(&self) -> Result<Vec<crate::history::FilterRule>> {
                use sea_query::{Order, Query};
                use sqlx::Row;

                use crate::history::schema::IngestFilterRules;

                let sql = {
                    let stmt = Query::select()
                        .columns([
                            IngestFilterRules::Name,
                            IngestFilterRules::Enabled,
                            IngestFilterRules::Rules,
                        ])
                        .from(IngestFilterRules::Table)
                        .order_by(IngestFilterRules::Name, Order::Asc)
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.into_iter()
                    .map(|row| {
                        let name: String = row.try_get("name")?;
                        let rules: String = row.try_get("rules")?;
                        let rules = serde_json::from_str(&rules).map_err(|e| {
                            StorageError::InvalidValue(format!("filter rules for {}: {}", name, e))
                        })?;
                        Ok(crate::history::FilterRule {
                            enabled: row.try_get("enabled")?,
                            name,
                            rules,
                        })
                    })
                    .collect()
            }

            async fn get_state_keys(&self) -> Result<Vec<crate::proto::LedgerKey>> {
                use sea_query::Query;
                use sqlx::Row;

                use crate::history::schema::{Accounts, TrustLines};
                use crate::proto::ledger_key::{AccountKey, Key, TrustLineKey};
                use crate::proto::{Asset, AssetType, LedgerKey};

                let (accounts_sql, trust_lines_sql) = {
                    let accounts = Query::select()
                        .column(Accounts::AccountId)
                        .from(Accounts::Table)
                        .to_owned();
                    let trust_lines = Query::select()
                        .columns([
                            TrustLines::AccountId,
                            TrustLines::AssetType,
                            TrustLines::AssetCode,
                            TrustLines::AssetIssuer,
                        ])
                        .from(TrustLines::Table)
                        .to_owned();
                    let backend = <$db_type as SqlDatabase>::BACKEND;
                    (backend.build(&accounts), backend.build(&trust_lines))
                };

                let mut keys = Vec::new();
                for row in sqlx::query(&accounts_sql).fetch_all(&self.pool).await? {
                    keys.push(LedgerKey {
                        key: Some(Key::Account(AccountKey {
                            account_id: row.try_get("account_id")?,
                        })),
                    });
                }
                for row in sqlx::query(&trust_lines_sql).fetch_all(&self.pool).await? {
                    let name: String = row.try_get("asset_type")?;
                    let asset_type = AssetType::from_name(&name).ok_or_else(|| {
                        StorageError::InvalidValue(format!("trust line asset type {}", name))
                    })?;
                    keys.push(LedgerKey {
                        key: Some(Key::Trustline(TrustLineKey {
                            account_id: row.try_get("account_id")?,
                            asset: Some(Asset {
                                asset_type: asset_type as i32,
                                code: row.try_get("asset_code")?,
                                issuer: row.try_get("asset_issuer")?,
                            }),
                        })),
                    });
                }
                Ok(keys)
            }

            async fn begin(&self) -> Result<Box<dyn crate::history::IngestTx>> {
                let mut tx = self.pool.begin().await?;
                let begin_sql: Option<&str> = $begin_sql;
                if let Some(sql) = begin_sql {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                Ok(Box::new(SqlIngestTx::<$db_type> { tx }))
            }

            async fn try_lock_ingestion(&self) -> Result<Option<IngestLock>> {
                self.acquire_lock().await
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::history::Session for SqlIngestTx<$db_type> {
            fn backend(&self) -> Backend {
                <$db_type as SqlDatabase>::BACKEND
            }

            async fn execute(&mut self, sql: &str) -> Result<u64> {
                let result = sqlx::query(sql).execute(&mut *self.tx).await?;
                Ok(result.rows_affected())
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::history::IngestTx for SqlIngestTx<$db_type> {
            async fn get_last_ledger_ingest(&mut self) -> Result<u32> {
                use sea_query::{Expr, LockType, Query};
                use sqlx::Row;

                use crate::history::schema::IngestCheckpoint;

                let sql = {
                    let mut stmt = Query::select()
                        .column(IngestCheckpoint::LastIngestedLedger)
                        .from(IngestCheckpoint::Table)
                        .and_where(Expr::col(IngestCheckpoint::Id).eq(1))
                        .to_owned();
                    if <$db_type as SqlDatabase>::BACKEND == Backend::Postgres {
                        stmt.lock(LockType::Update);
                    }
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                match sqlx::query(&sql).fetch_optional(&mut *self.tx).await? {
                    Some(row) => to_u32(
                        "last_ingested_ledger",
                        row.try_get::<i64, _>("last_ingested_ledger")?,
                    ),
                    None => Ok(0),
                }
            }

            async fn advance_last_ledger_ingest(&mut self, expected: u32, to: u32) -> Result<()> {
                use sea_query::{Expr, Query};

                use crate::history::schema::IngestCheckpoint;
                use crate::history::Session;

                let sql = {
                    let stmt = Query::update()
                        .table(IngestCheckpoint::Table)
                        .values([
                            (IngestCheckpoint::LastIngestedLedger, i64::from(to).into()),
                            (IngestCheckpoint::UpdatedAt, chrono::Utc::now().to_rfc3339().into()),
                        ])
                        .and_where(Expr::col(IngestCheckpoint::Id).eq(1))
                        .and_where(Expr::col(IngestCheckpoint::LastIngestedLedger).eq(i64::from(expected)))
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                if self.execute(&sql).await? != 1 {
                    let found = self.get_last_ledger_ingest().await?;
                    return Err(StorageError::CheckpointConflict { expected, found });
                }
                Ok(())
            }

            async fn reset_checkpoint(&mut self, version: u32) -> Result<()> {
                use sea_query::{Expr, Query};

                use crate::history::schema::IngestCheckpoint;
                use crate::history::Session;

                let sql = {
                    let stmt = Query::update()
                        .table(IngestCheckpoint::Table)
                        .values([
                            (IngestCheckpoint::LastIngestedLedger, 0i64.into()),
                            (IngestCheckpoint::IngestVersion, i64::from(version).into()),
                            (IngestCheckpoint::UpdatedAt, chrono::Utc::now().to_rfc3339().into()),
                        ])
                        .and_where(Expr::col(IngestCheckpoint::Id).eq(1))
                        .to_owned();
                    <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                };
                self.execute(&sql).await?;
                Ok(())
            }

            async fn truncate_derived_tables(&mut self) -> Result<()> {
                use sea_query::Query;

                use crate::history::schema::derived_tables;
                use crate::history::Session;

                let statements: Vec<String> = derived_tables()
                    .into_iter()
                    .map(|table| {
                        let stmt = Query::delete().from_table(table).to_owned();
                        <$db_type as SqlDatabase>::BACKEND.build(&stmt)
                    })
                    .collect();
                for sql in statements {
                    self.execute(&sql).await?;
                }
                Ok(())
            }

            async fn commit(self: Box<Self>) -> Result<()> {
                self.tx.commit().await?;
                Ok(())
            }

            async fn rollback(self: Box<Self>) -> Result<()> {
                self.tx.rollback().await?;
                Ok(())
            }
        }
    };
}

impl_history_q!(postgres::Postgres, "postgres", Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"));
impl_history_q!(sqlite::Sqlite, "sqlite", None);

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use super::{LockTarget, SqlDatabase, SqlHistoryQ};
    use crate::history::{Backend, IngestLock, Result};

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl SqlDatabase for Postgres {
        type Db = sqlx::Postgres;

        const BACKEND: Backend = Backend::Postgres;
    }

    impl SqlHistoryQ<Postgres> {
        pub(super) async fn acquire_lock(&self) -> Result<Option<IngestLock>> {
            match &self.lock {
                LockTarget::Advisory(key) => IngestLock::try_advisory(&self.pool, *key).await,
                LockTarget::Process(mutex) => Ok(IngestLock::try_process(mutex)),
                LockTarget::File(path) => IngestLock::try_file(path),
            }
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use super::{LockTarget, SqlDatabase, SqlHistoryQ};
    use crate::history::{Backend, IngestLock, Result, StorageError};

    /// SQLite database marker type.
    pub struct Sqlite;

    impl SqlDatabase for Sqlite {
        type Db = sqlx::Sqlite;

        const BACKEND: Backend = Backend::Sqlite;
    }

    impl SqlHistoryQ<Sqlite> {
        pub(super) async fn acquire_lock(&self) -> Result<Option<IngestLock>> {
            match &self.lock {
                LockTarget::File(path) => IngestLock::try_file(path),
                LockTarget::Process(mutex) => Ok(IngestLock::try_process(mutex)),
                LockTarget::Advisory(_) => Err(StorageError::Lock(
                    "advisory locks are not available on SQLite".to_string(),
                )),
            }
        }
    }
}

/// Open the configured database, create missing tables, and return the
/// ingestion queries for it.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn IngestionQ>> {
    match config.storage_type {
        StorageType::Sqlite => connect_sqlite(config).await,
        StorageType::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(config: &StorageConfig) -> Result<Arc<dyn IngestionQ>> {
    use std::time::Duration;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let sqlite = &config.sqlite;
    let (options, pool_options, lock) = if sqlite.is_memory() {
        // Every connection to an in-memory database is a separate database,
        // so keep exactly one alive for the life of the pool.
        (
            SqliteConnectOptions::new().in_memory(true),
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            LockTarget::Process(Arc::new(Mutex::new(()))),
        )
    } else {
        if let Some(parent) = std::path::Path::new(&sqlite.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        (
            SqliteConnectOptions::new()
                .filename(&sqlite.path)
                .create_if_missing(true),
            SqlitePoolOptions::new().max_connections(sqlite.max_connections.max(1)),
            LockTarget::File(PathBuf::from(format!("{}.ingest-lock", sqlite.path))),
        )
    };
    let options = options.busy_timeout(Duration::from_millis(sqlite.busy_timeout_ms));

    let pool = pool_options.connect_with(options).await?;
    let q = SqlHistoryQ::<sqlite::Sqlite>::new(pool, lock);
    q.init().await?;
    info!(path = %sqlite.path, "History database ready (sqlite)");
    Ok(Arc::new(q))
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(_config: &StorageConfig) -> Result<Arc<dyn IngestionQ>> {
    Err(StorageError::UnsupportedBackend("sqlite"))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> Result<Arc<dyn IngestionQ>> {
    use sqlx::postgres::PgPoolOptions;

    let postgres = &config.postgres;
    let pool = PgPoolOptions::new()
        .max_connections(postgres.max_connections.max(2))
        .connect(&postgres.uri)
        .await?;
    let q = SqlHistoryQ::<postgres::Postgres>::new(
        pool,
        LockTarget::Advisory(postgres.advisory_lock_key),
    );
    q.init().await?;
    info!("History database ready (postgres)");
    Ok(Arc::new(q))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &StorageConfig) -> Result<Arc<dyn IngestionQ>> {
    Err(StorageError::UnsupportedBackend("postgres"))
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::history::IngestTx;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queries_run_on_spawned_tasks() {
        let q = connect(&StorageConfig::in_memory()).await.unwrap();

        let reader = q.clone();
        let (last, latest) = tokio::spawn(async move {
            let last = reader.get_last_ledger_ingest_non_blocking().await?;
            let latest = reader.get_latest_history_ledger().await?;
            Ok::<_, StorageError>((last, latest))
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!((last, latest), (0, 0));

        let writer = q.clone();
        tokio::spawn(async move {
            let mut tx = writer.begin().await?;
            tx.truncate_derived_tables().await?;
            tx.reset_checkpoint(4).await?;
            tx.advance_last_ledger_ingest(0, 9).await?;
            tx.commit().await
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(q.get_last_ledger_ingest_non_blocking().await.unwrap(), 9);
        assert_eq!(q.get_ingest_version().await.unwrap(), 4);
        assert!(q.get_filter_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_conflict_is_reported() {
        let q = connect(&StorageConfig::in_memory()).await.unwrap();
        let mut tx = q.begin().await.unwrap();
        let err = tx.advance_last_ledger_ingest(3, 4).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::CheckpointConflict {
                expected: 3,
                found: 0
            }
        ));
        tx.rollback().await.unwrap();
    }
}
