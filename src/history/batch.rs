//! Batch writers.
//!
//! Builders buffer rows in memory and send them in multi-row statements on
//! `exec`. A builder is single-use: once executed it refuses further rows
//! until [`BatchInsertBuilder::reset`]. Every buffered row is validated again
//! before the first statement is sent, so a bad row aborts the whole batch
//! without partial writes from this builder.

use std::collections::{BTreeMap, HashSet};

use sea_query::{Cond, Expr, OnConflict, Query, SimpleExpr};
use tracing::debug;

use super::rows::{
    AccountRow, AssetRow, BatchRow, ContractAssetEventRow, HistoryLedgerRow, HistoryOperationRow,
    HistoryTransactionRow, OperationParticipantRow, StateRow, TransactionParticipantRow,
    TrustLineRow,
};
use super::schema::AssetStats;
use super::{Backend, Result, Session, StorageError};
use crate::proto::{Asset, AssetType};

/// Default number of rows per INSERT statement.
pub const DEFAULT_MAX_ROWS_PER_STATEMENT: usize = 1000;

fn invalid<R: BatchRow>(reason: String) -> StorageError {
    StorageError::InvalidRow {
        table: R::TABLE_NAME,
        reason,
    }
}

/// Buffers rows of one append-only table.
#[derive(Debug)]
pub struct BatchInsertBuilder<R: BatchRow> {
    rows: Vec<R>,
    max_rows_per_statement: usize,
    consumed: bool,
}

impl<R: BatchRow> BatchInsertBuilder<R> {
    pub fn new(max_rows_per_statement: usize) -> Self {
        Self {
            rows: Vec::new(),
            max_rows_per_statement: max_rows_per_statement.max(1),
            consumed: false,
        }
    }

    /// Buffer one row after checking its shape.
    pub fn add(&mut self, row: R) -> Result<()> {
        if self.consumed {
            return Err(StorageError::BuilderConsumed {
                table: R::TABLE_NAME,
            });
        }
        row.validate().map_err(invalid::<R>)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Render the batch. Fails without producing anything if any row is
    /// invalid or two rows share a key.
    pub fn statements(&self, backend: Backend) -> Result<Vec<String>> {
        let mut keys = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            row.validate().map_err(invalid::<R>)?;
            let key = row.key();
            if !keys.insert(key.clone()) {
                return Err(StorageError::DuplicateRow {
                    table: R::TABLE_NAME,
                    key,
                });
            }
        }

        let mut out = Vec::new();
        for chunk in self.rows.chunks(self.max_rows_per_statement) {
            let mut stmt = Query::insert();
            stmt.into_table(R::table()).columns(R::columns());
            for row in chunk {
                stmt.values(row.values())
                    .map_err(|e| invalid::<R>(e.to_string()))?;
            }
            if let Some(on_conflict) = R::on_conflict() {
                stmt.on_conflict(on_conflict);
            }
            out.push(backend.build(&stmt));
        }
        Ok(out)
    }

    /// Send every buffered row. An empty builder succeeds without touching
    /// the session. The builder is consumed either way.
    pub async fn exec<S: Session + ?Sized>(&mut self, session: &mut S) -> Result<()> {
        if self.consumed {
            return Err(StorageError::BuilderConsumed {
                table: R::TABLE_NAME,
            });
        }
        self.consumed = true;
        if self.rows.is_empty() {
            return Ok(());
        }

        let statements = self.statements(session.backend())?;
        for sql in &statements {
            session.execute(sql).await?;
        }
        debug!(
            table = R::TABLE_NAME,
            rows = self.rows.len(),
            statements = statements.len(),
            "Batch executed"
        );
        Ok(())
    }

    /// Drop buffered rows and make the builder usable again.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.consumed = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StateOp<R> {
    Upsert(R),
    Remove(R),
}

/// Last-write-wins changes to a state table, keyed by primary key.
#[derive(Debug)]
pub struct StateBatch<R: StateRow> {
    ops: BTreeMap<String, StateOp<R>>,
    max_rows_per_statement: usize,
    consumed: bool,
}

impl<R: StateRow> StateBatch<R> {
    pub fn new(max_rows_per_statement: usize) -> Self {
        Self {
            ops: BTreeMap::new(),
            max_rows_per_statement: max_rows_per_statement.max(1),
            consumed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.consumed {
            return Err(StorageError::BuilderConsumed {
                table: R::TABLE_NAME,
            });
        }
        Ok(())
    }

    pub fn upsert(&mut self, row: R) -> Result<()> {
        self.check_open()?;
        row.validate().map_err(invalid::<R>)?;
        self.ops.insert(row.key(), StateOp::Upsert(row));
        Ok(())
    }

    /// Delete the row with `row`'s key. Only key columns are read.
    pub fn remove(&mut self, row: R) -> Result<()> {
        self.check_open()?;
        self.ops.insert(row.key(), StateOp::Remove(row));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Pending upsert for `key`, if the last change to it was not a removal.
    pub fn pending(&self, key: &str) -> Option<&R> {
        match self.ops.get(key) {
            Some(StateOp::Upsert(row)) => Some(row),
            _ => None,
        }
    }

    pub fn statements(&self, backend: Backend) -> Result<Vec<String>> {
        let mut removals = Vec::new();
        let mut upserts = Vec::new();
        for op in self.ops.values() {
            match op {
                StateOp::Remove(row) => removals.push(row),
                StateOp::Upsert(row) => {
                    row.validate().map_err(invalid::<R>)?;
                    upserts.push(row);
                }
            }
        }

        let mut out = Vec::new();
        for chunk in removals.chunks(self.max_rows_per_statement) {
            let mut any = Cond::any();
            for row in chunk {
                let mut all = Cond::all();
                for (col, value) in R::key_columns().into_iter().zip(row.key_values()) {
                    all = all.add(Expr::col(col).eq(value));
                }
                any = any.add(all);
            }
            let stmt = Query::delete()
                .from_table(R::table())
                .cond_where(any)
                .to_owned();
            out.push(backend.build(&stmt));
        }

        for chunk in upserts.chunks(self.max_rows_per_statement) {
            let mut stmt = Query::insert();
            stmt.into_table(R::table()).columns(R::columns());
            for row in chunk {
                stmt.values(row.values())
                    .map_err(|e| invalid::<R>(e.to_string()))?;
            }
            stmt.on_conflict(
                OnConflict::columns(R::key_columns())
                    .update_columns(R::update_columns())
                    .to_owned(),
            );
            out.push(backend.build(&stmt));
        }
        Ok(out)
    }

    pub async fn exec<S: Session + ?Sized>(&mut self, session: &mut S) -> Result<()> {
        self.check_open()?;
        self.consumed = true;
        if self.ops.is_empty() {
            return Ok(());
        }
        for sql in self.statements(session.backend())? {
            session.execute(&sql).await?;
        }
        debug!(table = R::TABLE_NAME, changes = self.ops.len(), "State batch executed");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AssetStatDelta {
    asset_type: String,
    code: String,
    issuer: String,
    num_accounts: i64,
    amount: i128,
}

/// Additive per-asset holder counts and supply.
///
/// Deltas of one ledger are summed in memory, then added to the stored
/// values with one upsert per asset. The supply of an asset may exceed any
/// single balance, so amounts are summed as `i128` and stored as `NUMERIC`.
#[derive(Debug, Default)]
pub struct AssetStatsBatch {
    deltas: BTreeMap<String, AssetStatDelta>,
    consumed: bool,
}

impl AssetStatsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, asset: &Asset, num_accounts: i64, amount: i128) -> Result<()> {
        if self.consumed {
            return Err(StorageError::BuilderConsumed { table: "asset_stats" });
        }
        let asset_type = AssetType::try_from(asset.asset_type)
            .map(AssetType::name)
            .map_err(|_| StorageError::InvalidRow {
                table: "asset_stats",
                reason: format!("unknown asset type {}", asset.asset_type),
            })?;
        let entry = self
            .deltas
            .entry(asset.canonical())
            .or_insert_with(|| AssetStatDelta {
                asset_type: asset_type.to_string(),
                code: asset.code.clone(),
                issuer: asset.issuer.clone(),
                ..Default::default()
            });
        let overflow = || StorageError::InvalidRow {
            table: "asset_stats",
            reason: format!("delta of {} out of range", asset.canonical()),
        };
        entry.num_accounts = entry
            .num_accounts
            .checked_add(num_accounts)
            .ok_or_else(overflow)?;
        entry.amount = entry.amount.checked_add(amount).ok_or_else(overflow)?;
        Ok(())
    }

    /// Summed delta for an asset, as `(num_accounts, amount)`.
    pub fn delta(&self, canonical: &str) -> Option<(i64, i128)> {
        self.deltas
            .get(canonical)
            .map(|d| (d.num_accounts, d.amount))
    }

    pub fn is_empty(&self) -> bool {
        self.deltas
            .values()
            .all(|d| d.num_accounts == 0 && d.amount == 0)
    }

    pub fn statements(&self, backend: Backend) -> Result<Vec<String>> {
        self.deltas
            .iter()
            .filter(|(_, d)| d.num_accounts != 0 || d.amount != 0)
            .map(|(canonical, d)| {
                let values: Vec<SimpleExpr> = vec![
                    canonical.clone().into(),
                    d.asset_type.clone().into(),
                    d.code.clone().into(),
                    d.issuer.clone().into(),
                    d.num_accounts.into(),
                    d.amount.to_string().into(),
                ];
                let mut stmt = Query::insert();
                stmt
                    .into_table(AssetStats::Table)
                    .columns([
                        AssetStats::Asset,
                        AssetStats::AssetType,
                        AssetStats::AssetCode,
                        AssetStats::AssetIssuer,
                        AssetStats::NumAccounts,
                        AssetStats::Amount,
                    ])
                    .values(values)
                    .map_err(|e| StorageError::InvalidRow {
                        table: "asset_stats",
                        reason: e.to_string(),
                    })?
                    .on_conflict(
                        OnConflict::column(AssetStats::Asset)
                            .value(
                                AssetStats::NumAccounts,
                                Expr::col((AssetStats::Table, AssetStats::NumAccounts))
                                    .add(Expr::cust("excluded.num_accounts")),
                            )
                            .value(
                                AssetStats::Amount,
                                Expr::col((AssetStats::Table, AssetStats::Amount))
                                    .add(Expr::cust("excluded.amount")),
                            )
                            .to_owned(),
                    );
                Ok(backend.build(&stmt))
            })
            .collect()
    }

    pub async fn exec<S: Session + ?Sized>(&mut self, session: &mut S) -> Result<()> {
        if self.consumed {
            return Err(StorageError::BuilderConsumed { table: "asset_stats" });
        }
        self.consumed = true;
        for sql in self.statements(session.backend())? {
            session.execute(&sql).await?;
        }
        Ok(())
    }
}

/// Every row derived from one ledger, executed as one unit.
#[derive(Debug)]
pub struct LedgerBatch {
    pub ledgers: BatchInsertBuilder<HistoryLedgerRow>,
    pub transactions: BatchInsertBuilder<HistoryTransactionRow>,
    pub operations: BatchInsertBuilder<HistoryOperationRow>,
    pub transaction_participants: BatchInsertBuilder<TransactionParticipantRow>,
    pub operation_participants: BatchInsertBuilder<OperationParticipantRow>,
    pub assets: BatchInsertBuilder<AssetRow>,
    pub contract_events: BatchInsertBuilder<ContractAssetEventRow>,
    pub accounts: StateBatch<AccountRow>,
    pub trust_lines: StateBatch<TrustLineRow>,
    pub asset_stats: AssetStatsBatch,
}

impl LedgerBatch {
    pub fn new(max_rows_per_statement: usize) -> Self {
        Self {
            ledgers: BatchInsertBuilder::new(max_rows_per_statement),
            transactions: BatchInsertBuilder::new(max_rows_per_statement),
            operations: BatchInsertBuilder::new(max_rows_per_statement),
            transaction_participants: BatchInsertBuilder::new(max_rows_per_statement),
            operation_participants: BatchInsertBuilder::new(max_rows_per_statement),
            assets: BatchInsertBuilder::new(max_rows_per_statement),
            contract_events: BatchInsertBuilder::new(max_rows_per_statement),
            accounts: StateBatch::new(max_rows_per_statement),
            trust_lines: StateBatch::new(max_rows_per_statement),
            asset_stats: AssetStatsBatch::new(),
        }
    }

    /// Rows and state changes buffered across all tables.
    pub fn row_count(&self) -> usize {
        self.ledgers.len()
            + self.transactions.len()
            + self.operations.len()
            + self.transaction_participants.len()
            + self.operation_participants.len()
            + self.assets.len()
            + self.contract_events.len()
            + self.accounts.len()
            + self.trust_lines.len()
    }

    /// Render every statement without sending anything. Validation failures
    /// in any table fail the whole batch.
    pub fn statements(&self, backend: Backend) -> Result<Vec<String>> {
        let mut out = self.ledgers.statements(backend)?;
        out.extend(self.transactions.statements(backend)?);
        out.extend(self.operations.statements(backend)?);
        out.extend(self.transaction_participants.statements(backend)?);
        out.extend(self.operation_participants.statements(backend)?);
        out.extend(self.assets.statements(backend)?);
        out.extend(self.contract_events.statements(backend)?);
        out.extend(self.accounts.statements(backend)?);
        out.extend(self.trust_lines.statements(backend)?);
        out.extend(self.asset_stats.statements(backend)?);
        Ok(out)
    }

    /// Send the whole batch through `session`.
    pub async fn exec<S: Session + ?Sized>(&mut self, session: &mut S) -> Result<()> {
        // Validate everything before the first statement goes out.
        self.statements(session.backend())?;

        self.ledgers.exec(session).await?;
        self.transactions.exec(session).await?;
        self.operations.exec(session).await?;
        self.transaction_participants.exec(session).await?;
        self.operation_participants.exec(session).await?;
        self.assets.exec(session).await?;
        self.contract_events.exec(session).await?;
        self.accounts.exec(session).await?;
        self.trust_lines.exec(session).await?;
        self.asset_stats.exec(session).await
    }
}
