//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::{
    Alias, ColumnDef, Iden, Index, IndexCreateStatement, Table, TableCreateStatement,
};

use super::Backend;

/// Single-row durable cursor.
#[derive(Iden, Clone, Copy)]
pub enum IngestCheckpoint {
    Table,
    Id,
    LastIngestedLedger,
    IngestVersion,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum IngestFilterRules {
    Table,
    Name,
    Enabled,
    Rules,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryLedgers {
    Table,
    Sequence,
    LedgerHash,
    PreviousLedgerHash,
    ClosedAt,
    ProtocolVersion,
    SuccessfulTransactionCount,
    FailedTransactionCount,
    OperationCount,
    TxSetOperationCount,
    TotalCoins,
    FeePool,
    BaseFee,
    BaseReserve,
    MaxTxSetSize,
    ImporterVersion,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryTransactions {
    Table,
    Id,
    LedgerSequence,
    ApplicationOrder,
    TransactionHash,
    Account,
    AccountSequence,
    MaxFee,
    FeeCharged,
    OperationCount,
    Successful,
    ResultCode,
    Memo,
    TxMeta,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryOperations {
    Table,
    Id,
    TransactionId,
    ApplicationOrder,
    Type,
    TypeName,
    Details,
    SourceAccount,
    Successful,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryTransactionParticipants {
    Table,
    HistoryTransactionId,
    Account,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryOperationParticipants {
    Table,
    HistoryOperationId,
    Account,
}

#[derive(Iden, Clone, Copy)]
pub enum HistoryAssets {
    Table,
    AssetType,
    AssetCode,
    AssetIssuer,
}

#[derive(Iden, Clone, Copy)]
pub enum ContractAssetEvents {
    Table,
    TransactionId,
    EventIndex,
    LedgerSequence,
    OperationIndex,
    ContractId,
    EventType,
    Asset,
    FromAddress,
    ToAddress,
    Amount,
}

#[derive(Iden, Clone, Copy)]
pub enum Accounts {
    Table,
    AccountId,
    Balance,
    SequenceNumber,
    NumSubEntries,
    HomeDomain,
    Flags,
    LastModifiedLedger,
}

#[derive(Iden, Clone, Copy)]
pub enum TrustLines {
    Table,
    AccountId,
    Asset,
    AssetType,
    AssetCode,
    AssetIssuer,
    Balance,
    TrustLimit,
    Flags,
    LastModifiedLedger,
}

#[derive(Iden, Clone, Copy)]
pub enum AssetStats {
    Table,
    Asset,
    AssetType,
    AssetCode,
    AssetIssuer,
    NumAccounts,
    Amount,
}

/// Tables derived from ledgers, emptied on rebuild.
pub fn derived_tables() -> Vec<sea_query::DynIden> {
    vec![
        sea_query::SeaRc::new(HistoryOperationParticipants::Table),
        sea_query::SeaRc::new(HistoryTransactionParticipants::Table),
        sea_query::SeaRc::new(ContractAssetEvents::Table),
        sea_query::SeaRc::new(HistoryOperations::Table),
        sea_query::SeaRc::new(HistoryTransactions::Table),
        sea_query::SeaRc::new(HistoryLedgers::Table),
        sea_query::SeaRc::new(HistoryAssets::Table),
        sea_query::SeaRc::new(AssetStats::Table),
        sea_query::SeaRc::new(TrustLines::Table),
        sea_query::SeaRc::new(Accounts::Table),
    ]
}

fn tables() -> Vec<TableCreateStatement> {
    vec![
        Table::create()
            .table(IngestCheckpoint::Table)
            .if_not_exists()
            .col(ColumnDef::new(IngestCheckpoint::Id).integer().not_null().primary_key())
            .col(ColumnDef::new(IngestCheckpoint::LastIngestedLedger).big_integer().not_null())
            .col(ColumnDef::new(IngestCheckpoint::IngestVersion).big_integer().not_null())
            .col(ColumnDef::new(IngestCheckpoint::UpdatedAt).text().not_null())
            .to_owned(),
        Table::create()
            .table(IngestFilterRules::Table)
            .if_not_exists()
            .col(ColumnDef::new(IngestFilterRules::Name).text().not_null().primary_key())
            .col(ColumnDef::new(IngestFilterRules::Enabled).boolean().not_null())
            .col(ColumnDef::new(IngestFilterRules::Rules).text().not_null())
            .col(ColumnDef::new(IngestFilterRules::UpdatedAt).text().not_null())
            .to_owned(),
        Table::create()
            .table(HistoryLedgers::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryLedgers::Sequence).big_integer().not_null().primary_key())
            .col(ColumnDef::new(HistoryLedgers::LedgerHash).text().not_null())
            .col(ColumnDef::new(HistoryLedgers::PreviousLedgerHash).text().not_null())
            .col(ColumnDef::new(HistoryLedgers::ClosedAt).text().not_null())
            .col(ColumnDef::new(HistoryLedgers::ProtocolVersion).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::SuccessfulTransactionCount).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::FailedTransactionCount).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::OperationCount).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::TxSetOperationCount).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::TotalCoins).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::FeePool).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::BaseFee).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::BaseReserve).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::MaxTxSetSize).big_integer().not_null())
            .col(ColumnDef::new(HistoryLedgers::ImporterVersion).big_integer().not_null())
            .to_owned(),
        Table::create()
            .table(HistoryTransactions::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryTransactions::Id).big_integer().not_null().primary_key())
            .col(ColumnDef::new(HistoryTransactions::LedgerSequence).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::ApplicationOrder).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::TransactionHash).text().not_null())
            .col(ColumnDef::new(HistoryTransactions::Account).text().not_null())
            .col(ColumnDef::new(HistoryTransactions::AccountSequence).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::MaxFee).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::FeeCharged).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::OperationCount).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::Successful).boolean().not_null())
            .col(ColumnDef::new(HistoryTransactions::ResultCode).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactions::Memo).text().not_null())
            .col(ColumnDef::new(HistoryTransactions::TxMeta).text().not_null())
            .to_owned(),
        Table::create()
            .table(HistoryOperations::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryOperations::Id).big_integer().not_null().primary_key())
            .col(ColumnDef::new(HistoryOperations::TransactionId).big_integer().not_null())
            .col(ColumnDef::new(HistoryOperations::ApplicationOrder).big_integer().not_null())
            .col(ColumnDef::new(HistoryOperations::Type).big_integer().not_null())
            .col(ColumnDef::new(HistoryOperations::TypeName).text().not_null())
            .col(ColumnDef::new(HistoryOperations::Details).text().not_null())
            .col(ColumnDef::new(HistoryOperations::SourceAccount).text().not_null())
            .col(ColumnDef::new(HistoryOperations::Successful).boolean().not_null())
            .to_owned(),
        Table::create()
            .table(HistoryTransactionParticipants::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryTransactionParticipants::HistoryTransactionId).big_integer().not_null())
            .col(ColumnDef::new(HistoryTransactionParticipants::Account).text().not_null())
            .primary_key(
                Index::create()
                    .col(HistoryTransactionParticipants::HistoryTransactionId)
                    .col(HistoryTransactionParticipants::Account),
            )
            .to_owned(),
        Table::create()
            .table(HistoryOperationParticipants::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryOperationParticipants::HistoryOperationId).big_integer().not_null())
            .col(ColumnDef::new(HistoryOperationParticipants::Account).text().not_null())
            .primary_key(
                Index::create()
                    .col(HistoryOperationParticipants::HistoryOperationId)
                    .col(HistoryOperationParticipants::Account),
            )
            .to_owned(),
        Table::create()
            .table(HistoryAssets::Table)
            .if_not_exists()
            .col(ColumnDef::new(HistoryAssets::AssetType).text().not_null())
            .col(ColumnDef::new(HistoryAssets::AssetCode).text().not_null())
            .col(ColumnDef::new(HistoryAssets::AssetIssuer).text().not_null())
            .primary_key(
                Index::create()
                    .col(HistoryAssets::AssetType)
                    .col(HistoryAssets::AssetCode)
                    .col(HistoryAssets::AssetIssuer),
            )
            .to_owned(),
        Table::create()
            .table(ContractAssetEvents::Table)
            .if_not_exists()
            .col(ColumnDef::new(ContractAssetEvents::TransactionId).big_integer().not_null())
            .col(ColumnDef::new(ContractAssetEvents::EventIndex).big_integer().not_null())
            .col(ColumnDef::new(ContractAssetEvents::LedgerSequence).big_integer().not_null())
            .col(ColumnDef::new(ContractAssetEvents::OperationIndex).big_integer().not_null())
            .col(ColumnDef::new(ContractAssetEvents::ContractId).text().not_null())
            .col(ColumnDef::new(ContractAssetEvents::EventType).text().not_null())
            .col(ColumnDef::new(ContractAssetEvents::Asset).text().not_null())
            .col(ColumnDef::new(ContractAssetEvents::FromAddress).text())
            .col(ColumnDef::new(ContractAssetEvents::ToAddress).text())
            .col(ColumnDef::new(ContractAssetEvents::Amount).text().not_null())
            .primary_key(
                Index::create()
                    .col(ContractAssetEvents::TransactionId)
                    .col(ContractAssetEvents::EventIndex),
            )
            .to_owned(),
        Table::create()
            .table(Accounts::Table)
            .if_not_exists()
            .col(ColumnDef::new(Accounts::AccountId).text().not_null().primary_key())
            .col(ColumnDef::new(Accounts::Balance).big_integer().not_null())
            .col(ColumnDef::new(Accounts::SequenceNumber).big_integer().not_null())
            .col(ColumnDef::new(Accounts::NumSubEntries).big_integer().not_null())
            .col(ColumnDef::new(Accounts::HomeDomain).text().not_null())
            .col(ColumnDef::new(Accounts::Flags).big_integer().not_null())
            .col(ColumnDef::new(Accounts::LastModifiedLedger).big_integer().not_null())
            .to_owned(),
        Table::create()
            .table(TrustLines::Table)
            .if_not_exists()
            .col(ColumnDef::new(TrustLines::AccountId).text().not_null())
            .col(ColumnDef::new(TrustLines::Asset).text().not_null())
            .col(ColumnDef::new(TrustLines::AssetType).text().not_null())
            .col(ColumnDef::new(TrustLines::AssetCode).text().not_null())
            .col(ColumnDef::new(TrustLines::AssetIssuer).text().not_null())
            .col(ColumnDef::new(TrustLines::Balance).big_integer().not_null())
            .col(ColumnDef::new(TrustLines::TrustLimit).big_integer().not_null())
            .col(ColumnDef::new(TrustLines::Flags).big_integer().not_null())
            .col(ColumnDef::new(TrustLines::LastModifiedLedger).big_integer().not_null())
            .primary_key(Index::create().col(TrustLines::AccountId).col(TrustLines::Asset))
            .to_owned(),
        Table::create()
            .table(AssetStats::Table)
            .if_not_exists()
            .col(ColumnDef::new(AssetStats::Asset).text().not_null().primary_key())
            .col(ColumnDef::new(AssetStats::AssetType).text().not_null())
            .col(ColumnDef::new(AssetStats::AssetCode).text().not_null())
            .col(ColumnDef::new(AssetStats::AssetIssuer).text().not_null())
            .col(ColumnDef::new(AssetStats::NumAccounts).big_integer().not_null())
            .col(
                ColumnDef::new(AssetStats::Amount)
                    .custom(Alias::new("NUMERIC"))
                    .not_null(),
            )
            .to_owned(),
    ]
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name("idx_history_transactions_ledger")
            .table(HistoryTransactions::Table)
            .col(HistoryTransactions::LedgerSequence)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_history_transactions_hash")
            .table(HistoryTransactions::Table)
            .col(HistoryTransactions::TransactionHash)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_history_operations_transaction")
            .table(HistoryOperations::Table)
            .col(HistoryOperations::TransactionId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_contract_asset_events_ledger")
            .table(ContractAssetEvents::Table)
            .col(ContractAssetEvents::LedgerSequence)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_trust_lines_account")
            .table(TrustLines::Table)
            .col(TrustLines::AccountId)
            .to_owned(),
    ]
}

/// DDL creating every table and index, idempotently.
pub fn create_statements(backend: Backend) -> Vec<String> {
    let mut out: Vec<String> = tables().iter().map(|t| backend.build_schema(t)).collect();
    out.extend(indexes().iter().map(|i| backend.build_schema(i)));
    out
}
