//! Rows written by the batch writers.
//!
//! Each row type knows its table, its column order, how to render its values,
//! and which shape checks it must pass before it may be sent.

use sea_query::{Iden, OnConflict, SimpleExpr};

use super::schema::{
    Accounts, ContractAssetEvents, HistoryAssets, HistoryLedgers, HistoryOperationParticipants,
    HistoryOperations, HistoryTransactionParticipants, HistoryTransactions, TrustLines,
};

/// A row of an append-only table.
pub trait BatchRow: Clone + Send + Sync + 'static {
    type Iden: Iden + Copy + 'static;

    /// Table name used in errors and logs.
    const TABLE_NAME: &'static str;

    fn table() -> Self::Iden;

    fn columns() -> Vec<Self::Iden>;

    /// Values in the order of [`BatchRow::columns`].
    fn values(&self) -> Vec<SimpleExpr>;

    /// Primary key, used to reject duplicates within a batch.
    fn key(&self) -> String;

    fn validate(&self) -> Result<(), String>;

    fn on_conflict() -> Option<OnConflict> {
        None
    }
}

/// A row of a table mirroring current ledger state, written by upsert or delete.
pub trait StateRow: BatchRow {
    fn key_columns() -> Vec<Self::Iden>;

    /// Values of [`StateRow::key_columns`], in order.
    fn key_values(&self) -> Vec<SimpleExpr>;

    /// Columns overwritten when the key already exists.
    fn update_columns() -> Vec<Self::Iden>;
}

fn require(cond: bool, reason: &str) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

fn is_hash_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLedgerRow {
    pub sequence: u32,
    pub ledger_hash: String,
    pub previous_ledger_hash: String,
    /// RFC 3339.
    pub closed_at: String,
    pub protocol_version: u32,
    pub successful_transaction_count: u32,
    pub failed_transaction_count: u32,
    pub operation_count: u32,
    pub tx_set_operation_count: u32,
    pub total_coins: i64,
    pub fee_pool: i64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
    pub importer_version: u32,
}

impl BatchRow for HistoryLedgerRow {
    type Iden = HistoryLedgers;
    const TABLE_NAME: &'static str = "history_ledgers";

    fn table() -> HistoryLedgers {
        HistoryLedgers::Table
    }

    fn columns() -> Vec<HistoryLedgers> {
        vec![
            HistoryLedgers::Sequence,
            HistoryLedgers::LedgerHash,
            HistoryLedgers::PreviousLedgerHash,
            HistoryLedgers::ClosedAt,
            HistoryLedgers::ProtocolVersion,
            HistoryLedgers::SuccessfulTransactionCount,
            HistoryLedgers::FailedTransactionCount,
            HistoryLedgers::OperationCount,
            HistoryLedgers::TxSetOperationCount,
            HistoryLedgers::TotalCoins,
            HistoryLedgers::FeePool,
            HistoryLedgers::BaseFee,
            HistoryLedgers::BaseReserve,
            HistoryLedgers::MaxTxSetSize,
            HistoryLedgers::ImporterVersion,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            i64::from(self.sequence).into(),
            self.ledger_hash.clone().into(),
            self.previous_ledger_hash.clone().into(),
            self.closed_at.clone().into(),
            i64::from(self.protocol_version).into(),
            i64::from(self.successful_transaction_count).into(),
            i64::from(self.failed_transaction_count).into(),
            i64::from(self.operation_count).into(),
            i64::from(self.tx_set_operation_count).into(),
            self.total_coins.into(),
            self.fee_pool.into(),
            i64::from(self.base_fee).into(),
            i64::from(self.base_reserve).into(),
            i64::from(self.max_tx_set_size).into(),
            i64::from(self.importer_version).into(),
        ]
    }

    fn key(&self) -> String {
        self.sequence.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        require(self.sequence > 0, "sequence must be positive")?;
        require(is_hash_hex(&self.ledger_hash), "ledger hash must be 32 hex-encoded bytes")?;
        require(
            self.operation_count <= self.tx_set_operation_count,
            "applied operations exceed operations in set",
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTransactionRow {
    pub id: i64,
    pub ledger_sequence: u32,
    pub application_order: u32,
    pub transaction_hash: String,
    pub account: String,
    pub account_sequence: i64,
    pub max_fee: i64,
    pub fee_charged: i64,
    pub operation_count: u32,
    pub successful: bool,
    pub result_code: i32,
    pub memo: String,
    /// Base64 of the encoded transaction meta.
    pub tx_meta: String,
}

impl BatchRow for HistoryTransactionRow {
    type Iden = HistoryTransactions;
    const TABLE_NAME: &'static str = "history_transactions";

    fn table() -> HistoryTransactions {
        HistoryTransactions::Table
    }

    fn columns() -> Vec<HistoryTransactions> {
        vec![
            HistoryTransactions::Id,
            HistoryTransactions::LedgerSequence,
            HistoryTransactions::ApplicationOrder,
            HistoryTransactions::TransactionHash,
            HistoryTransactions::Account,
            HistoryTransactions::AccountSequence,
            HistoryTransactions::MaxFee,
            HistoryTransactions::FeeCharged,
            HistoryTransactions::OperationCount,
            HistoryTransactions::Successful,
            HistoryTransactions::ResultCode,
            HistoryTransactions::Memo,
            HistoryTransactions::TxMeta,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.id.into(),
            i64::from(self.ledger_sequence).into(),
            i64::from(self.application_order).into(),
            self.transaction_hash.clone().into(),
            self.account.clone().into(),
            self.account_sequence.into(),
            self.max_fee.into(),
            self.fee_charged.into(),
            i64::from(self.operation_count).into(),
            self.successful.into(),
            i64::from(self.result_code).into(),
            self.memo.clone().into(),
            self.tx_meta.clone().into(),
        ]
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        require(self.id > 0, "id must be positive")?;
        require(self.application_order > 0, "application order is 1-based")?;
        require(is_hash_hex(&self.transaction_hash), "transaction hash must be 32 hex-encoded bytes")?;
        require(!self.account.is_empty(), "source account is empty")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryOperationRow {
    pub id: i64,
    pub transaction_id: i64,
    pub application_order: u32,
    pub op_type: i32,
    pub type_name: String,
    /// JSON object.
    pub details: String,
    pub source_account: String,
    pub successful: bool,
}

impl BatchRow for HistoryOperationRow {
    type Iden = HistoryOperations;
    const TABLE_NAME: &'static str = "history_operations";

    fn table() -> HistoryOperations {
        HistoryOperations::Table
    }

    fn columns() -> Vec<HistoryOperations> {
        vec![
            HistoryOperations::Id,
            HistoryOperations::TransactionId,
            HistoryOperations::ApplicationOrder,
            HistoryOperations::Type,
            HistoryOperations::TypeName,
            HistoryOperations::Details,
            HistoryOperations::SourceAccount,
            HistoryOperations::Successful,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.id.into(),
            self.transaction_id.into(),
            i64::from(self.application_order).into(),
            i64::from(self.op_type).into(),
            self.type_name.clone().into(),
            self.details.clone().into(),
            self.source_account.clone().into(),
            self.successful.into(),
        ]
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn validate(&self) -> Result<(), String> {
        require(self.id > self.transaction_id, "operation id must follow its transaction id")?;
        require(self.application_order > 0, "application order is 1-based")?;
        require(!self.source_account.is_empty(), "source account is empty")?;
        require(self.details.starts_with('{'), "details must be a JSON object")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionParticipantRow {
    pub history_transaction_id: i64,
    pub account: String,
}

impl BatchRow for TransactionParticipantRow {
    type Iden = HistoryTransactionParticipants;
    const TABLE_NAME: &'static str = "history_transaction_participants";

    fn table() -> HistoryTransactionParticipants {
        HistoryTransactionParticipants::Table
    }

    fn columns() -> Vec<HistoryTransactionParticipants> {
        vec![
            HistoryTransactionParticipants::HistoryTransactionId,
            HistoryTransactionParticipants::Account,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![self.history_transaction_id.into(), self.account.clone().into()]
    }

    fn key(&self) -> String {
        format!("{}/{}", self.history_transaction_id, self.account)
    }

    fn validate(&self) -> Result<(), String> {
        require(self.history_transaction_id > 0, "transaction id must be positive")?;
        require(!self.account.is_empty(), "account is empty")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationParticipantRow {
    pub history_operation_id: i64,
    pub account: String,
}

impl BatchRow for OperationParticipantRow {
    type Iden = HistoryOperationParticipants;
    const TABLE_NAME: &'static str = "history_operation_participants";

    fn table() -> HistoryOperationParticipants {
        HistoryOperationParticipants::Table
    }

    fn columns() -> Vec<HistoryOperationParticipants> {
        vec![
            HistoryOperationParticipants::HistoryOperationId,
            HistoryOperationParticipants::Account,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![self.history_operation_id.into(), self.account.clone().into()]
    }

    fn key(&self) -> String {
        format!("{}/{}", self.history_operation_id, self.account)
    }

    fn validate(&self) -> Result<(), String> {
        require(self.history_operation_id > 0, "operation id must be positive")?;
        require(!self.account.is_empty(), "account is empty")
    }
}

/// An asset seen in an operation. Inserting an already known asset is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssetRow {
    pub asset_type: String,
    pub asset_code: String,
    pub asset_issuer: String,
}

impl BatchRow for AssetRow {
    type Iden = HistoryAssets;
    const TABLE_NAME: &'static str = "history_assets";

    fn table() -> HistoryAssets {
        HistoryAssets::Table
    }

    fn columns() -> Vec<HistoryAssets> {
        vec![
            HistoryAssets::AssetType,
            HistoryAssets::AssetCode,
            HistoryAssets::AssetIssuer,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.asset_type.clone().into(),
            self.asset_code.clone().into(),
            self.asset_issuer.clone().into(),
        ]
    }

    fn key(&self) -> String {
        format!("{}/{}/{}", self.asset_type, self.asset_code, self.asset_issuer)
    }

    fn validate(&self) -> Result<(), String> {
        require(!self.asset_type.is_empty(), "asset type is empty")?;
        require(
            (self.asset_type == "native") == self.asset_issuer.is_empty(),
            "credit assets need an issuer and native has none",
        )
    }

    fn on_conflict() -> Option<OnConflict> {
        Some(
            OnConflict::columns([
                HistoryAssets::AssetType,
                HistoryAssets::AssetCode,
                HistoryAssets::AssetIssuer,
            ])
            .do_nothing()
            .to_owned(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractAssetEventRow {
    pub transaction_id: i64,
    /// Position among the asset events of the transaction.
    pub event_index: u32,
    pub ledger_sequence: u32,
    pub operation_index: u32,
    /// Hex.
    pub contract_id: String,
    pub event_type: String,
    /// Canonical asset string.
    pub asset: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Decimal string; amounts are 128-bit.
    pub amount: String,
}

impl BatchRow for ContractAssetEventRow {
    type Iden = ContractAssetEvents;
    const TABLE_NAME: &'static str = "contract_asset_events";

    fn table() -> ContractAssetEvents {
        ContractAssetEvents::Table
    }

    fn columns() -> Vec<ContractAssetEvents> {
        vec![
            ContractAssetEvents::TransactionId,
            ContractAssetEvents::EventIndex,
            ContractAssetEvents::LedgerSequence,
            ContractAssetEvents::OperationIndex,
            ContractAssetEvents::ContractId,
            ContractAssetEvents::EventType,
            ContractAssetEvents::Asset,
            ContractAssetEvents::FromAddress,
            ContractAssetEvents::ToAddress,
            ContractAssetEvents::Amount,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.transaction_id.into(),
            i64::from(self.event_index).into(),
            i64::from(self.ledger_sequence).into(),
            i64::from(self.operation_index).into(),
            self.contract_id.clone().into(),
            self.event_type.clone().into(),
            self.asset.clone().into(),
            self.from_address.clone().into(),
            self.to_address.clone().into(),
            self.amount.clone().into(),
        ]
    }

    fn key(&self) -> String {
        format!("{}/{}", self.transaction_id, self.event_index)
    }

    fn validate(&self) -> Result<(), String> {
        require(self.transaction_id > 0, "transaction id must be positive")?;
        require(is_hash_hex(&self.contract_id), "contract id must be 32 hex-encoded bytes")?;
        require(
            self.from_address.is_some() || self.to_address.is_some(),
            "event moves value from or to nobody",
        )?;
        require(
            !self.amount.starts_with('-') && self.amount.parse::<i128>().is_ok(),
            "amount must be a non-negative integer",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountRow {
    pub account_id: String,
    pub balance: i64,
    pub sequence_number: i64,
    pub num_sub_entries: u32,
    pub home_domain: String,
    pub flags: u32,
    pub last_modified_ledger: u32,
}

impl BatchRow for AccountRow {
    type Iden = Accounts;
    const TABLE_NAME: &'static str = "accounts";

    fn table() -> Accounts {
        Accounts::Table
    }

    fn columns() -> Vec<Accounts> {
        vec![
            Accounts::AccountId,
            Accounts::Balance,
            Accounts::SequenceNumber,
            Accounts::NumSubEntries,
            Accounts::HomeDomain,
            Accounts::Flags,
            Accounts::LastModifiedLedger,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.account_id.clone().into(),
            self.balance.into(),
            self.sequence_number.into(),
            i64::from(self.num_sub_entries).into(),
            self.home_domain.clone().into(),
            i64::from(self.flags).into(),
            i64::from(self.last_modified_ledger).into(),
        ]
    }

    fn key(&self) -> String {
        self.account_id.clone()
    }

    fn validate(&self) -> Result<(), String> {
        require(!self.account_id.is_empty(), "account id is empty")?;
        require(self.balance >= 0, "balance is negative")
    }
}

impl StateRow for AccountRow {
    fn key_columns() -> Vec<Accounts> {
        vec![Accounts::AccountId]
    }

    fn key_values(&self) -> Vec<SimpleExpr> {
        vec![self.account_id.clone().into()]
    }

    fn update_columns() -> Vec<Accounts> {
        vec![
            Accounts::Balance,
            Accounts::SequenceNumber,
            Accounts::NumSubEntries,
            Accounts::HomeDomain,
            Accounts::Flags,
            Accounts::LastModifiedLedger,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrustLineRow {
    pub account_id: String,
    /// Canonical asset string.
    pub asset: String,
    pub asset_type: String,
    pub asset_code: String,
    pub asset_issuer: String,
    pub balance: i64,
    pub trust_limit: i64,
    pub flags: u32,
    pub last_modified_ledger: u32,
}

impl BatchRow for TrustLineRow {
    type Iden = TrustLines;
    const TABLE_NAME: &'static str = "trust_lines";

    fn table() -> TrustLines {
        TrustLines::Table
    }

    fn columns() -> Vec<TrustLines> {
        vec![
            TrustLines::AccountId,
            TrustLines::Asset,
            TrustLines::AssetType,
            TrustLines::AssetCode,
            TrustLines::AssetIssuer,
            TrustLines::Balance,
            TrustLines::TrustLimit,
            TrustLines::Flags,
            TrustLines::LastModifiedLedger,
        ]
    }

    fn values(&self) -> Vec<SimpleExpr> {
        vec![
            self.account_id.clone().into(),
            self.asset.clone().into(),
            self.asset_type.clone().into(),
            self.asset_code.clone().into(),
            self.asset_issuer.clone().into(),
            self.balance.into(),
            self.trust_limit.into(),
            i64::from(self.flags).into(),
            i64::from(self.last_modified_ledger).into(),
        ]
    }

    fn key(&self) -> String {
        format!("{}/{}", self.account_id, self.asset)
    }

    fn validate(&self) -> Result<(), String> {
        require(!self.account_id.is_empty(), "account id is empty")?;
        require(self.asset != "native", "native asset has no trust line")?;
        require(self.balance >= 0, "balance is negative")?;
        require(self.balance <= self.trust_limit, "balance exceeds limit")
    }
}

impl StateRow for TrustLineRow {
    fn key_columns() -> Vec<TrustLines> {
        vec![TrustLines::AccountId, TrustLines::Asset]
    }

    fn key_values(&self) -> Vec<SimpleExpr> {
        vec![self.account_id.clone().into(), self.asset.clone().into()]
    }

    fn update_columns() -> Vec<TrustLines> {
        vec![
            TrustLines::Balance,
            TrustLines::TrustLimit,
            TrustLines::Flags,
            TrustLines::LastModifiedLedger,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_row() -> HistoryLedgerRow {
        HistoryLedgerRow {
            sequence: 7,
            ledger_hash: "ab".repeat(32),
            previous_ledger_hash: "cd".repeat(32),
            closed_at: "2024-01-01T00:00:00+00:00".to_string(),
            protocol_version: 21,
            successful_transaction_count: 1,
            failed_transaction_count: 0,
            operation_count: 1,
            tx_set_operation_count: 1,
            total_coins: 0,
            fee_pool: 0,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 100,
            importer_version: 1,
        }
    }

    #[test]
    fn test_valid_ledger_row() {
        assert!(ledger_row().validate().is_ok());
        assert_eq!(ledger_row().values().len(), HistoryLedgerRow::columns().len());
    }

    #[test]
    fn test_ledger_row_rejects_bad_hash() {
        let row = HistoryLedgerRow {
            ledger_hash: "xyz".to_string(),
            ..ledger_row()
        };
        assert!(row.validate().is_err());
    }

    #[test]
    fn test_asset_row_native_has_no_issuer() {
        let native = AssetRow {
            asset_type: "native".to_string(),
            asset_code: String::new(),
            asset_issuer: String::new(),
        };
        assert!(native.validate().is_ok());

        let broken = AssetRow {
            asset_issuer: "GISSUER".to_string(),
            ..native
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_trust_line_balance_within_limit() {
        let row = TrustLineRow {
            account_id: "GA".to_string(),
            asset: "USD:GISSUER".to_string(),
            balance: 10,
            trust_limit: 5,
            ..Default::default()
        };
        assert!(row.validate().is_err());
    }

    #[test]
    fn test_contract_event_amount_must_be_integer() {
        let row = ContractAssetEventRow {
            transaction_id: 1 << 32,
            event_index: 0,
            ledger_sequence: 1,
            operation_index: 0,
            contract_id: "00".repeat(32),
            event_type: "transfer".to_string(),
            asset: "native".to_string(),
            from_address: Some("GA".to_string()),
            to_address: Some("GB".to_string()),
            amount: "12.5".to_string(),
        };
        assert!(row.validate().is_err());
        assert!(ContractAssetEventRow {
            amount: "170141183460469231731687303715884105727".to_string(),
            ..row
        }
        .validate()
        .is_ok());
    }
}
