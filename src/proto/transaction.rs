//! Transactions, operations, results and transaction meta.

use super::{Asset, ContractEvent, LedgerEntryChange, ScVal};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionEnvelope {
    #[prost(string, tag = "1")]
    pub source_account: String,
    /// Maximum fee the source is willing to pay.
    #[prost(int64, tag = "2")]
    pub fee: i64,
    #[prost(int64, tag = "3")]
    pub seq_num: i64,
    #[prost(message, repeated, tag = "4")]
    pub operations: Vec<Operation>,
    #[prost(string, tag = "5")]
    pub memo: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperationType {
    CreateAccount = 0,
    Payment = 1,
    PathPaymentStrictReceive = 2,
    ChangeTrust = 6,
    AccountMerge = 8,
    ManageData = 10,
    BumpSequence = 11,
    CreateClaimableBalance = 14,
    ClaimClaimableBalance = 15,
    Clawback = 19,
    InvokeHostFunction = 24,
    HelloWorld = 27,
}

impl OperationType {
    /// Snake-case name used in stored rows and stats.
    pub fn name(self) -> &'static str {
        match self {
            OperationType::CreateAccount => "create_account",
            OperationType::Payment => "payment",
            OperationType::PathPaymentStrictReceive => "path_payment_strict_receive",
            OperationType::ChangeTrust => "change_trust",
            OperationType::AccountMerge => "account_merge",
            OperationType::ManageData => "manage_data",
            OperationType::BumpSequence => "bump_sequence",
            OperationType::CreateClaimableBalance => "create_claimable_balance",
            OperationType::ClaimClaimableBalance => "claim_claimable_balance",
            OperationType::Clawback => "clawback",
            OperationType::InvokeHostFunction => "invoke_host_function",
            OperationType::HelloWorld => "hello_world",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operation {
    /// Overrides the transaction source when set.
    #[prost(string, optional, tag = "1")]
    pub source_account: Option<String>,
    /// Raw discriminant; values unknown to this build are preserved.
    #[prost(enumeration = "OperationType", tag = "2")]
    pub op_type: i32,
    #[prost(
        oneof = "operation::Body",
        tags = "10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21"
    )]
    pub body: Option<operation::Body>,
}

pub mod operation {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "10")]
        CreateAccount(super::CreateAccountOp),
        #[prost(message, tag = "11")]
        Payment(super::PaymentOp),
        #[prost(message, tag = "12")]
        PathPaymentStrictReceive(super::PathPaymentStrictReceiveOp),
        #[prost(message, tag = "13")]
        ChangeTrust(super::ChangeTrustOp),
        #[prost(message, tag = "14")]
        AccountMerge(super::AccountMergeOp),
        #[prost(message, tag = "15")]
        ManageData(super::ManageDataOp),
        #[prost(message, tag = "16")]
        BumpSequence(super::BumpSequenceOp),
        #[prost(message, tag = "17")]
        CreateClaimableBalance(super::CreateClaimableBalanceOp),
        #[prost(message, tag = "18")]
        ClaimClaimableBalance(super::ClaimClaimableBalanceOp),
        #[prost(message, tag = "19")]
        Clawback(super::ClawbackOp),
        #[prost(message, tag = "20")]
        InvokeHostFunction(super::InvokeHostFunctionOp),
        #[prost(message, tag = "21")]
        HelloWorld(super::HelloWorldOp),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateAccountOp {
    #[prost(string, tag = "1")]
    pub destination: String,
    #[prost(int64, tag = "2")]
    pub starting_balance: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PaymentOp {
    #[prost(string, tag = "1")]
    pub destination: String,
    #[prost(message, optional, tag = "2")]
    pub asset: Option<Asset>,
    #[prost(int64, tag = "3")]
    pub amount: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PathPaymentStrictReceiveOp {
    #[prost(message, optional, tag = "1")]
    pub send_asset: Option<Asset>,
    #[prost(int64, tag = "2")]
    pub send_max: i64,
    #[prost(string, tag = "3")]
    pub destination: String,
    #[prost(message, optional, tag = "4")]
    pub dest_asset: Option<Asset>,
    #[prost(int64, tag = "5")]
    pub dest_amount: i64,
    #[prost(message, repeated, tag = "6")]
    pub path: Vec<Asset>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChangeTrustOp {
    #[prost(message, optional, tag = "1")]
    pub line: Option<Asset>,
    #[prost(int64, tag = "2")]
    pub limit: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountMergeOp {
    #[prost(string, tag = "1")]
    pub destination: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ManageDataOp {
    #[prost(string, tag = "1")]
    pub data_name: String,
    /// Absent value deletes the entry.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data_value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BumpSequenceOp {
    #[prost(int64, tag = "1")]
    pub bump_to: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateClaimableBalanceOp {
    #[prost(message, optional, tag = "1")]
    pub asset: Option<Asset>,
    #[prost(int64, tag = "2")]
    pub amount: i64,
    #[prost(string, repeated, tag = "3")]
    pub claimants: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClaimClaimableBalanceOp {
    #[prost(bytes = "vec", tag = "1")]
    pub balance_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClawbackOp {
    #[prost(message, optional, tag = "1")]
    pub asset: Option<Asset>,
    #[prost(string, tag = "2")]
    pub from: String,
    #[prost(int64, tag = "3")]
    pub amount: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvokeHostFunctionOp {
    #[prost(bytes = "vec", tag = "1")]
    pub contract_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub function_name: String,
    #[prost(message, repeated, tag = "3")]
    pub args: Vec<ScVal>,
}

/// Experimental operation with an empty body, only valid on protocols that enable it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HelloWorldOp {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TransactionResultCode {
    TxSuccess = 0,
    TxFailed = 1,
    TxTooEarly = 2,
    TxTooLate = 3,
    TxMissingOperation = 4,
    TxBadSeq = 5,
    TxBadAuth = 6,
    TxInsufficientBalance = 7,
    TxNoAccount = 8,
    TxInsufficientFee = 9,
    TxInternalError = 10,
    TxFeeBumpInnerSuccess = 11,
    TxFeeBumpInnerFailed = 12,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OperationResult {
    /// Zero on success; operation-specific failure codes otherwise.
    #[prost(int32, tag = "1")]
    pub code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionResult {
    #[prost(int64, tag = "1")]
    pub fee_charged: i64,
    #[prost(enumeration = "TransactionResultCode", tag = "2")]
    pub code: i32,
    #[prost(message, repeated, tag = "3")]
    pub op_results: Vec<OperationResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionResultPair {
    #[prost(bytes = "vec", tag = "1")]
    pub transaction_hash: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub result: Option<TransactionResult>,
}

/// Result and state changes of one applied transaction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionResultMeta {
    #[prost(message, optional, tag = "1")]
    pub result: Option<TransactionResultPair>,
    #[prost(message, repeated, tag = "2")]
    pub fee_processing: Vec<LedgerEntryChange>,
    #[prost(message, optional, tag = "3")]
    pub tx_apply_processing: Option<TransactionMeta>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OperationMeta {
    #[prost(message, repeated, tag = "1")]
    pub changes: Vec<LedgerEntryChange>,
    /// Per-operation contract events (meta v4 and later).
    #[prost(message, repeated, tag = "2")]
    pub events: Vec<ContractEvent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SorobanTransactionMeta {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<ContractEvent>,
    #[prost(message, optional, tag = "2")]
    pub return_value: Option<ScVal>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionEvent {
    #[prost(int32, tag = "1")]
    pub stage: i32,
    #[prost(message, optional, tag = "2")]
    pub event: Option<ContractEvent>,
}

/// Versioned transaction meta. Fields in use depend on `v`:
/// v1/v2 carry only operation changes, v3 adds `soroban_meta`,
/// v4 and later move contract events onto operations and `events`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionMeta {
    #[prost(int32, tag = "1")]
    pub v: i32,
    #[prost(message, repeated, tag = "2")]
    pub tx_changes_before: Vec<LedgerEntryChange>,
    #[prost(message, repeated, tag = "3")]
    pub operations: Vec<OperationMeta>,
    #[prost(message, repeated, tag = "4")]
    pub tx_changes_after: Vec<LedgerEntryChange>,
    #[prost(message, optional, tag = "5")]
    pub soroban_meta: Option<SorobanTransactionMeta>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<TransactionEvent>,
    #[prost(message, repeated, tag = "7")]
    pub diagnostic_events: Vec<ContractEvent>,
}
