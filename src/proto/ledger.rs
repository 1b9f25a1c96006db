//! Ledger close records and their headers.

use super::{LedgerEntry, LedgerEntryChange, TransactionEnvelope, TransactionResultMeta};

/// One closed ledger as emitted by the node or stored in an archive.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LedgerCloseMeta {
    /// Meta layout version.
    #[prost(uint32, tag = "1")]
    pub v: u32,
    #[prost(message, optional, tag = "2")]
    pub header: Option<LedgerHeader>,
    /// Transaction set in hash order (not application order).
    #[prost(message, repeated, tag = "3")]
    pub tx_set: Vec<TransactionEnvelope>,
    /// Results and meta in application order.
    #[prost(message, repeated, tag = "4")]
    pub tx_processing: Vec<TransactionResultMeta>,
    #[prost(message, repeated, tag = "5")]
    pub upgrades_processing: Vec<UpgradeEntryMeta>,
    /// Entries evicted at the end of this ledger, as of their last value.
    #[prost(message, repeated, tag = "6")]
    pub evicted_entries: Vec<LedgerEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LedgerHeader {
    #[prost(uint32, tag = "1")]
    pub ledger_seq: u32,
    /// Close time, unix seconds.
    #[prost(uint64, tag = "2")]
    pub close_time: u64,
    #[prost(uint32, tag = "3")]
    pub protocol_version: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub ledger_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub previous_ledger_hash: Vec<u8>,
    #[prost(int64, tag = "6")]
    pub total_coins: i64,
    #[prost(int64, tag = "7")]
    pub fee_pool: i64,
    #[prost(uint32, tag = "8")]
    pub base_fee: u32,
    #[prost(uint32, tag = "9")]
    pub base_reserve: u32,
    #[prost(uint32, tag = "10")]
    pub max_tx_set_size: u32,
}

/// A network upgrade applied while closing the ledger.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpgradeEntryMeta {
    #[prost(bytes = "vec", tag = "1")]
    pub upgrade: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub changes: Vec<LedgerEntryChange>,
}
