//! Ledger entries, their keys, and entry change records.

use super::{Asset, ScVal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LedgerEntryType {
    Account = 0,
    Trustline = 1,
    Offer = 2,
    Data = 3,
    ClaimableBalance = 4,
    LiquidityPool = 5,
    ContractData = 6,
    ContractCode = 7,
    ConfigSetting = 8,
    Ttl = 9,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LedgerEntry {
    #[prost(uint32, tag = "1")]
    pub last_modified_ledger_seq: u32,
    /// Discriminant of `data`; kept separately so unknown entry types can be reported.
    #[prost(enumeration = "LedgerEntryType", tag = "2")]
    pub entry_type: i32,
    #[prost(oneof = "ledger_entry::Data", tags = "10, 11, 12, 13, 14, 15")]
    pub data: Option<ledger_entry::Data>,
}

pub mod ledger_entry {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "10")]
        Account(super::AccountEntry),
        #[prost(message, tag = "11")]
        Trustline(super::TrustLineEntry),
        #[prost(message, tag = "12")]
        Data(super::DataEntry),
        #[prost(message, tag = "13")]
        Offer(super::OfferEntry),
        #[prost(message, tag = "14")]
        ClaimableBalance(super::ClaimableBalanceEntry),
        #[prost(message, tag = "15")]
        ContractData(super::ContractDataEntry),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountEntry {
    #[prost(string, tag = "1")]
    pub account_id: String,
    #[prost(int64, tag = "2")]
    pub balance: i64,
    #[prost(int64, tag = "3")]
    pub seq_num: i64,
    #[prost(uint32, tag = "4")]
    pub num_sub_entries: u32,
    #[prost(string, tag = "5")]
    pub home_domain: String,
    #[prost(uint32, tag = "6")]
    pub flags: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrustLineEntry {
    #[prost(string, tag = "1")]
    pub account_id: String,
    #[prost(message, optional, tag = "2")]
    pub asset: Option<Asset>,
    #[prost(int64, tag = "3")]
    pub balance: i64,
    #[prost(int64, tag = "4")]
    pub limit: i64,
    #[prost(uint32, tag = "5")]
    pub flags: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataEntry {
    #[prost(string, tag = "1")]
    pub account_id: String,
    #[prost(string, tag = "2")]
    pub data_name: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data_value: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OfferEntry {
    #[prost(string, tag = "1")]
    pub seller_id: String,
    #[prost(int64, tag = "2")]
    pub offer_id: i64,
    #[prost(message, optional, tag = "3")]
    pub selling: Option<Asset>,
    #[prost(message, optional, tag = "4")]
    pub buying: Option<Asset>,
    #[prost(int64, tag = "5")]
    pub amount: i64,
    #[prost(int32, tag = "6")]
    pub price_n: i32,
    #[prost(int32, tag = "7")]
    pub price_d: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClaimableBalanceEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub balance_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub asset: Option<Asset>,
    #[prost(int64, tag = "3")]
    pub amount: i64,
    #[prost(string, repeated, tag = "4")]
    pub claimants: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContractDataDurability {
    Temporary = 0,
    Persistent = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContractDataEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub contract_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub key: Option<ScVal>,
    #[prost(enumeration = "ContractDataDurability", tag = "3")]
    pub durability: i32,
    #[prost(message, optional, tag = "4")]
    pub val: Option<ScVal>,
}

/// Identity of a ledger entry, independent of its value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LedgerKey {
    #[prost(oneof = "ledger_key::Key", tags = "1, 2, 3, 4, 5, 6")]
    pub key: Option<ledger_key::Key>,
}

pub mod ledger_key {
    use super::super::{Asset, ScVal};

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Key {
        #[prost(message, tag = "1")]
        Account(AccountKey),
        #[prost(message, tag = "2")]
        Trustline(TrustLineKey),
        #[prost(message, tag = "3")]
        Data(DataKey),
        #[prost(message, tag = "4")]
        Offer(OfferKey),
        #[prost(message, tag = "5")]
        ClaimableBalance(ClaimableBalanceKey),
        #[prost(message, tag = "6")]
        ContractData(ContractDataKey),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AccountKey {
        #[prost(string, tag = "1")]
        pub account_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TrustLineKey {
        #[prost(string, tag = "1")]
        pub account_id: String,
        #[prost(message, optional, tag = "2")]
        pub asset: Option<Asset>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DataKey {
        #[prost(string, tag = "1")]
        pub account_id: String,
        #[prost(string, tag = "2")]
        pub data_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OfferKey {
        #[prost(string, tag = "1")]
        pub seller_id: String,
        #[prost(int64, tag = "2")]
        pub offer_id: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClaimableBalanceKey {
        #[prost(bytes = "vec", tag = "1")]
        pub balance_id: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ContractDataKey {
        #[prost(bytes = "vec", tag = "1")]
        pub contract_id: Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub key: Option<ScVal>,
        #[prost(enumeration = "super::ContractDataDurability", tag = "3")]
        pub durability: i32,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LedgerEntryChangeType {
    Created = 0,
    Updated = 1,
    Removed = 2,
    /// Value of an entry immediately before the following update or removal.
    State = 3,
    Restored = 4,
}

/// One element of a raw entry change list.
///
/// `entry` is set for every kind but `Removed`, which carries `removed_key`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LedgerEntryChange {
    #[prost(enumeration = "LedgerEntryChangeType", tag = "1")]
    pub change_type: i32,
    #[prost(message, optional, tag = "2")]
    pub entry: Option<LedgerEntry>,
    #[prost(message, optional, tag = "3")]
    pub removed_key: Option<LedgerKey>,
}
