//! Identity keys of ledger entries.

use std::fmt;

use prost::Message;

use super::{LedgerError, Result};
use crate::proto::ledger_entry::Data;
use crate::proto::ledger_key::{
    AccountKey, ClaimableBalanceKey, ContractDataKey, DataKey, Key, OfferKey, TrustLineKey,
};
use crate::proto::{LedgerEntry, LedgerEntryType, LedgerKey};

impl LedgerEntry {
    /// Whether the entry's data is of a kind this build can decode. Data of
    /// newer kinds is dropped while decoding and leaves `data` empty.
    pub fn is_recognized(&self) -> bool {
        self.data.is_some()
    }

    /// Derive the key identifying this entry regardless of its value.
    pub fn ledger_key(&self) -> Result<LedgerKey> {
        let key = match &self.data {
            Some(Data::Account(a)) => Key::Account(AccountKey {
                account_id: a.account_id.clone(),
            }),
            Some(Data::Trustline(t)) => Key::Trustline(TrustLineKey {
                account_id: t.account_id.clone(),
                asset: t.asset.clone(),
            }),
            Some(Data::Data(d)) => Key::Data(DataKey {
                account_id: d.account_id.clone(),
                data_name: d.data_name.clone(),
            }),
            Some(Data::Offer(o)) => Key::Offer(OfferKey {
                seller_id: o.seller_id.clone(),
                offer_id: o.offer_id,
            }),
            Some(Data::ClaimableBalance(c)) => Key::ClaimableBalance(ClaimableBalanceKey {
                balance_id: c.balance_id.clone(),
            }),
            Some(Data::ContractData(c)) => Key::ContractData(ContractDataKey {
                contract_id: c.contract_id.clone(),
                key: c.key.clone(),
                durability: c.durability,
            }),
            None => {
                let kind = LedgerEntryType::try_from(self.entry_type)
                    .map(|t| format!("{:?}", t))
                    .unwrap_or_else(|_| format!("unknown({})", self.entry_type));
                return Err(LedgerError::MalformedEntry(format!(
                    "entry of type {} has no recognized data",
                    kind
                )));
            }
        };
        Ok(LedgerKey { key: Some(key) })
    }
}

impl LedgerKey {
    /// Canonical serialized identity, usable as a set member.
    pub fn to_bytes(&self) -> KeyBytes {
        KeyBytes(self.encode_to_vec())
    }

    /// Short label of the keyed entry type, for logs.
    pub fn type_name(&self) -> &'static str {
        match &self.key {
            Some(Key::Account(_)) => "account",
            Some(Key::Trustline(_)) => "trustline",
            Some(Key::Data(_)) => "data",
            Some(Key::Offer(_)) => "offer",
            Some(Key::ClaimableBalance(_)) => "claimable_balance",
            Some(Key::ContractData(_)) => "contract_data",
            None => "unknown",
        }
    }
}

/// Serialized [`LedgerKey`]. Two entries share a key exactly when their
/// `KeyBytes` are equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyBytes(Vec<u8>);

impl KeyBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyBytes({})", hex::encode(&self.0))
    }
}

impl fmt::Display for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}
