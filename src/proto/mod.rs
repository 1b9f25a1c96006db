//! Wire types of the ledger stream.
//!
//! Messages are protobuf-encoded. Decoding skips fields added by newer
//! producers, and enumeration fields keep their raw `i32` so discriminants
//! unknown to this build survive decoding and can be dispatched on (or
//! declined) by the processors instead of failing the whole ledger.

mod contract;
mod entry;
mod ledger;
mod transaction;

pub use contract::*;
pub use entry::*;
pub use ledger::*;
pub use transaction::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AssetType {
    Native = 0,
    CreditAlphanum4 = 1,
    CreditAlphanum12 = 2,
    PoolShare = 3,
}

impl AssetType {
    pub fn name(self) -> &'static str {
        match self {
            AssetType::Native => "native",
            AssetType::CreditAlphanum4 => "credit_alphanum4",
            AssetType::CreditAlphanum12 => "credit_alphanum12",
            AssetType::PoolShare => "liquidity_pool_shares",
        }
    }

    /// Inverse of [`AssetType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        [
            AssetType::Native,
            AssetType::CreditAlphanum4,
            AssetType::CreditAlphanum12,
            AssetType::PoolShare,
        ]
        .into_iter()
        .find(|t| t.name() == name)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Asset {
    #[prost(enumeration = "AssetType", tag = "1")]
    pub asset_type: i32,
    #[prost(string, tag = "2")]
    pub code: String,
    #[prost(string, tag = "3")]
    pub issuer: String,
}

impl Asset {
    pub fn native() -> Self {
        Self {
            asset_type: AssetType::Native as i32,
            code: String::new(),
            issuer: String::new(),
        }
    }

    /// Credit asset; the alphanum variant follows from the code length.
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        let code = code.into();
        let asset_type = if code.len() <= 4 {
            AssetType::CreditAlphanum4
        } else {
            AssetType::CreditAlphanum12
        };
        Self {
            asset_type: asset_type as i32,
            code,
            issuer: issuer.into(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.asset_type == AssetType::Native as i32
    }

    /// `native` or `CODE:ISSUER`.
    pub fn canonical(&self) -> String {
        if self.is_native() {
            "native".to_string()
        } else {
            format!("{}:{}", self.code, self.issuer)
        }
    }

    /// Parse the canonical form produced by [`Asset::canonical`].
    pub fn from_canonical(s: &str) -> Option<Self> {
        if s == "native" {
            return Some(Self::native());
        }
        let (code, issuer) = s.split_once(':')?;
        if code.is_empty() || code.len() > 12 || issuer.is_empty() {
            return None;
        }
        Some(Self::credit(code, issuer))
    }
}
