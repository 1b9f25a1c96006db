use std::collections::BTreeSet;

use serde::Deserialize;

use super::{operations, LedgerTransactionFilter};
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};
use crate::processors::{OperationRegistry, Result};

pub const ASSET_FILTER_NAME: &str = "asset";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFilterRules {
    /// Canonical asset strings (`native` or `CODE:ISSUER`).
    pub canonical_asset_whitelist: Vec<String>,
}

/// Accepts transactions with an operation touching a whitelisted asset.
#[derive(Debug, Default)]
pub struct AssetFilter {
    whitelist: Option<BTreeSet<String>>,
}

impl AssetFilter {
    /// `None` accepts every transaction.
    pub fn new(rules: Option<AssetFilterRules>) -> Self {
        Self {
            whitelist: rules.map(|r| r.canonical_asset_whitelist.into_iter().collect()),
        }
    }
}

impl LedgerTransactionFilter for AssetFilter {
    fn name(&self) -> &'static str {
        ASSET_FILTER_NAME
    }

    fn filter_transaction(
        &self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        registry: &OperationRegistry,
    ) -> Result<bool> {
        let Some(whitelist) = &self.whitelist else {
            return Ok(true);
        };
        for ctx in operations(ledger, tx) {
            let assets = registry.assets(&ctx)?.unwrap_or_default();
            if assets.iter().any(|a| whitelist.contains(&a.canonical())) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
