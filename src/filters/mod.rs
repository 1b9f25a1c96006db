//! Transaction filters.
//!
//! Filters are configured from the `ingest_filter_rules` table. A transaction
//! is ingested only when every filter accepts it; a disabled filter accepts
//! everything. Ledger rows, state changes and the checkpoint are written for
//! every ledger whatever the filters decide.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::history::{FilterRule, IngestionQ};
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};
use crate::processors::{OperationContext, OperationRegistry, Result};

mod account;
mod asset;

pub use account::{AccountFilter, AccountFilterRules, ACCOUNT_FILTER_NAME};
pub use asset::{AssetFilter, AssetFilterRules, ASSET_FILTER_NAME};

/// Predicate deciding which transactions are persisted.
pub trait LedgerTransactionFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn filter_ledger(&self, _ledger: &LedgerCloseRecord) -> bool {
        true
    }

    fn filter_transaction(
        &self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        registry: &OperationRegistry,
    ) -> Result<bool>;
}

/// Stored rules for filter `name`, or `None` (accept everything) when the
/// filter is missing, disabled or its rules do not parse.
fn enabled_rules<T: DeserializeOwned>(rules: &[FilterRule], name: &str) -> Option<T> {
    let rule = rules.iter().find(|r| r.name == name && r.enabled)?;
    match serde_json::from_value(rule.rules.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(filter = name, error = %e, "Invalid filter rules, filter disabled");
            None
        }
    }
}

/// Every operation of `tx`, as dispatch contexts.
fn operations<'a>(
    ledger: &LedgerCloseRecord,
    tx: &'a LedgerTransaction,
) -> impl Iterator<Item = OperationContext<'a>> {
    let protocol = ledger.protocol_version();
    (0..tx.operations().len()).filter_map(move |i| OperationContext::new(tx, i, protocol))
}

/// Builds the filter set from stored rules.
#[derive(Debug, Default, Clone)]
pub struct Filters;

impl Filters {
    pub fn new() -> Self {
        Self
    }

    /// Filters in evaluation order, configured from the stored rules.
    pub async fn get_filters(&self, q: &dyn IngestionQ) -> crate::history::Result<FilterChain> {
        let rules = q.get_filter_rules().await?;
        Ok(Self::from_rules(&rules))
    }

    pub fn from_rules(rules: &[FilterRule]) -> FilterChain {
        FilterChain::new(vec![
            Box::new(AssetFilter::new(enabled_rules(rules, ASSET_FILTER_NAME))),
            Box::new(AccountFilter::new(enabled_rules(rules, ACCOUNT_FILTER_NAME))),
        ])
    }
}

/// Filters combined with AND.
pub struct FilterChain {
    filters: Vec<Box<dyn LedgerTransactionFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn LedgerTransactionFilter>>) -> Self {
        Self { filters }
    }

    /// Chain accepting everything.
    pub fn accept_all() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn accept_ledger(&self, ledger: &LedgerCloseRecord) -> bool {
        self.filters.iter().all(|f| f.filter_ledger(ledger))
    }

    pub fn accept_transaction(
        &self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        registry: &OperationRegistry,
    ) -> Result<bool> {
        for filter in &self.filters {
            if !filter.filter_transaction(ledger, tx, registry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::test_utils::{LedgerBuilder, MockHistoryQ, TEST_PASSPHRASE};
    use serde_json::json;

    fn rule(name: &str, enabled: bool, rules: serde_json::Value) -> FilterRule {
        FilterRule {
            name: name.to_string(),
            enabled,
            rules,
        }
    }

    fn accepted(chain: &FilterChain, builder: LedgerBuilder) -> Vec<bool> {
        let record = builder.build();
        let registry = OperationRegistry::standard();
        LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap()
            .iter()
            .map(|tx| chain.accept_transaction(&record, tx, &registry).unwrap())
            .collect()
    }

    fn ledger() -> LedgerBuilder {
        LedgerBuilder::new(20)
            .credit_payment("GALICE", "GBOB", "USD", "GISSUER", 5)
            .credit_payment("GCAROL", "GDAVE", "EUR", "GISSUER", 5)
            .payment("GALICE", "GDAVE", 5)
    }

    #[tokio::test]
    async fn test_always_two_filters() {
        let q = MockHistoryQ::new();
        let chain = Filters::new().get_filters(&q).await.unwrap();
        assert_eq!(chain.names(), vec![ASSET_FILTER_NAME, ACCOUNT_FILTER_NAME]);
        assert_eq!(accepted(&chain, ledger()), vec![true, true, true]);
    }

    #[test]
    fn test_filters_compose_with_and() {
        let asset_only = Filters::from_rules(&[rule(
            ASSET_FILTER_NAME,
            true,
            json!({ "canonical_asset_whitelist": ["USD:GISSUER"] }),
        )]);
        assert_eq!(accepted(&asset_only, ledger()), vec![true, false, false]);

        let account_only = Filters::from_rules(&[rule(
            ACCOUNT_FILTER_NAME,
            true,
            json!({ "account_whitelist": ["GDAVE"] }),
        )]);
        assert_eq!(accepted(&account_only, ledger()), vec![false, true, true]);

        let both = Filters::from_rules(&[
            rule(ASSET_FILTER_NAME, true, json!({ "canonical_asset_whitelist": ["USD:GISSUER", "native"] })),
            rule(ACCOUNT_FILTER_NAME, true, json!({ "account_whitelist": ["GDAVE"] })),
        ]);
        assert_eq!(accepted(&both, ledger()), vec![false, false, true]);
    }

    #[test]
    fn test_disabled_or_invalid_rules_accept_everything() {
        let chain = Filters::from_rules(&[
            rule(ASSET_FILTER_NAME, false, json!({ "canonical_asset_whitelist": ["X:Y"] })),
            rule(ACCOUNT_FILTER_NAME, true, json!({ "account_whitelist": 5 })),
        ]);
        assert_eq!(chain.len(), 2);
        assert_eq!(accepted(&chain, ledger()), vec![true, true, true]);
    }
}
