use std::collections::BTreeSet;

use serde::Deserialize;

use super::{operations, LedgerTransactionFilter};
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};
use crate::processors::{OperationRegistry, Result};

pub const ACCOUNT_FILTER_NAME: &str = "account";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilterRules {
    pub account_whitelist: Vec<String>,
}

/// Accepts transactions whose source, operation sources or operation
/// participants include a whitelisted account.
#[derive(Debug, Default)]
pub struct AccountFilter {
    whitelist: Option<BTreeSet<String>>,
}

impl AccountFilter {
    pub fn new(rules: Option<AccountFilterRules>) -> Self {
        Self {
            whitelist: rules.map(|r| r.account_whitelist.into_iter().collect()),
        }
    }
}

impl LedgerTransactionFilter for AccountFilter {
    fn name(&self) -> &'static str {
        ACCOUNT_FILTER_NAME
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
        if whitelist.contains(&tx.envelope.source_account) {
            return Ok(true);
        }
        for ctx in operations(ledger, tx) {
            if whitelist.contains(ctx.source()) {
                return Ok(true);
            }
            let participants = registry.participants(&ctx)?.unwrap_or_default();
            if participants.iter().any(|a| whitelist.contains(a)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
