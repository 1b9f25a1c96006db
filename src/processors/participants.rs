use std::collections::BTreeSet;
use std::sync::Arc;

use super::{LedgerTransactionProcessor, OperationContext, OperationRegistry, Result, Toid};
use crate::history::rows::{OperationParticipantRow, TransactionParticipantRow};
use crate::history::LedgerBatch;
use crate::ledger::{Change, LedgerCloseRecord, LedgerTransaction};
use crate::proto::ledger_entry::Data;

/// Links accounts to the transactions and operations they took part in.
///
/// A transaction's participants are its source, the participants of each of
/// its operations, and every account whose entries it changed.
pub struct ParticipantsProcessor {
    registry: Arc<OperationRegistry>,
}

impl ParticipantsProcessor {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    fn operation_participants(&self, ctx: &OperationContext<'_>) -> Result<BTreeSet<String>> {
        let mut accounts = BTreeSet::new();
        accounts.insert(ctx.source().to_string());
        if let Some(others) = self.registry.participants(ctx)? {
            accounts.extend(others);
        }
        Ok(accounts)
    }
}

fn changed_account(change: &Change) -> Option<&str> {
    let entry = change.post.as_ref().or(change.pre.as_ref())?;
    match entry.data.as_ref()? {
        Data::Account(a) => Some(a.account_id.as_str()),
        Data::Trustline(t) => Some(t.account_id.as_str()),
        Data::Data(d) => Some(d.account_id.as_str()),
        Data::Offer(o) => Some(o.seller_id.as_str()),
        _ => None,
    }
}

impl LedgerTransactionProcessor for ParticipantsProcessor {
    fn name(&self) -> &'static str {
        "participants"
    }

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        batch: &mut LedgerBatch,
    ) -> Result<()> {
        let mut tx_participants = BTreeSet::new();
        tx_participants.insert(tx.envelope.source_account.clone());

        for index in 0..tx.operations().len() {
            let Some(ctx) = OperationContext::new(tx, index, ledger.protocol_version()) else {
                continue;
            };
            let op_id = Toid::operation(ledger.sequence(), tx.index, index)?.to_i64();
            let accounts = self.operation_participants(&ctx)?;
            for account in &accounts {
                batch.operation_participants.add(OperationParticipantRow {
                    history_operation_id: op_id,
                    account: account.clone(),
                })?;
            }
            tx_participants.extend(accounts);
        }

        for change in tx.changes()? {
            if let Some(account) = changed_account(&change) {
                tx_participants.insert(account.to_string());
            }
        }

        let tx_id = Toid::transaction(ledger.sequence(), tx.index)?.to_i64();
        for account in tx_participants.into_iter().filter(|a| !a.is_empty()) {
            batch.transaction_participants.add(TransactionParticipantRow {
                history_transaction_id: tx_id,
                account,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};

    fn run(builder: LedgerBuilder) -> LedgerBatch {
        let record = builder.build();
        let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap();
        let mut processor = ParticipantsProcessor::new(Arc::new(OperationRegistry::standard()));
        let mut batch = LedgerBatch::new(100);
        for tx in &txs {
            processor.process_transaction(&record, tx, &mut batch).unwrap();
        }
        batch
    }

    #[test]
    fn test_payment_participants() {
        let batch = run(LedgerBuilder::new(8).payment("GALICE", "GBOB", 10));

        let tx_accounts: Vec<_> = batch
            .transaction_participants
            .rows()
            .iter()
            .map(|r| r.account.as_str())
            .collect();
        assert_eq!(tx_accounts, vec!["GALICE", "GBOB"]);

        let op_accounts: Vec<_> = batch
            .operation_participants
            .rows()
            .iter()
            .map(|r| r.account.as_str())
            .collect();
        assert_eq!(op_accounts, vec!["GALICE", "GBOB"]);
    }

    #[test]
    fn test_hello_world_has_only_source() {
        let batch = run(LedgerBuilder::new(8)
            .protocol_version(crate::processors::EXPERIMENTAL_PROTOCOL_VERSION)
            .hello_world("GALICE"));

        let op_accounts: Vec<_> = batch
            .operation_participants
            .rows()
            .iter()
            .map(|r| r.account.as_str())
            .collect();
        assert_eq!(op_accounts, vec!["GALICE"]);
    }
}
