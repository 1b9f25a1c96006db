//! Runs every processor over one ledger.

use std::sync::Arc;

use tracing::debug;

use super::verify::{KeyDelta, StateVerifier};
use super::Result;
use crate::config::IngestConfig;
use crate::filters::FilterChain;
use crate::history::LedgerBatch;
use crate::ledger::{Change, ChangeReader, LedgerChangeReader, LedgerCloseRecord, LedgerTransactionReader};
use crate::processors::{
    AssetsProcessor, BalancesProcessor, ChangeProcessor, ContractEventProcessor,
    ContractEventRegistry, LedgerProcessor, LedgerTransactionProcessor, MetaRegistry,
    OperationProcessor, OperationRegistry, ParticipantsProcessor,
    StatsLedgerTransactionProcessor, StatsLedgerTransactionProcessorResults,
    TransactionProcessor,
};

/// Rows derived from one ledger, not yet written.
#[derive(Debug)]
pub struct LedgerOutcome {
    pub sequence: u32,
    pub batch: LedgerBatch,
    pub stats: StatsLedgerTransactionProcessorResults,
    /// Transactions the filters rejected.
    pub transactions_filtered: usize,
    /// Known-key changes, when verification is on.
    pub keys: Option<KeyDelta>,
}

/// Builds fresh processors for every ledger and feeds them.
#[derive(Clone)]
pub struct ProcessorRunner {
    network_passphrase: String,
    max_rows_per_statement: usize,
    skip_txmeta: bool,
    operations: Arc<OperationRegistry>,
    meta: Arc<MetaRegistry>,
    events: Arc<ContractEventRegistry>,
}

impl ProcessorRunner {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            network_passphrase: config.network_passphrase.clone(),
            max_rows_per_statement: config.max_rows_per_statement,
            skip_txmeta: config.skip_txmeta,
            operations: Arc::new(OperationRegistry::standard()),
            meta: Arc::new(MetaRegistry::standard()),
            events: Arc::new(ContractEventRegistry::standard(&config.network_passphrase)),
        }
    }

    pub fn with_operations(mut self, registry: OperationRegistry) -> Self {
        self.operations = Arc::new(registry);
        self
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    fn filtered_processors(&self) -> Vec<Box<dyn LedgerTransactionProcessor>> {
        vec![
            Box::new(TransactionProcessor::new(self.meta.clone(), self.skip_txmeta)),
            Box::new(OperationProcessor::new(self.operations.clone())),
            Box::new(ParticipantsProcessor::new(self.operations.clone())),
            Box::new(AssetsProcessor::new(self.operations.clone())),
            Box::new(ContractEventProcessor::new(self.events.clone(), self.meta.clone())),
        ]
    }

    /// Derive every row of `record`.
    ///
    /// The ledger row, stats and state changes cover the whole ledger;
    /// history rows only cover transactions every filter accepts.
    pub async fn run_all_processors_on_ledger(
        &self,
        record: &LedgerCloseRecord,
        filters: &FilterChain,
        verifier: Option<&StateVerifier>,
    ) -> Result<LedgerOutcome> {
        let sequence = record.sequence();
        let mut batch = LedgerBatch::new(self.max_rows_per_statement);
        let mut ledger = LedgerProcessor::new();
        let mut stats = StatsLedgerTransactionProcessor::new();
        let mut processors = self.filtered_processors();
        let mut transactions_filtered = 0;

        let transactions =
            LedgerTransactionReader::new(record.clone(), &self.network_passphrase)?.read_all()?;
        let ledger_accepted = filters.accept_ledger(record);

        for tx in &transactions {
            ledger.process_transaction(record, tx, &mut batch)?;
            stats.process_transaction(record, tx, &mut batch)?;

            if !ledger_accepted || !filters.accept_transaction(record, tx, &self.operations)? {
                transactions_filtered += 1;
                continue;
            }
            for processor in processors.iter_mut() {
                processor.process_transaction(record, tx, &mut batch)?;
            }
        }

        ledger.finish(record, &mut batch)?;
        for processor in processors.iter_mut() {
            processor.finish(record, &mut batch)?;
        }

        let mut reader = LedgerChangeReader::new(record.clone(), &self.network_passphrase)?;
        let changes = drain(&mut reader).await?;
        let keys = match verifier {
            Some(verifier) => Some(verifier.verify(sequence, &changes)?),
            None => None,
        };
        let mut balances = BalancesProcessor::new();
        for change in &changes {
            balances.process_change(change, &mut batch)?;
        }

        debug!(
            ledger = sequence,
            transactions = transactions.len(),
            filtered = transactions_filtered,
            changes = changes.len(),
            rows = batch.row_count(),
            "Processed ledger"
        );

        Ok(LedgerOutcome {
            sequence,
            batch,
            stats: stats.into_results(),
            transactions_filtered,
            keys,
        })
    }

    /// State rows for the entries of a checkpoint.
    pub async fn run_checkpoint_processors(
        &self,
        reader: &mut dyn ChangeReader,
        checkpoint: u32,
        verifier: Option<&StateVerifier>,
    ) -> Result<(LedgerBatch, Option<KeyDelta>)> {
        let mut batch = LedgerBatch::new(self.max_rows_per_statement);
        let changes = drain(reader).await?;
        let keys = match verifier {
            Some(verifier) => Some(verifier.verify(checkpoint, &changes)?),
            None => None,
        };
        let mut balances = BalancesProcessor::new();
        for change in &changes {
            balances.process_change(change, &mut batch)?;
        }
        debug!(checkpoint, entries = changes.len(), "Processed checkpoint state");
        Ok((batch, keys))
    }
}

async fn drain<R: ChangeReader + ?Sized>(reader: &mut R) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    while let Some(change) = reader.read().await? {
        changes.push(change);
    }
    reader.close().await?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filters;
    use crate::history::FilterRule;
    use crate::ledger::{Change, ChangeReason};
    use crate::proto::{Asset, LedgerEntry, LedgerEntryChange, LedgerEntryChangeType};
    use crate::test_utils::{account_entry, trustline_entry, LedgerBuilder, TEST_PASSPHRASE};

    fn runner() -> ProcessorRunner {
        ProcessorRunner::new(&IngestConfig {
            network_passphrase: TEST_PASSPHRASE.to_string(),
            ..IngestConfig::default()
        })
    }

    #[tokio::test]
    async fn test_rows_for_every_entity() {
        let record = LedgerBuilder::new(7)
            .payment("GA", "GB", 10)
            .create_account("GA", "GC", 1_000)
            .build();
        let outcome = runner()
            .run_all_processors_on_ledger(&record, &FilterChain::accept_all(), None)
            .await
            .unwrap();

        assert_eq!(outcome.sequence, 7);
        assert_eq!(outcome.batch.ledgers.len(), 1);
        assert_eq!(outcome.batch.transactions.len(), 2);
        assert_eq!(outcome.batch.operations.len(), 2);
        assert!(outcome.batch.accounts.len() >= 3);
        assert_eq!(outcome.stats.transactions, 2);
        assert_eq!(outcome.transactions_filtered, 0);
        assert!(outcome.keys.is_none());
    }

    #[tokio::test]
    async fn test_filtered_transactions_keep_ledger_and_state_rows() {
        let record = LedgerBuilder::new(7)
            .payment("GA", "GB", 10)
            .payment("GX", "GY", 10)
            .build();
        let filters = Filters::from_rules(&[FilterRule {
            name: "account".to_string(),
            enabled: true,
            rules: serde_json::json!({ "account_whitelist": ["GA"] }),
        }]);
        let outcome = runner()
            .run_all_processors_on_ledger(&record, &filters, None)
            .await
            .unwrap();

        assert_eq!(outcome.transactions_filtered, 1);
        assert_eq!(outcome.batch.transactions.len(), 1);
        assert_eq!(outcome.batch.ledgers.len(), 1);
        assert_eq!(outcome.stats.transactions, 2);
        assert!(outcome.batch.accounts.pending("GX").is_some());
    }

    #[tokio::test]
    async fn test_reprocessing_is_deterministic() {
        let record = LedgerBuilder::new(9)
            .payment("GA", "GB", 10)
            .hello_world("GA")
            .build();
        let runner = runner();
        let filters = FilterChain::accept_all();
        let a = runner.run_all_processors_on_ledger(&record, &filters, None).await.unwrap();
        let b = runner.run_all_processors_on_ledger(&record, &filters, None).await.unwrap();
        let backend = crate::history::Backend::Sqlite;
        assert_eq!(
            a.batch.statements(backend).unwrap(),
            b.batch.statements(backend).unwrap()
        );
        assert_eq!(a.stats, b.stats);
    }

    #[tokio::test]
    async fn test_verification_rejects_unknown_entries() {
        let record = LedgerBuilder::new(3).payment("GA", "GB", 10).build();
        let verifier = StateVerifier::new();
        let err = runner()
            .run_all_processors_on_ledger(&record, &FilterChain::accept_all(), Some(&verifier))
            .await
            .unwrap_err();
        assert!(matches!(err, super::super::IngestError::Verify { ledger: 3, .. }));
    }

    #[tokio::test]
    async fn test_checkpoint_state_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let mut buf = Vec::new();
        crate::codec::write_framed(&mut buf, &account_entry("GA", 10, 63)).unwrap();
        crate::codec::write_framed(&mut buf, &account_entry("GB", 20, 63)).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut reader = crate::ledger::CheckpointChangeReader::open(&path, 63)
            .await
            .unwrap();
        let verifier = StateVerifier::new();
        let (batch, keys) = runner()
            .run_checkpoint_processors(&mut reader, 63, Some(&verifier))
            .await
            .unwrap();
        assert_eq!(batch.accounts.len(), 2);
        assert_eq!(keys.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_kinds_in_ledger_do_not_halt() {
        let newer = LedgerEntry {
            last_modified_ledger_seq: 4,
            entry_type: 42,
            data: None,
        };
        let mut asset = Asset::credit("USD", "GISSUER");
        asset.asset_type = 42;
        let record = LedgerBuilder::new(4)
            .payment("GA", "GB", 10)
            .upgrade(vec![
                LedgerEntryChange {
                    change_type: 42,
                    entry: Some(account_entry("GZ", 1, 4)),
                    removed_key: None,
                },
                LedgerEntryChange {
                    change_type: LedgerEntryChangeType::Created as i32,
                    entry: Some(newer),
                    removed_key: None,
                },
                LedgerEntryChange {
                    change_type: LedgerEntryChangeType::Created as i32,
                    entry: Some(trustline_entry("GA", &asset, 5, 10, 4)),
                    removed_key: None,
                },
            ])
            .build();

        let mut verifier = StateVerifier::new();
        let seed: Vec<Change> = ["GA", "GB"]
            .iter()
            .map(|id| Change {
                pre: None,
                post: Some(account_entry(id, 1, 1)),
                reason: ChangeReason::Checkpoint,
            })
            .collect();
        verifier.apply(verifier.verify(1, &seed).unwrap());

        let outcome = runner()
            .run_all_processors_on_ledger(&record, &FilterChain::accept_all(), Some(&verifier))
            .await
            .unwrap();

        assert_eq!(outcome.batch.transactions.len(), 1);
        assert!(outcome.batch.accounts.pending("GZ").is_none());
        assert_eq!(outcome.batch.trust_lines.len(), 0);
        assert!(outcome.batch.asset_stats.is_empty());
    }
}
