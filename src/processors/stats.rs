use std::collections::BTreeMap;

use serde::Serialize;

use super::operations::operation_type_name;
use super::{LedgerTransactionProcessor, Result};
use crate::history::LedgerBatch;
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};

/// Transaction and operation counts of one or more ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsLedgerTransactionProcessorResults {
    pub transactions: u64,
    pub transactions_successful: u64,
    pub transactions_failed: u64,
    pub operations: u64,
    pub operations_in_successful: u64,
    pub operations_in_failed: u64,
    /// Operations per kind, keyed by operation type name.
    pub operations_by_type: BTreeMap<String, u64>,
}

impl StatsLedgerTransactionProcessorResults {
    /// Fold `other` into `self`. Order of merging never changes the result.
    pub fn merge(&mut self, other: &Self) {
        self.transactions += other.transactions;
        self.transactions_successful += other.transactions_successful;
        self.transactions_failed += other.transactions_failed;
        self.operations += other.operations;
        self.operations_in_successful += other.operations_in_successful;
        self.operations_in_failed += other.operations_in_failed;
        for (kind, count) in &other.operations_by_type {
            *self.operations_by_type.entry(kind.clone()).or_default() += count;
        }
    }

    /// Flat `stats_*` map, as logged after each ledger.
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        let mut map = BTreeMap::from([
            ("stats_transactions".to_string(), self.transactions),
            ("stats_transactions_successful".to_string(), self.transactions_successful),
            ("stats_transactions_failed".to_string(), self.transactions_failed),
            ("stats_operations".to_string(), self.operations),
            ("stats_operations_in_successful".to_string(), self.operations_in_successful),
            ("stats_operations_in_failed".to_string(), self.operations_in_failed),
        ]);
        for (kind, count) in &self.operations_by_type {
            map.insert(format!("stats_operations_{}", kind), *count);
        }
        map
    }
}

/// Counts transactions and operations by kind. Writes nothing.
#[derive(Debug, Default)]
pub struct StatsLedgerTransactionProcessor {
    results: StatsLedgerTransactionProcessorResults,
}

impl StatsLedgerTransactionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &StatsLedgerTransactionProcessorResults {
        &self.results
    }

    pub fn into_results(self) -> StatsLedgerTransactionProcessorResults {
        self.results
    }
}

impl LedgerTransactionProcessor for StatsLedgerTransactionProcessor {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn process_transaction(
        &mut self,
        _ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        _batch: &mut LedgerBatch,
    ) -> Result<()> {
        let ops = tx.operations().len() as u64;
        let r = &mut self.results;
        r.transactions += 1;
        r.operations += ops;
        if tx.successful() {
            r.transactions_successful += 1;
            r.operations_in_successful += ops;
        } else {
            r.transactions_failed += 1;
            r.operations_in_failed += ops;
        }
        for op in tx.operations() {
            *r.operations_by_type
                .entry(operation_type_name(op.op_type))
                .or_default() += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};
    use proptest::prelude::*;

    #[test]
    fn test_counts_by_kind() {
        let record = LedgerBuilder::new(5)
            .payment("GA", "GB", 1)
            .failed_payment("GB", "GA", 1)
            .create_account("GA", "GC", 10)
            .hello_world("GA")
            .build();
        let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap();
        let mut processor = StatsLedgerTransactionProcessor::new();
        let mut batch = LedgerBatch::new(10);
        for tx in &txs {
            processor.process_transaction(&record, tx, &mut batch).unwrap();
        }

        let map = processor.results().to_map();
        assert_eq!(map["stats_transactions"], 4);
        assert_eq!(map["stats_transactions_failed"], 1);
        assert_eq!(map["stats_operations_payment"], 2);
        assert_eq!(map["stats_operations_create_account"], 1);
        assert_eq!(map["stats_operations_hello_world"], 1);
        assert_eq!(map["stats_operations_in_failed"], 1);
        assert_eq!(batch.row_count(), 0);
    }

    fn results() -> impl Strategy<Value = StatsLedgerTransactionProcessorResults> {
        (
            0u64..100,
            0u64..100,
            prop::collection::btree_map("[a-c]", 0u64..50, 0..3),
        )
            .prop_map(|(ok, failed, by_type)| StatsLedgerTransactionProcessorResults {
                transactions: ok + failed,
                transactions_successful: ok,
                transactions_failed: failed,
                operations: by_type.values().sum(),
                operations_in_successful: by_type.values().sum(),
                operations_in_failed: 0,
                operations_by_type: by_type,
            })
    }

    proptest! {
        #[test]
        fn merge_is_commutative_and_associative(a in results(), b in results(), c in results()) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(&ab, &ba);

            let mut ab_c = ab.clone();
            ab_c.merge(&c);
            let mut bc = b.clone();
            bc.merge(&c);
            let mut a_bc = a.clone();
            a_bc.merge(&bc);
            prop_assert_eq!(ab_c, a_bc);
        }
    }
}
