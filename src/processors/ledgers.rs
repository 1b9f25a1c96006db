use super::{LedgerTransactionProcessor, Result};
use crate::history::rows::HistoryLedgerRow;
use crate::history::LedgerBatch;
use crate::ingest::CURRENT_INGEST_VERSION;
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};

/// Writes the `history_ledgers` row once every transaction has been seen.
///
/// Counts cover the whole transaction set, filtered or not.
#[derive(Debug, Default)]
pub struct LedgerProcessor {
    successful_transaction_count: u32,
    failed_transaction_count: u32,
    operation_count: u32,
    tx_set_operation_count: u32,
}

impl LedgerProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerTransactionProcessor for LedgerProcessor {
    fn name(&self) -> &'static str {
        "ledgers"
    }

    fn process_transaction(
        &mut self,
        _ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        _batch: &mut LedgerBatch,
    ) -> Result<()> {
        let ops = tx.operations().len() as u32;
        self.tx_set_operation_count += ops;
        if tx.successful() {
            self.successful_transaction_count += 1;
            self.operation_count += ops;
        } else {
            self.failed_transaction_count += 1;
        }
        Ok(())
    }

    fn finish(&mut self, ledger: &LedgerCloseRecord, batch: &mut LedgerBatch) -> Result<()> {
        let header = ledger.header();
        batch.ledgers.add(HistoryLedgerRow {
            sequence: ledger.sequence(),
            ledger_hash: hex::encode(&header.ledger_hash),
            previous_ledger_hash: hex::encode(&header.previous_ledger_hash),
            closed_at: ledger.close_time().to_rfc3339(),
            protocol_version: header.protocol_version,
            successful_transaction_count: self.successful_transaction_count,
            failed_transaction_count: self.failed_transaction_count,
            operation_count: self.operation_count,
            tx_set_operation_count: self.tx_set_operation_count,
            total_coins: header.total_coins,
            fee_pool: header.fee_pool,
            base_fee: header.base_fee,
            base_reserve: header.base_reserve,
            max_tx_set_size: header.max_tx_set_size,
            importer_version: CURRENT_INGEST_VERSION,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};

    #[test]
    fn test_counts() {
        let record = LedgerBuilder::new(40)
            .payment("GALICE", "GBOB", 1)
            .payment("GBOB", "GALICE", 1)
            .failed_payment("GCAROL", "GALICE", 1)
            .build();
        let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap();

        let mut processor = LedgerProcessor::new();
        let mut batch = LedgerBatch::new(10);
        for tx in &txs {
            processor.process_transaction(&record, tx, &mut batch).unwrap();
        }
        assert!(batch.ledgers.is_empty());
        processor.finish(&record, &mut batch).unwrap();

        let row = &batch.ledgers.rows()[0];
        assert_eq!(row.sequence, 40);
        assert_eq!(row.successful_transaction_count, 2);
        assert_eq!(row.failed_transaction_count, 1);
        assert_eq!(row.operation_count, 2);
        assert_eq!(row.tx_set_operation_count, 3);
        assert_eq!(row.ledger_hash, hex::encode(&record.header().ledger_hash));
        assert_eq!(row.importer_version, CURRENT_INGEST_VERSION);
    }

    #[test]
    fn test_empty_ledger_still_has_row() {
        let record = LedgerBuilder::new(2).build();
        let mut batch = LedgerBatch::new(10);
        LedgerProcessor::new().finish(&record, &mut batch).unwrap();
        assert_eq!(batch.ledgers.len(), 1);
    }
}
