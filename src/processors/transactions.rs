use std::sync::Arc;

use base64::Engine;
use prost::Message;
use tracing::debug;

use super::{LedgerTransactionProcessor, MetaRegistry, Result, Toid};
use crate::history::rows::HistoryTransactionRow;
use crate::history::LedgerBatch;
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};

/// Writes one `history_transactions` row per transaction.
pub struct TransactionProcessor {
    meta: Arc<MetaRegistry>,
    skip_txmeta: bool,
}

impl TransactionProcessor {
    /// With `skip_txmeta`, stored meta is elided for every known meta version.
    pub fn new(meta: Arc<MetaRegistry>, skip_txmeta: bool) -> Self {
        Self { meta, skip_txmeta }
    }

    fn encode_meta(&self, tx: &LedgerTransaction) -> String {
        let engine = base64::engine::general_purpose::STANDARD;
        if !self.skip_txmeta {
            return engine.encode(tx.meta.encode_to_vec());
        }
        let mut meta = tx.meta.clone();
        if !self.meta.elide(&mut meta) {
            debug!(tx = %tx.hash_hex(), version = meta.v, "Unknown meta version, stored unelided");
        }
        engine.encode(meta.encode_to_vec())
    }
}

impl LedgerTransactionProcessor for TransactionProcessor {
    fn name(&self) -> &'static str {
        "transactions"
    }

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        batch: &mut LedgerBatch,
    ) -> Result<()> {
        batch.transactions.add(HistoryTransactionRow {
            id: Toid::transaction(ledger.sequence(), tx.index)?.to_i64(),
            ledger_sequence: ledger.sequence(),
            application_order: tx.index,
            transaction_hash: tx.hash_hex(),
            account: tx.envelope.source_account.clone(),
            account_sequence: tx.envelope.seq_num,
            max_fee: tx.envelope.fee,
            fee_charged: tx.result.fee_charged,
            operation_count: tx.operations().len() as u32,
            successful: tx.successful(),
            result_code: tx.result.code,
            memo: tx.envelope.memo.clone(),
            tx_meta: self.encode_meta(tx),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::proto::TransactionMeta;
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};

    fn process(skip_txmeta: bool) -> (Vec<LedgerTransaction>, LedgerBatch) {
        let record = LedgerBuilder::new(12)
            .payment("GALICE", "GBOB", 100)
            .failed_payment("GBOB", "GALICE", 5)
            .build();
        let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap();
        let mut processor =
            TransactionProcessor::new(Arc::new(MetaRegistry::standard()), skip_txmeta);
        let mut batch = LedgerBatch::new(100);
        for tx in &txs {
            processor.process_transaction(&record, tx, &mut batch).unwrap();
        }
        (txs, batch)
    }

    fn decode_meta(row: &HistoryTransactionRow) -> TransactionMeta {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&row.tx_meta)
            .unwrap();
        TransactionMeta::decode(bytes.as_slice()).unwrap()
    }

    #[test]
    fn test_rows_follow_application_order() {
        let (txs, batch) = process(false);
        let rows = batch.transactions.rows();

        assert_eq!(rows.len(), 2);
        for (tx, row) in txs.iter().zip(rows) {
            assert_eq!(row.application_order, tx.index);
            assert_eq!(row.transaction_hash, tx.hash_hex());
            assert_eq!(row.successful, tx.successful());
            assert_eq!(Toid::parse(row.id), Toid::new(12, tx.index, 0).unwrap());
            assert_eq!(decode_meta(row), tx.meta);
        }
        assert_eq!(rows.iter().filter(|r| r.successful).count(), 1);
    }

    #[test]
    fn test_skip_txmeta_elides() {
        let (txs, batch) = process(true);
        for (tx, row) in txs.iter().zip(batch.transactions.rows()) {
            let meta = decode_meta(row);
            assert_eq!(meta.v, tx.meta.v);
            assert!(meta.operations.is_empty());
            assert!(meta.tx_changes_before.is_empty());
        }
    }
}
