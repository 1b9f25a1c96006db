//! Transactions of a ledger in application order.

use std::collections::HashMap;

use super::{
    changes_from_entry_changes, network_id, transaction_hash, Change, ChangeReason,
    LedgerCloseRecord, LedgerError, Result,
};
use crate::proto::{
    LedgerEntryChange, Operation, TransactionEnvelope, TransactionMeta, TransactionResult,
    TransactionResultCode,
};

/// One applied transaction with everything needed to derive history rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub ledger_sequence: u32,
    /// 1-based position in application order.
    pub index: u32,
    pub hash: [u8; 32],
    pub envelope: TransactionEnvelope,
    pub result: TransactionResult,
    pub fee_changes: Vec<LedgerEntryChange>,
    pub meta: TransactionMeta,
}

impl LedgerTransaction {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn successful(&self) -> bool {
        matches!(
            TransactionResultCode::try_from(self.result.code),
            Ok(TransactionResultCode::TxSuccess) | Ok(TransactionResultCode::TxFeeBumpInnerSuccess)
        )
    }

    pub fn operations(&self) -> &[Operation] {
        &self.envelope.operations
    }

    /// Source of the operation at `op_index` (0-based), falling back to the
    /// transaction source.
    pub fn operation_source(&self, op_index: usize) -> &str {
        self.envelope
            .operations
            .get(op_index)
            .and_then(|op| op.source_account.as_deref())
            .unwrap_or(&self.envelope.source_account)
    }

    /// Fee changes, as mutations.
    pub fn fee_changes(&self) -> Result<Vec<Change>> {
        changes_from_entry_changes(
            &self.fee_changes,
            ChangeReason::Fee {
                tx_index: self.index,
            },
        )
    }

    /// Changes caused by applying the transaction: transaction-level changes
    /// before the operations, each operation's changes, then the changes
    /// after. Failed transactions only report transaction-level changes.
    pub fn changes(&self) -> Result<Vec<Change>> {
        let tx_reason = ChangeReason::Transaction {
            tx_index: self.index,
        };
        let mut out = changes_from_entry_changes(&self.meta.tx_changes_before, tx_reason)?;

        if self.successful() {
            for (op_index, op_meta) in self.meta.operations.iter().enumerate() {
                out.extend(changes_from_entry_changes(
                    &op_meta.changes,
                    ChangeReason::Operation {
                        tx_index: self.index,
                        op_index: op_index as u32,
                    },
                )?);
            }
        }

        out.extend(changes_from_entry_changes(
            &self.meta.tx_changes_after,
            tx_reason,
        )?);
        Ok(out)
    }
}

/// Reads a ledger's transactions in application order.
///
/// The transaction set is stored in hash order; each result names the hash
/// of its envelope, which is how the two are joined.
pub struct LedgerTransactionReader {
    record: LedgerCloseRecord,
    envelopes: HashMap<[u8; 32], usize>,
    next: usize,
}

impl LedgerTransactionReader {
    pub fn new(record: LedgerCloseRecord, network_passphrase: &str) -> Result<Self> {
        let id = network_id(network_passphrase);
        let mut envelopes = HashMap::with_capacity(record.meta().tx_set.len());
        for (i, env) in record.meta().tx_set.iter().enumerate() {
            if envelopes.insert(transaction_hash(&id, env), i).is_some() {
                return Err(LedgerError::malformed(
                    record.sequence(),
                    "duplicate transaction in transaction set",
                ));
            }
        }
        Ok(Self {
            record,
            envelopes,
            next: 0,
        })
    }

    /// Next transaction, or `Ok(None)` when all have been read.
    pub fn read(&mut self) -> Result<Option<LedgerTransaction>> {
        let sequence = self.record.sequence();
        let Some(processing) = self.record.meta().tx_processing.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let pair = processing
            .result
            .as_ref()
            .ok_or_else(|| LedgerError::malformed(sequence, "transaction without result"))?;
        let hash: [u8; 32] = pair.transaction_hash.as_slice().try_into().map_err(|_| {
            LedgerError::malformed(sequence, "transaction hash is not 32 bytes")
        })?;
        let envelope_index = *self.envelopes.get(&hash).ok_or_else(|| {
            LedgerError::malformed(
                sequence,
                format!("no envelope for transaction {}", hex::encode(hash)),
            )
        })?;
        let result = pair
            .result
            .clone()
            .ok_or_else(|| LedgerError::malformed(sequence, "transaction result is empty"))?;

        Ok(Some(LedgerTransaction {
            ledger_sequence: sequence,
            index: self.next as u32,
            hash,
            envelope: self.record.meta().tx_set[envelope_index].clone(),
            result,
            fee_changes: processing.fee_processing.clone(),
            meta: processing.tx_apply_processing.clone().unwrap_or_default(),
        }))
    }

    /// Read every remaining transaction.
    pub fn read_all(&mut self) -> Result<Vec<LedgerTransaction>> {
        let mut out = Vec::new();
        while let Some(tx) = self.read()? {
            out.push(tx);
        }
        Ok(out)
    }

    pub fn record(&self) -> &LedgerCloseRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{LedgerCloseMeta, LedgerHeader, TransactionResultMeta, TransactionResultPair};
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};

    #[test]
    fn test_reads_in_application_order() {
        let record = LedgerBuilder::new(10)
            .payment("GA", "GB", 100)
            .payment("GC", "GD", 200)
            .build();

        let mut reader = LedgerTransactionReader::new(record, TEST_PASSPHRASE).unwrap();
        let txs = reader.read_all().unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].index, 1);
        assert_eq!(txs[0].envelope.source_account, "GA");
        assert_eq!(txs[1].index, 2);
        assert_eq!(txs[1].envelope.source_account, "GC");
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_unknown_hash_is_malformed() {
        let meta = LedgerCloseMeta {
            v: 1,
            header: Some(LedgerHeader {
                ledger_seq: 3,
                ..Default::default()
            }),
            tx_set: vec![TransactionEnvelope::default()],
            tx_processing: vec![TransactionResultMeta {
                result: Some(TransactionResultPair {
                    transaction_hash: vec![0u8; 32],
                    result: Some(TransactionResult::default()),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let record = LedgerCloseRecord::new(meta).unwrap();
        let mut reader = LedgerTransactionReader::new(record, TEST_PASSPHRASE).unwrap();
        assert!(matches!(
            reader.read(),
            Err(LedgerError::Malformed { sequence: 3, .. })
        ));
    }

    #[test]
    fn test_operation_source_falls_back_to_transaction() {
        let record = LedgerBuilder::new(4).payment("GA", "GB", 1).build();
        let mut reader = LedgerTransactionReader::new(record, TEST_PASSPHRASE).unwrap();
        let tx = reader.read().unwrap().unwrap();
        assert_eq!(tx.operation_source(0), "GA");
    }

    #[test]
    fn test_failed_transaction_skips_operation_changes() {
        let record = LedgerBuilder::new(5).failed_payment("GA", "GB", 1).build();
        let mut reader = LedgerTransactionReader::new(record, TEST_PASSPHRASE).unwrap();
        let tx = reader.read().unwrap().unwrap();
        assert!(!tx.successful());
        assert!(tx
            .changes()
            .unwrap()
            .iter()
            .all(|c| !matches!(c.reason, ChangeReason::Operation { .. })));
    }
}
