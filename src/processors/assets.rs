use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::{LedgerTransactionProcessor, OperationContext, OperationRegistry, Result};
use crate::history::rows::AssetRow;
use crate::history::LedgerBatch;
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};
use crate::proto::{Asset, AssetType};

/// Collects the assets referenced by successful operations and writes each
/// once per ledger.
pub struct AssetsProcessor {
    registry: Arc<OperationRegistry>,
    seen: BTreeSet<AssetRow>,
}

impl AssetsProcessor {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            registry,
            seen: BTreeSet::new(),
        }
    }
}

fn asset_row(asset: &Asset) -> Option<AssetRow> {
    let asset_type = AssetType::try_from(asset.asset_type).ok()?;
    if asset_type == AssetType::PoolShare {
        return None;
    }
    Some(AssetRow {
        asset_type: asset_type.name().to_string(),
        asset_code: asset.code.clone(),
        asset_issuer: asset.issuer.clone(),
    })
}

impl LedgerTransactionProcessor for AssetsProcessor {
    fn name(&self) -> &'static str {
        "assets"
    }

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        _batch: &mut LedgerBatch,
    ) -> Result<()> {
        if !tx.successful() {
            return Ok(());
        }
        for index in 0..tx.operations().len() {
            let Some(ctx) = OperationContext::new(tx, index, ledger.protocol_version()) else {
                continue;
            };
            for asset in self.registry.assets(&ctx)?.unwrap_or_default() {
                match asset_row(&asset) {
                    Some(row) => {
                        self.seen.insert(row);
                    }
                    None => debug!(asset_type = asset.asset_type, "Skipping asset without history row"),
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, _ledger: &LedgerCloseRecord, batch: &mut LedgerBatch) -> Result<()> {
        for row in std::mem::take(&mut self.seen) {
            batch.assets.add(row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::test_utils::{LedgerBuilder, TEST_PASSPHRASE};

    #[test]
    fn test_assets_written_once() {
        let record = LedgerBuilder::new(30)
            .payment("GALICE", "GBOB", 1)
            .payment("GBOB", "GALICE", 1)
            .create_account("GALICE", "GCAROL", 100)
            .failed_credit_payment("GALICE", "GBOB", "USD", "GISSUER", 1)
            .build();
        let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap();

        let mut processor = AssetsProcessor::new(Arc::new(OperationRegistry::standard()));
        let mut batch = LedgerBatch::new(10);
        for tx in &txs {
            processor.process_transaction(&record, tx, &mut batch).unwrap();
        }
        processor.finish(&record, &mut batch).unwrap();

        let rows = batch.assets.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].asset_type, "native");
    }

    #[test]
    fn test_credit_asset_row() {
        let row = asset_row(&Asset::credit("EURO1", "GISSUER")).unwrap();
        assert_eq!(row.asset_type, "credit_alphanum12");
        assert_eq!(row.asset_code, "EURO1");
        assert_eq!(row.asset_issuer, "GISSUER");
    }
}
