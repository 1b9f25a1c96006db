use tracing::debug;

use super::{ChangeProcessor, Result};
use crate::history::rows::{AccountRow, TrustLineRow};
use crate::history::LedgerBatch;
use crate::ledger::{Change, LedgerError};
use crate::proto::ledger_entry::Data;
use crate::proto::{AccountEntry, Asset, AssetType, LedgerEntry, TrustLineEntry};

/// Mirrors account and trust line entries into the state tables and keeps
/// `asset_stats` in step with trust line changes.
#[derive(Debug, Default)]
pub struct BalancesProcessor;

impl BalancesProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn account_row(entry: &LedgerEntry, account: &AccountEntry) -> AccountRow {
    AccountRow {
        account_id: account.account_id.clone(),
        balance: account.balance,
        sequence_number: account.seq_num,
        num_sub_entries: account.num_sub_entries,
        home_domain: account.home_domain.clone(),
        flags: account.flags,
        last_modified_ledger: entry.last_modified_ledger_seq,
    }
}

fn trust_line_asset(line: &TrustLineEntry) -> Result<&Asset> {
    line.asset.as_ref().ok_or_else(|| {
        LedgerError::MalformedEntry(format!("trust line of {} has no asset", line.account_id)).into()
    })
}

fn trust_line_row(entry: &LedgerEntry, line: &TrustLineEntry) -> Result<TrustLineRow> {
    let asset = trust_line_asset(line)?;
    let asset_type = AssetType::try_from(asset.asset_type).map_err(|_| {
        LedgerError::MalformedEntry(format!("unknown asset type {}", asset.asset_type))
    })?;
    Ok(TrustLineRow {
        account_id: line.account_id.clone(),
        asset: asset.canonical(),
        asset_type: asset_type.name().to_string(),
        asset_code: asset.code.clone(),
        asset_issuer: asset.issuer.clone(),
        balance: line.balance,
        trust_limit: line.limit,
        flags: line.flags,
        last_modified_ledger: entry.last_modified_ledger_seq,
    })
}

/// Asset type discriminant of `line` if this build does not know it.
fn unknown_asset_type(line: &TrustLineEntry) -> Option<i32> {
    line.asset
        .as_ref()
        .map(|asset| asset.asset_type)
        .filter(|t| AssetType::try_from(*t).is_err())
}

fn account_of(entry: &LedgerEntry) -> Option<&AccountEntry> {
    match &entry.data {
        Some(Data::Account(a)) => Some(a),
        _ => None,
    }
}

fn trust_line_of(entry: &LedgerEntry) -> Option<&TrustLineEntry> {
    match &entry.data {
        Some(Data::Trustline(t)) => Some(t),
        _ => None,
    }
}

impl BalancesProcessor {
    fn process_account(&self, change: &Change, batch: &mut LedgerBatch) -> Result<()> {
        match (&change.pre, &change.post) {
            (_, Some(post)) => {
                if let Some(account) = account_of(post) {
                    batch.accounts.upsert(account_row(post, account))?;
                }
            }
            (Some(pre), None) => {
                if let Some(account) = account_of(pre) {
                    batch.accounts.remove(AccountRow {
                        account_id: account.account_id.clone(),
                        ..AccountRow::default()
                    })?;
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn process_trust_line(&self, change: &Change, batch: &mut LedgerBatch) -> Result<()> {
        let pre = change.pre.as_ref().and_then(trust_line_of);
        let post_entry = change.post.as_ref();
        let post = post_entry.and_then(trust_line_of);

        match (pre, post_entry.zip(post)) {
            (None, Some((entry, line))) => {
                batch.trust_lines.upsert(trust_line_row(entry, line)?)?;
                batch
                    .asset_stats
                    .add(trust_line_asset(line)?, 1, i128::from(line.balance))?;
            }
            (Some(before), Some((entry, line))) => {
                batch.trust_lines.upsert(trust_line_row(entry, line)?)?;
                batch.asset_stats.add(
                    trust_line_asset(line)?,
                    0,
                    i128::from(line.balance) - i128::from(before.balance),
                )?;
            }
            (Some(before), None) => {
                let asset = trust_line_asset(before)?;
                batch.trust_lines.remove(TrustLineRow {
                    account_id: before.account_id.clone(),
                    asset: asset.canonical(),
                    ..TrustLineRow::default()
                })?;
                batch
                    .asset_stats
                    .add(asset, -1, -i128::from(before.balance))?;
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl ChangeProcessor for BalancesProcessor {
    fn name(&self) -> &'static str {
        "balances"
    }

    fn process_change(&mut self, change: &Change, batch: &mut LedgerBatch) -> Result<()> {
        let entry = change.post.as_ref().or(change.pre.as_ref());
        match entry.and_then(|e| e.data.as_ref()) {
            Some(Data::Account(_)) => self.process_account(change, batch),
            Some(Data::Trustline(line)) => match unknown_asset_type(line) {
                Some(asset_type) => {
                    debug!(
                        account = %line.account_id,
                        asset_type,
                        "Skipping trust line of unknown asset type"
                    );
                    Ok(())
                }
                None => self.process_trust_line(change, batch),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::StateRow;
    use crate::ledger::ChangeReason;
    use crate::test_utils::{account_entry, trustline_entry};

    const USD: &str = "USD:GISSUER";

    fn change(pre: Option<LedgerEntry>, post: Option<LedgerEntry>) -> Change {
        Change {
            pre,
            post,
            reason: ChangeReason::Operation {
                tx_index: 1,
                op_index: 0,
            },
        }
    }

    fn usd() -> Asset {
        Asset::from_canonical(USD).unwrap()
    }

    #[test]
    fn test_account_lifecycle() {
        let mut processor = BalancesProcessor::new();
        let mut batch = LedgerBatch::new(10);

        processor
            .process_change(&change(None, Some(account_entry("GA", 100, 5))), &mut batch)
            .unwrap();
        assert_eq!(batch.accounts.pending("GA").unwrap().balance, 100);

        processor
            .process_change(
                &change(Some(account_entry("GA", 100, 5)), Some(account_entry("GA", 70, 6))),
                &mut batch,
            )
            .unwrap();
        let row = batch.accounts.pending("GA").unwrap();
        assert_eq!(row.balance, 70);
        assert_eq!(row.last_modified_ledger, 6);

        processor
            .process_change(&change(Some(account_entry("GA", 70, 6)), None), &mut batch)
            .unwrap();
        assert!(batch.accounts.pending("GA").is_none());
        assert_eq!(batch.accounts.len(), 1);
    }

    #[test]
    fn test_trust_line_stats_deltas() {
        let mut processor = BalancesProcessor::new();
        let mut batch = LedgerBatch::new(10);
        let asset = usd();

        processor
            .process_change(&change(None, Some(trustline_entry("GA", &asset, 50, 1000, 3))), &mut batch)
            .unwrap();
        processor
            .process_change(&change(None, Some(trustline_entry("GB", &asset, 0, 1000, 3))), &mut batch)
            .unwrap();
        processor
            .process_change(
                &change(
                    Some(trustline_entry("GA", &asset, 50, 1000, 3)),
                    Some(trustline_entry("GA", &asset, 20, 1000, 4)),
                ),
                &mut batch,
            )
            .unwrap();
        processor
            .process_change(&change(Some(trustline_entry("GB", &asset, 0, 1000, 3)), None), &mut batch)
            .unwrap();

        assert_eq!(batch.asset_stats.delta(USD), Some((1, 20)));
        let row = batch.trust_lines.pending(&format!("GA/{}", USD)).unwrap();
        assert_eq!(row.balance, 20);
        assert_eq!(row.key_values().len(), 2);
        assert!(batch.trust_lines.pending(&format!("GB/{}", USD)).is_none());
    }

    #[test]
    fn test_other_entries_ignored() {
        let mut processor = BalancesProcessor::new();
        let mut batch = LedgerBatch::new(10);
        let entry = LedgerEntry {
            last_modified_ledger_seq: 1,
            entry_type: crate::proto::LedgerEntryType::Data as i32,
            data: Some(Data::Data(crate::proto::DataEntry {
                account_id: "GA".to_string(),
                data_name: "k".to_string(),
                data_value: vec![1],
            })),
        };
        processor.process_change(&change(None, Some(entry)), &mut batch).unwrap();
        assert_eq!(batch.row_count(), 0);
    }

    #[test]
    fn test_unknown_kinds_are_not_applicable() {
        let mut processor = BalancesProcessor::new();
        let mut batch = LedgerBatch::new(10);
        let newer = LedgerEntry {
            last_modified_ledger_seq: 1,
            entry_type: 42,
            data: None,
        };
        processor.process_change(&change(None, Some(newer)), &mut batch).unwrap();

        let mut asset = usd();
        asset.asset_type = 42;
        processor
            .process_change(&change(None, Some(trustline_entry("GA", &asset, 5, 10, 3))), &mut batch)
            .unwrap();
        assert_eq!(batch.row_count(), 0);
        assert!(batch.asset_stats.is_empty());
    }
}
