//! Sequential readers of entry mutations.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::debug;

use super::{
    changes_from_entry_changes, Change, ChangeReason, LedgerCloseRecord, LedgerTransactionReader,
    Result,
};
use crate::codec::FrameReader;
use crate::proto::LedgerEntry;

/// A finite, ordered sequence of entry mutations.
#[async_trait]
pub trait ChangeReader: Send {
    /// Next change, or `Ok(None)` at the end of the sequence.
    async fn read(&mut self) -> Result<Option<Change>>;

    /// Release underlying resources. Reading after close yields `Ok(None)`.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

enum Stage {
    Fees,
    Transactions,
    Upgrades(usize),
    Evictions,
    Done,
}

/// Changes of one ledger in canonical order: every transaction's fee
/// changes, then every transaction's apply changes, then upgrade changes,
/// then evictions.
///
/// Each stage is unpacked only when the previous one is drained.
pub struct LedgerChangeReader {
    record: LedgerCloseRecord,
    transactions: Vec<super::LedgerTransaction>,
    stage: Stage,
    tx_cursor: usize,
    pending: VecDeque<Change>,
}

impl LedgerChangeReader {
    pub fn new(record: LedgerCloseRecord, network_passphrase: &str) -> Result<Self> {
        let transactions =
            LedgerTransactionReader::new(record.clone(), network_passphrase)?.read_all()?;
        Ok(Self {
            record,
            transactions,
            stage: Stage::Fees,
            tx_cursor: 0,
            pending: VecDeque::new(),
        })
    }

    pub fn sequence(&self) -> u32 {
        self.record.sequence()
    }

    /// Refill `pending` from the current stage, advancing stages as they drain.
    fn advance(&mut self) -> Result<()> {
        while self.pending.is_empty() {
            match self.stage {
                Stage::Fees => match self.transactions.get(self.tx_cursor) {
                    Some(tx) => {
                        self.pending.extend(tx.fee_changes()?);
                        self.tx_cursor += 1;
                    }
                    None => {
                        self.stage = Stage::Transactions;
                        self.tx_cursor = 0;
                    }
                },
                Stage::Transactions => match self.transactions.get(self.tx_cursor) {
                    Some(tx) => {
                        self.pending.extend(tx.changes()?);
                        self.tx_cursor += 1;
                    }
                    None => self.stage = Stage::Upgrades(0),
                },
                Stage::Upgrades(i) => match self.record.meta().upgrades_processing.get(i) {
                    Some(upgrade) => {
                        self.pending.extend(changes_from_entry_changes(
                            &upgrade.changes,
                            ChangeReason::Upgrade,
                        )?);
                        self.stage = Stage::Upgrades(i + 1);
                    }
                    None => self.stage = Stage::Evictions,
                },
                Stage::Evictions => {
                    self.pending
                        .extend(self.record.meta().evicted_entries.iter().map(|entry| Change {
                            pre: Some(entry.clone()),
                            post: None,
                            reason: ChangeReason::Eviction,
                        }));
                    self.stage = Stage::Done;
                }
                Stage::Done => return Ok(()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeReader for LedgerChangeReader {
    async fn read(&mut self) -> Result<Option<Change>> {
        self.advance()?;
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.stage = Stage::Done;
        Ok(())
    }
}

/// State of the ledger at a checkpoint, read from a file of framed entries.
///
/// Every entry is reported as a creation.
pub struct CheckpointChangeReader {
    sequence: u32,
    reader: Option<FrameReader<BufReader<File>>>,
}

impl CheckpointChangeReader {
    pub async fn open(path: impl AsRef<Path>, sequence: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        debug!(path = %path.display(), checkpoint = sequence, "Opened checkpoint state");
        Ok(Self {
            sequence,
            reader: Some(FrameReader::new(BufReader::new(file))),
        })
    }

    /// Ledger whose closing state this reader describes.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

#[async_trait]
impl ChangeReader for CheckpointChangeReader {
    async fn read(&mut self) -> Result<Option<Change>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.read_message::<LedgerEntry>().await? {
            Some(entry) => Ok(Some(Change {
                pre: None,
                post: Some(entry),
                reason: ChangeReason::Checkpoint,
            })),
            None => {
                self.reader = None;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_framed;
    use crate::ledger::ChangeKind;
    use crate::test_utils::{account_entry, LedgerBuilder, TEST_PASSPHRASE};

    async fn drain(reader: &mut impl ChangeReader) -> Vec<Change> {
        let mut out = Vec::new();
        while let Some(change) = reader.read().await.unwrap() {
            out.push(change);
        }
        out
    }

    #[tokio::test]
    async fn test_fee_changes_come_before_apply_changes() {
        let record = LedgerBuilder::new(8)
            .create_account("GROOT", "GNEW1", 1_000)
            .create_account("GROOT", "GNEW2", 1_000)
            .build();
        let mut reader = LedgerChangeReader::new(record, TEST_PASSPHRASE).unwrap();
        let changes = drain(&mut reader).await;

        let first_apply = changes
            .iter()
            .position(|c| !matches!(c.reason, ChangeReason::Fee { .. }))
            .unwrap();
        assert!(changes[..first_apply]
            .iter()
            .all(|c| matches!(c.reason, ChangeReason::Fee { .. })));
        assert!(changes[first_apply..]
            .iter()
            .all(|c| !matches!(c.reason, ChangeReason::Fee { .. })));
        assert!(changes
            .iter()
            .any(|c| c.kind() == ChangeKind::Created));
    }

    #[tokio::test]
    async fn test_evictions_are_removals_at_the_end() {
        let record = LedgerBuilder::new(9)
            .payment("GA", "GB", 5)
            .evict(account_entry("GOLD", 0, 1))
            .build();
        let mut reader = LedgerChangeReader::new(record, TEST_PASSPHRASE).unwrap();
        let changes = drain(&mut reader).await;
        let last = changes.last().unwrap();
        assert_eq!(last.reason, ChangeReason::Eviction);
        assert_eq!(last.kind(), ChangeKind::Removed);
    }

    #[tokio::test]
    async fn test_close_ends_sequence() {
        let record = LedgerBuilder::new(9).payment("GA", "GB", 5).build();
        let mut reader = LedgerChangeReader::new(record, TEST_PASSPHRASE).unwrap();
        reader.close().await.unwrap();
        assert!(reader.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_reader_yields_creations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let mut buf = Vec::new();
        write_framed(&mut buf, &account_entry("GA", 10, 63)).unwrap();
        write_framed(&mut buf, &account_entry("GB", 20, 63)).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut reader = CheckpointChangeReader::open(&path, 63).await.unwrap();
        let changes = drain(&mut reader).await;
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind() == ChangeKind::Created));
        assert!(reader.read().await.unwrap().is_none());
    }
}
