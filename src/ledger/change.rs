//! Entry mutations.

use tracing::debug;

use super::{LedgerError, Result};
use crate::proto::{LedgerEntry, LedgerEntryChange, LedgerEntryChangeType, LedgerKey};

/// Where in the ledger a change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// Fee charged to the source of the transaction at `tx_index` (1-based).
    Fee { tx_index: u32 },
    /// Transaction-level changes before or after the operations.
    Transaction { tx_index: u32 },
    Operation { tx_index: u32, op_index: u32 },
    Upgrade,
    Eviction,
    /// Part of the state snapshot at a checkpoint.
    Checkpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// One entry's state before and after a mutation.
///
/// `pre == None` marks a creation, `post == None` a removal.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub pre: Option<LedgerEntry>,
    pub post: Option<LedgerEntry>,
    pub reason: ChangeReason,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match (&self.pre, &self.post) {
            (None, _) => ChangeKind::Created,
            (Some(_), None) => ChangeKind::Removed,
            (Some(_), Some(_)) => ChangeKind::Updated,
        }
    }

    /// Whether the changed entry carries data of a kind this build knows.
    /// Entries of newer kinds still flow through but have no key.
    pub fn is_recognized(&self) -> bool {
        self.post
            .as_ref()
            .or(self.pre.as_ref())
            .is_some_and(LedgerEntry::is_recognized)
    }

    /// Key of the changed entry.
    pub fn ledger_key(&self) -> Result<LedgerKey> {
        match (&self.post, &self.pre) {
            (Some(entry), _) | (None, Some(entry)) => entry.ledger_key(),
            (None, None) => Err(LedgerError::MalformedEntry(
                "change has neither pre nor post state".to_string(),
            )),
        }
    }
}

/// Pair raw entry changes into [`Change`]s.
///
/// `Updated` and `Removed` must directly follow the `State` record carrying
/// the previous value of the same entry. A trailing or unpaired `State` is
/// tolerated and produces nothing, since it only reports a value that was
/// read but not modified. Change types newer than this build are skipped.
pub fn changes_from_entry_changes(
    raw: &[LedgerEntryChange],
    reason: ChangeReason,
) -> Result<Vec<Change>> {
    let mut out = Vec::with_capacity(raw.len());

    for (i, change) in raw.iter().enumerate() {
        let Ok(change_type) = LedgerEntryChangeType::try_from(change.change_type) else {
            debug!(change_type = change.change_type, "Skipping entry change of unknown type");
            continue;
        };

        match change_type {
            LedgerEntryChangeType::State => continue,
            LedgerEntryChangeType::Created | LedgerEntryChangeType::Restored => {
                let post = required_entry(change, change_type)?;
                out.push(Change {
                    pre: None,
                    post: Some(post),
                    reason,
                });
            }
            LedgerEntryChangeType::Updated => {
                let post = required_entry(change, change_type)?;
                let pre = preceding_state(raw, i)?;
                if !same_entry(&pre, &post)? {
                    return Err(LedgerError::MalformedEntry(
                        "updated entry does not match preceding state".to_string(),
                    ));
                }
                out.push(Change {
                    pre: Some(pre),
                    post: Some(post),
                    reason,
                });
            }
            LedgerEntryChangeType::Removed => {
                let pre = preceding_state(raw, i)?;
                if let Some(key) = change.removed_key.as_ref().filter(|_| pre.is_recognized()) {
                    if key.to_bytes() != pre.ledger_key()?.to_bytes() {
                        return Err(LedgerError::MalformedEntry(
                            "removed key does not match preceding state".to_string(),
                        ));
                    }
                }
                out.push(Change {
                    pre: Some(pre),
                    post: None,
                    reason,
                });
            }
        }
    }

    Ok(out)
}

/// Entries of unrecognized kinds cannot be keyed and are taken as matching.
fn same_entry(a: &LedgerEntry, b: &LedgerEntry) -> Result<bool> {
    if !a.is_recognized() || !b.is_recognized() {
        return Ok(true);
    }
    Ok(a.ledger_key()?.to_bytes() == b.ledger_key()?.to_bytes())
}

fn required_entry(change: &LedgerEntryChange, kind: LedgerEntryChangeType) -> Result<LedgerEntry> {
    change
        .entry
        .clone()
        .ok_or_else(|| LedgerError::MalformedEntry(format!("{:?} change without entry", kind)))
}

fn preceding_state(raw: &[LedgerEntryChange], index: usize) -> Result<LedgerEntry> {
    let prev = index
        .checked_sub(1)
        .and_then(|i| raw.get(i))
        .filter(|c| c.change_type == LedgerEntryChangeType::State as i32)
        .ok_or_else(|| {
            LedgerError::MalformedEntry(format!(
                "change at position {} is not preceded by its state",
                index
            ))
        })?;
    required_entry(prev, LedgerEntryChangeType::State)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ledger_entry::Data;
    use crate::proto::{AccountEntry, LedgerEntryType};

    fn account(id: &str, balance: i64) -> LedgerEntry {
        LedgerEntry {
            last_modified_ledger_seq: 1,
            entry_type: LedgerEntryType::Account as i32,
            data: Some(Data::Account(AccountEntry {
                account_id: id.to_string(),
                balance,
                ..Default::default()
            })),
        }
    }

    fn raw(kind: LedgerEntryChangeType, entry: LedgerEntry) -> LedgerEntryChange {
        LedgerEntryChange {
            change_type: kind as i32,
            entry: Some(entry),
            removed_key: None,
        }
    }

    const REASON: ChangeReason = ChangeReason::Transaction { tx_index: 1 };

    #[test]
    fn test_created_has_no_pre() {
        let changes = changes_from_entry_changes(
            &[raw(LedgerEntryChangeType::Created, account("GA", 1))],
            REASON,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), ChangeKind::Created);
    }

    #[test]
    fn test_state_then_updated_pairs() {
        let changes = changes_from_entry_changes(
            &[
                raw(LedgerEntryChangeType::State, account("GA", 1)),
                raw(LedgerEntryChangeType::Updated, account("GA", 2)),
            ],
            REASON,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), ChangeKind::Updated);
        assert_eq!(changes[0].pre, Some(account("GA", 1)));
        assert_eq!(changes[0].post, Some(account("GA", 2)));
    }

    #[test]
    fn test_state_then_removed_pairs() {
        let key = account("GA", 1).ledger_key().unwrap();
        let changes = changes_from_entry_changes(
            &[
                raw(LedgerEntryChangeType::State, account("GA", 1)),
                LedgerEntryChange {
                    change_type: LedgerEntryChangeType::Removed as i32,
                    entry: None,
                    removed_key: Some(key),
                },
            ],
            REASON,
        )
        .unwrap();
        assert_eq!(changes[0].kind(), ChangeKind::Removed);
        assert!(changes[0].post.is_none());
    }

    #[test]
    fn test_update_without_state_is_malformed() {
        let err = changes_from_entry_changes(
            &[raw(LedgerEntryChangeType::Updated, account("GA", 2))],
            REASON,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_update_of_different_entry_is_malformed() {
        let err = changes_from_entry_changes(
            &[
                raw(LedgerEntryChangeType::State, account("GA", 1)),
                raw(LedgerEntryChangeType::Updated, account("GB", 2)),
            ],
            REASON,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_unpaired_state_is_ignored() {
        let changes = changes_from_entry_changes(
            &[raw(LedgerEntryChangeType::State, account("GA", 1))],
            REASON,
        )
        .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_unknown_change_type_is_skipped() {
        let changes = changes_from_entry_changes(
            &[
                LedgerEntryChange {
                    change_type: 42,
                    entry: Some(account("GA", 1)),
                    removed_key: None,
                },
                raw(LedgerEntryChangeType::Created, account("GB", 1)),
            ],
            ChangeReason::Upgrade,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].post, Some(account("GB", 1)));
    }

    #[test]
    fn test_update_of_unrecognized_entry_passes_through() {
        let newer = LedgerEntry {
            last_modified_ledger_seq: 1,
            entry_type: 42,
            data: None,
        };
        let changes = changes_from_entry_changes(
            &[
                raw(LedgerEntryChangeType::State, newer.clone()),
                raw(LedgerEntryChangeType::Updated, newer),
            ],
            REASON,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].is_recognized());
        assert!(changes[0].ledger_key().is_err());
    }
}
