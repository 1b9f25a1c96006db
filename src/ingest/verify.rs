//! Consistency verification of entry changes.
//!
//! Every change that carries a previous state must refer to an entry already
//! known: created by an earlier ledger or present in the checkpoint state.
//! A miss means ledgers were skipped or the stored state diverged.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{IngestError, Result};
use crate::ledger::{Change, KeyBytes};
use crate::proto::LedgerKey;

/// Entry kinds mirrored by the state tables.
const STATE_TABLE_KINDS: [&str; 2] = ["account", "trustline"];

/// Keys created and removed by one ledger, applied once it commits.
#[derive(Debug, Default)]
pub struct KeyDelta {
    /// `true` if the key exists after the ledger.
    keys: HashMap<KeyBytes, bool>,
}

impl KeyDelta {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Set of entry keys known to exist.
#[derive(Debug, Default)]
pub struct StateVerifier {
    known: HashSet<KeyBytes>,
    /// Entry kinds whose keys are tracked; `None` tracks every kind.
    kinds: Option<&'static [&'static str]>,
}

impl StateVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier seeded from the state tables. They only hold accounts and
    /// trust lines, so changes of other kinds are not checked.
    pub fn from_state_keys(keys: impl IntoIterator<Item = LedgerKey>) -> Self {
        Self {
            known: keys.into_iter().map(|k| k.to_bytes()).collect(),
            kinds: Some(&STATE_TABLE_KINDS),
        }
    }

    fn tracks(&self, key: &LedgerKey) -> bool {
        self.kinds
            .map_or(true, |kinds| kinds.contains(&key.type_name()))
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, key: &KeyBytes) -> bool {
        self.known.contains(key)
    }

    /// Check `changes` of `ledger` in order, without touching the known set.
    ///
    /// A creation of a key that already exists is accepted: restored entries
    /// come back as creations. Entries of kinds this build does not know
    /// have no key and are not checked.
    pub fn verify(&self, ledger: u32, changes: &[Change]) -> Result<KeyDelta> {
        let mut delta = KeyDelta::default();
        for change in changes {
            if !change.is_recognized() {
                debug!(ledger, reason = ?change.reason, "Not verifying change of unrecognized entry");
                continue;
            }
            let key = change.ledger_key().map_err(|e| IngestError::Verify {
                ledger,
                reason: e.to_string(),
            })?;
            if !self.tracks(&key) {
                continue;
            }
            let key = key.to_bytes();

            if change.pre.is_some() {
                let exists = delta
                    .keys
                    .get(&key)
                    .copied()
                    .unwrap_or_else(|| self.known.contains(&key));
                if !exists {
                    return Err(IngestError::Verify {
                        ledger,
                        reason: format!("{:?} change of unknown entry {}", change.kind(), key),
                    });
                }
            }
            delta.keys.insert(key, change.post.is_some());
        }
        Ok(delta)
    }

    /// Apply the keys of a committed ledger.
    pub fn apply(&mut self, delta: KeyDelta) {
        for (key, exists) in delta.keys {
            if exists {
                self.known.insert(key);
            } else {
                self.known.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ChangeReason;
    use crate::test_utils::account_entry;

    fn created(account: &str) -> Change {
        Change {
            pre: None,
            post: Some(account_entry(account, 10, 2)),
            reason: ChangeReason::Checkpoint,
        }
    }

    fn updated(account: &str) -> Change {
        Change {
            pre: Some(account_entry(account, 10, 2)),
            post: Some(account_entry(account, 20, 3)),
            reason: ChangeReason::Transaction { tx_index: 1 },
        }
    }

    fn removed(account: &str) -> Change {
        Change {
            pre: Some(account_entry(account, 20, 3)),
            post: None,
            reason: ChangeReason::Operation {
                tx_index: 1,
                op_index: 0,
            },
        }
    }

    #[test]
    fn test_update_of_unknown_entry_fails() {
        let verifier = StateVerifier::new();
        let err = verifier.verify(5, &[updated("GA")]).unwrap_err();
        assert!(matches!(err, IngestError::Verify { ledger: 5, .. }));
    }

    #[test]
    fn test_creation_within_ledger_is_visible_to_later_changes() {
        let verifier = StateVerifier::new();
        let delta = verifier
            .verify(5, &[created("GA"), updated("GA"), removed("GA")])
            .unwrap();
        assert_eq!(delta.len(), 1);
    }

    #[test]
    fn test_delta_applies_only_when_committed() {
        let mut verifier = StateVerifier::new();
        let delta = verifier.verify(5, &[created("GA")]).unwrap();
        assert!(verifier.verify(6, &[updated("GA")]).is_err());

        verifier.apply(delta);
        assert_eq!(verifier.len(), 1);
        let delta = verifier.verify(6, &[updated("GA"), removed("GA")]).unwrap();
        verifier.apply(delta);
        assert!(verifier.is_empty());
        assert!(verifier.verify(7, &[removed("GA")]).is_err());
    }

    #[test]
    fn test_removed_entry_can_be_recreated() {
        let mut verifier = StateVerifier::new();
        verifier.apply(verifier.verify(1, &[created("GA")]).unwrap());
        assert!(verifier.verify(2, &[removed("GA"), created("GA")]).is_ok());
        assert!(verifier.verify(2, &[created("GA")]).is_ok());
    }

    #[test]
    fn test_unrecognized_entries_are_not_checked() {
        let newer = crate::proto::LedgerEntry {
            last_modified_ledger_seq: 2,
            entry_type: 42,
            data: None,
        };
        let change = Change {
            pre: Some(newer.clone()),
            post: Some(newer),
            reason: ChangeReason::Upgrade,
        };
        let verifier = StateVerifier::new();
        let delta = verifier.verify(5, &[change, created("GA")]).unwrap();
        assert_eq!(delta.len(), 1);
    }

    #[test]
    fn test_state_table_seed_checks_accounts_only() {
        let seed = account_entry("GA", 10, 2).ledger_key().unwrap();
        let verifier = StateVerifier::from_state_keys([seed]);
        assert_eq!(verifier.len(), 1);
        assert!(verifier.verify(5, &[updated("GA")]).is_ok());
        assert!(verifier.verify(5, &[updated("GB")]).is_err());

        let data = crate::proto::LedgerEntry {
            last_modified_ledger_seq: 2,
            entry_type: crate::proto::LedgerEntryType::Data as i32,
            data: Some(crate::proto::ledger_entry::Data::Data(crate::proto::DataEntry {
                account_id: "GA".to_string(),
                data_name: "k".to_string(),
                data_value: vec![1],
            })),
        };
        let change = Change {
            pre: Some(data.clone()),
            post: Some(data),
            reason: ChangeReason::Transaction { tx_index: 1 },
        };
        assert!(verifier.verify(5, &[change]).unwrap().is_empty());
    }
}
