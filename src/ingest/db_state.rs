//! Database state evaluation.
//!
//! [`evaluate_db_state`] is the one place that decides how ingestion starts
//! from what is stored. The driver and the diagnostic binary both call it
//! through [`check_db_state`].

use std::fmt;

use serde::Serialize;

use crate::history::{IngestionQ, Result};

/// How ingestion has to (re)start given the stored counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DbState {
    /// Nothing ingested yet.
    Empty,
    /// Checkpoint and history agree; resume after the checkpoint.
    Valid,
    /// Derived tables were written by another ingest version.
    NeedsRebuild,
    /// Checkpoint and history high-water mark disagree.
    Inconsistent,
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbState::Empty => "empty",
            DbState::Valid => "valid",
            DbState::NeedsRebuild => "needs_rebuild",
            DbState::Inconsistent => "inconsistent",
        };
        f.write_str(s)
    }
}

/// Counters read from the history database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbStateInput {
    pub last_ingested_ledger: u32,
    pub ingest_version: u32,
    pub last_history_ledger: u32,
    /// Version of this build's derived schema.
    pub current_version: u32,
}

/// Evaluator signature, injectable for tests.
pub type StateEvaluator = fn(&DbStateInput) -> DbState;

/// First matching rule wins.
pub fn evaluate_db_state(input: &DbStateInput) -> DbState {
    if input.last_ingested_ledger == 0 {
        return DbState::Empty;
    }
    if input.ingest_version != input.current_version {
        return DbState::NeedsRebuild;
    }
    if input.last_history_ledger != 0 && input.last_history_ledger != input.last_ingested_ledger {
        return DbState::Inconsistent;
    }
    DbState::Valid
}

/// Evaluated state together with the counters it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbStateReport {
    #[serde(flatten)]
    pub input: DbStateInput,
    pub state: DbState,
}

/// Read the counters without taking the ingest lock.
pub async fn read_db_state_input(q: &dyn IngestionQ, current_version: u32) -> Result<DbStateInput> {
    Ok(DbStateInput {
        last_ingested_ledger: q.get_last_ledger_ingest_non_blocking().await?,
        ingest_version: q.get_ingest_version().await?,
        last_history_ledger: q.get_latest_history_ledger().await?,
        current_version,
    })
}

pub async fn check_db_state(
    q: &dyn IngestionQ,
    current_version: u32,
    evaluator: StateEvaluator,
) -> Result<DbStateReport> {
    let input = read_db_state_input(q, current_version).await?;
    Ok(DbStateReport {
        state: evaluator(&input),
        input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHistoryQ;
    use proptest::prelude::*;

    fn input(last: u32, version: u32, history: u32) -> DbStateInput {
        DbStateInput {
            last_ingested_ledger: last,
            ingest_version: version,
            last_history_ledger: history,
            current_version: 1,
        }
    }

    #[test]
    fn test_state_table() {
        assert_eq!(evaluate_db_state(&input(0, 0, 0)), DbState::Empty);
        assert_eq!(evaluate_db_state(&input(0, 7, 5)), DbState::Empty);
        assert_eq!(evaluate_db_state(&input(10, 0, 10)), DbState::NeedsRebuild);
        assert_eq!(evaluate_db_state(&input(10, 1, 9)), DbState::Inconsistent);
        assert_eq!(evaluate_db_state(&input(10, 1, 10)), DbState::Valid);
        assert_eq!(evaluate_db_state(&input(10, 1, 0)), DbState::Valid);
    }

    #[test]
    fn test_rebuild_takes_precedence_over_inconsistent() {
        assert_eq!(evaluate_db_state(&input(10, 2, 3)), DbState::NeedsRebuild);
    }

    #[test]
    fn test_display() {
        assert_eq!(DbState::NeedsRebuild.to_string(), "needs_rebuild");
        assert_eq!(DbState::Valid.to_string(), "valid");
    }

    #[tokio::test]
    async fn test_check_db_state_reads_counters() {
        let q = MockHistoryQ::new();
        q.set_state(42, 1, 41).await;
        let report = check_db_state(&q, 1, evaluate_db_state).await.unwrap();
        assert_eq!(report.state, DbState::Inconsistent);
        assert_eq!(report.input.last_ingested_ledger, 42);
        assert_eq!(report.input.last_history_ledger, 41);

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["state"], "inconsistent");
        assert_eq!(json["last_ingested_ledger"], 42);
    }

    #[tokio::test]
    async fn test_check_db_state_uses_injected_evaluator() {
        let q = MockHistoryQ::new();
        let report = check_db_state(&q, 1, |_| DbState::Valid).await.unwrap();
        assert_eq!(report.state, DbState::Valid);
    }

    proptest! {
        #[test]
        fn rules_apply_in_order(last in 0u32..4, version in 0u32..3, history in 0u32..4, current in 0u32..3) {
            let input = DbStateInput {
                last_ingested_ledger: last,
                ingest_version: version,
                last_history_ledger: history,
                current_version: current,
            };
            let state = evaluate_db_state(&input);
            if last == 0 {
                prop_assert_eq!(state, DbState::Empty);
            } else if version != current {
                prop_assert_eq!(state, DbState::NeedsRebuild);
            } else if history != 0 && history != last {
                prop_assert_eq!(state, DbState::Inconsistent);
            } else {
                prop_assert_eq!(state, DbState::Valid);
            }
            if state == DbState::Inconsistent {
                prop_assert!(last != 0 && history != 0 && last != history);
            }
        }
    }
}
