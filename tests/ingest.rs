//! Ingestion state machine tests against the in-memory history database.
//!
//! Run with: cargo test --test ingest

mod common;

use std::sync::Arc;

use tokio::sync::watch;

use common::{ingest_config, write_checkpoint};
use ledger_ingest::config::IngestConfig;
use ledger_ingest::history::FilterRule;
use ledger_ingest::ingest::{DbState, IngestError, RunOutcome, StopReason, System};
use ledger_ingest::test_utils::{
    account_entry, LedgerBuilder, MemoryLedgerSource, MockHistoryQ, DEFAULT_BALANCE,
};

async fn run(
    q: &MockHistoryQ,
    source: MemoryLedgerSource,
    config: IngestConfig,
) -> Result<RunOutcome, IngestError> {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    System::new(Arc::new(q.clone()), Box::new(source), config)
        .run(cancel_rx)
        .await
}

fn history_inserts(statements: &[String], table: &str) -> usize {
    let prefix = format!("INSERT INTO \"{}\"", table);
    statements.iter().filter(|s| s.starts_with(&prefix)).count()
}

#[tokio::test]
async fn test_empty_database_ingests_every_ledger() {
    let q = MockHistoryQ::new();
    let outcome = run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap();

    assert_eq!(outcome.reason, StopReason::EndOfData);
    assert_eq!(outcome.last_ingested_ledger, 3);
    assert_eq!(outcome.ledgers_ingested, 3);
    assert_eq!(outcome.stats.transactions, 3);
    assert_eq!(outcome.stats.operations_by_type["payment"], 3);

    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 3);
    assert_eq!(state.latest_history_ledger, 3);
    assert_eq!(state.ingest_version, 1);
    // Bootstrap, then one commit per ledger.
    assert_eq!(state.commits, 4);
    assert_eq!(history_inserts(&state.statements, "history_ledgers"), 3);
}

#[tokio::test]
async fn test_valid_database_resumes_after_checkpoint() {
    let q = MockHistoryQ::new();
    q.set_state(2, 1, 2).await;
    let source = MemoryLedgerSource::with_payments(1..=4);
    let handle = source.clone();

    let outcome = run(&q, source, ingest_config()).await.unwrap();

    assert_eq!(handle.prepared_from(), vec![3]);
    assert_eq!(outcome.ledgers_ingested, 2);
    assert!(!outcome.rebuilt);
    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 4);
    assert_eq!(state.truncations, 0);
}

#[tokio::test]
async fn test_restart_reingests_nothing() {
    let q = MockHistoryQ::new();
    run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap();
    let before = q.state().await;

    let outcome = run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap();

    assert_eq!(outcome.ledgers_ingested, 0);
    assert_eq!(outcome.last_ingested_ledger, 3);
    let after = q.state().await;
    assert_eq!(after.statements, before.statements);
    assert_eq!(after.commits, before.commits);
}

#[tokio::test]
async fn test_replayed_ledgers_are_skipped() {
    let q = MockHistoryQ::new();
    q.set_state(2, 1, 2).await;
    // A source that delivers ledgers again after the requested one.
    let mut records: Vec<_> = (1..=4)
        .map(|seq| LedgerBuilder::new(seq).payment("GA", "GB", 1).build())
        .collect();
    records.insert(0, LedgerBuilder::new(3).payment("GA", "GB", 1).build());
    let source = MemoryLedgerSource::new(records);

    let outcome = run(&q, source, ingest_config()).await.unwrap();

    assert_eq!(outcome.ledgers_ingested, 2);
    assert_eq!(q.state().await.last_ingested_ledger, 4);
}

#[tokio::test]
async fn test_version_change_rebuilds() {
    let q = MockHistoryQ::new();
    q.set_state(5, 7, 5).await;

    let outcome = run(&q, MemoryLedgerSource::with_payments(1..=5), ingest_config())
        .await
        .unwrap();

    assert!(outcome.rebuilt);
    assert_eq!(outcome.ledgers_ingested, 5);
    let state = q.state().await;
    assert_eq!(state.truncations, 1);
    assert_eq!(state.ingest_version, 1);
    assert_eq!(state.last_ingested_ledger, 5);
    assert_eq!(state.latest_history_ledger, 5);
}

#[tokio::test]
async fn test_inconsistent_database_is_never_repaired() {
    let q = MockHistoryQ::new();
    q.set_state(5, 1, 3).await;

    let err = run(&q, MemoryLedgerSource::with_payments(1..=8), ingest_config())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Inconsistent {
            last_ingested: 5,
            last_history: 3
        }
    ));
    let state = q.state().await;
    assert_eq!(state.commits, 0);
    assert_eq!(state.last_ingested_ledger, 5);
}

#[tokio::test]
async fn test_injected_evaluator_drives_start() {
    let q = MockHistoryQ::new();
    q.set_state(5, 1, 3).await;
    let (_tx, rx) = watch::channel(false);

    let outcome = System::new(
        Arc::new(q.clone()),
        Box::new(MemoryLedgerSource::with_payments(1..=6)),
        ingest_config(),
    )
    .with_evaluator(|_| DbState::Valid)
    .run(rx)
    .await
    .unwrap();

    assert_eq!(outcome.ledgers_ingested, 1);
    assert_eq!(outcome.last_ingested_ledger, 6);
}

#[tokio::test]
async fn test_sequence_gap_halts() {
    let q = MockHistoryQ::new();
    let records = [1, 2, 4]
        .into_iter()
        .map(|seq| LedgerBuilder::new(seq).payment("GA", "GB", 1).build())
        .collect();

    let err = run(&q, MemoryLedgerSource::new(records), ingest_config())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::SequenceGap {
            expected: 3,
            actual: 4
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(q.state().await.last_ingested_ledger, 2);
}

#[tokio::test]
async fn test_transient_commit_failure_retries_same_ledger() {
    let q = MockHistoryQ::new();
    q.set_state(1, 1, 1).await;
    q.fail_next_commits(2);

    let outcome = run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap();

    assert_eq!(outcome.ledgers_ingested, 2);
    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 3);
    assert_eq!(state.rollbacks, 2);
    assert_eq!(history_inserts(&state.statements, "history_ledgers"), 2);
}

#[tokio::test]
async fn test_persistent_failure_leaves_checkpoint() {
    let q = MockHistoryQ::new();
    q.set_state(1, 1, 1).await;
    q.fail_next_statements(100);

    let err = run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 1);
    assert!(state.statements.is_empty());
    // One attempt plus three retries, each rolled back.
    assert_eq!(state.rollbacks, 4);
}

#[tokio::test]
async fn test_transient_source_failure_reopens_source() {
    let q = MockHistoryQ::new();
    let source = MemoryLedgerSource::with_payments(1..=3);
    let handle = source.clone();
    source.fail_next_reads(1);

    let outcome = run(&q, source, ingest_config()).await.unwrap();

    assert_eq!(outcome.last_ingested_ledger, 3);
    assert_eq!(handle.prepared_from(), vec![0, 0]);
}

#[tokio::test]
async fn test_lock_held_by_another_writer() {
    let q = MockHistoryQ::new();
    let lock = q.lock_handle();
    let _guard = lock.lock().await;

    let err = run(&q, MemoryLedgerSource::with_payments(1..=2), ingest_config())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::LockHeld));
    assert_eq!(q.state().await.commits, 0);
}

#[tokio::test]
async fn test_cancelled_before_streaming() {
    let q = MockHistoryQ::new();
    q.set_state(1, 1, 1).await;
    let (_cancel_tx, cancel_rx) = watch::channel(true);

    let outcome = System::new(
        Arc::new(q.clone()),
        Box::new(MemoryLedgerSource::with_payments(1..=3)),
        ingest_config(),
    )
    .run(cancel_rx)
    .await
    .unwrap();

    assert_eq!(outcome.reason, StopReason::Cancelled);
    assert_eq!(outcome.ledgers_ingested, 0);
    assert_eq!(q.state().await.last_ingested_ledger, 1);
}

#[tokio::test]
async fn test_filters_limit_history_rows_only() {
    let q = MockHistoryQ::new();
    q.set_filter_rules(vec![FilterRule {
        name: "account".to_string(),
        enabled: true,
        rules: serde_json::json!({ "account_whitelist": ["GWATCHED"] }),
    }])
    .await;
    let records = vec![
        LedgerBuilder::new(1).payment("GA", "GB", 1).build(),
        LedgerBuilder::new(2).payment("GWATCHED", "GB", 1).build(),
    ];

    let outcome = run(&q, MemoryLedgerSource::new(records), ingest_config())
        .await
        .unwrap();

    assert_eq!(outcome.stats.transactions, 2);
    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 2);
    assert_eq!(history_inserts(&state.statements, "history_ledgers"), 2);
    assert_eq!(history_inserts(&state.statements, "history_transactions"), 1);
}

#[tokio::test]
async fn test_checkpoint_state_seeds_verification() {
    let dir = tempfile::tempdir().unwrap();
    let q = MockHistoryQ::new();
    let checkpoint = write_checkpoint(
        dir.path(),
        3,
        &[
            account_entry("GA", DEFAULT_BALANCE, 3),
            account_entry("GB", DEFAULT_BALANCE, 3),
        ],
    );
    let config = IngestConfig {
        verify_changes: true,
        checkpoint: Some(checkpoint),
        ..ingest_config()
    };
    let (_tx, rx) = watch::channel(false);
    let mut system = System::new(
        Arc::new(q.clone()),
        Box::new(MemoryLedgerSource::with_payments(1..=5)),
        config,
    );

    let outcome = system.run(rx).await.unwrap();

    assert_eq!(outcome.ledgers_ingested, 2);
    assert_eq!(outcome.last_ingested_ledger, 5);
    assert_eq!(system.verifier().map(|v| v.len()), Some(2));
    let state = q.state().await;
    assert_eq!(history_inserts(&state.statements, "accounts"), 3);
}

#[tokio::test]
async fn test_change_of_unknown_entry_halts() {
    let dir = tempfile::tempdir().unwrap();
    let q = MockHistoryQ::new();
    let checkpoint = write_checkpoint(dir.path(), 3, &[account_entry("GA", DEFAULT_BALANCE, 3)]);
    let config = IngestConfig {
        verify_changes: true,
        checkpoint: Some(checkpoint),
        ..ingest_config()
    };

    let err = run(&q, MemoryLedgerSource::with_payments(1..=5), config)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Verify { ledger: 4, .. }));
    assert_eq!(q.state().await.last_ingested_ledger, 3);
}

#[tokio::test]
async fn test_restart_verifies_against_state_tables() {
    let q = MockHistoryQ::new();
    q.set_state(2, 1, 2).await;
    q.set_state_keys(vec![
        account_entry("GA", DEFAULT_BALANCE, 2).ledger_key().unwrap(),
        account_entry("GB", DEFAULT_BALANCE, 2).ledger_key().unwrap(),
    ])
    .await;
    let config = IngestConfig {
        verify_changes: true,
        ..ingest_config()
    };
    let (_tx, rx) = watch::channel(false);
    let mut system = System::new(
        Arc::new(q.clone()),
        Box::new(MemoryLedgerSource::with_payments(1..=4)),
        config,
    );

    let outcome = system.run(rx).await.unwrap();

    assert_eq!(outcome.ledgers_ingested, 2);
    assert_eq!(system.verifier().map(|v| v.len()), Some(2));
}

#[tokio::test]
async fn test_restart_with_missing_state_entry_halts() {
    let q = MockHistoryQ::new();
    q.set_state(2, 1, 2).await;
    q.set_state_keys(vec![account_entry("GA", DEFAULT_BALANCE, 2)
        .ledger_key()
        .unwrap()])
        .await;
    let config = IngestConfig {
        verify_changes: true,
        ..ingest_config()
    };

    let err = run(&q, MemoryLedgerSource::with_payments(1..=4), config)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Verify { ledger: 3, .. }));
    assert_eq!(q.state().await.last_ingested_ledger, 2);
}

fn watched_only() -> Vec<FilterRule> {
    vec![FilterRule {
        name: "account".to_string(),
        enabled: true,
        rules: serde_json::json!({ "account_whitelist": ["GWATCHED"] }),
    }]
}

#[tokio::test]
async fn test_filter_rules_read_is_retried() {
    let q = MockHistoryQ::new();
    q.set_filter_rules(watched_only()).await;
    q.fail_next_filter_reads(2);
    let records = vec![
        LedgerBuilder::new(1).payment("GA", "GB", 1).build(),
        LedgerBuilder::new(2).payment("GWATCHED", "GB", 1).build(),
    ];

    run(&q, MemoryLedgerSource::new(records), ingest_config())
        .await
        .unwrap();

    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 2);
    assert_eq!(history_inserts(&state.statements, "history_transactions"), 1);
}

#[tokio::test]
async fn test_unreadable_filter_rules_halt_before_streaming() {
    let q = MockHistoryQ::new();
    q.set_state(1, 1, 1).await;
    q.set_filter_rules(watched_only()).await;
    q.fail_next_filter_reads(100);

    let err = run(&q, MemoryLedgerSource::with_payments(1..=3), ingest_config())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let state = q.state().await;
    assert_eq!(state.last_ingested_ledger, 1);
    assert_eq!(state.commits, 0);
}
