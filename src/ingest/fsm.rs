//! Ingestion state machine.
//!
//! ```text
//! Start -> Resume ------------> Stream -> Stop
//!       -> Rebuild -> Resume ---^
//!       -> ReportInconsistent (terminal)
//! ```
//!
//! Every ledger is written in one database transaction together with the
//! checkpoint advance. A failed ledger leaves the checkpoint untouched and is
//! retried with backoff when the failure is transient.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, Retryable};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::db_state::{check_db_state, evaluate_db_state, DbState, StateEvaluator};
use super::runner::{LedgerOutcome, ProcessorRunner};
use super::verify::StateVerifier;
use super::{IngestError, Result, CURRENT_INGEST_VERSION};
use crate::config::{IngestConfig, RetryConfig};
use crate::filters::{FilterChain, Filters};
use crate::history::{IngestTx, IngestionQ, LedgerBatch};
use crate::ledger::source::LedgerSource;
use crate::ledger::{CheckpointChangeReader, LedgerCloseRecord};
use crate::processors::StatsLedgerTransactionProcessorResults;
use crate::utils::retry::ingest_backoff;
use crate::utils::sequence_validator::{validate_next_ledger, SequenceValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Start,
    Resume { last_ingested: u32 },
    Rebuild,
    ReportInconsistent { last_ingested: u32, last_history: u32 },
    Stream { last_ingested: u32 },
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source has no more ledgers.
    #[default]
    EndOfData,
    Cancelled,
}

/// Summary of one run of the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub last_ingested_ledger: u32,
    pub ledgers_ingested: u64,
    /// Derived tables were truncated and re-derived during this run.
    pub rebuilt: bool,
    pub stats: StatsLedgerTransactionProcessorResults,
}

/// The ingestion system: one writer over one history database.
pub struct System {
    q: Arc<dyn IngestionQ>,
    source: Box<dyn LedgerSource>,
    config: IngestConfig,
    runner: ProcessorRunner,
    filters: Filters,
    evaluator: StateEvaluator,
    current_version: u32,
    verifier: Option<StateVerifier>,
    bootstrapped: bool,
}

impl System {
    pub fn new(q: Arc<dyn IngestionQ>, source: Box<dyn LedgerSource>, config: IngestConfig) -> Self {
        let runner = ProcessorRunner::new(&config);
        Self {
            q,
            source,
            config,
            runner,
            filters: Filters::new(),
            evaluator: evaluate_db_state,
            current_version: CURRENT_INGEST_VERSION,
            verifier: None,
            bootstrapped: false,
        }
    }

    pub fn with_evaluator(mut self, evaluator: StateEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Version stamped on rebuild and compared at start.
    pub fn with_ingest_version(mut self, version: u32) -> Self {
        self.current_version = version;
        self
    }

    pub fn with_runner(mut self, runner: ProcessorRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Known-key set, when change verification is active.
    pub fn verifier(&self) -> Option<&StateVerifier> {
        self.verifier.as_ref()
    }

    /// Run until the source is drained, `cancel` turns true, or a fatal
    /// error occurs.
    pub async fn run(&mut self, mut cancel: watch::Receiver<bool>) -> Result<RunOutcome> {
        let _lock = self
            .q
            .try_lock_ingestion()
            .await?
            .ok_or(IngestError::LockHeld)?;
        debug!("Acquired ingest lock");

        let mut outcome = RunOutcome::default();
        let mut state = IngestState::Start;
        loop {
            debug!(state = ?state, "Ingestion state");
            state = match state {
                IngestState::Start => self.start().await?,
                IngestState::Rebuild => {
                    outcome.rebuilt = true;
                    let last_ingested = self.bootstrap().await?;
                    IngestState::Resume { last_ingested }
                }
                IngestState::ReportInconsistent {
                    last_ingested,
                    last_history,
                } => {
                    error!(
                        last_ingested,
                        last_history,
                        "History does not match the checkpoint; refusing to ingest"
                    );
                    return Err(IngestError::Inconsistent {
                        last_ingested,
                        last_history,
                    });
                }
                IngestState::Resume { last_ingested } => self.resume(last_ingested).await?,
                IngestState::Stream { last_ingested } => {
                    self.stream(last_ingested, &mut cancel, &mut outcome).await?
                }
                IngestState::Stop => break,
            };
        }

        self.source.close().await?;
        info!(
            reason = ?outcome.reason,
            last_ingested = outcome.last_ingested_ledger,
            ledgers = outcome.ledgers_ingested,
            "Ingestion stopped"
        );
        Ok(outcome)
    }

    async fn start(&self) -> Result<IngestState> {
        let report = check_db_state(self.q.as_ref(), self.current_version, self.evaluator).await?;
        let input = report.input;
        info!(
            state = %report.state,
            last_ingested = input.last_ingested_ledger,
            ingest_version = input.ingest_version,
            last_history = input.last_history_ledger,
            "Evaluated database state"
        );

        Ok(match report.state {
            DbState::Empty => IngestState::Resume { last_ingested: 0 },
            DbState::Valid => IngestState::Resume {
                last_ingested: input.last_ingested_ledger,
            },
            DbState::NeedsRebuild => {
                info!(
                    stored = input.ingest_version,
                    current = input.current_version,
                    "Ingest version changed, rebuilding derived tables"
                );
                IngestState::Rebuild
            }
            DbState::Inconsistent => IngestState::ReportInconsistent {
                last_ingested: input.last_ingested_ledger,
                last_history: input.last_history_ledger,
            },
        })
    }

    async fn resume(&mut self, mut last_ingested: u32) -> Result<IngestState> {
        if last_ingested == 0 && !self.bootstrapped {
            last_ingested = self.bootstrap().await?;
        }
        if self.config.verify_changes && self.verifier.is_none() {
            let q = &self.q;
            let keys = retry_transient(&self.config.retry, last_ingested, || async {
                Ok(q.get_state_keys().await?)
            })
            .await?;
            let verifier = StateVerifier::from_state_keys(keys);
            info!(
                last_ingested,
                known_entries = verifier.len(),
                "Seeded change verification from the state tables"
            );
            self.verifier = Some(verifier);
        }

        let from = self.start_from(last_ingested);
        self.source.prepare(from).await?;
        info!(last_ingested, from, "Resuming ingestion");
        Ok(IngestState::Stream { last_ingested })
    }

    /// Truncate derived tables, stamp the current version and load the
    /// configured checkpoint state. Returns the new checkpoint.
    async fn bootstrap(&mut self) -> Result<u32> {
        let this = &*self;
        let (last_ingested, verifier) =
            retry_transient(&this.config.retry, 0, || this.bootstrap_once()).await?;
        self.verifier = verifier;
        self.bootstrapped = true;
        info!(
            last_ingested,
            version = self.current_version,
            known_entries = self.verifier.as_ref().map(StateVerifier::len),
            "Bootstrapped history"
        );
        Ok(last_ingested)
    }

    async fn bootstrap_once(&self) -> Result<(u32, Option<StateVerifier>)> {
        let mut verifier = self.config.verify_changes.then(StateVerifier::new);
        let mut checkpoint = None;
        if let Some(config) = &self.config.checkpoint {
            let mut reader = CheckpointChangeReader::open(&config.path, config.ledger).await?;
            let (batch, keys) = self
                .runner
                .run_checkpoint_processors(&mut reader, config.ledger, verifier.as_ref())
                .await?;
            if let (Some(verifier), Some(keys)) = (verifier.as_mut(), keys) {
                verifier.apply(keys);
            }
            checkpoint = Some((config.ledger, batch));
        }

        let mut tx = self.q.begin().await?;
        let result = write_bootstrap(tx.as_mut(), self.current_version, checkpoint.as_mut()).await;
        finish_tx(tx, result).await?;
        Ok((checkpoint.map_or(0, |(ledger, _)| ledger), verifier))
    }

    /// First ledger to ask the source for after `last_ingested`.
    fn start_from(&self, last_ingested: u32) -> u32 {
        if last_ingested == 0 {
            self.config.start_ledger
        } else {
            last_ingested.saturating_add(1)
        }
    }

    async fn stream(
        &mut self,
        mut last_ingested: u32,
        cancel: &mut watch::Receiver<bool>,
        outcome: &mut RunOutcome,
    ) -> Result<IngestState> {
        let (q, loader) = (self.q.as_ref(), &self.filters);
        let filters = retry_transient(&self.config.retry, last_ingested, || async {
            Ok(loader.get_filters(q).await?)
        })
        .await?;
        info!(last_ingested, filters = ?filters, "Streaming ledgers");
        outcome.last_ingested_ledger = last_ingested;

        loop {
            let from = self.start_from(last_ingested);
            let record = tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    info!(last_ingested, "Ingestion cancelled");
                    outcome.reason = StopReason::Cancelled;
                    return Ok(IngestState::Stop);
                }
                record = self.next_ledger(from) => record?,
            };
            let Some(record) = record else {
                info!(last_ingested, "Ledger source drained");
                outcome.reason = StopReason::EndOfData;
                return Ok(IngestState::Stop);
            };

            let sequence = record.sequence();
            match validate_next_ledger(last_ingested, sequence) {
                SequenceValidationResult::Valid => {}
                SequenceValidationResult::AlreadyIngested { .. } => {
                    debug!(ledger = sequence, last_ingested, "Skipping ingested ledger");
                    continue;
                }
                SequenceValidationResult::Gap { expected, actual } => {
                    error!(expected, actual, "Ledger sequence gap");
                    return Err(IngestError::SequenceGap { expected, actual });
                }
            }

            let started = Instant::now();
            let this = &*self;
            let mut ingested = retry_transient(&this.config.retry, sequence, || {
                this.ingest_ledger(last_ingested, &record, &filters)
            })
            .await
            .inspect_err(|e| error!(ledger = sequence, error = %e, "Ingestion halted"))?;

            if let (Some(verifier), Some(keys)) = (self.verifier.as_mut(), ingested.keys.take()) {
                verifier.apply(keys);
            }
            last_ingested = sequence;
            outcome.last_ingested_ledger = sequence;
            outcome.ledgers_ingested += 1;
            outcome.stats.merge(&ingested.stats);

            info!(
                ledger = sequence,
                transactions = ingested.stats.transactions,
                operations = ingested.stats.operations,
                filtered = ingested.transactions_filtered,
                duration_ms = started.elapsed().as_millis() as u64,
                stats = ?ingested.stats.to_map(),
                "Ingested ledger"
            );
        }
    }

    /// Next record from the source. Transient read failures reopen the
    /// source at `from` after a backoff delay.
    async fn next_ledger(&mut self, from: u32) -> Result<Option<LedgerCloseRecord>> {
        let mut delays = ingest_backoff(&self.config.retry).build();
        loop {
            let err = match self.source.next_ledger().await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e.into()),
            };
            let Some(delay) = delays.next() else {
                return Err(err.into());
            };
            warn!(ledger = from, error = %err, delay = ?delay, "Ledger source failed, reopening");
            tokio::time::sleep(delay).await;
            if let Err(e) = self.source.prepare(from).await {
                if !e.is_transient() {
                    return Err(e.into());
                }
                warn!(ledger = from, error = %e, "Failed to reopen ledger source");
            }
        }
    }

    /// Derive and write one ledger. Each attempt derives a fresh batch.
    async fn ingest_ledger(
        &self,
        last_ingested: u32,
        record: &LedgerCloseRecord,
        filters: &FilterChain,
    ) -> Result<LedgerOutcome> {
        let mut outcome = self
            .runner
            .run_all_processors_on_ledger(record, filters, self.verifier.as_ref())
            .await?;

        let mut tx = self.q.begin().await?;
        let result = write_ledger(tx.as_mut(), &mut outcome.batch, last_ingested, outcome.sequence).await;
        finish_tx(tx, result).await?;
        Ok(outcome)
    }
}

async fn write_ledger(
    tx: &mut dyn IngestTx,
    batch: &mut LedgerBatch,
    last_ingested: u32,
    sequence: u32,
) -> Result<()> {
    batch.exec(&mut *tx).await?;
    tx.advance_last_ledger_ingest(last_ingested, sequence).await?;
    Ok(())
}

async fn write_bootstrap(
    tx: &mut dyn IngestTx,
    version: u32,
    checkpoint: Option<&mut (u32, LedgerBatch)>,
) -> Result<()> {
    tx.truncate_derived_tables().await?;
    tx.reset_checkpoint(version).await?;
    if let Some((ledger, batch)) = checkpoint {
        batch.exec(&mut *tx).await?;
        tx.advance_last_ledger_ingest(0, *ledger).await?;
    }
    Ok(())
}

/// Commit on success, otherwise roll back and keep the original error.
async fn finish_tx(tx: Box<dyn IngestTx>, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(tx.commit().await?),
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Retry `work` while it fails with a retryable error.
async fn retry_transient<T, F, Fut>(config: &RetryConfig, ledger: u32, work: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    work.retry(ingest_backoff(config))
        .when(|e: &IngestError| e.is_retryable())
        .notify(|e: &IngestError, delay: Duration| {
            warn!(ledger, error = %e, delay = ?delay, "Retrying after transient failure");
        })
        .await
}

/// Resolves once `rx` reads `true`. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
