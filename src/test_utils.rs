//! Test utilities and mock implementations.
//!
//! [`LedgerBuilder`] produces well-formed ledger close records, and
//! [`MockHistoryQ`] stands in for the history database so the driver can be
//! exercised without SQL.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use crate::history::{
    Backend, FilterRule, IngestLock, IngestTx, IngestionQ, Result as StorageResult, Session,
    StorageError,
};
use crate::ledger::source::LedgerSource;
use crate::ledger::{
    asset_contract_id, network_id, transaction_hash, LedgerCloseRecord, LedgerError,
    Result as LedgerResult,
};
use crate::proto::ledger_entry::Data;
use crate::proto::operation::Body;
use crate::proto::{
    AccountEntry, Asset, ContractEvent, ContractEventType, CreateAccountOp, HelloWorldOp,
    InvokeHostFunctionOp, LedgerCloseMeta, LedgerEntry, LedgerEntryChange, LedgerEntryChangeType,
    LedgerEntryType, LedgerHeader, LedgerKey, Operation, OperationMeta, OperationResult,
    OperationType, PaymentOp, ScVal, SorobanTransactionMeta, TransactionEnvelope, TransactionMeta,
    TransactionResult, TransactionResultCode, TransactionResultMeta, TransactionResultPair,
    TrustLineEntry, UpgradeEntryMeta,
};

pub const TEST_PASSPHRASE: &str = "Test Ledger Network ; 2024";

/// Protocol version of built ledgers unless overridden.
pub const TEST_PROTOCOL_VERSION: u32 = 22;

/// Balance of accounts the builder has not seen before.
pub const DEFAULT_BALANCE: i64 = 10_000_000_000;

const BASE_FEE: i64 = 100;

pub fn account_entry(account_id: &str, balance: i64, last_modified: u32) -> LedgerEntry {
    LedgerEntry {
        last_modified_ledger_seq: last_modified,
        entry_type: LedgerEntryType::Account as i32,
        data: Some(Data::Account(AccountEntry {
            account_id: account_id.to_string(),
            balance,
            ..Default::default()
        })),
    }
}

pub fn trustline_entry(
    account_id: &str,
    asset: &Asset,
    balance: i64,
    limit: i64,
    last_modified: u32,
) -> LedgerEntry {
    LedgerEntry {
        last_modified_ledger_seq: last_modified,
        entry_type: LedgerEntryType::Trustline as i32,
        data: Some(Data::Trustline(TrustLineEntry {
            account_id: account_id.to_string(),
            asset: Some(asset.clone()),
            balance,
            limit,
            flags: 1,
        })),
    }
}

/// Contract event emitted by the wrapper contract of `asset` on the test
/// network. The asset topic is appended to `topics`.
pub fn asset_event(asset: &Asset, mut topics: Vec<ScVal>, data: ScVal) -> ContractEvent {
    topics.push(ScVal::string(asset.canonical()));
    ContractEvent {
        contract_id: asset_contract_id(&network_id(TEST_PASSPHRASE), asset).to_vec(),
        event_type: ContractEventType::Contract as i32,
        topics,
        data: Some(data),
    }
}

fn raw_change(change_type: LedgerEntryChangeType, entry: LedgerEntry) -> LedgerEntryChange {
    LedgerEntryChange {
        change_type: change_type as i32,
        entry: Some(entry),
        removed_key: None,
    }
}

fn ledger_hash(sequence: u32) -> Vec<u8> {
    if sequence == 0 {
        return vec![0; 32];
    }
    Sha256::digest(format!("ledger-{}", sequence).as_bytes()).to_vec()
}

struct PendingTx {
    envelope: TransactionEnvelope,
    result: TransactionResultMeta,
}

/// Builds one ledger close record, transaction by transaction.
///
/// Account balances are tracked across the transactions of the builder so
/// every `State` record matches the previous write of the same account.
pub struct LedgerBuilder {
    sequence: u32,
    protocol_version: u32,
    meta_version: i32,
    txs: Vec<PendingTx>,
    accounts: BTreeMap<String, (i64, u32)>,
    next_seq_num: i64,
    evicted: Vec<LedgerEntry>,
    upgrades: Vec<UpgradeEntryMeta>,
    network_id: [u8; 32],
}

impl LedgerBuilder {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            protocol_version: TEST_PROTOCOL_VERSION,
            meta_version: 3,
            txs: Vec::new(),
            accounts: BTreeMap::new(),
            next_seq_num: i64::from(sequence) << 32,
            evicted: Vec::new(),
            upgrades: Vec::new(),
            network_id: network_id(TEST_PASSPHRASE),
        }
    }

    pub fn protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Transaction-meta version of transactions added after this call.
    pub fn meta_version(mut self, version: i32) -> Self {
        self.meta_version = version;
        self
    }

    pub fn payment(self, from: &str, to: &str, amount: i64) -> Self {
        self.native_payment(from, to, amount, true)
    }

    pub fn failed_payment(self, from: &str, to: &str, amount: i64) -> Self {
        self.native_payment(from, to, amount, false)
    }

    fn native_payment(mut self, from: &str, to: &str, amount: i64, success: bool) -> Self {
        let op = Operation {
            source_account: None,
            op_type: OperationType::Payment as i32,
            body: Some(Body::Payment(PaymentOp {
                destination: to.to_string(),
                asset: Some(Asset::native()),
                amount,
            })),
        };
        let fee = self.adjust(from, -BASE_FEE);
        let changes = if success {
            let mut changes = self.adjust(from, -amount);
            changes.extend(self.adjust(to, amount));
            changes
        } else {
            Vec::new()
        };
        self.push(from, fee, op, changes, success, Vec::new());
        self
    }

    /// Payment of a credit asset; trust lines are not modelled, so it
    /// changes no entries.
    pub fn credit_payment(
        self,
        from: &str,
        to: &str,
        code: &str,
        issuer: &str,
        amount: i64,
    ) -> Self {
        self.credit(from, to, code, issuer, amount, true)
    }

    pub fn failed_credit_payment(
        self,
        from: &str,
        to: &str,
        code: &str,
        issuer: &str,
        amount: i64,
    ) -> Self {
        self.credit(from, to, code, issuer, amount, false)
    }

    fn credit(
        mut self,
        from: &str,
        to: &str,
        code: &str,
        issuer: &str,
        amount: i64,
        success: bool,
    ) -> Self {
        let op = Operation {
            source_account: None,
            op_type: OperationType::Payment as i32,
            body: Some(Body::Payment(PaymentOp {
                destination: to.to_string(),
                asset: Some(Asset::credit(code, issuer)),
                amount,
            })),
        };
        let fee = self.adjust(from, -BASE_FEE);
        self.push(from, fee, op, Vec::new(), success, Vec::new());
        self
    }

    pub fn create_account(mut self, source: &str, destination: &str, balance: i64) -> Self {
        let op = Operation {
            source_account: None,
            op_type: OperationType::CreateAccount as i32,
            body: Some(Body::CreateAccount(CreateAccountOp {
                destination: destination.to_string(),
                starting_balance: balance,
            })),
        };
        let fee = self.adjust(source, -BASE_FEE);
        let mut changes = self.adjust(source, -balance);
        self.accounts
            .insert(destination.to_string(), (balance, self.sequence));
        changes.push(raw_change(
            LedgerEntryChangeType::Created,
            account_entry(destination, balance, self.sequence),
        ));
        self.push(source, fee, op, changes, true, Vec::new());
        self
    }

    pub fn hello_world(mut self, source: &str) -> Self {
        let op = Operation {
            source_account: None,
            op_type: OperationType::HelloWorld as i32,
            body: Some(Body::HelloWorld(HelloWorldOp {})),
        };
        let fee = self.adjust(source, -BASE_FEE);
        self.push(source, fee, op, Vec::new(), true, Vec::new());
        self
    }

    /// Successful contract invocation emitting `events`, placed where the
    /// current meta version keeps them.
    pub fn invoke_contract(mut self, source: &str, events: Vec<ContractEvent>) -> Self {
        let contract_id = events
            .first()
            .map(|e| e.contract_id.clone())
            .unwrap_or_else(|| vec![0; 32]);
        let op = Operation {
            source_account: None,
            op_type: OperationType::InvokeHostFunction as i32,
            body: Some(Body::InvokeHostFunction(InvokeHostFunctionOp {
                contract_id,
                function_name: "transfer".to_string(),
                args: vec![ScVal::address(source)],
            })),
        };
        let fee = self.adjust(source, -BASE_FEE);
        self.push(source, fee, op, Vec::new(), true, events);
        self
    }

    /// Remove `entry` at the end of the ledger, as state expiry does.
    pub fn evict(mut self, entry: LedgerEntry) -> Self {
        self.evicted.push(entry);
        self
    }

    /// Network upgrade applying the raw `changes` as given.
    pub fn upgrade(mut self, changes: Vec<LedgerEntryChange>) -> Self {
        self.upgrades.push(UpgradeEntryMeta {
            upgrade: vec![self.upgrades.len() as u8],
            changes,
        });
        self
    }

    /// `State` and `Updated` records moving `account` by `delta`.
    fn adjust(&mut self, account: &str, delta: i64) -> Vec<LedgerEntryChange> {
        let (balance, modified) = self
            .accounts
            .get(account)
            .copied()
            .unwrap_or((DEFAULT_BALANCE, 1));
        let next = balance + delta;
        self.accounts
            .insert(account.to_string(), (next, self.sequence));
        vec![
            raw_change(
                LedgerEntryChangeType::State,
                account_entry(account, balance, modified),
            ),
            raw_change(
                LedgerEntryChangeType::Updated,
                account_entry(account, next, self.sequence),
            ),
        ]
    }

    fn push(
        &mut self,
        source: &str,
        fee_changes: Vec<LedgerEntryChange>,
        op: Operation,
        op_changes: Vec<LedgerEntryChange>,
        success: bool,
        events: Vec<ContractEvent>,
    ) {
        self.next_seq_num += 1;
        let envelope = TransactionEnvelope {
            source_account: source.to_string(),
            fee: BASE_FEE,
            seq_num: self.next_seq_num,
            operations: vec![op],
            memo: String::new(),
        };
        let hash = transaction_hash(&self.network_id, &envelope);

        let mut meta = TransactionMeta {
            v: self.meta_version,
            ..Default::default()
        };
        if success {
            let mut op_meta = OperationMeta {
                changes: op_changes,
                events: Vec::new(),
            };
            if self.meta_version >= 4 {
                op_meta.events = events;
            } else if !events.is_empty() {
                meta.soroban_meta = Some(SorobanTransactionMeta {
                    events,
                    return_value: None,
                });
            }
            meta.operations.push(op_meta);
        }

        let code = if success {
            TransactionResultCode::TxSuccess
        } else {
            TransactionResultCode::TxFailed
        };
        let result = TransactionResultMeta {
            result: Some(TransactionResultPair {
                transaction_hash: hash.to_vec(),
                result: Some(TransactionResult {
                    fee_charged: BASE_FEE,
                    code: code as i32,
                    op_results: vec![OperationResult {
                        code: if success { 0 } else { -1 },
                    }],
                }),
            }),
            fee_processing: fee_changes,
            tx_apply_processing: Some(meta),
        };
        self.txs.push(PendingTx { envelope, result });
    }

    pub fn build(self) -> LedgerCloseRecord {
        let fee_pool = BASE_FEE * self.txs.len() as i64;
        let header = LedgerHeader {
            ledger_seq: self.sequence,
            close_time: 1_700_000_000 + u64::from(self.sequence) * 5,
            protocol_version: self.protocol_version,
            ledger_hash: ledger_hash(self.sequence),
            previous_ledger_hash: ledger_hash(self.sequence.saturating_sub(1)),
            total_coins: 1_000_000_000_000_000_000,
            fee_pool,
            base_fee: BASE_FEE as u32,
            base_reserve: 5_000_000,
            max_tx_set_size: 1000,
        };

        // The set is stored in hash order, results in application order.
        let mut tx_set: Vec<TransactionEnvelope> =
            self.txs.iter().map(|t| t.envelope.clone()).collect();
        tx_set.sort_by_key(|env| transaction_hash(&self.network_id, env));

        let meta = LedgerCloseMeta {
            v: 1,
            header: Some(header),
            tx_set,
            tx_processing: self.txs.into_iter().map(|t| t.result).collect(),
            upgrades_processing: self.upgrades,
            evicted_entries: self.evicted,
        };
        LedgerCloseRecord::new(meta).unwrap()
    }
}

/// Ledger source over records held in memory.
#[derive(Clone, Default)]
pub struct MemoryLedgerSource {
    records: Vec<LedgerCloseRecord>,
    cursor: Option<usize>,
    fail_reads: Arc<AtomicUsize>,
    prepared_from: Arc<std::sync::Mutex<Vec<u32>>>,
}

impl MemoryLedgerSource {
    pub fn new(records: Vec<LedgerCloseRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Ledgers `range`, each with one payment.
    pub fn with_payments(range: std::ops::RangeInclusive<u32>) -> Self {
        Self::new(
            range
                .map(|seq| LedgerBuilder::new(seq).payment("GA", "GB", 100).build())
                .collect(),
        )
    }

    /// Fail the next `n` reads with a transient I/O error.
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Every `from` passed to `prepare`, in order.
    pub fn prepared_from(&self) -> Vec<u32> {
        self.prepared_from
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerSource for MemoryLedgerSource {
    async fn prepare(&mut self, from: u32) -> LedgerResult<()> {
        if let Ok(mut prepared) = self.prepared_from.lock() {
            prepared.push(from);
        }
        let index = self
            .records
            .iter()
            .position(|r| from == 0 || r.sequence() >= from)
            .unwrap_or(self.records.len());
        if let Some(record) = self.records.get(index) {
            if from != 0 && record.sequence() > from {
                return Err(LedgerError::NotAvailable {
                    requested: from,
                    next: record.sequence(),
                });
            }
        }
        self.cursor = Some(index);
        Ok(())
    }

    async fn next_ledger(&mut self) -> LedgerResult<Option<LedgerCloseRecord>> {
        let cursor = self.cursor.as_mut().ok_or(LedgerError::Closed)?;
        if take_failure(&self.fail_reads) {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "injected read failure",
            )));
        }
        let record = self.records.get(*cursor).cloned();
        if record.is_some() {
            *cursor += 1;
        }
        Ok(record)
    }

    async fn close(&mut self) -> LedgerResult<()> {
        self.cursor = None;
        Ok(())
    }
}

/// Session that records statements instead of running them.
pub struct RecordingSession {
    backend: Backend,
    statements: Vec<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::with_backend(Backend::Sqlite)
    }

    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            statements: Vec::new(),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for RecordingSession {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute(&mut self, sql: &str) -> StorageResult<u64> {
        self.statements.push(sql.to_string());
        Ok(1)
    }
}

/// Committed state of a [`MockHistoryQ`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockState {
    pub last_ingested_ledger: u32,
    pub ingest_version: u32,
    pub latest_history_ledger: u32,
    pub filter_rules: Vec<FilterRule>,
    /// Keys served as the content of the state tables.
    pub state_keys: Vec<LedgerKey>,
    /// Every committed statement, in order.
    pub statements: Vec<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub truncations: usize,
}

/// In-memory history database.
///
/// Statements are recorded, not interpreted; the history high-water mark
/// follows committed `history_ledgers` inserts.
#[derive(Clone, Default)]
pub struct MockHistoryQ {
    state: Arc<RwLock<MockState>>,
    lock: Arc<Mutex<()>>,
    fail_commits: Arc<AtomicUsize>,
    fail_statements: Arc<AtomicUsize>,
    fail_filter_reads: Arc<AtomicUsize>,
}

impl MockHistoryQ {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_state(&self, last_ingested: u32, version: u32, latest_history: u32) {
        let mut state = self.state.write().await;
        state.last_ingested_ledger = last_ingested;
        state.ingest_version = version;
        state.latest_history_ledger = latest_history;
    }

    pub async fn set_filter_rules(&self, rules: Vec<FilterRule>) {
        self.state.write().await.filter_rules = rules;
    }

    pub async fn set_state_keys(&self, keys: Vec<LedgerKey>) {
        self.state.write().await.state_keys = keys;
    }

    /// Fail the next `n` commits with a transient error.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` filter rule reads with a transient error.
    pub fn fail_next_filter_reads(&self, n: usize) {
        self.fail_filter_reads.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` statements with a transient error.
    pub fn fail_next_statements(&self, n: usize) {
        self.fail_statements.store(n, Ordering::SeqCst);
    }

    pub async fn state(&self) -> MockState {
        self.state.read().await.clone()
    }

    /// Hold the ingest lock as another writer would.
    pub fn lock_handle(&self) -> Arc<Mutex<()>> {
        self.lock.clone()
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn transient() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "injected failure",
    ))
}

#[async_trait]
impl IngestionQ for MockHistoryQ {
    async fn get_last_ledger_ingest_non_blocking(&self) -> StorageResult<u32> {
        Ok(self.state.read().await.last_ingested_ledger)
    }

    async fn get_ingest_version(&self) -> StorageResult<u32> {
        Ok(self.state.read().await.ingest_version)
    }

    async fn get_latest_history_ledger(&self) -> StorageResult<u32> {
        Ok(self.state.read().await.latest_history_ledger)
    }

    async fn get_filter_rules(&self) -> StorageResult<Vec<FilterRule>> {
        if take_failure(&self.fail_filter_reads) {
            return Err(transient());
        }
        Ok(self.state.read().await.filter_rules.clone())
    }

    async fn get_state_keys(&self) -> StorageResult<Vec<LedgerKey>> {
        Ok(self.state.read().await.state_keys.clone())
    }

    async fn begin(&self) -> StorageResult<Box<dyn IngestTx>> {
        let snapshot = self.state.read().await.clone();
        Ok(Box::new(MockIngestTx {
            q: self.clone(),
            last_ingested_ledger: snapshot.last_ingested_ledger,
            ingest_version: snapshot.ingest_version,
            reset: false,
            truncated: false,
            statements: Vec::new(),
        }))
    }

    async fn try_lock_ingestion(&self) -> StorageResult<Option<IngestLock>> {
        Ok(IngestLock::try_process(&self.lock))
    }
}

struct MockIngestTx {
    q: MockHistoryQ,
    last_ingested_ledger: u32,
    ingest_version: u32,
    reset: bool,
    truncated: bool,
    statements: Vec<String>,
}

#[async_trait]
impl Session for MockIngestTx {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> StorageResult<u64> {
        if take_failure(&self.q.fail_statements) {
            return Err(transient());
        }
        self.statements.push(sql.to_string());
        Ok(1)
    }
}

#[async_trait]
impl IngestTx for MockIngestTx {
    async fn get_last_ledger_ingest(&mut self) -> StorageResult<u32> {
        Ok(self.last_ingested_ledger)
    }

    async fn advance_last_ledger_ingest(&mut self, expected: u32, to: u32) -> StorageResult<()> {
        // Compare against committed state, as a row lock would, unless this
        // transaction already rewrote the checkpoint.
        let found = if self.reset {
            self.last_ingested_ledger
        } else {
            self.q.state.read().await.last_ingested_ledger
        };
        if found != expected || self.last_ingested_ledger != expected {
            return Err(StorageError::CheckpointConflict { expected, found });
        }
        self.last_ingested_ledger = to;
        Ok(())
    }

    async fn reset_checkpoint(&mut self, version: u32) -> StorageResult<()> {
        self.last_ingested_ledger = 0;
        self.ingest_version = version;
        self.reset = true;
        Ok(())
    }

    async fn truncate_derived_tables(&mut self) -> StorageResult<()> {
        self.truncated = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MockIngestTx {
            q,
            last_ingested_ledger,
            ingest_version,
            truncated,
            statements,
            ..
        } = *self;
        if take_failure(&q.fail_commits) {
            q.state.write().await.rollbacks += 1;
            return Err(transient());
        }
        let mut state = q.state.write().await;
        if truncated {
            state.latest_history_ledger = 0;
            state.truncations += 1;
        }
        if statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO \"history_ledgers\""))
        {
            state.latest_history_ledger = state.latest_history_ledger.max(last_ingested_ledger);
        }
        state.last_ingested_ledger = last_ingested_ledger;
        state.ingest_version = ingest_version;
        state.statements.extend(statements);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.q.state.write().await.rollbacks += 1;
        Ok(())
    }
}
