//! Entity processors.
//!
//! Processors turn one ledger's transactions and changes into rows of a
//! [`LedgerBatch`]. They are pure with respect to the database: nothing is
//! written until the ingestion driver executes the batch, so reprocessing the
//! same ledger yields the same rows.
//!
//! Operation kinds, transaction-meta versions and asset-contract events are
//! each handled by a registry of variants. A variant either claims an input
//! or declines it; an input no variant claims is a dispatch miss, which is
//! logged and skipped rather than failing the ledger.

use crate::history::{LedgerBatch, StorageError};
use crate::ledger::{Change, LedgerCloseRecord, LedgerError, LedgerTransaction};

pub mod amount;
mod assets;
mod balances;
pub mod contract_events;
mod ledgers;
pub mod meta;
pub mod operations;
mod participants;
mod stats;
pub mod toid;
mod transactions;

pub use assets::AssetsProcessor;
pub use balances::BalancesProcessor;
pub use contract_events::{
    AssetContractEvent, AssetEventType, ContractEventProcessor, ContractEventRegistry,
    ContractEventVariant,
};
pub use ledgers::LedgerProcessor;
pub use meta::{MetaRegistry, MetaVariant};
pub use operations::{
    Details, OperationContext, OperationProcessor, OperationRegistry, OperationVariant,
    EXPERIMENTAL_PROTOCOL_VERSION,
};
pub use participants::ParticipantsProcessor;
pub use stats::{StatsLedgerTransactionProcessor, StatsLedgerTransactionProcessorResults};
pub use toid::Toid;
pub use transactions::TransactionProcessor;

/// Errors raised while deriving rows.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Malformed {kind} operation {index} in transaction {tx_hash}: {reason}")]
    MalformedOperation {
        tx_hash: String,
        index: usize,
        kind: &'static str,
        reason: String,
    },

    #[error("Malformed contract event in transaction {tx_hash}: {reason}")]
    MalformedEvent { tx_hash: String, reason: String },

    #[error("Id out of range: ledger {ledger}, transaction {tx_order}, operation {op_order}")]
    IdOverflow {
        ledger: u32,
        tx_order: u32,
        op_order: u32,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Derives rows from each transaction of a ledger.
pub trait LedgerTransactionProcessor: Send {
    fn name(&self) -> &'static str;

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        batch: &mut LedgerBatch,
    ) -> Result<()>;

    /// Called once after the last transaction of the ledger.
    fn finish(&mut self, _ledger: &LedgerCloseRecord, _batch: &mut LedgerBatch) -> Result<()> {
        Ok(())
    }
}

/// Derives state rows from entry changes.
pub trait ChangeProcessor: Send {
    fn name(&self) -> &'static str;

    fn process_change(&mut self, change: &Change, batch: &mut LedgerBatch) -> Result<()>;
}
