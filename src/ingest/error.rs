//! Errors of the ingestion driver.

use crate::history::StorageError;
use crate::ledger::LedgerError;
use crate::processors::ProcessorError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger source error: {0}")]
    Source(#[from] LedgerError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Change verification failed at ledger {ledger}: {reason}")]
    Verify { ledger: u32, reason: String },

    #[error(
        "History is inconsistent: last ingested ledger {last_ingested}, \
         latest history ledger {last_history}; operator intervention required"
    )]
    Inconsistent { last_ingested: u32, last_history: u32 },

    #[error("Ledger sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u32, actual: u32 },

    #[error("Another process holds the ingest lock")]
    LockHeld,
}

impl IngestError {
    /// Whether the ledger may succeed if ingested again.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Storage(e) => e.is_transient(),
            IngestError::Source(e) => e.is_transient(),
            IngestError::Processor(ProcessorError::Storage(e)) => e.is_transient(),
            IngestError::Processor(ProcessorError::Ledger(e)) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
