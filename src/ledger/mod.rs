//! Ledger close records and the readers that unpack them.
//!
//! A [`LedgerCloseRecord`] is produced by a [`source::LedgerSource`] and owned
//! by the ingestion driver for one cycle. From it, a [`LedgerChangeReader`]
//! yields entry mutations in canonical order and a
//! [`LedgerTransactionReader`] yields transactions in application order.

use chrono::{DateTime, Utc};

use crate::codec::FrameError;
use crate::proto::{LedgerCloseMeta, LedgerHeader};

mod change;
mod change_reader;
mod hash;
mod key;
pub mod source;
mod transaction;

pub use change::{changes_from_entry_changes, Change, ChangeKind, ChangeReason};
pub use change_reader::{ChangeReader, CheckpointChangeReader, LedgerChangeReader};
pub use hash::{asset_contract_id, network_id, transaction_hash};
pub use key::KeyBytes;
pub use transaction::{LedgerTransaction, LedgerTransactionReader};

/// Errors raised while reading or unpacking ledger data.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Malformed ledger {sequence}: {reason}")]
    Malformed { sequence: u32, reason: String },

    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Ledger {requested} is not available from the source (next available: {next})")]
    NotAvailable { requested: u32, next: u32 },

    #[error("Source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source is closed")]
    Closed,
}

impl LedgerError {
    pub(crate) fn malformed(sequence: u32, reason: impl Into<String>) -> Self {
        LedgerError::Malformed {
            sequence,
            reason: reason.into(),
        }
    }

    /// Whether reading again may succeed.
    ///
    /// Only plain I/O failures qualify; anything that reached the decoder is
    /// treated as a property of the data.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Io(_) => true,
            LedgerError::Frame(FrameError::Io(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A validated ledger close record.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCloseRecord {
    header: LedgerHeader,
    meta: LedgerCloseMeta,
}

impl LedgerCloseRecord {
    /// Wrap decoded meta, rejecting records without a usable header.
    pub fn new(meta: LedgerCloseMeta) -> Result<Self> {
        let header = meta
            .header
            .clone()
            .ok_or_else(|| LedgerError::malformed(0, "missing ledger header"))?;
        if header.ledger_seq == 0 {
            return Err(LedgerError::malformed(0, "ledger sequence is zero"));
        }
        if meta.tx_processing.len() != meta.tx_set.len() {
            return Err(LedgerError::malformed(
                header.ledger_seq,
                format!(
                    "{} transactions in set but {} results",
                    meta.tx_set.len(),
                    meta.tx_processing.len()
                ),
            ));
        }
        Ok(Self { header, meta })
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    pub fn sequence(&self) -> u32 {
        self.header().ledger_seq
    }

    pub fn protocol_version(&self) -> u32 {
        self.header().protocol_version
    }

    pub fn close_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.header().close_time as i64, 0).unwrap_or_default()
    }

    pub fn transaction_count(&self) -> usize {
        self.meta.tx_processing.len()
    }

    pub fn meta(&self) -> &LedgerCloseMeta {
        &self.meta
    }

    pub fn into_meta(self) -> LedgerCloseMeta {
        self.meta
    }
}
