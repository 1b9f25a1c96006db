//! Ingestion driver.
//!
//! [`System`] evaluates the stored state, rebuilds or resumes, and streams
//! ledgers from a [`LedgerSource`](crate::ledger::source::LedgerSource)
//! through the processors into the history database, one transaction per
//! ledger.

mod db_state;
mod error;
mod fsm;
mod runner;
mod verify;

pub use db_state::{
    check_db_state, evaluate_db_state, read_db_state_input, DbState, DbStateInput, DbStateReport,
    StateEvaluator,
};
pub use error::{IngestError, Result};
pub use fsm::{IngestState, RunOutcome, StopReason, System};
pub use runner::{LedgerOutcome, ProcessorRunner};
pub use verify::{KeyDelta, StateVerifier};

/// Version of the derived tables written by this build. Databases stamped
/// with another version are rebuilt.
pub const CURRENT_INGEST_VERSION: u32 = 1;
