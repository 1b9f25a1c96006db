//! ledger-ingest - ledger history ingestion
//!
//! Streams ledger close records from an archive or a running node,
//! derives history and state rows from them, and commits each ledger to a
//! relational history database together with the ingestion checkpoint.

pub mod codec;
pub mod config;
pub mod filters;
pub mod history;
pub mod ingest;
pub mod ledger;
pub mod processors;
pub mod proto;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
