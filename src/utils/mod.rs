//! Shared helpers: retry policies, ledger sequence checks and binary setup.

pub mod bootstrap;
pub mod retry;
pub mod sequence_validator;
