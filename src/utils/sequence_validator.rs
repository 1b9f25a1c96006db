//! Ledger sequence validation for the ingestion stream.
//!
//! The checkpoint only moves forward one ledger at a time. A ledger at or
//! below the checkpoint was already committed and is skipped; one beyond the
//! next expected sequence means the source dropped ledgers.

/// Result of checking a ledger against the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceValidationResult {
    /// Ledger is the next one to ingest.
    Valid,
    /// Ledger was already committed.
    AlreadyIngested { last_ingested: u32, actual: u32 },
    /// Ledgers between the checkpoint and this one are missing.
    Gap { expected: u32, actual: u32 },
}

/// Validates `actual` against `last_ingested`.
///
/// With nothing ingested (`last_ingested == 0`) any sequence may start the
/// stream.
pub fn validate_next_ledger(last_ingested: u32, actual: u32) -> SequenceValidationResult {
    if last_ingested == 0 {
        return SequenceValidationResult::Valid;
    }
    if actual <= last_ingested {
        return SequenceValidationResult::AlreadyIngested {
            last_ingested,
            actual,
        };
    }
    let expected = last_ingested.saturating_add(1);
    if actual == expected {
        SequenceValidationResult::Valid
    } else {
        SequenceValidationResult::Gap { expected, actual }
    }
}
