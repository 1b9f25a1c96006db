//! Shared helpers for the ingestion integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ledger_ingest::codec::write_framed;
use ledger_ingest::config::{CheckpointConfig, IngestConfig, RetryConfig};
use ledger_ingest::ledger::LedgerCloseRecord;
use ledger_ingest::proto::LedgerEntry;
use ledger_ingest::test_utils::TEST_PASSPHRASE;

/// Ingest configuration with millisecond retry delays.
pub fn ingest_config() -> IngestConfig {
    IngestConfig {
        network_passphrase: TEST_PASSPHRASE.to_string(),
        retry: RetryConfig {
            min_delay_ms: 1,
            max_delay_ms: 5,
            max_retries: 3,
        },
        ..IngestConfig::default()
    }
}

/// Write `records` as a framed archive file in `dir`.
pub fn write_archive(dir: &Path, records: &[LedgerCloseRecord]) -> PathBuf {
    let path = dir.join("ledgers.bin");
    let mut buf = Vec::new();
    for record in records {
        write_framed(&mut buf, record.meta()).unwrap();
    }
    std::fs::write(&path, buf).unwrap();
    path
}

/// Write `entries` as checkpoint state for `ledger`.
pub fn write_checkpoint(dir: &Path, ledger: u32, entries: &[LedgerEntry]) -> CheckpointConfig {
    let path = dir.join(format!("checkpoint-{}.bin", ledger));
    let mut buf = Vec::new();
    for entry in entries {
        write_framed(&mut buf, entry).unwrap();
    }
    std::fs::write(&path, buf).unwrap();
    CheckpointConfig {
        path: path.display().to_string(),
        ledger,
    }
}
