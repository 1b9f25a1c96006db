//! ledger-ingest: history ingestion service
//!
//! Streams ledgers from the configured source into the history database
//! until the source is drained or the process receives Ctrl-C.
//!
//! ## Configuration
//! - First argument or LEDGER_INGEST_CONFIG: YAML config file
//! - LEDGER_INGEST__<SECTION>__<KEY>: overrides (e.g. LEDGER_INGEST__STORAGE__TYPE)
//! - LEDGER_INGEST_LOG: log filter (default "info")

use tokio::sync::watch;
use tracing::{error, info, warn};

use ledger_ingest::config::Config;
use ledger_ingest::history::connect;
use ledger_ingest::ingest::System;
use ledger_ingest::ledger::source;
use ledger_ingest::utils::bootstrap::{connect_with_retry, init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        storage = ?config.storage.storage_type,
        source = ?config.source.source_type,
        "Starting ledger-ingest"
    );

    let q = connect_with_retry("history database", || connect(&config.storage)).await?;
    let source = source::from_config(&config.source);
    let mut system = System::new(q, source, config.ingest.clone());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown requested, finishing current ledger");
        let _ = cancel_tx.send(true);
    });

    match system.run(cancel_rx).await {
        Ok(outcome) => {
            info!(
                reason = ?outcome.reason,
                last_ingested = outcome.last_ingested_ledger,
                ledgers = outcome.ledgers_ingested,
                stats = ?outcome.stats.to_map(),
                "ledger-ingest finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "ledger-ingest failed");
            Err(e.into())
        }
    }
}
