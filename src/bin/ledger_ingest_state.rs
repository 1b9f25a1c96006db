//! ledger-ingest-state: print the evaluated state of the history database
//!
//! Reads the checkpoint and history counters without taking the ingest lock
//! and prints them, with the state the ingestion service would start from,
//! as JSON. Exits non-zero when the database is inconsistent.

use tracing::error;

use ledger_ingest::config::Config;
use ledger_ingest::history::connect;
use ledger_ingest::ingest::{check_db_state, evaluate_db_state, DbState, CURRENT_INGEST_VERSION};
use ledger_ingest::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let q = connect(&config.storage).await?;
    let report = check_db_state(q.as_ref(), CURRENT_INGEST_VERSION, evaluate_db_state).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.state == DbState::Inconsistent {
        std::process::exit(2);
    }
    Ok(())
}
