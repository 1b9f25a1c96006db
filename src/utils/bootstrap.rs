//! Bootstrap utilities for the ledger-ingest binaries.

use std::future::Future;

use backon::Retryable;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::retry::connection_backoff;
use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the `LEDGER_INGEST_LOG` environment variable.
///
/// Defaults to "info" level if it is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config file path from the first command line argument, if any.
pub fn parse_config_path() -> Option<String> {
    std::env::args().nth(1)
}

/// Connect to `what` with exponential backoff.
///
/// Returns the last error once the attempts run out.
pub async fn connect_with_retry<T, E, F, Fut>(what: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let client = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay| {
            warn!(service = what, error = %e, delay = ?delay, "Connection failed, retrying");
        })
        .await?;
    info!(service = what, "Connected");
    Ok(client)
}
