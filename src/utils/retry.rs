//! Retry utilities: backoff builders for ingestion.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

/// Backoff for retrying one ledger after a transient failure.
///
/// Delays and attempt count come from the `ingest.retry` configuration.
pub fn ingest_backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(config.min_delay())
        .with_max_delay(config.max_delay())
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Backoff for connecting to the history database at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::Retryable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_ingest_backoff_gives_up_after_max_retries() {
        let config = RetryConfig {
            min_delay_ms: 1,
            max_delay_ms: 2,
            max_retries: 3,
        };
        let attempts = AtomicUsize::new(0);
        let result: Result<(), &str> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("busy")
        })
        .retry(ingest_backoff(&config))
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
