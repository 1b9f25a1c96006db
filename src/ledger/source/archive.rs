//! Replay of archived ledgers.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{debug, info};

use super::{FramedLedgerStream, LedgerSource};
use crate::ledger::{LedgerCloseRecord, LedgerError, Result};

/// Reads framed ledger records from a file, in file order.
///
/// `prepare` reopens the file, so the source can restart from any ledger.
pub struct ArchiveLedgerSource {
    path: PathBuf,
    max_frame_size: usize,
    stream: Option<FramedLedgerStream<BufReader<File>>>,
}

impl ArchiveLedgerSource {
    pub fn new(path: impl Into<PathBuf>, max_frame_size: usize) -> Self {
        Self {
            path: path.into(),
            max_frame_size,
            stream: None,
        }
    }
}

#[async_trait]
impl LedgerSource for ArchiveLedgerSource {
    async fn prepare(&mut self, from: u32) -> Result<()> {
        self.stream = None;
        let file = File::open(&self.path).await?;
        let mut stream = FramedLedgerStream::new(BufReader::new(file), self.max_frame_size);
        stream.skip_to(from).await?;
        info!(path = %self.path.display(), from, "Archive source prepared");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_ledger(&mut self) -> Result<Option<LedgerCloseRecord>> {
        let stream = self.stream.as_mut().ok_or(LedgerError::Closed)?;
        stream.next().await
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!(path = %self.path.display(), "Archive source closed");
        }
        Ok(())
    }
}
