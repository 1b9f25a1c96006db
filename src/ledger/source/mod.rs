//! Sources of ledger close records.
//!
//! Two implementations share the [`LedgerSource`] contract:
//!
//! - [`ArchiveLedgerSource`] replays a file of framed records.
//! - [`LiveLedgerSource`] spawns a node process and reads framed records
//!   from its standard output.
//!
//! Reading is strictly sequential. A source owns its file or process and
//! releases it on [`LedgerSource::close`] or when dropped.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::trace;

use super::{LedgerCloseRecord, LedgerError, Result};
use crate::codec::FrameReader;
use crate::config::{SourceConfig, SourceType};
use crate::proto::LedgerCloseMeta;

mod archive;
mod live;

pub use archive::ArchiveLedgerSource;
pub use live::{LiveLedgerSource, LiveSourceConfig};

#[async_trait]
pub trait LedgerSource: Send {
    /// Position the source so the next record returned is ledger `from`.
    ///
    /// `from == 0` means "the first ledger the source has". May be called
    /// again to restart from a different ledger.
    async fn prepare(&mut self, from: u32) -> Result<()>;

    /// Next ledger, or `Ok(None)` once no more data is available.
    async fn next_ledger(&mut self) -> Result<Option<LedgerCloseRecord>>;

    /// Release the underlying file or process.
    async fn close(&mut self) -> Result<()>;
}

/// Source selected by configuration.
pub fn from_config(config: &SourceConfig) -> Box<dyn LedgerSource> {
    match config.source_type {
        SourceType::Archive => Box::new(ArchiveLedgerSource::new(
            &config.archive.path,
            config.max_frame_size,
        )),
        SourceType::Live => Box::new(LiveLedgerSource::new(LiveSourceConfig {
            command: config.live.command.clone(),
            args: config.live.args.clone(),
            max_frame_size: config.max_frame_size,
        })),
    }
}

/// Shared positioning logic for framed record streams.
pub(crate) struct FramedLedgerStream<R> {
    frames: FrameReader<R>,
    /// First record not yet returned, kept after skipping to `from`.
    peeked: Option<LedgerCloseRecord>,
}

impl<R: AsyncRead + Unpin + Send> FramedLedgerStream<R> {
    pub(crate) fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            frames: FrameReader::with_max_frame_size(inner, max_frame_size),
            peeked: None,
        }
    }

    async fn read_record(&mut self) -> Result<Option<LedgerCloseRecord>> {
        match self.frames.read_message::<LedgerCloseMeta>().await? {
            Some(meta) => Ok(Some(LedgerCloseRecord::new(meta)?)),
            None => Ok(None),
        }
    }

    /// Skip records before `from`. The stream must then hold `from` exactly,
    /// or end.
    pub(crate) async fn skip_to(&mut self, from: u32) -> Result<()> {
        loop {
            let Some(record) = self.read_record().await? else {
                return Ok(());
            };
            let seq = record.sequence();
            if from != 0 && seq < from {
                trace!(ledger = seq, target = from, "Skipping ledger before start");
                continue;
            }
            if from != 0 && seq > from {
                return Err(LedgerError::NotAvailable {
                    requested: from,
                    next: seq,
                });
            }
            self.peeked = Some(record);
            return Ok(());
        }
    }

    pub(crate) async fn next(&mut self) -> Result<Option<LedgerCloseRecord>> {
        if let Some(record) = self.peeked.take() {
            return Ok(Some(record));
        }
        self.read_record().await
    }
}
