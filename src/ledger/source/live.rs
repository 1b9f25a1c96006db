//! Ledgers streamed by a running node process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, warn};

use super::{FramedLedgerStream, LedgerSource};
use crate::ledger::{LedgerCloseRecord, LedgerError, Result};

/// Placeholder in node arguments replaced with the first ledger to emit.
pub const START_LEDGER_PLACEHOLDER: &str = "{start_ledger}";

#[derive(Debug, Clone)]
pub struct LiveSourceConfig {
    /// Node executable.
    pub command: String,
    /// Arguments; occurrences of [`START_LEDGER_PLACEHOLDER`] are substituted.
    pub args: Vec<String>,
    pub max_frame_size: usize,
}

/// Spawns the node and reads framed ledgers from its stdout.
///
/// The child is killed when the source is closed, re-prepared, or dropped.
pub struct LiveLedgerSource {
    config: LiveSourceConfig,
    child: Option<Child>,
    stream: Option<FramedLedgerStream<BufReader<ChildStdout>>>,
}

impl LiveLedgerSource {
    pub fn new(config: LiveSourceConfig) -> Self {
        Self {
            config,
            child: None,
            stream: None,
        }
    }

    fn args_for(&self, from: u32) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|a| a.replace(START_LEDGER_PLACEHOLDER, &from.to_string()))
            .collect()
    }

    async fn stop_child(&mut self) -> Result<()> {
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to stop node process");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerSource for LiveLedgerSource {
    async fn prepare(&mut self, from: u32) -> Result<()> {
        self.stop_child().await?;

        let args = self.args_for(from);
        let mut child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "node stdout unavailable")
        })?;
        info!(command = %self.config.command, ?args, from, pid = child.id(), "Node process started");
        self.child = Some(child);

        let mut stream = FramedLedgerStream::new(BufReader::new(stdout), self.config.max_frame_size);
        stream.skip_to(from).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_ledger(&mut self) -> Result<Option<LedgerCloseRecord>> {
        let stream = self.stream.as_mut().ok_or(LedgerError::Closed)?;
        if let Some(record) = stream.next().await? {
            return Ok(Some(record));
        }

        // Output ended: a clean exit is end of data, anything else is an error.
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(LedgerError::Io(std::io::Error::other(format!(
                    "node process exited with {}",
                    status
                ))));
            }
            info!(%status, "Node process finished");
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.stop_child().await
    }
}
