//! Single-writer ingestion lock.
//!
//! Only one process may advance the checkpoint of a database. The lock is
//! held for as long as the guard lives and released on drop, including when
//! the process dies:
//!
//! - file-backed SQLite uses an OS file lock next to the database,
//! - in-memory SQLite uses an in-process mutex,
//! - PostgreSQL uses a session advisory lock on a dedicated connection.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::{Result, StorageError};

enum Held {
    File {
        #[allow(dead_code)] // retained to keep the lock file open
        file: File,
        path: PathBuf,
    },
    Process(#[allow(dead_code)] OwnedMutexGuard<()>),
    #[cfg(feature = "postgres")]
    Advisory(Option<sqlx::pool::PoolConnection<sqlx::Postgres>>),
}

/// Guard proving this process is the single writer.
pub struct IngestLock {
    held: Held,
}

impl std::fmt::Debug for IngestLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.held {
            Held::File { .. } => "file",
            Held::Process(_) => "process",
            #[cfg(feature = "postgres")]
            Held::Advisory(_) => "advisory",
        };
        f.debug_struct("IngestLock").field("kind", &kind).finish()
    }
}

impl IngestLock {
    /// Exclusive lock on `path`, created if missing. `Ok(None)` when another
    /// process holds it.
    pub fn try_file(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!(path = %path.display(), "Acquired ingest lock");
                Ok(Some(Self {
                    held: Held::File {
                        file,
                        path: path.to_path_buf(),
                    },
                }))
            }
            Err(e) if is_contended(&e) => {
                debug!(path = %path.display(), "Ingest lock held by another process");
                Ok(None)
            }
            Err(e) => Err(StorageError::Lock(format!(
                "failed to lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Lock shared by every holder of `mutex` within this process.
    pub fn try_process(mutex: &Arc<Mutex<()>>) -> Option<Self> {
        mutex.clone().try_lock_owned().ok().map(|guard| Self {
            held: Held::Process(guard),
        })
    }

    /// Session advisory lock on `key`, held by a connection taken out of the pool.
    #[cfg(feature = "postgres")]
    pub async fn try_advisory(pool: &sqlx::PgPool, key: i64) -> Result<Option<Self>> {
        use sqlx::Row;

        let mut conn = pool.acquire().await?;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        let locked: bool = row.get("locked");
        if !locked {
            debug!(key, "Ingest advisory lock held by another session");
            return Ok(None);
        }
        info!(key, "Acquired ingest advisory lock");
        Ok(Some(Self {
            held: Held::Advisory(Some(conn)),
        }))
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind() || e.kind() == io::ErrorKind::WouldBlock
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        match &mut self.held {
            Held::File { path, .. } => {
                debug!(path = %path.display(), "Released ingest lock");
            }
            Held::Process(_) => {}
            #[cfg(feature = "postgres")]
            Held::Advisory(conn) => {
                // Closing the session releases the lock; returning the
                // connection to the pool would keep it.
                if let Some(conn) = conn.take() {
                    drop(conn.detach());
                    debug!("Released ingest advisory lock");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.lock");

        let first = IngestLock::try_file(&path).unwrap();
        assert!(first.is_some());
        assert!(IngestLock::try_file(&path).unwrap().is_none());

        drop(first);
        assert!(IngestLock::try_file(&path).unwrap().is_some());
    }

    #[test]
    fn test_process_lock_is_exclusive() {
        let mutex = Arc::new(Mutex::new(()));
        let first = IngestLock::try_process(&mutex);
        assert!(first.is_some());
        assert!(IngestLock::try_process(&mutex).is_none());
        drop(first);
        assert!(IngestLock::try_process(&mutex).is_some());
    }
}
