//! Ping log abstraction.
//!
//! Every ping the study sends is also kept here so the final summary can
//! embed the complete sequence. The log is append-only; records leave it only
//! through a bulk [`PingLog::clear`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use studykit_host::PingRecord;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StudyError};

/// Trait for ping storage.
///
/// Implementations must support:
/// - Append-only storage in append order
/// - Reading back every record
/// - Bulk clearing
/// - Closing exactly once; later operations fail with a storage error
#[async_trait]
pub trait PingLog: Send + Sync {
    /// Append a record.
    async fn append(&self, record: PingRecord) -> Result<()>;

    /// Every record, in append order.
    async fn all(&self) -> Result<Vec<PingRecord>>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    /// Release the storage handle. Idempotent.
    async fn close(&self) -> Result<()>;
}

fn closed_error() -> StudyError {
    StudyError::storage("ping log is closed")
}

/// For each predicate in order, the first record it matches that no earlier
/// predicate claimed.
///
/// Fails with [`StudyError::NotFound`] naming the first predicate (by index)
/// that matches nothing.
pub fn filter_first_match(
    records: &[PingRecord],
    predicates: &[&dyn Fn(&PingRecord) -> bool],
) -> Result<Vec<PingRecord>> {
    let mut claimed = vec![false; records.len()];
    let mut matches = Vec::with_capacity(predicates.len());

    for (idx, predicate) in predicates.iter().enumerate() {
        let found = records
            .iter()
            .enumerate()
            .find(|&(i, r)| !claimed[i] && predicate(r));
        match found {
            Some((i, record)) => {
                claimed[i] = true;
                matches.push(record.clone());
            }
            None => {
                return Err(StudyError::not_found(format!(
                    "no ping matches predicate {idx}"
                )));
            }
        }
    }
    Ok(matches)
}

// ─── In-Memory ───────────────────────────────────────────────────────

/// In-memory implementation for tests and simulations.
#[derive(Debug, Default)]
pub struct InMemoryPingLog {
    records: RwLock<Vec<PingRecord>>,
    closed: AtomicBool,
}

impl InMemoryPingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (for testing)
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the log is empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        Ok(())
    }
}

#[async_trait]
impl PingLog for InMemoryPingLog {
    async fn append(&self, record: PingRecord) -> Result<()> {
        self.ensure_open()?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<PingRecord>> {
        self.ensure_open()?;
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ─── JSONL File ──────────────────────────────────────────────────────

/// File-backed log, one JSON object per line. Survives restarts.
///
/// The file is opened per operation; the lock serializes operations and
/// holds the closed flag.
#[derive(Debug)]
pub struct JsonlPingLog {
    path: PathBuf,
    closed: Mutex<bool>,
}

impl JsonlPingLog {
    /// Create a log at `path`. The file and its directory are created on the
    /// first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            closed: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn parse_line(line: &str) -> Result<Option<PingRecord>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| StudyError::storage(format!("corrupt ping log line: {e}")))
    }
}

#[async_trait]
impl PingLog for JsonlPingLog {
    async fn append(&self, record: PingRecord) -> Result<()> {
        let closed = self.closed.lock().await;
        if *closed {
            return Err(closed_error());
        }
        self.ensure_parent_dir().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<PingRecord>> {
        let closed = self.closed.lock().await;
        if *closed {
            return Err(closed_error());
        }

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if let Some(record) = Self::parse_line(&line)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn clear(&self) -> Result<()> {
        let closed = self.closed.lock().await;
        if *closed {
            return Err(closed_error());
        }

        match OpenOptions::new().write(true).truncate(true).open(&self.path).await {
            Ok(file) => file.sync_all().await?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().await;
        if !*closed {
            *closed = true;
            debug!(path = %self.path.display(), "Closed ping log");
        }
        Ok(())
    }
}
