//! State ledger: the on-disk record of provisioned devices per run.
//!
//! The ledger is a JSON document with a top-level `run` list. One entry is
//! appended per task when its device becomes active, which makes leaked
//! devices visible after a crash and lets operators resolve a run id back to
//! a device for manual teardown.
//!
//! # Concurrency
//!
//! The ledger file is shared by every invocation on the machine. Each
//! mutation is a read-merge-write performed under an exclusive advisory lock
//! on a sibling `<ledger>.lock` file, and the new document is written to a
//! temporary file in the same directory and renamed over the old one, so a
//! concurrent reader sees either the old or the new document, never a torn
//! one.
//!
//! The lock is a blocking `flock`. Async callers go through
//! [`StateLedger::append_async`] and [`StateLedger::remove_async`], which run
//! the mutation on tokio's blocking pool.
//!
//! # Corruption
//!
//! A missing file is an empty ledger. A file that exists but does not parse
//! is reported as [`BenchError::LedgerCorruption`]; it is never replaced by an
//! empty document.

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};

/// Default ledger file name, relative to the working directory.
pub const DEFAULT_LEDGER_FILE: &str = "config-lock.json";

/// One provisioned device, as recorded when its task reached `DeviceProvisioned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_name: String,
    pub run_id: String,
    pub source: String,
    pub commit: String,
    pub vps_id: String,
    pub ip_address: String,
    pub inventory_file: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    run: Vec<LedgerEntry>,
    /// Unknown top-level keys are carried through rewrites.
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

/// Handle on a ledger file.
#[derive(Debug, Clone)]
pub struct StateLedger {
    path: PathBuf,
}

impl StateLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all entries in append order.
    pub fn load(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.read_document()?.run)
    }

    /// Appends `entry` to the run list.
    pub fn append(&self, entry: LedgerEntry) -> Result<()> {
        let _lock = self.lock()?;
        let mut document = self.read_document()?;
        tracing::debug!(
            ledger = %self.path.display(),
            run_id = %entry.run_id,
            existing = document.run.len(),
            "Appending ledger entry"
        );
        document.run.push(entry);
        self.write_document(&document)
    }

    /// Removes the entry for `run_id` and returns it.
    ///
    /// Returns `Ok(None)` when no entry matches; the file is left untouched.
    pub fn lookup_and_remove(&self, run_id: &str) -> Result<Option<LedgerEntry>> {
        let _lock = self.lock()?;
        let mut document = self.read_document()?;
        let Some(index) = document.run.iter().position(|e| e.run_id == run_id) else {
            return Ok(None);
        };
        let entry = document.run.remove(index);
        self.write_document(&document)?;
        Ok(Some(entry))
    }

    /// [`append`](Self::append) on the blocking pool.
    pub async fn append_async(&self, entry: LedgerEntry) -> Result<()> {
        self.off_thread(move |ledger| ledger.append(entry)).await
    }

    /// [`lookup_and_remove`](Self::lookup_and_remove) on the blocking pool.
    pub async fn remove_async(&self, run_id: &str) -> Result<Option<LedgerEntry>> {
        let run_id = run_id.to_string();
        self.off_thread(move |ledger| ledger.lookup_and_remove(&run_id))
            .await
    }

    async fn off_thread<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StateLedger) -> Result<T> + Send + 'static,
    {
        let ledger = self.clone();
        tokio::task::spawn_blocking(move || op(&ledger))
            .await
            .map_err(|e| BenchError::io(&self.path, std::io::Error::other(e)))?
    }

    fn read_document(&self) -> Result<LedgerDocument> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerDocument::default())
            },
            Err(e) => return Err(BenchError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|e| BenchError::LedgerCorruption {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn write_document(&self, document: &LedgerDocument) -> Result<()> {
        let dir = self.parent_dir();
        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| BenchError::io(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, document).map_err(|e| {
            BenchError::io(tmp.path(), std::io::Error::other(e))
        })?;
        tmp.flush().map_err(|e| BenchError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| BenchError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| BenchError::io(&self.path, e.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<LedgerLock> {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        let lock_path = self.parent_dir().join(name);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| BenchError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| BenchError::io(&lock_path, e))?;
        Ok(LedgerLock { file })
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Exclusive advisory lock, released on drop.
struct LedgerLock {
    file: File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %err, "Failed to release ledger lock");
        }
    }
}
