//! Holder of the currently served snapshot, with optional JSON persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::model::{PollutionRecord, Snapshot, SnapshotStatus};

#[derive(thiserror::Error, Debug)]
/// Errors raised while persisting or loading a snapshot.
pub enum StoreError {
    /// Filesystem failure.
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON encoding or decoding failure.
    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serves one immutable snapshot at a time and swaps it atomically on commit.
///
/// Readers clone an `Arc` to the current snapshot, so a reader holds either
/// the old or the new snapshot for as long as it needs it. Writers are
/// serialized; a snapshot is persisted before it becomes visible.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl SnapshotStore {
    /// Store without persistence, starting uninitialized.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_snapshot(Snapshot::uninitialized(), None)
    }

    /// Store persisted at `path`, starting from the snapshot found there.
    ///
    /// A missing or unreadable file leaves the store uninitialized.
    #[must_use]
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let snapshot = match Self::load(&path) {
            Ok(snapshot) => {
                info!(
                    path = %path.display(),
                    version = snapshot.version,
                    status = %snapshot.status,
                    records = snapshot.records.len(),
                    "loaded persisted snapshot"
                );
                snapshot
            }
            Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no persisted snapshot yet");
                Snapshot::uninitialized()
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring unreadable snapshot");
                Snapshot::uninitialized()
            }
        };
        Self::with_snapshot(snapshot, Some(path))
    }

    fn with_snapshot(snapshot: Snapshot, path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            path,
        }
    }

    /// Read a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Snapshot, StoreError> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Latest committed snapshot, or the uninitialized placeholder.
    #[must_use]
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the served snapshot with a fresh one holding `records`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if persisting fails; the served snapshot is then unchanged.
    pub fn commit(&self, records: Vec<PollutionRecord>) -> Result<Arc<Snapshot>, StoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.current();
        let snapshot = Arc::new(Snapshot {
            version: previous.version + 1,
            generated_at: Some(Utc::now()),
            status: SnapshotStatus::Fresh,
            records,
        });

        self.persist(&snapshot)?;
        self.swap(Arc::clone(&snapshot));

        info!(
            version = snapshot.version,
            records = snapshot.records.len(),
            "committed snapshot"
        );
        Ok(snapshot)
    }

    /// Tag the served snapshot as a stale fallback without changing its contents.
    ///
    /// An uninitialized store stays uninitialized.
    pub fn mark_stale_fallback(&self) -> Arc<Snapshot> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.current();
        if previous.status != SnapshotStatus::Fresh {
            return previous;
        }

        let stale = Arc::new(Snapshot {
            status: SnapshotStatus::StaleFallback,
            ..Snapshot::clone(&previous)
        });
        if let Err(err) = self.persist(&stale) {
            warn!(%err, "failed to persist stale-fallback status");
        }
        self.swap(Arc::clone(&stale));

        warn!(version = stale.version, "serving previous snapshot as stale fallback");
        stale
    }

    fn swap(&self, snapshot: Arc<Snapshot>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
