//! Persisted sync settings: the cached notebook guid and the download checkpoint.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Cross-pass sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Guid of the canonical notebook, once resolved.
    #[serde(default)]
    pub notebook_guid: Option<String>,
    /// Remote update counter observed by the last complete download.
    #[serde(default)]
    pub last_update_count: i64,
}

/// Durable storage for the [`SyncCheckpoint`].
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint, returning the default when nothing was saved.
    fn load(&self) -> SyncResult<SyncCheckpoint>;

    /// Persists the checkpoint.
    fn save(&self, checkpoint: &SyncCheckpoint) -> SyncResult<()>;
}

/// An in-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoint: RwLock<SyncCheckpoint>,
}

impl MemoryCheckpointStore {
    /// Creates a store holding the default checkpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `checkpoint`.
    pub fn with_checkpoint(checkpoint: SyncCheckpoint) -> Self {
        Self {
            checkpoint: RwLock::new(checkpoint),
        }
    }

    /// Returns the last saved checkpoint.
    pub fn current(&self) -> SyncCheckpoint {
        self.checkpoint.read().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> SyncResult<SyncCheckpoint> {
        Ok(self.current())
    }

    fn save(&self, checkpoint: &SyncCheckpoint) -> SyncResult<()> {
        *self.checkpoint.write() = checkpoint.clone();
        Ok(())
    }
}

/// A checkpoint store backed by a JSON file.
///
/// Saves go through a sibling temporary file and a rename, so a crash never
/// leaves a half-written checkpoint behind.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the checkpoint file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> SyncResult<SyncCheckpoint> {
        if !self.path.exists() {
            return Ok(SyncCheckpoint::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, checkpoint: &SyncCheckpoint) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_vec_pretty(checkpoint)?)?;
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }
}

/// The lane's exclusively owned copy of the checkpoint.
///
/// Reads are served from memory; every change is written through to the
/// backing store before it becomes visible.
pub(crate) struct CheckpointHandle<C: CheckpointStore> {
    current: SyncCheckpoint,
    store: Arc<C>,
}

impl<C: CheckpointStore> CheckpointHandle<C> {
    pub(crate) fn load(store: Arc<C>) -> SyncResult<Self> {
        let current = store.load()?;
        Ok(Self { current, store })
    }

    pub(crate) fn notebook_guid(&self) -> Option<&str> {
        self.current.notebook_guid.as_deref()
    }

    pub(crate) fn last_update_count(&self) -> i64 {
        self.current.last_update_count
    }

    pub(crate) fn set_notebook_guid(&mut self, guid: &str) -> SyncResult<()> {
        if self.notebook_guid() == Some(guid) {
            return Ok(());
        }
        let mut next = self.current.clone();
        next.notebook_guid = Some(guid.to_string());
        self.commit(next)
    }

    /// Records `update_count` as seen. The checkpoint never moves backwards.
    pub(crate) fn advance_update_count(&mut self, update_count: i64) -> SyncResult<()> {
        if update_count <= self.current.last_update_count {
            return Ok(());
        }
        let mut next = self.current.clone();
        next.last_update_count = update_count;
        self.commit(next)
    }

    fn commit(&mut self, next: SyncCheckpoint) -> SyncResult<()> {
        self.store
            .save(&next)
            .map_err(|e| SyncError::Checkpoint(e.to_string()))?;
        self.current = next;
        Ok(())
    }
}
