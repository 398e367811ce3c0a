//! The public entry point of the sync engine.

use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::lane::{Lane, LaneHandle, LaneJob, LaneShared, LaneState, SyncStats};
use crate::remote::NoteService;
use crate::store::ReadingStore;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Direction of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// Push pending local changes to the remote service.
    Upload,
    /// Pull remote changes into the local store.
    Download,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Upload => f.write_str("upload"),
            SyncDirection::Download => f.write_str("download"),
        }
    }
}

/// Coordinates two-way sync between a [`ReadingStore`] and a [`NoteService`].
///
/// All passes run on a single serialized lane task, so at most one pass
/// talks to the remote service at a time no matter how many callers sync
/// concurrently. The coordinator must be created inside a Tokio runtime.
///
/// Passes report only how many items they handled. Failures are logged and
/// reflected in [`SyncCoordinator::stats`]; a pass that fails as a whole
/// reports `0`.
pub struct SyncCoordinator<R: NoteService + 'static> {
    remote: Arc<R>,
    lane: LaneHandle,
    shared: Arc<LaneShared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: NoteService + 'static> SyncCoordinator<R> {
    /// Creates a coordinator and starts its lane.
    ///
    /// Fails if the persisted checkpoint cannot be loaded.
    pub fn new<S, C>(
        config: SyncConfig,
        remote: Arc<R>,
        store: Arc<S>,
        checkpoints: Arc<C>,
    ) -> SyncResult<Self>
    where
        S: ReadingStore + 'static,
        C: CheckpointStore + 'static,
    {
        let cancel = CancellationToken::new();
        let shared = Arc::new(LaneShared::new());
        let (lane, task) = Lane::spawn(
            config,
            Arc::clone(&remote),
            store,
            checkpoints,
            cancel.clone(),
            Arc::clone(&shared),
        )?;
        Ok(Self {
            remote,
            lane,
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Returns the remote service.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns true if the remote service holds a session.
    pub fn is_authenticated(&self) -> bool {
        self.remote.is_authenticated()
    }

    /// Authenticates and resolves the application notebook.
    ///
    /// Returns true only if both steps succeeded; sync passes are usable
    /// afterwards.
    pub async fn authenticate(&self) -> bool {
        if let Err(err) = self.remote.authenticate().await {
            warn!(error = %err, "authentication failed");
            return false;
        }
        match self.lane.submit(LaneJob::Resolve).await {
            Ok(_) => {
                info!("authenticated and notebook resolved");
                true
            }
            Err(err) => {
                warn!(error = %err, "notebook bootstrap failed");
                false
            }
        }
    }

    /// Drops the remote session.
    pub fn unauthenticate(&self) {
        self.remote.unauthenticate();
        debug!("unauthenticated");
    }

    /// Runs one pass in `direction` and returns how many items it handled.
    pub async fn sync(&self, direction: SyncDirection) -> usize {
        match self.try_sync(direction).await {
            Ok(count) => count,
            Err(err) => {
                debug!(%direction, error = %err, "sync pass reported no progress");
                0
            }
        }
    }

    /// Runs an upload pass.
    pub async fn sync_up(&self) -> usize {
        self.sync(SyncDirection::Upload).await
    }

    /// Runs a download pass.
    pub async fn sync_down(&self) -> usize {
        self.sync(SyncDirection::Download).await
    }

    /// Runs one pass in `direction`, surfacing why a pass failed as a whole.
    ///
    /// Per-record and per-note failures are still only logged.
    pub async fn try_sync(&self, direction: SyncDirection) -> SyncResult<usize> {
        if !self.remote.is_authenticated() {
            let err = SyncError::NotAuthenticated;
            self.shared.record_skipped(&err);
            debug!(%direction, "not authenticated, skipping sync");
            return Err(err);
        }
        let job = match direction {
            SyncDirection::Upload => LaneJob::Upload,
            SyncDirection::Download => LaneJob::Download,
        };
        self.lane.submit(job).await
    }

    /// Gets the current lane state.
    pub fn state(&self) -> LaneState {
        self.shared.state()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats()
    }

    /// Cancels any running pass and waits for the lane to stop.
    ///
    /// Later syncs report `0`.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "sync lane task failed");
            }
        }
        info!("sync coordinator shut down");
    }
}

impl<R: NoteService + 'static> Drop for SyncCoordinator<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<R: NoteService + 'static> fmt::Debug for SyncCoordinator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
