//! The serialized execution lane.
//!
//! Every job that talks to the remote service runs on one Tokio task, one
//! job at a time. Callers submit jobs through a bounded channel and await
//! the result on a oneshot reply. The lane exclusively owns the checkpoint,
//! so the cached notebook guid and the update counter are never read or
//! written by two passes at once.

use crate::checkpoint::{CheckpointHandle, CheckpointStore};
use crate::config::SyncConfig;
use crate::download::Downloader;
use crate::error::{SyncError, SyncResult};
use crate::notebook::NotebookResolver;
use crate::remote::{NoteService, RemoteGuard};
use crate::store::ReadingStore;
use crate::upload::Uploader;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the lane is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// Waiting for work.
    Idle,
    /// Resolving the application notebook.
    Resolving,
    /// Running an upload pass.
    Uploading,
    /// Running a download pass.
    Downloading,
    /// The lane stopped and accepts no more work.
    Closed,
}

impl LaneState {
    /// Returns true while a job is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LaneState::Resolving | LaneState::Uploading | LaneState::Downloading
        )
    }
}

/// Statistics about sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Upload passes that ran to completion.
    pub uploads_completed: u64,
    /// Download passes that ran to completion.
    pub downloads_completed: u64,
    /// Records handled by upload passes.
    pub records_uploaded: u64,
    /// Notes applied by download passes.
    pub notes_downloaded: u64,
    /// Passes that were rejected or aborted before completing.
    pub skipped_passes: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// A unit of work for the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneJob {
    Resolve,
    Upload,
    Download,
}

impl LaneJob {
    fn state(self) -> LaneState {
        match self {
            LaneJob::Resolve => LaneState::Resolving,
            LaneJob::Upload => LaneState::Uploading,
            LaneJob::Download => LaneState::Downloading,
        }
    }
}

struct LaneRequest {
    job: LaneJob,
    respond_to: oneshot::Sender<SyncResult<usize>>,
}

/// State the lane shares with its owner.
#[derive(Debug)]
pub(crate) struct LaneShared {
    state: RwLock<LaneState>,
    stats: RwLock<SyncStats>,
}

impl LaneShared {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(LaneState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    pub(crate) fn state(&self) -> LaneState {
        *self.state.read()
    }

    pub(crate) fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    pub(crate) fn record_skipped(&self, error: &SyncError) {
        let mut stats = self.stats.write();
        stats.skipped_passes += 1;
        stats.last_error = Some(error.to_string());
    }

    fn set_state(&self, state: LaneState) {
        *self.state.write() = state;
    }

    fn record(&self, job: LaneJob, result: &SyncResult<usize>) {
        let mut stats = self.stats.write();
        match (job, result) {
            (LaneJob::Resolve, Ok(_)) => {}
            (LaneJob::Upload, Ok(count)) => {
                stats.uploads_completed += 1;
                stats.records_uploaded += *count as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            (LaneJob::Download, Ok(count)) => {
                stats.downloads_completed += 1;
                stats.notes_downloaded += *count as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            (_, Err(err)) => {
                stats.skipped_passes += 1;
                stats.last_error = Some(err.to_string());
            }
        }
    }
}

/// Sending half of the lane.
#[derive(Debug, Clone)]
pub(crate) struct LaneHandle {
    sender: mpsc::Sender<LaneRequest>,
}

impl LaneHandle {
    /// Queues `job` and waits for its result.
    pub(crate) async fn submit(&self, job: LaneJob) -> SyncResult<usize> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(LaneRequest { job, respond_to })
            .await
            .map_err(|_| SyncError::LaneClosed)?;
        response.await.map_err(|_| SyncError::LaneClosed)?
    }
}

impl std::fmt::Debug for LaneRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneRequest").field("job", &self.job).finish()
    }
}

/// The task that executes lane jobs.
pub(crate) struct Lane<R: NoteService, S: ReadingStore, C: CheckpointStore> {
    config: SyncConfig,
    remote: Arc<R>,
    store: Arc<S>,
    checkpoint: CheckpointHandle<C>,
    guard: RemoteGuard,
    cancel: CancellationToken,
    shared: Arc<LaneShared>,
}

impl<R, S, C> Lane<R, S, C>
where
    R: NoteService + 'static,
    S: ReadingStore + 'static,
    C: CheckpointStore + 'static,
{
    /// Loads the checkpoint and starts the lane on the current Tokio runtime.
    pub(crate) fn spawn(
        config: SyncConfig,
        remote: Arc<R>,
        store: Arc<S>,
        checkpoints: Arc<C>,
        cancel: CancellationToken,
        shared: Arc<LaneShared>,
    ) -> SyncResult<(LaneHandle, JoinHandle<()>)> {
        let checkpoint = CheckpointHandle::load(checkpoints)?;
        let (sender, receiver) = mpsc::channel(config.lane_capacity.max(1));
        let lane = Self {
            guard: RemoteGuard::new(config.remote_timeout, cancel.clone()),
            config,
            remote,
            store,
            checkpoint,
            cancel,
            shared,
        };
        let task = tokio::spawn(lane.run(receiver));
        Ok((LaneHandle { sender }, task))
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<LaneRequest>) {
        debug!("sync lane started");
        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            let result = self.execute(request.job).await;
            if request.respond_to.send(result).is_err() {
                debug!(job = ?request.job, "caller went away before the result");
            }
        }
        receiver.close();
        self.shared.set_state(LaneState::Closed);
        debug!("sync lane stopped");
    }

    async fn execute(&mut self, job: LaneJob) -> SyncResult<usize> {
        let started = Instant::now();
        self.shared.set_state(job.state());

        let result = match self.guard.check_cancelled() {
            Ok(()) => self.dispatch(job).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(count) => info!(
                job = ?job,
                count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "lane job finished"
            ),
            Err(err) => warn!(job = ?job, error = %err, "lane job failed"),
        }
        self.shared.record(job, &result);
        self.shared.set_state(LaneState::Idle);
        result
    }

    async fn dispatch(&mut self, job: LaneJob) -> SyncResult<usize> {
        let resolver = NotebookResolver::new(
            self.remote.as_ref(),
            &self.guard,
            &self.config.notebook_name,
        );
        match job {
            LaneJob::Resolve => resolver
                .ensure_notebook(&mut self.checkpoint)
                .await
                .map(|_| 0),
            LaneJob::Upload => {
                Uploader::new(self.remote.as_ref(), self.store.as_ref(), &self.guard)
                    .upload_pending(&mut self.checkpoint, &resolver)
                    .await
            }
            LaneJob::Download => {
                Downloader::new(self.remote.as_ref(), self.store.as_ref(), &self.guard)
                    .download_changes(&mut self.checkpoint)
                    .await
            }
        }
    }
}
