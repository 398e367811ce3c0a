//! Remote note service abstraction.

use crate::error::{RemoteOperation, SyncError, SyncResult};
use crate::record::{NoteDraft, NoteMetadata, Notebook, RemoteNote};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The remote note service handles every call the engine makes over the network.
///
/// This trait abstracts the service SDK, allowing for different implementations
/// (a real account, an in-memory service for testing, etc.). Implementations
/// report failures as [`SyncError::RemoteCallFailed`] tagged with the
/// matching [`RemoteOperation`].
#[async_trait]
pub trait NoteService: Send + Sync {
    /// Returns true if a session is currently authenticated.
    fn is_authenticated(&self) -> bool;

    /// Runs the service's authentication flow.
    async fn authenticate(&self) -> SyncResult<()>;

    /// Drops the current session.
    fn unauthenticate(&self);

    /// Lists every notebook of the account.
    async fn list_notebooks(&self) -> SyncResult<Vec<Notebook>>;

    /// Fetches one notebook, or `None` if no notebook has this guid.
    async fn get_notebook(&self, guid: &str) -> SyncResult<Option<Notebook>>;

    /// Creates a (non-default) notebook named `name`.
    async fn create_notebook(&self, name: &str) -> SyncResult<Notebook>;

    /// Creates a note and returns it with its assigned guid.
    async fn create_note(&self, draft: &NoteDraft) -> SyncResult<RemoteNote>;

    /// Updates the note addressed by `draft.guid`.
    async fn update_note(&self, draft: &NoteDraft) -> SyncResult<RemoteNote>;

    /// Deletes the note `guid`.
    ///
    /// Returns false if the note did not exist, e.g. because another client
    /// already deleted it.
    async fn delete_note(&self, guid: &str) -> SyncResult<bool>;

    /// Returns the account-wide update counter.
    ///
    /// The counter never decreases and changes whenever any remote content
    /// changes.
    async fn update_count(&self) -> SyncResult<i64>;

    /// Counts the live notes in a notebook.
    async fn find_note_count(&self, notebook_guid: &str) -> SyncResult<u32>;

    /// Lists metadata (guid and update time) of notes in a notebook.
    async fn find_notes_metadata(
        &self,
        notebook_guid: &str,
        max_results: u32,
    ) -> SyncResult<Vec<NoteMetadata>>;

    /// Fetches a full note including its content, without resource data.
    async fn get_note(&self, guid: &str) -> SyncResult<RemoteNote>;
}

/// Bounds every remote call of a pass by the configured deadline and the
/// owner's cancellation token.
#[derive(Debug, Clone)]
pub(crate) struct RemoteGuard {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl RemoteGuard {
    pub(crate) fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Fails with [`SyncError::Cancelled`] once the owner shut down.
    pub(crate) fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Awaits one remote call to completion.
    pub(crate) async fn call<T, F>(&self, operation: RemoteOperation, call: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        self.check_cancelled()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            result = Self::with_deadline(self.timeout, operation, call) => result,
        }
    }

    async fn with_deadline<T, F>(
        timeout: Option<Duration>,
        operation: RemoteOperation,
        call: F,
    ) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        match timeout {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| SyncError::Timeout { operation })?,
            None => call.await,
        }
    }
}
