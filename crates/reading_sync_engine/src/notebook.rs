//! Resolution of the canonical application notebook.

use crate::checkpoint::{CheckpointHandle, CheckpointStore};
use crate::error::{RemoteOperation, SyncError, SyncResult};
use crate::remote::{NoteService, RemoteGuard};
use tracing::{debug, info, warn};

/// Outcome of checking the cached notebook guid.
enum CachedNotebook {
    Valid,
    /// Renamed or gone; a new notebook is needed.
    Stale(String),
    /// The fetch failed, so the notebook may still be fine.
    Unknown(String),
}

/// Finds or creates the single notebook all managed notes live in.
///
/// Resolution order:
/// 1. A cached guid is fetched; it is trusted only if the notebook still
///    carries the canonical name. A renamed or missing notebook is
///    replaced by a fresh one.
/// 2. Without a cached guid, or when the fetch itself failed, notebooks are
///    listed and the first exact name match is adopted.
/// 3. Failing both, a notebook with the canonical name is created.
///
/// The resolved guid is written to the checkpoint. Existing notebooks are
/// never renamed or deleted.
pub(crate) struct NotebookResolver<'a, R: NoteService> {
    remote: &'a R,
    guard: &'a RemoteGuard,
    name: &'a str,
}

impl<'a, R: NoteService> NotebookResolver<'a, R> {
    pub(crate) fn new(remote: &'a R, guard: &'a RemoteGuard, name: &'a str) -> Self {
        Self {
            remote,
            guard,
            name,
        }
    }

    /// Returns the canonical notebook guid, creating the notebook if needed.
    pub(crate) async fn ensure_notebook<C: CheckpointStore>(
        &self,
        checkpoint: &mut CheckpointHandle<C>,
    ) -> SyncResult<String> {
        let cached = checkpoint.notebook_guid().map(str::to_owned);
        let lookup = match cached {
            Some(guid) => match self.verify_cached(&guid).await? {
                CachedNotebook::Valid => {
                    debug!(notebook = %guid, "cached notebook verified");
                    return Ok(guid);
                }
                CachedNotebook::Stale(reason) => Err(reason),
                CachedNotebook::Unknown(reason) => self
                    .find_by_name()
                    .await?
                    .map_err(|list_error| format!("{reason}; {list_error}")),
            },
            None => self.find_by_name().await?,
        };
        let lookup_error = match lookup {
            Ok(guid) => {
                checkpoint.set_notebook_guid(&guid)?;
                info!(notebook = %guid, name = self.name, "adopted existing notebook");
                return Ok(guid);
            }
            Err(reason) => reason,
        };

        let create = self.remote.create_notebook(self.name);
        match self.guard.call(RemoteOperation::CreateNotebook, create).await {
            Ok(notebook) => {
                checkpoint.set_notebook_guid(&notebook.guid)?;
                info!(notebook = %notebook.guid, name = %notebook.name, "created notebook");
                Ok(notebook.guid)
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(err) => {
                warn!(error = %err, "failed to create notebook");
                Err(SyncError::ContainerUnavailable {
                    list_error: lookup_error,
                    create_error: err.to_string(),
                })
            }
        }
    }

    /// Checks that `guid` still names the canonical notebook.
    async fn verify_cached(&self, guid: &str) -> SyncResult<CachedNotebook> {
        let fetch = self.remote.get_notebook(guid);
        match self.guard.call(RemoteOperation::GetNotebook, fetch).await {
            Ok(Some(notebook)) if notebook.name == self.name => Ok(CachedNotebook::Valid),
            Ok(Some(notebook)) => {
                warn!(notebook = %guid, name = %notebook.name, "cached notebook was renamed");
                Ok(CachedNotebook::Stale(format!(
                    "cached notebook {guid} is now named {:?}",
                    notebook.name
                )))
            }
            Ok(None) => {
                warn!(notebook = %guid, "cached notebook no longer exists");
                Ok(CachedNotebook::Stale(format!(
                    "cached notebook {guid} no longer exists"
                )))
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(err) => {
                warn!(notebook = %guid, error = %err, "cached notebook lookup failed");
                Ok(CachedNotebook::Unknown(err.to_string()))
            }
        }
    }

    /// Looks the canonical notebook up by exact name.
    async fn find_by_name(&self) -> SyncResult<Result<String, String>> {
        let list = self.remote.list_notebooks();
        match self.guard.call(RemoteOperation::ListNotebooks, list).await {
            Ok(notebooks) => Ok(notebooks
                .into_iter()
                .find(|notebook| notebook.name == self.name)
                .map(|notebook| notebook.guid)
                .ok_or_else(|| format!("no notebook named {:?}", self.name))),
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(err) => {
                warn!(error = %err, "failed to list notebooks");
                Ok(Err(err.to_string()))
            }
        }
    }
}
