//! Pulling remote changes into the local store.

use crate::checkpoint::{CheckpointHandle, CheckpointStore};
use crate::error::{RemoteOperation, SyncError, SyncResult};
use crate::record::{ReadingRecord, RemoteNote};
use crate::remote::{NoteService, RemoteGuard};
use crate::store::{ReadingQuery, ReadingStore};
use tracing::{debug, info, warn};

/// Runs one download pass.
///
/// A pass is gated on the account update counter: when it has not moved
/// past the checkpoint nothing else is fetched. The checkpoint only
/// advances after a pass saw every note of the notebook without a failure.
pub(crate) struct Downloader<'a, R: NoteService, S: ReadingStore> {
    remote: &'a R,
    store: &'a S,
    guard: &'a RemoteGuard,
}

impl<'a, R: NoteService, S: ReadingStore> Downloader<'a, R, S> {
    pub(crate) fn new(remote: &'a R, store: &'a S, guard: &'a RemoteGuard) -> Self {
        Self {
            remote,
            store,
            guard,
        }
    }

    /// Fetches changed notes and joins them into the local store.
    ///
    /// Returns how many notes were applied locally.
    pub(crate) async fn download_changes<C: CheckpointStore>(
        &self,
        checkpoint: &mut CheckpointHandle<C>,
    ) -> SyncResult<usize> {
        let Some(notebook_guid) = checkpoint.notebook_guid().map(str::to_owned) else {
            debug!("no notebook resolved yet, skipping download");
            return Ok(0);
        };

        let update_count = self
            .guard
            .call(RemoteOperation::GetSyncState, self.remote.update_count())
            .await?;
        let last_seen = checkpoint.last_update_count();
        if update_count <= last_seen {
            debug!(update_count, last_seen, "remote unchanged");
            return Ok(0);
        }

        let note_count = self
            .guard
            .call(
                RemoteOperation::FindNoteCount,
                self.remote.find_note_count(&notebook_guid),
            )
            .await?;
        if note_count == 0 {
            debug!(notebook = %notebook_guid, "notebook is empty");
            checkpoint.advance_update_count(update_count)?;
            return Ok(0);
        }

        let metadata = self
            .guard
            .call(
                RemoteOperation::FindNotesMetadata,
                self.remote.find_notes_metadata(&notebook_guid, note_count),
            )
            .await?;
        if metadata.is_empty() {
            debug!(notebook = %notebook_guid, note_count, "no note metadata returned");
            checkpoint.advance_update_count(update_count)?;
            return Ok(0);
        }

        let mut downloaded = 0;
        let mut failed = 0;
        for entry in &metadata {
            self.guard.check_cancelled()?;
            match self.download_note(&entry.guid, &notebook_guid).await {
                Ok(()) => downloaded += 1,
                Err(err) if err.is_pass_fatal() => return Err(err),
                Err(err) => {
                    failed += 1;
                    warn!(note = %entry.guid, error = %err, "skipping note");
                }
            }
        }

        if failed == 0 {
            checkpoint.advance_update_count(update_count)?;
        } else {
            info!(failed, last_seen, "download incomplete, checkpoint held");
        }
        info!(downloaded, update_count, "download pass finished");
        Ok(downloaded)
    }

    async fn download_note(&self, guid: &str, notebook_guid: &str) -> SyncResult<()> {
        let note = self
            .guard
            .call(RemoteOperation::GetNote, self.remote.get_note(guid))
            .await?;
        if note.notebook_guid != notebook_guid {
            return Err(SyncError::RecordNotFound(format!(
                "note {guid} moved to notebook {}",
                note.notebook_guid
            )));
        }
        self.join(&note)
    }

    /// Applies `note` to the record mapped to it, or creates one.
    fn join(&self, note: &RemoteNote) -> SyncResult<()> {
        let query = ReadingQuery::by_remote_id(note.guid.as_str());
        if self.store.count(&query)? > 0 {
            self.store
                .update_all(&query, &mut |r: &mut ReadingRecord| r.fill_from_note(note))?;
            debug!(note = %note.guid, "refreshed local record");
        } else {
            let record = ReadingRecord::from_remote(note);
            debug!(note = %note.guid, local_id = %record.local_id, "created local record");
            self.store.create(record)?;
        }
        Ok(())
    }
}
