//! Pushing pending local changes to the remote service.

use crate::checkpoint::{CheckpointHandle, CheckpointStore};
use crate::error::{RemoteOperation, SyncResult};
use crate::notebook::NotebookResolver;
use crate::record::{ReadingRecord, SyncStatus};
use crate::remote::{NoteService, RemoteGuard};
use crate::store::{ReadingQuery, ReadingStore};
use tracing::{debug, info, warn};

/// What the uploader does with one pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadAction {
    Create,
    Update,
    DeleteRemote,
    DiscardLocal,
}

impl UploadAction {
    fn for_record(record: &ReadingRecord) -> Option<Self> {
        match (record.sync_status, record.remote_id.is_some()) {
            (SyncStatus::NeedSyncUpload, false) => Some(Self::Create),
            (SyncStatus::NeedSyncUpload, true) => Some(Self::Update),
            (SyncStatus::NeedSyncDelete, true) => Some(Self::DeleteRemote),
            (SyncStatus::NeedSyncDelete, false) => Some(Self::DiscardLocal),
            (SyncStatus::Normal, _) => None,
        }
    }

    fn needs_notebook(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// Runs one upload pass.
pub(crate) struct Uploader<'a, R: NoteService, S: ReadingStore> {
    remote: &'a R,
    store: &'a S,
    guard: &'a RemoteGuard,
}

impl<'a, R: NoteService, S: ReadingStore> Uploader<'a, R, S> {
    pub(crate) fn new(remote: &'a R, store: &'a S, guard: &'a RemoteGuard) -> Self {
        Self {
            remote,
            store,
            guard,
        }
    }

    /// Pushes every pending record, in store order.
    ///
    /// Returns how many records were fully handled. A record whose remote
    /// call fails keeps its status and is retried by the next pass.
    pub(crate) async fn upload_pending<C: CheckpointStore>(
        &self,
        checkpoint: &mut CheckpointHandle<C>,
        resolver: &NotebookResolver<'_, R>,
    ) -> SyncResult<usize> {
        let pending = self.store.filter(&ReadingQuery::by_status([
            SyncStatus::NeedSyncUpload,
            SyncStatus::NeedSyncDelete,
        ]))?;
        if pending.is_empty() {
            debug!("nothing to upload");
            return Ok(0);
        }

        let needs_notebook = pending
            .iter()
            .filter_map(UploadAction::for_record)
            .any(UploadAction::needs_notebook);
        let notebook_guid = match checkpoint.notebook_guid().map(str::to_owned) {
            Some(guid) => Some(guid),
            None if needs_notebook => Some(resolver.ensure_notebook(checkpoint).await?),
            None => None,
        };

        let mut uploaded = 0;
        for record in &pending {
            self.guard.check_cancelled()?;
            let Some(action) = UploadAction::for_record(record) else {
                continue;
            };
            let outcome = match (action, notebook_guid.as_deref()) {
                (UploadAction::Create, Some(notebook)) => self.create(record, notebook).await,
                (UploadAction::Update, Some(notebook)) => self.update(record, notebook).await,
                (UploadAction::DeleteRemote, _) => self.delete(record).await,
                (UploadAction::DiscardLocal, _) => self.discard(record),
                (UploadAction::Create | UploadAction::Update, None) => continue,
            };
            match outcome {
                Ok(()) => uploaded += 1,
                Err(err) if err.is_pass_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        local_id = %record.local_id,
                        action = ?action,
                        error = %err,
                        "upload failed, record stays pending"
                    );
                }
            }
        }

        info!(pending = pending.len(), uploaded, "upload pass finished");
        Ok(uploaded)
    }

    async fn create(&self, record: &ReadingRecord, notebook_guid: &str) -> SyncResult<()> {
        let draft = record.to_draft(notebook_guid);
        let note = self
            .guard
            .call(RemoteOperation::CreateNote, self.remote.create_note(&draft))
            .await?;
        let updated = self.store.update_all(
            &ReadingQuery::by_local_id(record.local_id),
            &mut |r: &mut ReadingRecord| {
                r.fill_from_note(&note);
                r.mark_synced(note.guid.clone());
            },
        )?;
        if updated == 0 {
            warn!(local_id = %record.local_id, note = %note.guid, "record vanished during upload");
        }
        debug!(local_id = %record.local_id, note = %note.guid, "created note");
        Ok(())
    }

    async fn update(&self, record: &ReadingRecord, notebook_guid: &str) -> SyncResult<()> {
        let draft = record.to_draft(notebook_guid);
        let note = self
            .guard
            .call(RemoteOperation::UpdateNote, self.remote.update_note(&draft))
            .await?;
        self.store.update_all(
            &ReadingQuery::by_local_id(record.local_id),
            &mut |r: &mut ReadingRecord| {
                r.fill_from_note(&note);
                r.sync_status = SyncStatus::Normal;
            },
        )?;
        debug!(local_id = %record.local_id, note = %note.guid, "updated note");
        Ok(())
    }

    async fn delete(&self, record: &ReadingRecord) -> SyncResult<()> {
        let Some(guid) = record.remote_id.as_deref() else {
            return self.discard(record);
        };
        let existed = self
            .guard
            .call(RemoteOperation::DeleteNote, self.remote.delete_note(guid))
            .await?;
        self.store
            .remove(&ReadingQuery::by_local_id(record.local_id))?;
        if existed {
            debug!(local_id = %record.local_id, note = %guid, "deleted note");
        } else {
            debug!(local_id = %record.local_id, note = %guid, "note already gone remotely");
        }
        Ok(())
    }

    fn discard(&self, record: &ReadingRecord) -> SyncResult<()> {
        self.store
            .remove(&ReadingQuery::by_local_id(record.local_id))?;
        debug!(local_id = %record.local_id, "discarded never-uploaded record");
        Ok(())
    }
}
