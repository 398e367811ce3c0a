//! In-memory note service for testing.

use crate::error::{RemoteOperation, SyncError, SyncResult};
use crate::record::{now_millis, NoteDraft, NoteMetadata, Notebook, RemoteNote};
use crate::remote::NoteService;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    authenticated: bool,
    reject_authentication: bool,
    notebooks: Vec<Notebook>,
    notes: Vec<RemoteNote>,
    update_count: i64,
    next_guid: u64,
    calls: HashMap<RemoteOperation, usize>,
    failing_operations: HashSet<RemoteOperation>,
    failing_calls: HashSet<(RemoteOperation, usize)>,
    failing_notes: HashSet<String>,
    latency: Option<Duration>,
}

impl MockState {
    fn next_guid(&mut self, prefix: &str) -> String {
        self.next_guid += 1;
        format!("{prefix}-{}", self.next_guid)
    }

    fn bump(&mut self) {
        self.update_count += 1;
    }
}

/// A scriptable in-memory note service.
///
/// Every mutation bumps the account update counter the way a real service
/// does. Calls are counted per [`RemoteOperation`] and failures can be
/// injected per operation, per call index, or per note guid.
#[derive(Debug, Default)]
pub struct MockNoteService {
    state: Mutex<MockState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockNoteService {
    /// Creates an authenticated, empty service.
    pub fn new() -> Self {
        let service = Self::default();
        service.state.lock().authenticated = true;
        service
    }

    /// Creates a service without a session.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Sets the session state.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.lock().authenticated = authenticated;
    }

    /// Makes the next authentication attempts fail.
    pub fn reject_authentication(&self, reject: bool) {
        self.state.lock().reject_authentication = reject;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Makes every call of `operation` fail.
    pub fn fail_operation(&self, operation: RemoteOperation) {
        self.state.lock().failing_operations.insert(operation);
    }

    /// Makes the `index`-th (0-based) call of `operation` fail.
    pub fn fail_call(&self, operation: RemoteOperation, index: usize) {
        self.state.lock().failing_calls.insert((operation, index));
    }

    /// Makes every fetch, update and delete of note `guid` fail.
    pub fn fail_note(&self, guid: impl Into<String>) {
        self.state.lock().failing_notes.insert(guid.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_operations.clear();
        state.failing_calls.clear();
        state.failing_notes.clear();
    }

    /// Adds a notebook, as another client would.
    pub fn add_notebook(&self, name: impl Into<String>) -> Notebook {
        let mut state = self.state.lock();
        let notebook = Notebook {
            guid: state.next_guid("nb"),
            name: name.into(),
        };
        state.notebooks.push(notebook.clone());
        state.bump();
        notebook
    }

    /// Renames a notebook, as another client would.
    pub fn rename_notebook(&self, guid: &str, name: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(notebook) = state.notebooks.iter_mut().find(|nb| nb.guid == guid) {
            notebook.name = name.into();
            state.bump();
        }
    }

    /// Adds a note, as another client would.
    pub fn insert_note(&self, notebook_guid: &str, content: impl Into<String>) -> RemoteNote {
        let mut state = self.state.lock();
        let now = now_millis();
        let note = RemoteNote {
            guid: state.next_guid("note"),
            notebook_guid: notebook_guid.to_string(),
            title: String::new(),
            content: content.into(),
            created: now,
            updated: now,
        };
        state.notes.push(note.clone());
        state.bump();
        note
    }

    /// Rewrites a note's content, as another client would.
    pub fn edit_note(&self, guid: &str, content: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(note) = state.notes.iter_mut().find(|note| note.guid == guid) {
            note.content = content.into();
            note.updated = now_millis();
            state.bump();
        }
    }

    /// Overrides the account update counter.
    pub fn set_update_count(&self, count: i64) {
        self.state.lock().update_count = count;
    }

    /// Returns the account update counter.
    pub fn current_update_count(&self) -> i64 {
        self.state.lock().update_count
    }

    /// Returns every notebook.
    pub fn notebooks(&self) -> Vec<Notebook> {
        self.state.lock().notebooks.clone()
    }

    /// Returns every note.
    pub fn notes(&self) -> Vec<RemoteNote> {
        self.state.lock().notes.clone()
    }

    /// Returns note `guid`, if present.
    pub fn note(&self, guid: &str) -> Option<RemoteNote> {
        self.state
            .lock()
            .notes
            .iter()
            .find(|note| note.guid == guid)
            .cloned()
    }

    /// Returns how many times `operation` was called.
    pub fn calls(&self, operation: RemoteOperation) -> usize {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Returns how many calls were made in total.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Returns the highest number of calls that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Registers a call, waits out the configured latency and applies
    /// injected failures.
    async fn enter(
        &self,
        operation: RemoteOperation,
        note_guid: Option<&str>,
    ) -> SyncResult<InFlight<'_>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let flight = InFlight {
            counter: &self.in_flight,
        };

        let (latency, failure) = {
            let mut state = self.state.lock();
            let entry = state.calls.entry(operation).or_insert(0);
            let index = *entry;
            *entry += 1;

            let failure = if operation != RemoteOperation::Authenticate && !state.authenticated {
                Some("not authenticated")
            } else if state.failing_operations.contains(&operation)
                || state.failing_calls.contains(&(operation, index))
                || note_guid.is_some_and(|guid| state.failing_notes.contains(guid))
            {
                Some("injected failure")
            } else {
                None
            };
            (state.latency, failure)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => Err(SyncError::remote(operation, message)),
            None => Ok(flight),
        }
    }
}

#[async_trait]
impl NoteService for MockNoteService {
    fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    async fn authenticate(&self) -> SyncResult<()> {
        let _flight = self.enter(RemoteOperation::Authenticate, None).await?;
        let mut state = self.state.lock();
        if state.reject_authentication {
            return Err(SyncError::remote(
                RemoteOperation::Authenticate,
                "authentication rejected",
            ));
        }
        state.authenticated = true;
        Ok(())
    }

    fn unauthenticate(&self) {
        self.state.lock().authenticated = false;
    }

    async fn list_notebooks(&self) -> SyncResult<Vec<Notebook>> {
        let _flight = self.enter(RemoteOperation::ListNotebooks, None).await?;
        Ok(self.state.lock().notebooks.clone())
    }

    async fn get_notebook(&self, guid: &str) -> SyncResult<Option<Notebook>> {
        let _flight = self.enter(RemoteOperation::GetNotebook, None).await?;
        Ok(self
            .state
            .lock()
            .notebooks
            .iter()
            .find(|nb| nb.guid == guid)
            .cloned())
    }

    async fn create_notebook(&self, name: &str) -> SyncResult<Notebook> {
        let _flight = self.enter(RemoteOperation::CreateNotebook, None).await?;
        let mut state = self.state.lock();
        let notebook = Notebook {
            guid: state.next_guid("nb"),
            name: name.to_string(),
        };
        state.notebooks.push(notebook.clone());
        state.bump();
        Ok(notebook)
    }

    async fn create_note(&self, draft: &NoteDraft) -> SyncResult<RemoteNote> {
        let _flight = self.enter(RemoteOperation::CreateNote, None).await?;
        let mut state = self.state.lock();
        if !state
            .notebooks
            .iter()
            .any(|nb| nb.guid == draft.notebook_guid)
        {
            return Err(SyncError::remote(
                RemoteOperation::CreateNote,
                "unknown notebook",
            ));
        }
        let note = RemoteNote {
            guid: state.next_guid("note"),
            notebook_guid: draft.notebook_guid.clone(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            created: draft.created,
            updated: draft.updated,
        };
        state.notes.push(note.clone());
        state.bump();
        Ok(note)
    }

    async fn update_note(&self, draft: &NoteDraft) -> SyncResult<RemoteNote> {
        let guid = draft
            .guid
            .as_deref()
            .ok_or_else(|| SyncError::remote(RemoteOperation::UpdateNote, "missing guid"))?;
        let _flight = self.enter(RemoteOperation::UpdateNote, Some(guid)).await?;
        let mut state = self.state.lock();
        let note = state
            .notes
            .iter_mut()
            .find(|note| note.guid == guid)
            .ok_or_else(|| SyncError::remote(RemoteOperation::UpdateNote, "unknown note"))?;
        note.notebook_guid = draft.notebook_guid.clone();
        note.title = draft.title.clone();
        note.content = draft.content.clone();
        note.updated = draft.updated;
        let updated = note.clone();
        state.bump();
        Ok(updated)
    }

    async fn delete_note(&self, guid: &str) -> SyncResult<bool> {
        let _flight = self.enter(RemoteOperation::DeleteNote, Some(guid)).await?;
        let mut state = self.state.lock();
        let before = state.notes.len();
        state.notes.retain(|note| note.guid != guid);
        if state.notes.len() == before {
            return Ok(false);
        }
        state.bump();
        Ok(true)
    }

    async fn update_count(&self) -> SyncResult<i64> {
        let _flight = self.enter(RemoteOperation::GetSyncState, None).await?;
        Ok(self.state.lock().update_count)
    }

    async fn find_note_count(&self, notebook_guid: &str) -> SyncResult<u32> {
        let _flight = self.enter(RemoteOperation::FindNoteCount, None).await?;
        let count = self
            .state
            .lock()
            .notes
            .iter()
            .filter(|note| note.notebook_guid == notebook_guid)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn find_notes_metadata(
        &self,
        notebook_guid: &str,
        max_results: u32,
    ) -> SyncResult<Vec<NoteMetadata>> {
        let _flight = self
            .enter(RemoteOperation::FindNotesMetadata, None)
            .await?;
        Ok(self
            .state
            .lock()
            .notes
            .iter()
            .filter(|note| note.notebook_guid == notebook_guid)
            .take(max_results as usize)
            .map(|note| NoteMetadata {
                guid: note.guid.clone(),
                updated: Some(note.updated),
            })
            .collect())
    }

    async fn get_note(&self, guid: &str) -> SyncResult<RemoteNote> {
        let _flight = self.enter(RemoteOperation::GetNote, Some(guid)).await?;
        self.state
            .lock()
            .notes
            .iter()
            .find(|note| note.guid == guid)
            .cloned()
            .ok_or_else(|| SyncError::remote(RemoteOperation::GetNote, "unknown note"))
    }
}
