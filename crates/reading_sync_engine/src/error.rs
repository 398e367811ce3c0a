//! Error types for the sync engine.

use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Identifies a single call against the remote note service.
///
/// Carried by [`SyncError::RemoteCallFailed`] and [`SyncError::Timeout`] so
/// that a failure can be attributed in logs without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// Starting the authentication flow.
    Authenticate,
    /// Listing every notebook of the account.
    ListNotebooks,
    /// Fetching one notebook by guid.
    GetNotebook,
    /// Creating a notebook.
    CreateNotebook,
    /// Creating a note.
    CreateNote,
    /// Updating a note.
    UpdateNote,
    /// Deleting a note.
    DeleteNote,
    /// Reading the account-wide update counter.
    GetSyncState,
    /// Counting the notes of a notebook.
    FindNoteCount,
    /// Enumerating note metadata of a notebook.
    FindNotesMetadata,
    /// Fetching a full note.
    GetNote,
}

impl RemoteOperation {
    /// Returns the operation name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::Authenticate => "authenticate",
            RemoteOperation::ListNotebooks => "listNotebooks",
            RemoteOperation::GetNotebook => "getNotebook",
            RemoteOperation::CreateNotebook => "createNotebook",
            RemoteOperation::CreateNote => "createNote",
            RemoteOperation::UpdateNote => "updateNote",
            RemoteOperation::DeleteNote => "deleteNote",
            RemoteOperation::GetSyncState => "getSyncState",
            RemoteOperation::FindNoteCount => "findNoteCount",
            RemoteOperation::FindNotesMetadata => "findNotesMetadata",
            RemoteOperation::GetNote => "getNote",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote service has no authenticated session.
    #[error("note service is not authenticated")]
    NotAuthenticated,

    /// The canonical notebook could neither be found nor created.
    #[error("application notebook unavailable (list: {list_error}, create: {create_error})")]
    ContainerUnavailable {
        /// Why the cached or listed notebook could not be used.
        list_error: String,
        /// Why creating a fresh notebook failed.
        create_error: String,
    },

    /// A remote call failed.
    #[error("remote call {operation} failed: {message}")]
    RemoteCallFailed {
        /// The failing call.
        operation: RemoteOperation,
        /// Error message reported by the service.
        message: String,
    },

    /// A downloaded note could not be joined against local state.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// The local reading store rejected an operation.
    #[error("reading store error: {0}")]
    Store(String),

    /// The persisted checkpoint could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// A remote call exceeded its deadline.
    #[error("remote call {operation} timed out")]
    Timeout {
        /// The call that timed out.
        operation: RemoteOperation,
    },

    /// The pass was cancelled because its owner shut down.
    #[error("sync cancelled")]
    Cancelled,

    /// The serialized lane is no longer accepting work.
    #[error("sync lane closed")]
    LaneClosed,

    /// I/O error while persisting settings.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a remote call failure.
    pub fn remote(operation: RemoteOperation, message: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            operation,
            message: message.into(),
        }
    }

    /// Returns the remote call this error is attributed to, if any.
    pub fn operation(&self) -> Option<RemoteOperation> {
        match self {
            SyncError::RemoteCallFailed { operation, .. } | SyncError::Timeout { operation } => {
                Some(*operation)
            }
            _ => None,
        }
    }

    /// Returns true if this error aborts the whole pass.
    ///
    /// Everything else is a per-record or per-note failure: it is logged,
    /// the item is skipped, and the pass moves on.
    pub fn is_pass_fatal(&self) -> bool {
        match self {
            SyncError::RemoteCallFailed { .. }
            | SyncError::Timeout { .. }
            | SyncError::RecordNotFound(_) => false,
            SyncError::NotAuthenticated
            | SyncError::ContainerUnavailable { .. }
            | SyncError::Store(_)
            | SyncError::Checkpoint(_)
            | SyncError::Cancelled
            | SyncError::LaneClosed
            | SyncError::Io(_)
            | SyncError::Serialization(_) => true,
        }
    }
}
