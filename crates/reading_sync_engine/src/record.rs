//! Reading records and the remote entities they map to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Client-generated identifier of a reading record.
///
/// Local IDs are random UUIDs that are:
/// - Assigned once when the record is created (locally or by a download)
/// - Immutable afterwards
/// - Never derived from the remote guid
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a new random local ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a local ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for LocalId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

/// Per-record reconciliation state.
///
/// ```text
///            create / edit                upload ok
///   (new) ─────────────────▶ NeedSyncUpload ─────────▶ Normal
///                                 ▲                      │
///                                 └──────── edit ────────┘
///   Normal | NeedSyncUpload ── delete ──▶ NeedSyncDelete ── remote delete ok ──▶ (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum SyncStatus {
    /// Local and remote copies are believed consistent.
    #[default]
    Normal = 0,
    /// Local content changed (or is new) and must be pushed.
    NeedSyncUpload = 1,
    /// The record was deleted locally; its remote note must be removed.
    NeedSyncDelete = 2,
}

impl SyncStatus {
    /// Returns true if the uploader has work to do for this status.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::NeedSyncUpload | SyncStatus::NeedSyncDelete)
    }

    /// Decodes the persisted integer form.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(SyncStatus::Normal),
            1 => Some(SyncStatus::NeedSyncUpload),
            2 => Some(SyncStatus::NeedSyncDelete),
            _ => None,
        }
    }

    /// Returns the persisted integer form.
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// A reading as kept in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingRecord {
    /// Local identifier.
    pub local_id: LocalId,
    /// Guid of the remote note, once one exists.
    pub remote_id: Option<String>,
    /// Reconciliation state.
    pub sync_status: SyncStatus,
    /// Display title. Local only, never sent to or taken from the remote.
    pub title: String,
    /// Reading body; the payload exchanged with the remote note.
    pub content: String,
    /// Creation timestamp (Unix ms).
    pub created_at: i64,
    /// Last update timestamp (Unix ms).
    pub updated_at: i64,
}

impl ReadingRecord {
    /// Creates a record that has never been uploaded.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            local_id: LocalId::new(),
            remote_id: None,
            sync_status: SyncStatus::NeedSyncUpload,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a record for a note that only exists remotely.
    pub fn from_remote(note: &RemoteNote) -> Self {
        let mut record = Self {
            local_id: LocalId::new(),
            remote_id: Some(note.guid.clone()),
            sync_status: SyncStatus::Normal,
            title: String::new(),
            content: String::new(),
            created_at: 0,
            updated_at: 0,
        };
        record.fill_from_note(note);
        record
    }

    /// Copies the exchanged fields of `note` into this record.
    ///
    /// Neither the sync status nor the local title is touched.
    pub fn fill_from_note(&mut self, note: &RemoteNote) {
        self.content = note.content.clone();
        self.created_at = note.created;
        self.updated_at = note.updated;
    }

    /// Builds the note payload for this record inside `notebook_guid`.
    ///
    /// The draft is addressed by the record's remote id when it has one and
    /// always carries an empty title.
    pub fn to_draft(&self, notebook_guid: &str) -> NoteDraft {
        NoteDraft {
            guid: self.remote_id.clone(),
            notebook_guid: notebook_guid.to_string(),
            title: String::new(),
            content: self.content.clone(),
            created: self.created_at,
            updated: self.updated_at,
        }
    }

    /// Applies a local edit.
    ///
    /// A record already pending deletion stays pending deletion.
    pub fn edit(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.title = title.into();
        self.content = content.into();
        self.updated_at = now_millis();
        if self.sync_status != SyncStatus::NeedSyncDelete {
            self.sync_status = SyncStatus::NeedSyncUpload;
        }
    }

    /// Marks the record as deleted locally.
    pub fn mark_deleted(&mut self) {
        self.sync_status = SyncStatus::NeedSyncDelete;
    }

    /// Records a successful upload under `remote_id`.
    pub fn mark_synced(&mut self, remote_id: impl Into<String>) {
        self.remote_id = Some(remote_id.into());
        self.sync_status = SyncStatus::Normal;
    }

    /// Returns true for a deletion that never reached the remote.
    ///
    /// Such a record is removed without any remote call.
    pub fn is_local_only_deletion(&self) -> bool {
        self.sync_status == SyncStatus::NeedSyncDelete && self.remote_id.is_none()
    }
}

/// A notebook of the remote account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Service-assigned identifier.
    pub guid: String,
    /// Display name.
    pub name: String,
}

/// A note as returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    /// Service-assigned identifier.
    pub guid: String,
    /// Notebook containing the note.
    pub notebook_guid: String,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Creation timestamp (Unix ms).
    pub created: i64,
    /// Last update timestamp (Unix ms).
    pub updated: i64,
}

/// A note payload submitted for creation or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    /// Guid of the note being updated; `None` for a creation.
    pub guid: Option<String>,
    /// Target notebook.
    pub notebook_guid: String,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Creation timestamp (Unix ms).
    pub created: i64,
    /// Last update timestamp (Unix ms).
    pub updated: i64,
}

/// Lightweight note listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    /// Note guid.
    pub guid: String,
    /// Last update timestamp (Unix ms), when requested.
    pub updated: Option<i64>,
}

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
