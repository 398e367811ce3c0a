//! # Reading Sync Engine
//!
//! Two-way sync between locally stored readings and notes kept by a remote
//! note service.
//!
//! This crate provides:
//! - A per-record sync status state machine
//! - Resolution of a single application notebook on the remote account
//! - Upload of pending creates, edits and deletes
//! - Checkpointed download of remote changes
//! - A serialized lane that runs one pass at a time
//!
//! ## Architecture
//!
//! Callers drive sync through [`SyncCoordinator`]. Each call is one pass in
//! one direction:
//! 1. The coordinator rejects the pass if there is no remote session
//! 2. The pass is queued on the lane and runs after earlier passes finish
//! 3. The pass reports how many records or notes it handled
//!
//! ## Key Invariants
//!
//! - At most one pass talks to the remote service at a time
//! - Every managed note lives in one notebook, matched by exact name
//! - A record leaves its pending status only after the remote call succeeded
//! - A failing record or note is skipped, never fatal to the pass
//! - The download checkpoint never moves backwards

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod config;
mod coordinator;
mod download;
mod error;
mod lane;
mod mock;
mod notebook;
mod record;
mod remote;
mod store;
mod upload;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SyncCheckpoint};
pub use config::{SyncConfig, DEFAULT_NOTEBOOK_NAME};
pub use coordinator::{SyncCoordinator, SyncDirection};
pub use error::{RemoteOperation, SyncError, SyncResult};
pub use lane::{LaneState, SyncStats};
pub use mock::MockNoteService;
pub use record::{LocalId, NoteDraft, NoteMetadata, Notebook, ReadingRecord, RemoteNote, SyncStatus};
pub use remote::NoteService;
pub use store::{MemoryReadingStore, ReadingQuery, ReadingStore};
