//! Integration tests for the sync coordinator against the in-memory service.

use reading_sync_engine::{
    CheckpointStore, FileCheckpointStore, LaneState, MemoryCheckpointStore, MemoryReadingStore,
    MockNoteService, ReadingQuery, ReadingRecord, ReadingStore, RemoteOperation, SyncCheckpoint,
    SyncConfig, SyncCoordinator, SyncDirection, SyncStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    service: Arc<MockNoteService>,
    store: Arc<MemoryReadingStore>,
    checkpoints: Arc<MemoryCheckpointStore>,
    sync: SyncCoordinator<MockNoteService>,
}

impl Harness {
    fn new(records: Vec<ReadingRecord>) -> Self {
        Self::with_config(SyncConfig::new(), records)
    }

    fn with_config(config: SyncConfig, records: Vec<ReadingRecord>) -> Self {
        init_tracing();
        let service = Arc::new(MockNoteService::new());
        let store = Arc::new(MemoryReadingStore::with_records(records));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let sync = SyncCoordinator::new(
            config,
            Arc::clone(&service),
            Arc::clone(&store),
            Arc::clone(&checkpoints),
        )
        .unwrap();
        Self {
            service,
            store,
            checkpoints,
            sync,
        }
    }
}

#[tokio::test]
async fn new_record_is_uploaded_and_mapped() {
    let record = ReadingRecord::new("a", "first reading");
    let id = record.local_id;
    let h = Harness::new(vec![record]);

    assert_eq!(h.sync.sync_up().await, 1);

    let stored = h.store.get(id).unwrap();
    let notes = h.service.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(stored.remote_id.as_deref(), Some(notes[0].guid.as_str()));
    assert_eq!(stored.sync_status, SyncStatus::Normal);
}

#[tokio::test]
async fn second_upload_pass_is_a_no_op() {
    let h = Harness::new(vec![
        ReadingRecord::new("a", "1"),
        ReadingRecord::new("b", "2"),
    ]);

    assert_eq!(h.sync.sync_up().await, 2);
    let calls = h.service.total_calls();

    assert_eq!(h.sync.sync_up().await, 0);
    assert_eq!(h.service.total_calls(), calls);
    assert_eq!(h.service.notes().len(), 2);
}

#[tokio::test]
async fn never_uploaded_deletion_is_local() {
    let mut record = ReadingRecord::new("a", "draft");
    record.mark_deleted();
    let h = Harness::new(vec![record]);

    assert_eq!(h.sync.sync_up().await, 1);
    assert!(h.store.is_empty());
    assert_eq!(h.service.total_calls(), 0);
}

#[tokio::test]
async fn edit_and_delete_round_trip() {
    let record = ReadingRecord::new("a", "v1");
    let id = record.local_id;
    let h = Harness::new(vec![record]);
    assert_eq!(h.sync.sync_up().await, 1);
    let guid = h.store.get(id).unwrap().remote_id.unwrap();

    h.store
        .update_all(&ReadingQuery::by_local_id(id), &mut |r: &mut ReadingRecord| {
            r.edit("a", "v2")
        })
        .unwrap();
    assert_eq!(h.sync.sync_up().await, 1);
    assert_eq!(h.service.note(&guid).unwrap().content, "v2");

    h.store
        .update_all(&ReadingQuery::by_local_id(id), &mut |r: &mut ReadingRecord| {
            r.mark_deleted()
        })
        .unwrap();
    assert_eq!(h.sync.sync_up().await, 1);
    assert!(h.store.is_empty());
    assert!(h.service.notes().is_empty());
}

#[tokio::test]
async fn download_without_notebook_returns_zero() {
    let h = Harness::new(Vec::new());

    assert_eq!(h.sync.sync_down().await, 0);
    assert_eq!(h.service.total_calls(), 0);
}

#[tokio::test]
async fn download_picks_up_notes_from_other_clients() {
    let h = Harness::new(Vec::new());
    assert!(h.sync.authenticate().await);
    let notebook = h.checkpoints.current().notebook_guid.unwrap();
    let other = h.service.add_notebook("Personal");
    h.service.insert_note(&notebook, "shared reading");
    h.service.insert_note(&other.guid, "not ours");

    assert_eq!(h.sync.sync_down().await, 1);

    let records = h.store.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "shared reading");
    assert_eq!(records[0].sync_status, SyncStatus::Normal);
}

#[tokio::test]
async fn unchanged_remote_skips_fetches() {
    let h = Harness::new(Vec::new());
    assert!(h.sync.authenticate().await);
    let notebook = h.checkpoints.current().notebook_guid.unwrap();
    h.service.insert_note(&notebook, "x");
    assert_eq!(h.sync.sync_down().await, 1);

    let seen = h.checkpoints.current().last_update_count;
    assert_eq!(seen, h.service.current_update_count());

    assert_eq!(h.sync.sync_down().await, 0);
    assert_eq!(h.service.calls(RemoteOperation::FindNotesMetadata), 1);
    assert_eq!(h.service.calls(RemoteOperation::GetNote), 1);
}

#[tokio::test]
async fn stored_checkpoint_gates_download() {
    init_tracing();
    let service = Arc::new(MockNoteService::new());
    let notebook = service.add_notebook("SectionReading");
    service.insert_note(&notebook.guid, "x");
    service.set_update_count(5);
    let store = Arc::new(MemoryReadingStore::new());
    let checkpoints = Arc::new(MemoryCheckpointStore::with_checkpoint(SyncCheckpoint {
        notebook_guid: Some(notebook.guid.clone()),
        last_update_count: 5,
    }));
    let sync = SyncCoordinator::new(
        SyncConfig::new(),
        Arc::clone(&service),
        Arc::clone(&store),
        checkpoints,
    )
    .unwrap();

    assert_eq!(sync.sync(SyncDirection::Download).await, 0);
    assert_eq!(service.calls(RemoteOperation::FindNotesMetadata), 0);
    assert_eq!(service.calls(RemoteOperation::GetNote), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn one_failing_note_does_not_abort_download() {
    let h = Harness::new(Vec::new());
    assert!(h.sync.authenticate().await);
    let notebook = h.checkpoints.current().notebook_guid.unwrap();
    let notes: Vec<_> = (0..4)
        .map(|i| h.service.insert_note(&notebook, format!("note {i}")))
        .collect();
    h.service.fail_note(notes[2].guid.clone());

    assert_eq!(h.sync.sync_down().await, 3);
    assert_eq!(h.store.len(), 3);
    assert_eq!(h.checkpoints.current().last_update_count, 0);
}

#[tokio::test]
async fn renamed_notebook_is_replaced_on_bootstrap() {
    let h = Harness::new(Vec::new());
    assert!(h.sync.authenticate().await);
    let first = h.checkpoints.current().notebook_guid.unwrap();
    h.service.rename_notebook(&first, "Archive");

    assert!(h.sync.authenticate().await);
    let second = h.checkpoints.current().notebook_guid.unwrap();
    assert_ne!(first, second);
    assert_eq!(h.service.notebooks().len(), 2);
}

#[tokio::test]
async fn unauthenticated_session_blocks_sync() {
    let h = Harness::new(vec![ReadingRecord::new("a", "1")]);
    h.sync.unauthenticate();

    assert_eq!(h.sync.sync_up().await, 0);
    assert_eq!(h.service.total_calls(), 0);
    assert_eq!(h.sync.stats().skipped_passes, 1);
}

#[tokio::test]
async fn concurrent_passes_are_serialized() {
    let records = (0..3)
        .map(|i| ReadingRecord::new(format!("r{i}"), format!("body {i}")))
        .collect();
    let h = Harness::new(records);
    h.service.set_latency(Duration::from_millis(10));
    assert!(h.sync.authenticate().await);

    let (up, down, up_again) = tokio::join!(
        h.sync.sync_up(),
        h.sync.sync_down(),
        h.sync.sync(SyncDirection::Upload)
    );

    assert_eq!(h.service.max_in_flight(), 1);
    assert_eq!(up + up_again, 3);
    assert!(down <= 3);
    let stats = h.sync.stats();
    assert_eq!(stats.uploads_completed, 2);
    assert_eq!(stats.downloads_completed, 1);
    assert_eq!(h.sync.state(), LaneState::Idle);
}

#[tokio::test]
async fn shutdown_cancels_a_running_pass() {
    let h = Harness::with_config(
        SyncConfig::new().without_remote_timeout(),
        vec![ReadingRecord::new("a", "1")],
    );
    h.service.set_latency(Duration::from_secs(30));
    let sync = Arc::new(h.sync);

    let pass = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.sync_up().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.shutdown().await;

    let uploaded = tokio::time::timeout(Duration::from_secs(5), pass)
        .await
        .expect("pass should stop promptly")
        .unwrap();
    assert_eq!(uploaded, 0);
    assert_eq!(sync.state(), LaneState::Closed);
    assert_eq!(
        h.store.snapshot()[0].sync_status,
        SyncStatus::NeedSyncUpload
    );
}

#[tokio::test]
async fn slow_calls_time_out() {
    let h = Harness::with_config(
        SyncConfig::new().with_remote_timeout(Duration::from_millis(50)),
        vec![ReadingRecord::new("a", "1")],
    );
    h.service.set_latency(Duration::from_secs(5));

    assert_eq!(h.sync.sync_up().await, 0);
    let last_error = h.sync.stats().last_error.unwrap();
    assert!(last_error.contains("timed out"), "{last_error}");
}

#[tokio::test]
async fn file_checkpoint_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.json");
    let service = Arc::new(MockNoteService::new());
    let store = Arc::new(MemoryReadingStore::new());

    {
        let sync = SyncCoordinator::new(
            SyncConfig::new(),
            Arc::clone(&service),
            Arc::clone(&store),
            Arc::new(FileCheckpointStore::new(&path)),
        )
        .unwrap();
        assert!(sync.authenticate().await);
        let notebook = service.notebooks()[0].guid.clone();
        service.insert_note(&notebook, "x");
        assert_eq!(sync.sync_down().await, 1);
        sync.shutdown().await;
    }

    let saved = FileCheckpointStore::new(&path).load().unwrap();
    assert_eq!(saved.notebook_guid, Some(service.notebooks()[0].guid.clone()));
    assert_eq!(saved.last_update_count, service.current_update_count());

    let sync = SyncCoordinator::new(
        SyncConfig::new(),
        Arc::clone(&service),
        Arc::clone(&store),
        Arc::new(FileCheckpointStore::new(&path)),
    )
    .unwrap();
    assert_eq!(sync.sync_down().await, 0);
    assert_eq!(service.calls(RemoteOperation::GetNote), 1);
    assert_eq!(service.calls(RemoteOperation::CreateNotebook), 1);
}
