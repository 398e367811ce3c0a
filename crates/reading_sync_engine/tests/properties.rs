//! Property tests for upload and download passes.

use proptest::prelude::*;
use reading_sync_engine::{
    MemoryCheckpointStore, MemoryReadingStore, MockNoteService, ReadingRecord, RemoteOperation,
    SyncCheckpoint, SyncConfig, SyncCoordinator, SyncStatus,
};
use std::sync::Arc;

/// Local shape of a record before an upload pass.
#[derive(Debug, Clone, Copy)]
enum Shape {
    New,
    Synced,
    Edited,
    DeletedLocalOnly,
    DeletedRemote,
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::New),
        Just(Shape::Synced),
        Just(Shape::Edited),
        Just(Shape::DeletedLocalOnly),
        Just(Shape::DeletedRemote),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn upload_pass_settles_every_pending_record(shapes in prop::collection::vec(shape(), 0..12)) {
        runtime().block_on(async {
            let service = Arc::new(MockNoteService::new());
            let notebook = service.add_notebook("SectionReading");
            let records: Vec<ReadingRecord> = shapes
                .iter()
                .enumerate()
                .map(|(i, shape)| {
                    let mut record = ReadingRecord::new(format!("r{i}"), format!("body {i}"));
                    if matches!(shape, Shape::Synced | Shape::Edited | Shape::DeletedRemote) {
                        let note = service.insert_note(&notebook.guid, record.content.clone());
                        record.mark_synced(note.guid);
                    }
                    match shape {
                        Shape::Edited => record.edit(format!("r{i}"), format!("edited {i}")),
                        Shape::DeletedLocalOnly | Shape::DeletedRemote => record.mark_deleted(),
                        Shape::New | Shape::Synced => {}
                    }
                    record
                })
                .collect();
            let store = Arc::new(MemoryReadingStore::with_records(records.clone()));
            let sync = SyncCoordinator::new(
                SyncConfig::new(),
                Arc::clone(&service),
                Arc::clone(&store),
                Arc::new(MemoryCheckpointStore::new()),
            )
            .unwrap();

            let count_of = |wanted: fn(&Shape) -> bool| shapes.iter().filter(|s| wanted(s)).count();
            let pending = count_of(|s| !matches!(s, Shape::Synced));
            let creates = count_of(|s| matches!(s, Shape::New));
            let remote_deletes = count_of(|s| matches!(s, Shape::DeletedRemote));
            let deletions = count_of(|s| matches!(s, Shape::DeletedLocalOnly | Shape::DeletedRemote));

            assert_eq!(sync.sync_up().await, pending);
            assert_eq!(service.calls(RemoteOperation::CreateNote), creates);
            assert_eq!(service.calls(RemoteOperation::DeleteNote), remote_deletes);

            let after = store.snapshot();
            assert_eq!(after.len(), records.len() - deletions);
            for record in &after {
                assert_eq!(record.sync_status, SyncStatus::Normal);
                assert!(record.remote_id.as_deref().is_some_and(|guid| !guid.is_empty()));
            }

            let calls = service.total_calls();
            assert_eq!(sync.sync_up().await, 0);
            assert_eq!(service.total_calls(), calls);
        });
    }

    #[test]
    fn download_pass_joins_by_remote_id(
        notes in prop::collection::vec((any::<bool>(), any::<bool>()), 1..10),
    ) {
        runtime().block_on(async {
            let service = Arc::new(MockNoteService::new());
            let notebook = service.add_notebook("SectionReading");
            let mut local = Vec::new();
            for (i, (mapped, failing)) in notes.iter().enumerate() {
                let note = service.insert_note(&notebook.guid, format!("remote {i}"));
                if *mapped {
                    let mut record = ReadingRecord::new(format!("local {i}"), "stale");
                    record.mark_synced(note.guid.clone());
                    local.push((record, note.content.clone(), *failing));
                }
                if *failing {
                    service.fail_note(note.guid);
                }
            }
            let store = Arc::new(MemoryReadingStore::with_records(
                local.iter().map(|(record, _, _)| record.clone()),
            ));
            let sync = SyncCoordinator::new(
                SyncConfig::new(),
                Arc::clone(&service),
                Arc::clone(&store),
                Arc::new(MemoryCheckpointStore::with_checkpoint(SyncCheckpoint {
                    notebook_guid: Some(notebook.guid.clone()),
                    last_update_count: 0,
                })),
            )
            .unwrap();

            let failing = notes.iter().filter(|(_, failing)| *failing).count();
            let created = notes
                .iter()
                .filter(|(mapped, failing)| !*mapped && !*failing)
                .count();

            assert_eq!(sync.sync_down().await, notes.len() - failing);
            assert_eq!(store.len(), local.len() + created);
            for (before, remote_content, failing) in &local {
                let after = store.get(before.local_id).unwrap();
                assert_eq!(after.title, before.title);
                assert_eq!(after.sync_status, SyncStatus::Normal);
                let expected = if *failing { "stale" } else { remote_content.as_str() };
                assert_eq!(after.content, expected);
            }
        });
    }
}
