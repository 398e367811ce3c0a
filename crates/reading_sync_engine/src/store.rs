//! Local reading store interface.

use crate::error::SyncResult;
use crate::record::{LocalId, ReadingRecord, SyncStatus};
use parking_lot::RwLock;

/// Filter over reading records.
///
/// Every predicate that is set must match; an empty query matches all
/// records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingQuery {
    /// Accepted sync statuses.
    pub sync_status: Option<Vec<SyncStatus>>,
    /// Required remote guid.
    pub remote_id: Option<String>,
    /// Required local id.
    pub local_id: Option<LocalId>,
}

impl ReadingQuery {
    /// Creates a query matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records whose status is one of `statuses`.
    pub fn by_status(statuses: impl IntoIterator<Item = SyncStatus>) -> Self {
        Self {
            sync_status: Some(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Matches the record mapped to remote note `guid`.
    pub fn by_remote_id(guid: impl Into<String>) -> Self {
        Self {
            remote_id: Some(guid.into()),
            ..Self::default()
        }
    }

    /// Matches the record with `local_id`.
    pub fn by_local_id(local_id: LocalId) -> Self {
        Self {
            local_id: Some(local_id),
            ..Self::default()
        }
    }

    /// Returns true if `record` satisfies every predicate.
    pub fn matches(&self, record: &ReadingRecord) -> bool {
        if let Some(statuses) = &self.sync_status {
            if !statuses.contains(&record.sync_status) {
                return false;
            }
        }
        if let Some(remote_id) = &self.remote_id {
            if record.remote_id.as_deref() != Some(remote_id.as_str()) {
                return false;
            }
        }
        if let Some(local_id) = &self.local_id {
            if record.local_id != *local_id {
                return false;
            }
        }
        true
    }
}

/// Storage the sync engine reads and writes reading records through.
///
/// Implementations must return records in a stable (insertion) order so
/// upload passes are deterministic.
pub trait ReadingStore: Send + Sync {
    /// Returns every record matching `query`.
    fn filter(&self, query: &ReadingQuery) -> SyncResult<Vec<ReadingRecord>>;

    /// Counts records matching `query`.
    fn count(&self, query: &ReadingQuery) -> SyncResult<usize>;

    /// Inserts a new record.
    fn create(&self, record: ReadingRecord) -> SyncResult<()>;

    /// Applies `mutator` to every matching record, returning how many changed.
    fn update_all(
        &self,
        query: &ReadingQuery,
        mutator: &mut dyn FnMut(&mut ReadingRecord),
    ) -> SyncResult<usize>;

    /// Removes every matching record, returning how many were removed.
    fn remove(&self, query: &ReadingQuery) -> SyncResult<usize>;
}

/// An in-memory reading store.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    records: RwLock<Vec<ReadingRecord>>,
}

impl MemoryReadingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records` in the given order.
    pub fn with_records(records: impl IntoIterator<Item = ReadingRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
        }
    }

    /// Returns a copy of every record.
    pub fn snapshot(&self) -> Vec<ReadingRecord> {
        self.records.read().clone()
    }

    /// Returns the record with `local_id`, if present.
    pub fn get(&self, local_id: LocalId) -> Option<ReadingRecord> {
        self.records
            .read()
            .iter()
            .find(|record| record.local_id == local_id)
            .cloned()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ReadingStore for MemoryReadingStore {
    fn filter(&self, query: &ReadingQuery) -> SyncResult<Vec<ReadingRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    fn count(&self, query: &ReadingQuery) -> SyncResult<usize> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| query.matches(record))
            .count())
    }

    fn create(&self, record: ReadingRecord) -> SyncResult<()> {
        self.records.write().push(record);
        Ok(())
    }

    fn update_all(
        &self,
        query: &ReadingQuery,
        mutator: &mut dyn FnMut(&mut ReadingRecord),
    ) -> SyncResult<usize> {
        let mut updated = 0;
        for record in self.records.write().iter_mut() {
            if query.matches(record) {
                mutator(record);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn remove(&self, query: &ReadingQuery) -> SyncResult<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| !query.matches(record));
        Ok(before - records.len())
    }
}
