//! Local store - the key-value holder of the canonical record set.
//!
//! The orchestrator only needs a small contract: point reads, full scans,
//! puts, deletes, and an atomic get-modify-put per record. The atomic update
//! is what lets merge and upload-result application run while the user keeps
//! editing: the closure always sees the latest stored version.

use crate::error::{Result, SyncError};
use contract_sync_engine::{ContractRecord, RecordDocument, SyncMetadata, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Mutex;

/// Persisted key-value holder of contract records and sync metadata.
pub trait LocalStore: Send + Sync {
    /// Get a record by id, tombstones included.
    fn get(&self, id: &str) -> Result<Option<ContractRecord>>;

    /// Get every record, tombstones included, in no particular order.
    fn get_all(&self) -> Result<Vec<ContractRecord>>;

    /// Insert or replace a record.
    fn put(&self, record: ContractRecord) -> Result<()>;

    /// Remove a record outright. Returns the removed record, if any.
    fn delete(&self, id: &str) -> Result<Option<ContractRecord>>;

    /// Atomically read, transform and write one record.
    ///
    /// `f` receives the current version (or `None`) and returns the version
    /// to store; returning `None` removes the record. No other write to the
    /// same id can land between the read and the write. Returns the stored
    /// version.
    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(Option<&ContractRecord>) -> Option<ContractRecord>,
    ) -> Result<Option<ContractRecord>>;

    /// Current sync metadata.
    fn metadata(&self) -> Result<SyncMetadata>;

    /// Replace the sync metadata.
    fn set_metadata(&self, metadata: SyncMetadata) -> Result<()>;

    /// Records with unsynced changes, sorted by id.
    fn dirty(&self) -> Result<Vec<ContractRecord>> {
        let mut records: Vec<_> = self.get_all()?.into_iter().filter(|r| r.dirty).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Export everything as a bulk interchange document.
    fn export(&self, exported_at: Timestamp) -> Result<RecordDocument> {
        Ok(RecordDocument::new(
            self.get_all()?,
            self.metadata()?,
            exported_at,
        ))
    }

    /// Replace the store contents with a document's contents.
    fn import(&self, document: RecordDocument) -> Result<()>;
}

/// In-memory store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, ContractRecord>,
    metadata: Mutex<SyncMetadata>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with records.
    pub fn with_records(records: impl IntoIterator<Item = ContractRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.id.clone(), record);
        }
        store
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lock_metadata(&self) -> Result<std::sync::MutexGuard<'_, SyncMetadata>> {
        self.metadata
            .lock()
            .map_err(|_| SyncError::Store("metadata lock poisoned".to_string()))
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<ContractRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn get_all(&self) -> Result<Vec<ContractRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    fn put(&self, record: ContractRecord) -> Result<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<Option<ContractRecord>> {
        Ok(self.records.remove(id).map(|(_, record)| record))
    }

    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(Option<&ContractRecord>) -> Option<ContractRecord>,
    ) -> Result<Option<ContractRecord>> {
        // The entry holds the shard lock for the whole read-modify-write.
        match self.records.entry(id.to_string()) {
            Entry::Occupied(mut entry) => match f(Some(entry.get())) {
                Some(next) => {
                    entry.insert(next.clone());
                    Ok(Some(next))
                }
                None => {
                    entry.remove();
                    Ok(None)
                }
            },
            Entry::Vacant(entry) => match f(None) {
                Some(next) => {
                    entry.insert(next.clone());
                    Ok(Some(next))
                }
                None => Ok(None),
            },
        }
    }

    fn metadata(&self) -> Result<SyncMetadata> {
        Ok(self.lock_metadata()?.clone())
    }

    fn set_metadata(&self, metadata: SyncMetadata) -> Result<()> {
        *self.lock_metadata()? = metadata;
        Ok(())
    }

    fn import(&self, document: RecordDocument) -> Result<()> {
        document.validate()?;
        self.records.clear();
        for record in document.records {
            self.records.insert(record.id.clone(), record);
        }
        *self.lock_metadata()? = document.metadata;
        Ok(())
    }
}

/// Read a backup document from disk. A missing file is an empty store.
pub async fn load_document(path: impl AsRef<Path>) -> Result<RecordDocument> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(RecordDocument::from_json(&json)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No data file yet, starting empty");
            Ok(RecordDocument::new(Vec::new(), SyncMetadata::default(), 0))
        }
        Err(e) => Err(e.into()),
    }
}

/// Write a backup document to disk via a temporary file and rename.
pub async fn save_document(path: impl AsRef<Path>, document: &RecordDocument) -> Result<()> {
    let path = path.as_ref();
    let json = document.to_json_pretty()?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    tracing::debug!(
        path = %path.display(),
        records = document.records.len(),
        "Saved data file"
    );
    Ok(())
}
