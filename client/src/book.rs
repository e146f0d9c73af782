//! Contract book - the local side of sync.
//!
//! Bundles the local store with the clock that stamps mutations and the
//! filtered view cache. Every local edit goes through here so that it is
//! marked dirty, gets a strictly newer `updated_at`, and clears the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use contract_sync_engine::{
    CacheStats, ContractRecord, ContractStatus, Error, Fields, FilterSpec, FilteredViewCache,
    MonotonicClock, RecordDocument, Timestamp, DEFAULT_CACHE_CAPACITY,
};

use crate::error::Result;
use crate::store::LocalStore;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Local record set with mutation bookkeeping.
pub struct ContractBook {
    store: Arc<dyn LocalStore>,
    clock: Mutex<MonotonicClock>,
    views: Mutex<FilteredViewCache>,
    /// Bumped on every invalidation, under the `views` lock
    generation: AtomicU64,
}

impl std::fmt::Debug for ContractBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBook")
            .field("clock", &self.lock_clock().last())
            .field("views", &self.lock_views().stats())
            .finish()
    }
}

impl ContractBook {
    /// Wrap a store. The clock resumes after the newest stored record.
    pub fn new(store: Arc<dyn LocalStore>) -> Result<Self> {
        Self::with_cache_capacity(store, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(store: Arc<dyn LocalStore>, capacity: usize) -> Result<Self> {
        let newest = store
            .get_all()?
            .iter()
            .map(|r| r.updated_at)
            .max()
            .unwrap_or(0);

        Ok(Self {
            store,
            clock: Mutex::new(MonotonicClock::starting_at(newest)),
            views: Mutex::new(FilteredViewCache::new(capacity)),
            generation: AtomicU64::new(0),
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    fn lock_clock(&self) -> MutexGuard<'_, MonotonicClock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_views(&self) -> MutexGuard<'_, FilteredViewCache> {
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next mutation timestamp, strictly after `floor` and every earlier one.
    pub fn next_timestamp_after(&self, floor: Timestamp) -> Timestamp {
        self.lock_clock().next_after(now_millis(), floor)
    }

    /// Fold a timestamp seen on the server into the clock.
    pub fn observe(&self, ts: Timestamp) {
        self.lock_clock().observe(ts);
    }

    /// Drop all cached filter results.
    pub fn invalidate_views(&self) {
        let mut views = self.lock_views();
        self.generation.fetch_add(1, Ordering::AcqRel);
        views.invalidate();
    }

    /// Create a contract with a generated id.
    pub fn create(&self, fields: Fields, status: ContractStatus) -> Result<ContractRecord> {
        self.create_with_id(uuid::Uuid::new_v4().to_string(), fields, status)
    }

    /// Create a contract with a caller-chosen id.
    pub fn create_with_id(
        &self,
        id: impl Into<String>,
        fields: Fields,
        status: ContractStatus,
    ) -> Result<ContractRecord> {
        let id = id.into();
        let mut failure = None;

        let stored = self.store.update(&id, &mut |current| match current {
            Some(existing) => {
                failure = Some(Error::DuplicateRecord(existing.id.clone()));
                Some(existing.clone())
            }
            None => Some(ContractRecord::new(
                id.clone(),
                fields.clone(),
                status,
                self.next_timestamp_after(0),
            )),
        })?;

        let record = self.finish_edit(stored, failure, &id)?;
        tracing::debug!(id = %record.id, "Contract created");
        Ok(record)
    }

    /// Change fields and/or status of an existing contract.
    pub fn update(
        &self,
        id: &str,
        fields: Option<Fields>,
        status: Option<ContractStatus>,
    ) -> Result<ContractRecord> {
        let mut failure = None;

        let stored = self.store.update(id, &mut |current| {
            let current = current?;
            if current.tombstone {
                failure = Some(Error::RecordDeleted(id.to_string()));
                return Some(current.clone());
            }
            let mut next = current.clone();
            next.edit(
                fields.clone(),
                status,
                self.next_timestamp_after(current.updated_at),
            );
            Some(next)
        })?;

        let record = self.finish_edit(stored, failure, id)?;
        tracing::debug!(id = %record.id, "Contract updated");
        Ok(record)
    }

    /// Delete a contract. It stays as a tombstone until the server confirms.
    pub fn delete(&self, id: &str) -> Result<ContractRecord> {
        let mut failure = None;

        let stored = self.store.update(id, &mut |current| {
            let current = current?;
            if current.tombstone {
                failure = Some(Error::RecordDeleted(id.to_string()));
                return Some(current.clone());
            }
            let mut next = current.clone();
            next.mark_deleted(self.next_timestamp_after(current.updated_at));
            Some(next)
        })?;

        let record = self.finish_edit(stored, failure, id)?;
        tracing::debug!(id = %record.id, "Contract deleted");
        Ok(record)
    }

    fn finish_edit(
        &self,
        stored: Option<ContractRecord>,
        failure: Option<Error>,
        id: &str,
    ) -> Result<ContractRecord> {
        if let Some(err) = failure {
            return Err(err.into());
        }
        let record = stored.ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        self.invalidate_views();
        Ok(record)
    }

    /// Get an active (non-deleted) contract.
    pub fn get(&self, id: &str) -> Result<Option<ContractRecord>> {
        Ok(self.store.get(id)?.filter(|r| r.is_active()))
    }

    /// Run a filter query, served from the view cache when possible.
    ///
    /// A mutation that lands between the store read and the cache insert
    /// makes the read stale, so its result is returned but not cached.
    pub fn filtered(&self, spec: &FilterSpec) -> Result<Vec<ContractRecord>> {
        let generation = self.generation.load(Ordering::Acquire);
        let records = self.store.get_all()?;

        let mut views = self.lock_views();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::trace!("Store changed during filter query; result not cached");
            return Ok(spec.apply(&records));
        }
        Ok(views.get_filtered(&records, spec))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_views().stats()
    }

    /// Export the record set for backup.
    pub fn export(&self) -> Result<RecordDocument> {
        self.store.export(now_millis())
    }

    /// Replace the record set from a backup.
    pub fn import(&self, document: RecordDocument) -> Result<()> {
        let newest = document.max_updated_at();
        self.store.import(document)?;
        self.observe(newest);
        self.invalidate_views();
        tracing::info!(records = self.store.get_all()?.len(), "Restored contracts from backup");
        Ok(())
    }
}
