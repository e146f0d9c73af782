//! Memoized read-only filter queries over the local record set.
//!
//! Entries are keyed by a hash of the filter and the record count only, so
//! the cache cannot notice an edit that keeps the count unchanged. Owners must
//! call [`FilteredViewCache::invalidate`] on every create, update, or delete;
//! invalidation always drops every entry.

use crate::{ContractRecord, ContractStatus};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Default number of cached queries.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Most recently changed first
    #[default]
    UpdatedDesc,
    UpdatedAsc,
    Id,
}

/// A read-only query over contract records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    /// Only records in this workflow state
    pub status: Option<ContractStatus>,
    /// Case-insensitive substring over id and scalar fields
    pub text: Option<String>,
    /// Only records with unsynced changes
    pub dirty_only: bool,
    /// Include tombstoned records
    pub include_deleted: bool,
    /// Exact matches on field values, compared as text
    pub field_equals: BTreeMap<String, String>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl FilterSpec {
    pub fn with_status(mut self, status: ContractStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_equals.insert(key.into(), value.into());
        self
    }

    pub fn dirty_only(mut self) -> Self {
        self.dirty_only = true;
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes the filter.
    pub fn matches(&self, record: &ContractRecord) -> bool {
        if record.tombstone && !self.include_deleted {
            return false;
        }
        if self.dirty_only && !record.dirty {
            return false;
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        for (key, expected) in &self.field_equals {
            let matched = match record.fields.get(key) {
                Some(serde_json::Value::String(s)) => s == expected,
                Some(other) => other.to_string() == *expected,
                None => false,
            };
            if !matched {
                return false;
            }
        }
        match &self.text {
            Some(text) if !text.is_empty() => record.matches_text(&text.to_lowercase()),
            _ => true,
        }
    }

    /// Run the filter without caching.
    pub fn apply(&self, records: &[ContractRecord]) -> Vec<ContractRecord> {
        let mut result: Vec<ContractRecord> =
            records.iter().filter(|r| self.matches(r)).cloned().collect();

        match self.sort {
            SortOrder::UpdatedDesc => result.sort_by(|a, b| {
                b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::UpdatedAsc => result.sort_by(|a, b| {
                a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::Id => result.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            result.truncate(limit);
        }
        result
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    spec: FilterSpec,
    record_count: usize,
    records: Vec<ContractRecord>,
}

/// Bounded LRU cache of filter results.
///
/// The map keeps entries in recency order: front is least recently used.
#[derive(Debug, Clone)]
pub struct FilteredViewCache {
    entries: IndexMap<u64, CacheEntry>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for FilteredViewCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl FilteredViewCache {
    /// Create a cache holding at most `capacity` queries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: IndexMap::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    fn key(spec: &FilterSpec, record_count: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        spec.hash(&mut hasher);
        record_count.hash(&mut hasher);
        hasher.finish()
    }

    /// Filter `records`, reusing a cached result for the same filter and
    /// record count.
    pub fn get_filtered(
        &mut self,
        records: &[ContractRecord],
        spec: &FilterSpec,
    ) -> Vec<ContractRecord> {
        let key = Self::key(spec, records.len());

        if let Some(entry) = self.entries.shift_remove(&key) {
            if entry.spec == *spec && entry.record_count == records.len() {
                self.hits += 1;
                let result = entry.records.clone();
                self.entries.insert(key, entry);
                return result;
            }
        }

        self.misses += 1;
        let result = spec.apply(records);
        self.entries.insert(
            key,
            CacheEntry {
                spec: spec.clone(),
                record_count: records.len(),
                records: result.clone(),
            },
        );
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
        result
    }

    /// Drop every cached result.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
