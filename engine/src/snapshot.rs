//! Bulk interchange document for backup and restore.
//!
//! The whole local record set is written as a plain list of records plus the
//! sync metadata. Records are sorted by id so the same store always produces
//! the same bytes.

use crate::{error::Result, ContractRecord, Error, SyncMetadata, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the document format for future compatibility.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// A point-in-time export of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    /// Document format version
    pub format_version: u32,
    /// When the export was taken (milliseconds since epoch)
    pub exported_at: Timestamp,
    /// Sync bookkeeping at export time
    #[serde(default)]
    pub metadata: SyncMetadata,
    /// All records, tombstones included, sorted by id
    pub records: Vec<ContractRecord>,
}

impl RecordDocument {
    /// Build a document from an unordered record set.
    pub fn new(
        records: impl IntoIterator<Item = ContractRecord>,
        metadata: SyncMetadata,
        exported_at: Timestamp,
    ) -> Self {
        let mut records: Vec<_> = records.into_iter().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            exported_at,
            metadata,
            records,
        }
    }

    /// Count active (non-deleted) records.
    pub fn active_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }

    /// Count records awaiting upload.
    pub fn dirty_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.dirty).count()
    }

    /// Highest `updated_at` in the document, for resuming the clock.
    pub fn max_updated_at(&self) -> Timestamp {
        self.records.iter().map(|r| r.updated_at).max().unwrap_or(0)
    }

    /// Check structural invariants: supported version, unique non-empty ids.
    pub fn validate(&self) -> Result<()> {
        if self.format_version > DOCUMENT_FORMAT_VERSION {
            return Err(Error::UnsupportedFormatVersion {
                found: self.format_version,
                supported: DOCUMENT_FORMAT_VERSION,
            });
        }

        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if record.id.is_empty() {
                return Err(Error::InvalidDocument("record with empty id".to_string()));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(Error::DuplicateRecord(record.id.clone()));
            }
        }

        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidDocument(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidDocument(e.to_string()))
    }

    /// Deserialize and validate.
    ///
    /// A bare JSON array of records is accepted as well, for hand-written or
    /// externally produced backups.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidDocument(e.to_string()))?;

        let document = if value.is_array() {
            let records: Vec<ContractRecord> =
                serde_json::from_value(value).map_err(|e| Error::InvalidDocument(e.to_string()))?;
            Self::new(records, SyncMetadata::default(), 0)
        } else {
            serde_json::from_value(value).map_err(|e| Error::InvalidDocument(e.to_string()))?
        };

        document.validate()?;
        Ok(document)
    }
}
