//! Contract record types.

use crate::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Free-form contract fields (customer, address, notes, ...).
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Workflow state of a contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Registered, work not started
    #[default]
    Open,
    /// Work in progress on site
    InProgress,
    /// Work finished, report pending or done
    Completed,
    /// Billed to the customer
    Invoiced,
    /// Withdrawn before completion
    Cancelled,
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractStatus::Open => write!(f, "open"),
            ContractStatus::InProgress => write!(f, "in_progress"),
            ContractStatus::Completed => write!(f, "completed"),
            ContractStatus::Invoiced => write!(f, "invoiced"),
            ContractStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A contract record as held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    /// Unique identifier, shared by local and remote copies
    pub id: RecordId,
    /// Contract payload
    #[serde(default)]
    pub fields: Fields,
    /// Workflow state
    #[serde(default)]
    pub status: ContractStatus,
    /// Last mutation time (milliseconds since epoch), strictly increasing
    pub updated_at: Timestamp,
    /// Has a local change the server has not confirmed
    #[serde(default)]
    pub dirty: bool,
    /// Deleted locally, deletion not yet confirmed by the server
    #[serde(default)]
    pub tombstone: bool,
}

impl ContractRecord {
    /// Create a record as a fresh local edit (dirty, not yet uploaded).
    pub fn new(
        id: impl Into<RecordId>,
        fields: Fields,
        status: ContractStatus,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            fields,
            status,
            updated_at,
            dirty: true,
            tombstone: false,
        }
    }

    /// Create a record as the server reports it (clean).
    pub fn remote(
        id: impl Into<RecordId>,
        fields: Fields,
        status: ContractStatus,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            dirty: false,
            ..Self::new(id, fields, status, updated_at)
        }
    }

    /// Normalize a copy received from the server: a remote copy is never dirty.
    pub fn into_remote(mut self) -> Self {
        self.dirty = false;
        self
    }

    /// Check if record is active (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.tombstone
    }

    /// Whether two versions carry the same data, ignoring sync flags.
    pub fn same_content(&self, other: &ContractRecord) -> bool {
        self.id == other.id
            && self.updated_at == other.updated_at
            && self.status == other.status
            && self.tombstone == other.tombstone
            && self.fields == other.fields
    }

    /// Apply a local edit. Either part may be left unchanged.
    pub fn edit(
        &mut self,
        fields: Option<Fields>,
        status: Option<ContractStatus>,
        timestamp: Timestamp,
    ) {
        if let Some(fields) = fields {
            self.fields = fields;
        }
        if let Some(status) = status {
            self.status = status;
        }
        self.updated_at = timestamp;
        self.dirty = true;
    }

    /// Mark record as deleted (tombstone) pending server confirmation.
    pub fn mark_deleted(&mut self, timestamp: Timestamp) {
        self.tombstone = true;
        self.updated_at = timestamp;
        self.dirty = true;
    }

    /// Overlay fields returned by the server after a successful upload.
    ///
    /// Returns `true` if any field value changed.
    pub fn overlay_fields(&mut self, server_fields: &Fields) -> bool {
        let mut changed = false;
        for (key, value) in server_fields {
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Substring match over the id and scalar field values.
    /// `needle_lower` must already be lowercased.
    pub(crate) fn matches_text(&self, needle_lower: &str) -> bool {
        if self.id.to_lowercase().contains(needle_lower) {
            return true;
        }
        self.fields.values().any(|v| match v {
            serde_json::Value::String(s) => s.to_lowercase().contains(needle_lower),
            serde_json::Value::Number(n) => n.to_string().contains(needle_lower),
            _ => false,
        })
    }
}
