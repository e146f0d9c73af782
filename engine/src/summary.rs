//! Per-cycle sync results, upload outcomes and orchestrator states.
//!
//! A cycle has two legs, download and upload, that fail independently. The
//! summary always describes each leg on its own; it never collapses both into
//! a single flag.

use crate::{Fields, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Leg failure reason when connectivity is known to be absent.
pub const REASON_OFFLINE: &str = "offline";

/// Why a single record upload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadErrorKind {
    /// Transport failure or unexpected server status
    Network,
    /// Request exceeded its timeout
    Timeout,
    /// Server rejected the record content
    Validation,
}

/// Result of uploading one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub id: RecordId,
    pub ok: bool,
    /// Fields the server assigned or normalized on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_fields: Option<Fields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<UploadErrorKind>,
}

impl UploadOutcome {
    pub fn success(id: impl Into<RecordId>, server_fields: Option<Fields>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            server_fields,
            error_detail: None,
            error_kind: None,
        }
    }

    pub fn failure(
        id: impl Into<RecordId>,
        kind: UploadErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ok: false,
            server_fields: None,
            error_detail: Some(detail.into()),
            error_kind: Some(kind),
        }
    }
}

/// Progress emitted after each chunk drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// Records settled so far; never decreases within one upload call
    pub current: usize,
    /// Records in this upload call
    pub total: usize,
    /// Successful uploads so far
    pub uploaded: usize,
    /// Failed uploads so far
    pub errors: usize,
    /// Chunks drained so far
    pub chunk: usize,
    /// Chunks planned
    pub chunks: usize,
}

/// Aggregate result of one batch upload call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    /// No record failed
    pub ok: bool,
    /// Records accepted by the server
    pub uploaded: usize,
    /// Failed records, in dispatch order
    pub errors: Vec<UploadOutcome>,
    /// Successful records, in dispatch order
    pub succeeded: Vec<UploadOutcome>,
    /// Chunks dispatched
    pub chunks: usize,
}

impl UploadReport {
    /// Report for an upload call with nothing to send.
    pub fn empty() -> Self {
        Self {
            ok: true,
            uploaded: 0,
            errors: Vec::new(),
            succeeded: Vec::new(),
            chunks: 0,
        }
    }

    /// Fold one settled record into the report.
    pub fn push(&mut self, outcome: UploadOutcome) {
        if outcome.ok {
            self.uploaded += 1;
            self.succeeded.push(outcome);
        } else {
            self.ok = false;
            self.errors.push(outcome);
        }
    }

    /// Records settled so far.
    pub fn settled(&self) -> usize {
        self.succeeded.len() + self.errors.len()
    }
}

/// Overall status of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Cycle still running; legs may not be filled in yet
    #[default]
    InProgress,
    /// Both legs succeeded
    Success,
    /// At least one leg failed
    Error,
}

/// Classification of a finished cycle, kept in [`SyncMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleResult {
    /// Both legs succeeded
    Success,
    /// A leg failed but the cycle still moved data
    Partial,
    /// Nothing was exchanged
    Error,
}

/// Orchestrator state machine.
///
/// `Idle` carries the result of the cycle that just finished, if any; a
/// finished cycle is immediately the idle state for the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "camelCase")]
pub enum SyncState {
    Idle(Option<CycleResult>),
    Downloading,
    Merging,
    Uploading,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Idle(None)
    }
}

impl SyncState {
    /// Whether a cycle is running in this state.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle(_))
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle(None) => write!(f, "idle"),
            SyncState::Idle(Some(CycleResult::Success)) => write!(f, "idle(success)"),
            SyncState::Idle(Some(CycleResult::Partial)) => write!(f, "idle(partial)"),
            SyncState::Idle(Some(CycleResult::Error)) => write!(f, "idle(error)"),
            SyncState::Downloading => write!(f, "downloading"),
            SyncState::Merging => write!(f, "merging"),
            SyncState::Uploading => write!(f, "uploading"),
        }
    }
}

/// Download leg of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLeg {
    pub ok: bool,
    /// Local records changed by the merge
    pub count: usize,
    /// Remote records received
    pub fetched: usize,
    /// Conflicts settled by the policy
    pub conflicts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for DownloadLeg {
    fn default() -> Self {
        Self {
            ok: true,
            count: 0,
            fetched: 0,
            conflicts: 0,
            reason: None,
        }
    }
}

impl DownloadLeg {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Upload leg of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLeg {
    pub ok: bool,
    /// Records accepted by the server
    pub count: usize,
    /// Per-record failures
    pub errors: Vec<UploadOutcome>,
    /// Set when the leg did not run at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for UploadLeg {
    fn default() -> Self {
        Self {
            ok: true,
            count: 0,
            errors: Vec::new(),
            reason: None,
        }
    }
}

impl UploadLeg {
    /// A leg that never ran.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

impl From<&UploadReport> for UploadLeg {
    fn from(report: &UploadReport) -> Self {
        Self {
            ok: report.ok,
            count: report.uploaded,
            errors: report.errors.clone(),
            reason: None,
        }
    }
}

/// Structured result of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub download: DownloadLeg,
    pub upload: UploadLeg,
    pub status: SyncStatus,
}

impl SyncSummary {
    /// Summary of a cycle refused because the device is offline.
    pub fn offline() -> Self {
        Self {
            download: DownloadLeg::failed(REASON_OFFLINE),
            upload: UploadLeg::skipped(REASON_OFFLINE),
            status: SyncStatus::Error,
        }
    }

    /// Set the final status from the two legs.
    pub fn finish(&mut self) {
        self.status = if self.download.ok && self.upload.ok {
            SyncStatus::Success
        } else {
            SyncStatus::Error
        };
    }

    /// Classification used for the idle state and the sync metadata.
    pub fn result(&self) -> CycleResult {
        if self.download.ok && self.upload.ok {
            CycleResult::Success
        } else if self.download.ok || self.upload.count > 0 {
            CycleResult::Partial
        } else {
            CycleResult::Error
        }
    }

    /// One-line message describing both legs.
    pub fn describe(&self) -> String {
        let download = if self.download.ok {
            format!(
                "downloaded {} records ({} merged, {} conflicts)",
                self.download.fetched, self.download.count, self.download.conflicts
            )
        } else {
            format!(
                "download failed: {}",
                self.download.reason.as_deref().unwrap_or("unknown error")
            )
        };

        let upload = match (&self.upload.reason, self.upload.errors.len()) {
            (Some(reason), _) if self.upload.count > 0 => {
                format!("uploaded {} records, then failed: {reason}", self.upload.count)
            }
            (Some(reason), _) => format!("upload skipped: {reason}"),
            (None, 0) => format!("uploaded {} records", self.upload.count),
            (None, failed) => format!(
                "uploaded {} records, {} failed",
                self.upload.count, failed
            ),
        };

        format!("{download}; {upload}")
    }
}

/// Sync bookkeeping persisted next to the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<CycleResult>,
    /// Dirty records left after the last cycle
    pub pending_count: usize,
}
