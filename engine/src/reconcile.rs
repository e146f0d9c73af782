//! Conflict resolution between the local and remote copy of one record.
//!
//! The resolver is pure: it takes the two versions and returns the version to
//! keep. Writing the result back is the caller's job.
//!
//! # Rules
//!
//! 1. No local copy: the remote record is adopted verbatim.
//! 2. Clean local copy: last writer wins by `updated_at`; ties go to the
//!    remote side.
//! 3. Dirty local copy and a remote copy at least as new: this is a conflict,
//!    settled by the [`ConflictPolicy`]. A dirty local edit newer than the
//!    remote copy is not a conflict; it is simply kept for upload.
//!
//! A remote copy kept on a tie carries the same `updated_at` as the local
//! copy it replaces. The caller owns the clock and must re-stamp it.
//!
//! No three-way merge is attempted. Without a common ancestor the resolver
//! cannot tell which side changed a given field, so [`ConflictPolicy::FieldMerge`]
//! is a shallow key union, not a real field-level merge.

use crate::{ContractRecord, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// How a conflict between a dirty local copy and a newer remote copy is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Remote copy replaces the local edit, which is discarded
    ServerWins,
    /// Local edit is kept and re-uploaded, overwriting the server (default)
    #[default]
    LocalWins,
    /// Remote fields are kept where the local copy has no value for the key;
    /// local values win for every key both sides carry
    FieldMerge,
}

/// What the resolver decided for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// No local copy existed; remote adopted
    Adopted,
    /// Both copies carry the same data
    Unchanged,
    /// Clean local copy replaced by a newer remote copy
    RemoteNewer,
    /// Clean local copy is newer than the remote copy and was kept
    LocalNewer,
    /// Dirty local edit is newer than the remote copy; kept for upload
    LocalPending,
    /// Conflict: dirty local edit kept over a newer remote copy
    LocalWins,
    /// Conflict: newer remote copy replaced a dirty local edit
    ServerWins,
    /// Conflict: both copies combined key by key
    FieldMerged,
}

impl Resolution {
    /// Whether this outcome overrode one side of a genuine conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Resolution::LocalWins | Resolution::ServerWins | Resolution::FieldMerged
        )
    }
}

/// Resolver output: the record to keep and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub record: ContractRecord,
    pub resolution: Resolution,
}

/// Non-fatal notice that one side of a conflict was overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictNotice {
    pub id: RecordId,
    pub resolution: Resolution,
    pub local_updated_at: Timestamp,
    pub remote_updated_at: Timestamp,
}

/// Resolves local/remote pairs under a fixed policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    /// Create a resolver with the given policy.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// The policy applied to conflicts.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decide which version of a record to keep locally.
    ///
    /// `remote` is treated as a clean server copy regardless of its flags.
    pub fn resolve(&self, local: Option<&ContractRecord>, remote: ContractRecord) -> Resolved {
        let remote = remote.into_remote();

        let Some(local) = local else {
            return Resolved {
                record: remote,
                resolution: Resolution::Adopted,
            };
        };

        if local.same_content(&remote) {
            return Resolved {
                record: local.clone(),
                resolution: Resolution::Unchanged,
            };
        }

        if !local.dirty {
            return if remote.updated_at >= local.updated_at {
                Resolved {
                    record: remote,
                    resolution: Resolution::RemoteNewer,
                }
            } else {
                Resolved {
                    record: local.clone(),
                    resolution: Resolution::LocalNewer,
                }
            };
        }

        if remote.updated_at < local.updated_at {
            return Resolved {
                record: local.clone(),
                resolution: Resolution::LocalPending,
            };
        }

        match self.policy {
            ConflictPolicy::LocalWins => Resolved {
                record: local.clone(),
                resolution: Resolution::LocalWins,
            },
            ConflictPolicy::ServerWins => Resolved {
                record: remote,
                resolution: Resolution::ServerWins,
            },
            ConflictPolicy::FieldMerge => Resolved {
                record: field_merge(local, remote),
                resolution: Resolution::FieldMerged,
            },
        }
    }
}

fn field_merge(local: &ContractRecord, remote: ContractRecord) -> ContractRecord {
    let mut fields = remote.fields;
    for (key, value) in &local.fields {
        fields.insert(key.clone(), value.clone());
    }

    ContractRecord {
        id: local.id.clone(),
        fields,
        status: local.status,
        // Strictly after both inputs, so the merged version supersedes them.
        updated_at: local.updated_at.max(remote.updated_at) + 1,
        dirty: true,
        tombstone: local.tombstone,
    }
}

/// Tally of one merge pass over the remote record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Remote records examined
    pub fetched: usize,
    /// Records whose stored version changed
    pub merged: usize,
    /// Remote-confirmed deletions purged from the store
    pub purged: usize,
    /// Conflicts settled by the policy
    pub conflicts: Vec<ConflictNotice>,
}

impl MergeReport {
    /// Record one resolver outcome.
    ///
    /// `local_updated_at` is the stored version's timestamp before the merge,
    /// `changed` whether the stored version was replaced.
    pub fn record(
        &mut self,
        resolved: &Resolved,
        local_updated_at: Option<Timestamp>,
        remote_updated_at: Timestamp,
        changed: bool,
    ) {
        self.fetched += 1;
        if changed {
            self.merged += 1;
        }
        if resolved.resolution.is_conflict() {
            self.conflicts.push(ConflictNotice {
                id: resolved.record.id.clone(),
                resolution: resolved.resolution,
                local_updated_at: local_updated_at.unwrap_or_default(),
                remote_updated_at,
            });
        }
    }
}
