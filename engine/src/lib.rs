//! # Contract Sync Engine
//!
//! Deterministic core of the contract reconciliation client.
//!
//! This crate holds everything about syncing contract records that can be
//! expressed without IO: the record model, conflict resolution, chunk
//! planning for uploads, the per-cycle summary types, the filtered view cache
//! and the backup document format. The async pieces (stores, network,
//! orchestration) live in `contract-sync-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: no files, network, clocks or threads
//! - **Deterministic**: callers pass timestamps in; same inputs, same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`ContractRecord`] carries an id, free-form fields, a workflow
//! [`ContractStatus`], an `updated_at` timestamp, and two sync flags:
//! `dirty` (local change not yet confirmed by the server) and `tombstone`
//! (deleted locally, deletion not yet confirmed).
//!
//! ### Conflict resolution
//!
//! The [`ConflictResolver`] picks which version of a record to keep. Clean
//! local copies follow last-writer-wins by timestamp; a dirty local copy facing
//! a newer remote copy is settled by the [`ConflictPolicy`]:
//! - [`ConflictPolicy::LocalWins`] - keep the local edit, re-upload it (default)
//! - [`ConflictPolicy::ServerWins`] - discard the local edit
//! - [`ConflictPolicy::FieldMerge`] - shallow key union, local values first
//!
//! ### Uploads
//!
//! [`ChunkPolicy`] decides how many records go into each sequential upload
//! chunk; [`UploadReport`] and [`UploadOutcome`] collect per-record results.
//!
//! ## Quick Start
//!
//! ```rust
//! use contract_sync_engine::{
//!     ConflictResolver, ContractRecord, ContractStatus, Fields, Resolution,
//! };
//! use serde_json::json;
//!
//! let fields: Fields = json!({"customer": "Müller GmbH"}).as_object().cloned().unwrap();
//!
//! // A local edit that has not been uploaded yet
//! let local = ContractRecord::new("c-1", fields.clone(), ContractStatus::InProgress, 1000);
//! // The server copy changed later
//! let remote = ContractRecord::remote("c-1", fields, ContractStatus::Open, 2000);
//!
//! let resolved = ConflictResolver::default().resolve(Some(&local), remote);
//! assert_eq!(resolved.resolution, Resolution::LocalWins);
//! assert!(resolved.record.dirty);
//! ```

pub mod chunk;
pub mod clock;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod snapshot;
pub mod summary;
pub mod view_cache;

// Re-export main types at crate root
pub use chunk::{ChunkPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_LARGE_CHUNK_SIZE, DEFAULT_LARGE_THRESHOLD};
pub use clock::MonotonicClock;
pub use error::Error;
pub use reconcile::{
    ConflictNotice, ConflictPolicy, ConflictResolver, MergeReport, Resolution, Resolved,
};
pub use record::{ContractRecord, ContractStatus, Fields};
pub use snapshot::{RecordDocument, DOCUMENT_FORMAT_VERSION};
pub use summary::{
    CycleResult, DownloadLeg, SyncMetadata, SyncState, SyncStatus, SyncSummary, UploadErrorKind,
    UploadLeg, UploadOutcome, UploadProgress, UploadReport, REASON_OFFLINE,
};
pub use view_cache::{CacheStats, FilterSpec, FilteredViewCache, SortOrder, DEFAULT_CACHE_CAPACITY};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = u64;
