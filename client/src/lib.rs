//! # Contract Sync Client
//!
//! Async side of contract reconciliation: keeps a local copy of contract
//! records and periodically syncs it with a remote server over an unreliable
//! network.
//!
//! A cycle run by [`SyncOrchestrator::sync`] has two independent legs:
//!
//! - **Download**: fetch the remote record set and merge it record by record
//!   through the [`ConflictResolver`](contract_sync_engine::ConflictResolver)
//! - **Upload**: push every dirty record through the [`BatchUploader`] in
//!   sequential chunks, concurrently within a chunk
//!
//! Either leg may fail without aborting the other; the outcome of both is
//! reported in a [`SyncSummary`](contract_sync_engine::SyncSummary).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use contract_sync_client::{
//!     AlwaysOnline, ContractBook, HttpRemoteClient, MemoryStore, SyncOrchestrator, SyncSettings,
//! };
//! use contract_sync_engine::{ContractStatus, Fields};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let book = Arc::new(ContractBook::new(Arc::new(MemoryStore::new()))?);
//! book.create(Fields::new(), ContractStatus::Open)?;
//!
//! let remote = HttpRemoteClient::new(
//!     "https://api.example.com/".parse()?,
//!     Duration::from_secs(30),
//!     None,
//! )?;
//! let orchestrator = SyncOrchestrator::new(
//!     book,
//!     Arc::new(remote),
//!     Arc::new(AlwaysOnline),
//!     SyncSettings::default(),
//! )?;
//!
//! let summary = orchestrator.sync().await?;
//! println!("{}", summary.describe());
//! # Ok(())
//! # }
//! ```

pub mod book;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod remote;
pub mod store;
pub mod uploader;

pub use book::{now_millis, ContractBook};
pub use config::{Config, ConfigError};
pub use connectivity::{AlwaysOnline, Connectivity, NetworkStatus};
pub use error::{RemoteError, Result, SyncError};
pub use notify::{SubscriberId, SubscriberRegistry, Subscription, SyncCallback, SyncEvent};
pub use orchestrator::{SyncOrchestrator, SyncSettings, DEFAULT_REQUEST_TIMEOUT};
pub use remote::{HttpRemoteClient, RemoteAck, RemoteClient};
pub use store::{load_document, save_document, LocalStore, MemoryStore};
pub use uploader::BatchUploader;
