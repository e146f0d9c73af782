//! Sync orchestrator - drives one Download → Merge → Upload cycle at a time.
//!
//! # Cycle
//!
//! 1. Refuse to start if another cycle is running (single-flight)
//! 2. Refuse to touch the network if connectivity is known to be absent
//! 3. Download the remote record set and merge it record by record
//! 4. Upload every dirty record, whatever the download leg did
//! 5. Apply upload results, update metadata, notify subscribers
//!
//! The two legs are independent failure domains. A failed download still
//! uploads pending local edits; a failed upload does not undo the merge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use contract_sync_engine::{
    ChunkPolicy, ConflictPolicy, ConflictResolver, ContractRecord, DownloadLeg, Error, Fields,
    MergeReport, Resolved, SyncMetadata, SyncState, SyncSummary, Timestamp, UploadLeg,
    UploadProgress, UploadReport,
};
use tokio::sync::{mpsc, watch};

use crate::book::{now_millis, ContractBook};
use crate::connectivity::Connectivity;
use crate::error::{RemoteError, Result, SyncError};
use crate::notify::{SubscriberRegistry, Subscription, SyncEvent};
use crate::remote::RemoteClient;
use crate::uploader::BatchUploader;

/// Default bound on every network call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub chunk_policy: ChunkPolicy,
    /// Forces one chunk size regardless of batch size
    pub chunk_size: Option<usize>,
    pub conflict_policy: ConflictPolicy,
    pub request_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            chunk_policy: ChunkPolicy::default(),
            chunk_size: None,
            conflict_policy: ConflictPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SyncSettings {
    /// Reject chunk sizes the uploader could not use.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        self.chunk_policy.validate()?;
        if self.chunk_size == Some(0) {
            return Err(Error::InvalidChunkSize(0));
        }
        Ok(())
    }
}

/// Releases the single-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the sync state machine for one contract book.
pub struct SyncOrchestrator {
    book: Arc<ContractBook>,
    remote: Arc<dyn RemoteClient>,
    connectivity: Arc<dyn Connectivity>,
    uploader: BatchUploader,
    resolver: ConflictResolver,
    settings: SyncSettings,
    subscribers: Arc<SubscriberRegistry>,
    progress: Mutex<Option<mpsc::UnboundedSender<UploadProgress>>>,
    in_flight: AtomicBool,
    state: Mutex<SyncState>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(
        book: Arc<ContractBook>,
        remote: Arc<dyn RemoteClient>,
        connectivity: Arc<dyn Connectivity>,
        settings: SyncSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let uploader = BatchUploader::new(
            remote.clone(),
            settings.chunk_policy,
            settings.request_timeout,
        );

        Ok(Self {
            book,
            remote,
            connectivity,
            uploader,
            resolver: ConflictResolver::new(settings.conflict_policy),
            settings,
            subscribers: SubscriberRegistry::new_shared(),
            progress: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SyncState::default()),
        })
    }

    /// The contract book this orchestrator syncs.
    pub fn book(&self) -> &Arc<ContractBook> {
        &self.book
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state of the state machine.
    pub fn state(&self) -> SyncState {
        *self.lock_state()
    }

    /// Whether a cycle is running right now.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Register a callback for every state transition.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Register a channel for every state transition.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SyncEvent>) {
        self.subscribers.subscribe_channel()
    }

    /// Stream upload progress of subsequent cycles. Replaces any earlier stream.
    pub fn upload_progress(&self) -> mpsc::UnboundedReceiver<UploadProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tx);
        rx
    }

    fn progress_sender(&self) -> Option<mpsc::UnboundedSender<UploadProgress>> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn transition(&self, state: SyncState, summary: &SyncSummary) {
        *self.lock_state() = state;
        tracing::debug!(%state, "Sync state changed");
        self.subscribers.notify(&SyncEvent {
            state,
            summary: summary.clone(),
        });
    }

    /// Run one sync cycle.
    ///
    /// Returns [`SyncError::AlreadyRunning`] immediately if a cycle is in
    /// flight. Leg failures are not errors: they are reported in the summary.
    /// An `Err` other than the rejection means the cycle was aborted; the leg
    /// that aborted is still reported as failed to subscribers and recorded
    /// in the metadata.
    pub async fn sync(&self) -> Result<SyncSummary> {
        let _in_flight = match InFlight::acquire(&self.in_flight) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::debug!("Sync requested while a cycle is running; rejected");
                return Err(e);
            }
        };

        if !self.connectivity.is_online() {
            tracing::info!("Offline, skipping sync cycle");
            let summary = SyncSummary::offline();
            self.finish(&summary)?;
            return Ok(summary);
        }

        let mut summary = SyncSummary::default();
        let outcome = self.run_cycle(&mut summary).await;
        summary.finish();

        match outcome {
            Ok(()) => {
                self.finish(&summary)?;
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, summary = %summary.describe(), "Sync cycle aborted");
                if let Err(meta_err) = self.finish(&summary) {
                    tracing::error!(error = %meta_err, "Could not record aborted cycle");
                    self.transition(SyncState::Idle(Some(summary.result())), &summary);
                }
                Err(e)
            }
        }
    }

    /// Run both legs, filling in `summary` as they complete. On `Err` the leg
    /// that was running is already marked failed and the upload leg, if it
    /// never started, is marked skipped.
    async fn run_cycle(&self, summary: &mut SyncSummary) -> Result<()> {
        self.transition(SyncState::Downloading, summary);
        match self.download().await {
            Ok(remote_records) => {
                self.transition(SyncState::Merging, summary);
                let report = match self.merge(remote_records) {
                    Ok(report) => report,
                    Err(e) => {
                        summary.download = DownloadLeg::failed(format!("merge failed: {e}"));
                        summary.upload = UploadLeg::skipped("cycle aborted");
                        return Err(e);
                    }
                };
                summary.download = DownloadLeg {
                    ok: true,
                    count: report.merged,
                    fetched: report.fetched,
                    conflicts: report.conflicts.len(),
                    reason: None,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Download leg failed");
                summary.download = DownloadLeg::failed(e.reason());
            }
        }

        self.transition(SyncState::Uploading, summary);
        if let Err(e) = self.upload(summary).await {
            summary.upload.ok = false;
            summary.upload.reason = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    async fn upload(&self, summary: &mut SyncSummary) -> Result<()> {
        let pending = self.book.store().dirty()?;
        let progress = self.progress_sender();
        let report = self
            .uploader
            .upload(&pending, self.settings.chunk_size, progress.as_ref())
            .await?;
        summary.upload = UploadLeg::from(&report);
        self.apply_upload(&pending, &report)
    }

    async fn download(&self) -> std::result::Result<Vec<ContractRecord>, RemoteError> {
        tokio::time::timeout(self.settings.request_timeout, self.remote.fetch_all())
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    /// Merge remote records into the store, one atomic update per record.
    fn merge(&self, remote_records: Vec<ContractRecord>) -> Result<MergeReport> {
        let mut report = MergeReport::default();

        for remote in remote_records {
            self.book.observe(remote.updated_at);
            let remote_updated_at = remote.updated_at;
            let mut decision: Option<(Resolved, Option<Timestamp>, bool, bool)> = None;

            self.book.store().update(&remote.id, &mut |current| {
                let mut resolved = self.resolver.resolve(current, remote.clone());
                if let Some(existing) = current {
                    // A remote copy adopted on a timestamp tie still has to
                    // move the stored version forward.
                    if resolved.record.updated_at <= existing.updated_at
                        && !existing.same_content(&resolved.record)
                    {
                        resolved.record.updated_at =
                            self.book.next_timestamp_after(existing.updated_at);
                    }
                }
                // A clean tombstone is a deletion both sides agree on.
                let purge = resolved.record.tombstone && !resolved.record.dirty;
                let changed = match current {
                    None => !purge,
                    Some(existing) => {
                        purge
                            || existing.dirty != resolved.record.dirty
                            || !existing.same_content(&resolved.record)
                    }
                };
                let next = (!purge).then(|| resolved.record.clone());
                let purged = purge && current.is_some();
                decision = Some((resolved, current.map(|c| c.updated_at), changed, purged));
                next
            })?;

            if let Some((resolved, local_updated_at, changed, purged)) = decision {
                if resolved.resolution.is_conflict() {
                    tracing::warn!(
                        id = %resolved.record.id,
                        resolution = ?resolved.resolution,
                        local_updated_at,
                        remote_updated_at,
                        "Conflict settled by policy"
                    );
                }
                if purged {
                    report.purged += 1;
                }
                report.record(&resolved, local_updated_at, remote_updated_at, changed);
            }
        }

        if report.merged > 0 {
            self.book.invalidate_views();
        }
        tracing::info!(
            fetched = report.fetched,
            merged = report.merged,
            purged = report.purged,
            conflicts = report.conflicts.len(),
            "Merged remote records"
        );
        Ok(report)
    }

    /// Write upload results back to the store.
    ///
    /// Only records still at the version that was uploaded are marked clean.
    /// A record edited again while its upload was in flight stays dirty, but
    /// still takes the server-assigned fields its newer edit left untouched.
    fn apply_upload(&self, uploaded: &[ContractRecord], report: &UploadReport) -> Result<()> {
        if report.succeeded.is_empty() {
            return Ok(());
        }

        let versions: HashMap<&str, &ContractRecord> =
            uploaded.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut purged = 0usize;

        for outcome in &report.succeeded {
            let Some(&sent) = versions.get(outcome.id.as_str()) else {
                continue;
            };

            self.book.store().update(&outcome.id, &mut |current| {
                let current = current?;
                if current.updated_at != sent.updated_at {
                    let mut next = current.clone();
                    if let Some(server_fields) = &outcome.server_fields {
                        let untouched = untouched_fields(server_fields, sent, current);
                        if !current.tombstone && next.overlay_fields(&untouched) {
                            next.updated_at = self.book.next_timestamp_after(next.updated_at);
                        }
                    }
                    return Some(next);
                }
                if current.tombstone {
                    purged += 1;
                    return None;
                }
                let mut next = current.clone();
                next.dirty = false;
                if let Some(server_fields) = &outcome.server_fields {
                    if next.overlay_fields(server_fields) {
                        next.updated_at = self.book.next_timestamp_after(next.updated_at);
                    }
                }
                Some(next)
            })?;
        }

        self.book.invalidate_views();
        tracing::debug!(
            confirmed = report.succeeded.len(),
            purged,
            "Applied upload results"
        );
        Ok(())
    }

    /// Record the finished cycle and return to idle.
    fn finish(&self, summary: &SyncSummary) -> Result<()> {
        let result = summary.result();
        let pending_count = self.book.store().dirty()?.len();
        self.book.store().set_metadata(SyncMetadata {
            last_sync_at: Some(now_millis()),
            last_result: Some(result),
            pending_count,
        })?;

        tracing::info!(
            result = ?result,
            pending = pending_count,
            summary = %summary.describe(),
            "Sync cycle finished"
        );
        self.transition(SyncState::Idle(Some(result)), summary);
        Ok(())
    }

    /// Run cycles every `interval` until `shutdown` turns true or its sender
    /// is dropped. A trigger that finds a cycle running is skipped, not queued.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sync().await {
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning) => {
                        tracing::debug!("Scheduled sync skipped, cycle already running");
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduled sync failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Periodic sync stopped");
                        break;
                    }
                }
            }
        }
    }
}

/// Server fields whose key the local edit made after `sent` did not change.
fn untouched_fields(
    server_fields: &Fields,
    sent: &ContractRecord,
    current: &ContractRecord,
) -> Fields {
    server_fields
        .iter()
        .filter(|(key, _)| sent.fields.get(*key) == current.fields.get(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
