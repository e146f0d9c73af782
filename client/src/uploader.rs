//! Batch uploader - pushes dirty records to the server in chunks.
//!
//! Chunks run one after another; the records inside a chunk are uploaded
//! concurrently and the chunk only completes once every call has settled.
//! A failing record never cancels its siblings and is never retried within
//! the same call.

use std::sync::Arc;
use std::time::Duration;

use contract_sync_engine::{
    ChunkPolicy, ContractRecord, UploadOutcome, UploadProgress, UploadReport,
};
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::error::{RemoteError, Result};
use crate::remote::RemoteClient;

/// Uploads record batches through a [`RemoteClient`].
#[derive(Clone)]
pub struct BatchUploader {
    remote: Arc<dyn RemoteClient>,
    policy: ChunkPolicy,
    request_timeout: Duration,
}

impl std::fmt::Debug for BatchUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchUploader")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl BatchUploader {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        policy: ChunkPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            policy,
            request_timeout,
        }
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    /// Upload `records`, chunked per the policy unless `chunk_size` overrides it.
    ///
    /// After each chunk drains, a [`UploadProgress`] is sent on `progress` if
    /// given. A closed progress receiver is ignored.
    pub async fn upload(
        &self,
        records: &[ContractRecord],
        chunk_size: Option<usize>,
        progress: Option<&mpsc::UnboundedSender<UploadProgress>>,
    ) -> Result<UploadReport> {
        if records.is_empty() {
            return Ok(UploadReport::empty());
        }

        let chunks = self.policy.plan(records, chunk_size)?;
        let total_chunks = chunks.len();
        let mut report = UploadReport::empty();

        tracing::info!(
            records = records.len(),
            chunks = total_chunks,
            "Starting batch upload"
        );

        for (index, chunk) in chunks.enumerate() {
            tracing::debug!(
                chunk = index + 1,
                chunks = total_chunks,
                size = chunk.len(),
                "Dispatching upload chunk"
            );

            let outcomes = join_all(chunk.iter().map(|record| self.upload_one(record))).await;
            for outcome in outcomes {
                report.push(outcome);
            }
            report.chunks += 1;

            if let Some(tx) = progress {
                let _ = tx.send(UploadProgress {
                    current: report.settled(),
                    total: records.len(),
                    uploaded: report.uploaded,
                    errors: report.errors.len(),
                    chunk: index + 1,
                    chunks: total_chunks,
                });
            }
        }

        tracing::info!(
            uploaded = report.uploaded,
            failed = report.errors.len(),
            "Batch upload finished"
        );
        Ok(report)
    }

    async fn upload_one(&self, record: &ContractRecord) -> UploadOutcome {
        let call = self.remote.create_or_update(record);
        let result = tokio::time::timeout(self.request_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout));

        match result {
            Ok(ack) => UploadOutcome::success(record.id.clone(), ack.server_fields),
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "Record upload failed");
                UploadOutcome::failure(record.id.clone(), e.kind(), e.to_string())
            }
        }
    }
}
