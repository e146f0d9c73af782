//! Remote client - the network side of a sync cycle.
//!
//! The orchestrator needs two calls: fetch the whole remote record set, and
//! create-or-update one record. Implementations must report a server-side
//! rejection as [`RemoteError::Validation`] and everything else (transport
//! failures, unexpected statuses) as [`RemoteError::Network`] or
//! [`RemoteError::Timeout`].

use crate::error::RemoteError;
use async_trait::async_trait;
use contract_sync_engine::{ContractRecord, Fields};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server acknowledgement of a create-or-update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAck {
    /// Fields the server assigned or normalized (contract number, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_fields: Option<Fields>,
}

/// Network calls a sync cycle makes.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch every record the server holds.
    async fn fetch_all(&self) -> Result<Vec<ContractRecord>, RemoteError>;

    /// Create or update one record. A tombstoned record is a delete request.
    async fn create_or_update(&self, record: &ContractRecord) -> Result<RemoteAck, RemoteError>;
}

/// JSON-over-HTTP remote client.
///
/// - `GET  {base}/contracts` returns an array of records
/// - `PUT  {base}/contracts/{id}` stores one record, optionally answering
///   `{"serverFields": {...}}`
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpRemoteClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            auth_token,
        })
    }

    fn contracts_url(&self, id: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Network(format!("invalid base url: {}", self.base_url)))?;
            segments.pop_if_empty().push("contracts");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn classify(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(error.to_string())
    }
}

fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    )
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_all(&self) -> Result<Vec<ContractRecord>, RemoteError> {
        let url = self.contracts_url(None)?;
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Network(format!("unexpected status {status}")));
        }

        let records: Vec<ContractRecord> = response.json().await.map_err(classify)?;
        tracing::debug!(count = records.len(), "Fetched remote records");
        Ok(records.into_iter().map(ContractRecord::into_remote).collect())
    }

    async fn create_or_update(&self, record: &ContractRecord) -> Result<RemoteAck, RemoteError> {
        let url = self.contracts_url(Some(&record.id))?;
        let response = self
            .authorize(self.http.put(url).json(record))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if is_rejection(status) {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Validation(if body.is_empty() {
                status.to_string()
            } else {
                body
            }));
        }
        if !status.is_success() {
            return Err(RemoteError::Network(format!("unexpected status {status}")));
        }

        let body = response.bytes().await.map_err(classify)?;
        if body.is_empty() {
            return Ok(RemoteAck::default());
        }
        match serde_json::from_slice(&body) {
            Ok(ack) => Ok(ack),
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    error = %e,
                    "Ignoring unreadable upload acknowledgement"
                );
                Ok(RemoteAck::default())
            }
        }
    }
}
