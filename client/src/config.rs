//! Configuration management for the sync client.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use contract_sync_engine::{
    ChunkPolicy, ConflictPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_LARGE_CHUNK_SIZE,
    DEFAULT_LARGE_THRESHOLD,
};
use reqwest::Url;

use crate::orchestrator::{SyncSettings, DEFAULT_REQUEST_TIMEOUT};

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Remote base URL
    pub api_url: Url,
    /// Interchange file backing the local store
    pub data_file: PathBuf,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    pub chunk_policy: ChunkPolicy,
    pub conflict_policy: ConflictPolicy,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Periodic sync interval; `None` runs a single cycle
    pub sync_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("CONTRACT_SYNC_API_URL").ok_or(ConfigError::MissingApiUrl)?;
        let api_url = Url::parse(&raw_url).map_err(|_| ConfigError::InvalidApiUrl(raw_url))?;

        let data_file = lookup("CONTRACT_SYNC_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("contracts.json"));

        let auth_token = lookup("CONTRACT_SYNC_AUTH_TOKEN").filter(|t| !t.is_empty());

        let chunk_policy = ChunkPolicy::new(
            number(&lookup, "CONTRACT_SYNC_LARGE_THRESHOLD")?.unwrap_or(DEFAULT_LARGE_THRESHOLD),
            number(&lookup, "CONTRACT_SYNC_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE),
            number(&lookup, "CONTRACT_SYNC_LARGE_CHUNK_SIZE")?.unwrap_or(DEFAULT_LARGE_CHUNK_SIZE),
        )
        .map_err(|e| ConfigError::InvalidChunkPolicy(e.to_string()))?;

        let conflict_policy = match lookup("CONTRACT_SYNC_CONFLICT_POLICY") {
            Some(value) => parse_policy(&value)?,
            None => ConflictPolicy::default(),
        };

        let request_timeout = number::<u64>(&lookup, "CONTRACT_SYNC_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let sync_interval = match number::<u64>(&lookup, "CONTRACT_SYNC_INTERVAL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidNumber {
                    var: "CONTRACT_SYNC_INTERVAL_SECS",
                })
            }
            other => other.map(Duration::from_secs),
        };

        Ok(Self {
            api_url,
            data_file,
            auth_token,
            chunk_policy,
            conflict_policy,
            request_timeout,
            sync_interval,
        })
    }

    /// Orchestrator settings derived from this configuration.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            chunk_policy: self.chunk_policy,
            chunk_size: None,
            conflict_policy: self.conflict_policy,
            request_timeout: self.request_timeout,
        }
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|raw| raw.trim().parse().map_err(|_| ConfigError::InvalidNumber { var }))
        .transpose()
}

fn parse_policy(value: &str) -> Result<ConflictPolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local_wins" => Ok(ConflictPolicy::LocalWins),
        "server_wins" => Ok(ConflictPolicy::ServerWins),
        "field_merge" => Ok(ConflictPolicy::FieldMerge),
        _ => Err(ConfigError::InvalidConflictPolicy(value.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CONTRACT_SYNC_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid CONTRACT_SYNC_API_URL value: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid {var} value")]
    InvalidNumber { var: &'static str },

    #[error("Invalid chunk settings: {0}")]
    InvalidChunkPolicy(String),

    #[error("Invalid CONTRACT_SYNC_CONFLICT_POLICY value: {0}")]
    InvalidConflictPolicy(String),
}
