//! Unified error handling for the sync client.

use contract_sync_engine::UploadErrorKind;

/// Failure of a single remote call.
///
/// Network and timeout failures are transient; a validation failure means the
/// server rejected the record content. Both leave the record dirty and are
/// retried on the next cycle; the distinction is reported, not acted on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("validation error: {0}")]
    Validation(String),
}

impl RemoteError {
    /// Whether the same request might succeed unchanged later.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout)
    }

    /// Stable leg-level reason shown in the sync summary.
    pub fn reason(&self) -> String {
        match self {
            RemoteError::Network(_) => "network error".to_string(),
            RemoteError::Timeout => "timeout".to_string(),
            RemoteError::Validation(detail) => format!("validation error: {detail}"),
        }
    }

    /// Classification recorded on a failed upload outcome.
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            RemoteError::Network(_) => UploadErrorKind::Network,
            RemoteError::Timeout => UploadErrorKind::Timeout,
            RemoteError::Validation(_) => UploadErrorKind::Validation,
        }
    }
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync cycle is already running")]
    AlreadyRunning,

    #[error("store error: {0}")]
    Store(String),

    #[error("engine error: {0}")]
    Engine(#[from] contract_sync_engine::Error),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable() {
        assert_eq!(
            RemoteError::Network("connection refused".into()).reason(),
            "network error"
        );
        assert_eq!(RemoteError::Timeout.reason(), "timeout");
        assert_eq!(
            RemoteError::Validation("missing customer".into()).reason(),
            "validation error: missing customer"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Network(String::new()).is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(!RemoteError::Validation(String::new()).is_transient());
        assert_eq!(RemoteError::Timeout.kind(), UploadErrorKind::Timeout);
    }

    #[test]
    fn sync_error_display() {
        assert_eq!(
            SyncError::AlreadyRunning.to_string(),
            "a sync cycle is already running"
        );
        let err: SyncError = contract_sync_engine::Error::RecordNotFound("c-1".into()).into();
        assert_eq!(err.to_string(), "engine error: record not found: c-1");
    }
}
