//! Store error types.

use sprocket_interfaces::{BackendError, BlobError};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the job store.
///
/// Lock contention never appears here: expired-lock handling is
/// resolved inside the acquisition protocol by retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad or conflicting initialization configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced job or trigger does not exist where existence was
    /// required.
    #[error("{0} not found")]
    NotFound(String),

    /// Insert with `replace = false` hit an existing document.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A data-map value could not be serialized.
    #[error("value of data key '{key}' is not serializable: {reason}")]
    Serialization { key: String, reason: String },

    /// A replacement trigger references a different job than the
    /// trigger it replaces.
    #[error("replacement for trigger {trigger} references job {offered}, but the existing trigger references {expected}")]
    JobMismatch {
        trigger: String,
        expected: String,
        offered: String,
    },

    /// Operation recognized but deliberately unimplemented.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Underlying document store failure.
    #[error("storage failure: {0}")]
    Storage(#[from] BackendError),
}

impl From<BlobError> for StoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Unserializable { key, reason } => StoreError::Serialization { key, reason },
            BlobError::Malformed(reason) => StoreError::Serialization {
                key: "<payload>".to_string(),
                reason,
            },
        }
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}
