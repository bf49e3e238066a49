//! Error types for store backends

use crate::record::RecordId;

/// Record store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Credential rejected
    #[error("record store rejected credentials: {0}")]
    Unauthorized(String),

    /// Store could not be reached
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// Update targeted a record that does not exist
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Store answered with an unexpected status
    #[error("record store request failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("malformed record store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Check if error means the credential itself is bad
    #[inline]
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Blob store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlobStoreError {
    /// Credential rejected
    #[error("blob store rejected credentials: {0}")]
    Unauthorized(String),

    /// Configured bucket does not exist
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Store refused the object
    #[error("blob store rejected object ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network or transport failure
    #[error("blob store transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for BlobStoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
