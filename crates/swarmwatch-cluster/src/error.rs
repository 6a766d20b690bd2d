//! Error types for the cluster client.

use thiserror::Error;

/// Result type alias for cluster API operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while reading cluster state.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid docker host: {0}")]
    InvalidHost(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("docker api returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("event stream closed")]
    StreamClosed,
}

impl ClusterError {
    /// Whether the error means the requested object does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}
