//! Error types for the metric surface.

use thiserror::Error;

/// Result type alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised while registering, observing, or rendering metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("invalid custom label: {0}")]
    InvalidLabel(String),

    #[error("encode error: {0}")]
    Encode(String),
}
