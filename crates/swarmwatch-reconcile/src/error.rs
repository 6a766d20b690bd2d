//! Reconciliation error types.

use thiserror::Error;

use swarmwatch_cluster::ClusterError;
use swarmwatch_metrics::MetricsError;

/// Result type alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur while reconciling cluster state into gauges.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no cached metadata found for removed service {0}")]
    NotFound(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}
