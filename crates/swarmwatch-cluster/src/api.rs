//! The cluster API seam.
//!
//! The reconciliation engine only ever reads the cluster through this
//! trait, so tests can substitute an in-memory cluster.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::ClusterResult;
use crate::types::{ClusterEvent, Node, Service, Task};

/// Boxed future returned by [`ClusterApi`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Live cluster events. An `Err` item or the channel closing means the
/// subscription is gone for good.
pub type EventStream = mpsc::Receiver<ClusterResult<ClusterEvent>>;

/// Read-only operations on a swarm cluster.
pub trait ClusterApi: Send + Sync {
    /// List every service.
    fn list_services(&self) -> BoxFuture<'_, ClusterResult<Vec<Service>>>;

    /// List every member node.
    fn list_nodes(&self) -> BoxFuture<'_, ClusterResult<Vec<Node>>>;

    /// List every task, in whatever order the cluster returns them.
    fn list_tasks(&self) -> BoxFuture<'_, ClusterResult<Vec<Task>>>;

    /// Fetch the current definition of one service.
    ///
    /// Returns [`ClusterError::NotFound`](crate::ClusterError::NotFound)
    /// when the service does not exist.
    fn inspect_service<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ClusterResult<Service>>;

    /// Subscribe to service and node events, starting now.
    fn subscribe_events(&self) -> BoxFuture<'_, ClusterResult<EventStream>>;
}
