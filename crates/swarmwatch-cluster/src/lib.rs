//! swarmwatch-cluster — read-only access to a Docker Swarm cluster.
//!
//! Defines the swarm domain types the exporter reasons about (services,
//! nodes, tasks, events), the [`ClusterApi`] seam the reconciliation engine
//! is written against, and [`DockerClient`], an implementation that talks
//! to the Docker Engine API over HTTP/1.1 on a unix socket or TCP.
//!
//! # Architecture
//!
//! ```text
//! ClusterApi (trait)
//!   ├── list_services() / list_nodes() / list_tasks()
//!   ├── inspect_service(id)        → ClusterError::NotFound on 404
//!   └── subscribe_events()         → EventStream (mpsc of ClusterEvent)
//!
//! DockerClient
//!   ├── one HTTP/1.1 connection per request
//!   └── /events body → LineDecoder → ClusterEvent
//! ```

pub mod api;
pub mod decode;
pub mod docker;
pub mod error;
pub mod types;

pub use api::{BoxFuture, ClusterApi, EventStream};
pub use docker::{DEFAULT_DOCKER_HOST, DockerClient, DockerEndpoint};
pub use error::{ClusterError, ClusterResult};
pub use types::*;
