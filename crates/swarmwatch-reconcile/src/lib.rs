//! swarmwatch-reconcile — keeps the swarm gauges in step with the cluster.
//!
//! Two writers feed the [`GaugeStore`](swarmwatch_metrics::GaugeStore):
//! the event path keeps `swarm_service_desired_replicas` current with low
//! latency, and the snapshot poller rebuilds `swarm_service_replicas_state`
//! from a full task listing on every cycle. The poller is the only writer
//! of the state histogram, so missed or duplicated events can never make
//! it drift.
//!
//! # Architecture
//!
//! ```text
//! EventStream ──► EventDispatcher ──► lane per service (FIFO) ──┐
//!                     (node events share one lane)              │ bounded by semaphore
//!                                                               ▼
//!                                                          Reconciler
//!                                                   ├── MetadataCache (Arc swap)
//!                                                   ├── ClusterSize
//!                                                   └── DesiredReplicaTracker ──► GaugeStore
//!
//! SnapshotPoller ── every poll interval ──► list tasks
//!                                           └── TaskStateHistogram::aggregate ──► GaugeStore
//! ```
//!
//! # Consistency
//!
//! Metadata records are immutable once published and replaced wholesale.
//! A record carrying an older service version than the cached one is
//! discarded, and events for the same service are applied in delivery
//! order by their lane.

pub mod cache;
pub mod desired;
pub mod dispatch;
pub mod error;
pub mod histogram;
pub mod metadata;
pub mod poller;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod fake;

pub use cache::{ClusterSize, MetadataCache, PutOutcome};
pub use desired::DesiredReplicaTracker;
pub use dispatch::{DEFAULT_LANE_IDLE, DEFAULT_MAX_CONCURRENT, EventDispatcher};
pub use error::{ReconcileError, ReconcileResult};
pub use histogram::{BucketKey, StateCounts, TaskStateHistogram};
pub use metadata::{CustomLabel, ModeTag, ServiceMetadata};
pub use poller::{DEFAULT_POLL_INTERVAL, SnapshotPoller};
pub use reconciler::{EventOutcome, InitStats, Reconciler};
