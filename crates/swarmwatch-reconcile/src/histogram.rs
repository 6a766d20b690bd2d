//! Per-service task state histogram.
//!
//! Built from scratch on every poll. Counts only ever come from a full
//! task listing, never from incremental updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use swarmwatch_cluster::{ServiceId, Task, TaskState};
use swarmwatch_metrics::{GaugeStore, MetricsResult};

use crate::metadata::ServiceMetadata;

/// Identifies one histogram bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub service_id: ServiceId,
    pub version: u64,
}

/// Task counts for one service version, one counter per state.
#[derive(Debug, Clone)]
pub struct StateCounts {
    metadata: Arc<ServiceMetadata>,
    counts: [u64; TaskState::COUNT],
}

impl StateCounts {
    fn zeroed(metadata: Arc<ServiceMetadata>) -> Self {
        Self {
            metadata,
            counts: [0; TaskState::COUNT],
        }
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    pub fn get(&self, state: TaskState) -> u64 {
        self.counts[state.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Every state with its count, zeros included.
    pub fn iter(&self) -> impl Iterator<Item = (TaskState, u64)> + '_ {
        TaskState::ALL.into_iter().map(|state| (state, self.get(state)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskStateHistogram {
    buckets: BTreeMap<BucketKey, StateCounts>,
    unresolved: usize,
}

impl TaskStateHistogram {
    /// Count `tasks` by state for each service `resolve` knows about.
    ///
    /// Tasks whose service cannot be resolved are skipped. The result does
    /// not depend on the order of `tasks`.
    pub fn aggregate<F>(tasks: &[Task], mut resolve: F) -> Self
    where
        F: FnMut(&str) -> Option<Arc<ServiceMetadata>>,
    {
        let mut histogram = Self::default();
        for task in tasks {
            match resolve(&task.service_id) {
                Some(metadata) => histogram.bucket_mut(metadata).counts[task.state.index()] += 1,
                None => histogram.unresolved += 1,
            }
        }
        histogram
    }

    /// Ensure a bucket exists for `metadata`, so the service is published
    /// with zeros even when it has no tasks.
    pub fn seed(&mut self, metadata: Arc<ServiceMetadata>) {
        self.bucket_mut(metadata);
    }

    pub fn get(&self, service_id: &str, version: u64) -> Option<&StateCounts> {
        self.buckets.get(&BucketKey {
            service_id: service_id.to_string(),
            version,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketKey, &StateCounts)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Tasks skipped because their service could not be resolved.
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    /// Tasks counted across all buckets.
    pub fn total_tasks(&self) -> u64 {
        self.buckets.values().map(StateCounts::total).sum()
    }

    /// Write every bucket to `swarm_service_replicas_state`, all states
    /// included. Returns the number of series written.
    pub fn publish(&self, gauges: &GaugeStore) -> MetricsResult<usize> {
        let mut written = 0;
        for counts in self.buckets.values() {
            for (state, count) in counts.iter() {
                gauges.set_replicas_state(&counts.metadata.state_labels(state), count as f64)?;
                written += 1;
            }
        }
        Ok(written)
    }

    fn bucket_mut(&mut self, metadata: Arc<ServiceMetadata>) -> &mut StateCounts {
        let key = BucketKey {
            service_id: metadata.service_id.clone(),
            version: metadata.version,
        };
        self.buckets
            .entry(key)
            .or_insert_with(|| StateCounts::zeroed(metadata))
    }
}
